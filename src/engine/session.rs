//! Trading session: authorize, warm up, subscribe, run the decision loop,
//! shut down.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::correlator::RequestCorrelator;
use super::dispatcher::Dispatcher;
use super::executor::{AttemptOutcome, ExecutionConfig, TradeExecutor};
use super::SharedBook;
use crate::data::last_digit;
use crate::storage::TradeJournal;
use crate::strategy::{DecisionPipeline, DecisionRecord};
use crate::types::{
    EngineError, RequestKind, SessionState, SessionStatus, SkipReason, TerminationReason, Tick,
};
use crate::venue::{OutboundRequest, Reply, VenueTransport};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub symbol: String,
    /// Pip precision of the symbol's quotes.
    pub quote_decimals: u32,
    /// Historical quotes requested to seed the window (0 skips warm-up).
    pub warmup_history: usize,
    pub auth_timeout: Duration,
    pub history_timeout: Duration,
    /// Minimum gap between two trade attempts.
    pub cooldown: Duration,
    pub tick_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            symbol: "R_10".to_string(),
            quote_decimals: 3,
            warmup_history: 1000,
            auth_timeout: Duration::from_secs(10),
            history_timeout: Duration::from_secs(10),
            cooldown: Duration::from_millis(1500),
            tick_channel_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What one decision cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleResult {
    Skipped(SkipReason),
    Attempted(AttemptOutcome),
    Terminated(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    Shutdown,
    FeedClosed,
    RiskGate(TerminationReason),
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub reason: StopReason,
    pub state: SessionState,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    config: SessionConfig,
    book: SharedBook,
    correlator: RequestCorrelator,
    pipeline: DecisionPipeline,
    executor: TradeExecutor,
    ticks: mpsc::Receiver<Tick>,
    last_attempt: Option<Instant>,
}

impl Session {
    /// Wire a session to `transport`. The returned dispatcher must be fed
    /// every inbound frame from the same venue.
    pub fn new(
        config: SessionConfig,
        book: SharedBook,
        transport: Arc<dyn VenueTransport>,
        pipeline: DecisionPipeline,
        execution: ExecutionConfig,
        journal: Arc<dyn TradeJournal>,
    ) -> (Self, Dispatcher) {
        let (tick_tx, tick_rx) = mpsc::channel(config.tick_channel_capacity.max(1));
        let dispatcher = Dispatcher::new(book.clone(), tick_tx, config.quote_decimals);
        let correlator = RequestCorrelator::new(book.clone(), transport);
        let executor = TradeExecutor::new(correlator.clone(), journal, execution);

        let session = Self {
            config,
            book,
            correlator,
            pipeline,
            executor,
            ticks: tick_rx,
            last_attempt: None,
        };
        (session, dispatcher)
    }

    /// Authorize, seed the window from history, subscribe to live ticks.
    ///
    /// Authorization failure is fatal; a failed warm-up only means the
    /// window fills from live ticks.
    pub async fn start(&mut self, token: SecretString) -> Result<(), EngineError> {
        let authorize = OutboundRequest::Authorize { token };
        match self
            .correlator
            .send_and_wait(RequestKind::Authorize, &authorize, self.config.auth_timeout)
            .await?
        {
            Reply::Authorized(account) => {
                info!(
                    balance = %account.balance,
                    currency = %account.currency,
                    "Session authorized"
                );
            }
            other => {
                return Err(EngineError::protocol(
                    "unexpected_reply",
                    format!("expected authorize reply, got {}", other.kind()),
                ));
            }
        }

        if self.config.warmup_history > 0 {
            self.warm_up().await;
        }

        let subscribe = OutboundRequest::SubscribeTicks {
            symbol: self.config.symbol.clone(),
        };
        self.correlator.notify(&subscribe).await?;
        info!(symbol = %self.config.symbol, "Subscribed to ticks");
        Ok(())
    }

    async fn warm_up(&mut self) {
        let request = OutboundRequest::TicksHistory {
            symbol: self.config.symbol.clone(),
            count: self.config.warmup_history,
        };
        let prices = match self
            .correlator
            .send_and_wait(RequestKind::History, &request, self.config.history_timeout)
            .await
        {
            Ok(Reply::History(prices)) => prices,
            Ok(other) => {
                warn!(got = %other.kind(), "Unexpected warm-up reply");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Warm-up failed, starting from live ticks");
                return;
            }
        };

        let decimals = self.config.quote_decimals;
        let mut book = self.book.lock().await;
        let seeded = book
            .window
            .extend(prices.iter().filter_map(|q| last_digit(*q, decimals)));
        info!(
            requested = self.config.warmup_history,
            seeded,
            window = book.window.len(),
            "Warm-up complete"
        );
    }

    /// One decision cycle against the current window.
    pub async fn run_cycle(&mut self) -> CycleResult {
        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.config.cooldown {
                return CycleResult::Skipped(SkipReason::Cooldown);
            }
        }

        // Coalesce notifications that piled up during the last attempt.
        while self.ticks.try_recv().is_ok() {}

        let decision = {
            let mut book = self.book.lock().await;
            let snapshot = book.window.snapshot();
            self.pipeline.plan(&snapshot, &mut book.state)
        };

        let plan = match decision {
            DecisionRecord::Skip(reason) => {
                debug!(reason = %reason, "Cycle skipped");
                return CycleResult::Skipped(reason);
            }
            DecisionRecord::Halt(reason) => return CycleResult::Terminated(reason),
            DecisionRecord::Trade(plan) => plan,
        };

        self.last_attempt = Some(Instant::now());
        let outcome = self.executor.attempt(&plan).await;

        if let AttemptOutcome::Settled(_) = &outcome {
            let mut book = self.book.lock().await;
            self.pipeline.risk().after_settlement(&mut book.state);
            info!(session = %book.state, "Session status");
        }

        CycleResult::Attempted(outcome)
    }

    /// Decision loop. Runs one cycle per tick notification until
    /// `shutdown` completes, the feed closes or the risk gate ends the
    /// session. `shutdown` is also watched while an attempt is in flight.
    /// Always shuts down cleanly before returning.
    pub async fn run<F>(&mut self, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break StopReason::Shutdown;
                }
                tick = self.ticks.recv() => {
                    if tick.is_none() {
                        warn!("Tick feed closed");
                        break StopReason::FeedClosed;
                    }
                    let cycle = tokio::select! {
                        _ = &mut shutdown => None,
                        result = self.run_cycle() => Some(result),
                    };
                    let Some(cycle) = cycle else {
                        info!("Shutdown requested during an attempt");
                        break StopReason::Shutdown;
                    };
                    match cycle {
                        CycleResult::Terminated(reason) => break StopReason::RiskGate(reason),
                        CycleResult::Attempted(_) => {
                            if let Some(reason) = self.check_limits().await {
                                break StopReason::RiskGate(reason);
                            }
                        }
                        CycleResult::Skipped(_) => {}
                    }
                }
            }
        };

        if let StopReason::RiskGate(reason) = &reason {
            let book = self.book.lock().await;
            warn!(
                reason = %reason,
                pnl = %book.state.session_pnl(),
                balance = %book.state.balance,
                "Session terminated by risk gate"
            );
        }

        self.shutdown().await;

        let state = self.book.lock().await.state.clone();
        info!(
            trades = state.trade_no,
            wins = state.wins,
            losses = state.losses,
            unresolved = state.unresolved,
            win_rate = format!("{:.1}%", state.win_rate()),
            pnl = %state.session_pnl(),
            "Session finished"
        );
        SessionSummary { reason, state }
    }

    async fn check_limits(&self) -> Option<TerminationReason> {
        let mut book = self.book.lock().await;
        let reason = self.pipeline.risk().limit_breached(&book.state)?;
        book.state.status = SessionStatus::Terminated;
        Some(reason)
    }

    /// Release waiters and unsubscribe from every stream. Contracts still
    /// open are booked from whatever the venue reported for them.
    pub async fn shutdown(&self) {
        let cancelled = self.correlator.cancel_all().await;
        let subscriptions = {
            let mut book = self.book.lock().await;
            let mut subscriptions = Vec::new();
            for contract in book.contracts.drain() {
                match contract.profit {
                    Some(profit) => {
                        book.state.record_settlement(profit);
                    }
                    None => {
                        book.state.unresolved += 1;
                        warn!(contract = %contract, "Open contract left unresolved at shutdown");
                    }
                }
                subscriptions.extend(contract.subscription_id);
            }
            subscriptions
        };

        for subscription_id in subscriptions {
            let forget = OutboundRequest::Forget { subscription_id };
            if let Err(e) = self.correlator.notify(&forget).await {
                debug!(error = %e, "Forget failed");
            }
        }

        let forget_ticks = OutboundRequest::ForgetAll {
            stream: "ticks".to_string(),
        };
        if let Err(e) = self.correlator.notify(&forget_ticks).await {
            debug!(error = %e, "Tick unsubscribe failed");
        }

        info!(cancelled, "Session shut down");
    }
}
