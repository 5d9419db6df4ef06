//! Trade executor.
//!
//! Drives one contract attempt through propose → evaluate → buy → await
//! settlement. Every wait goes through the correlator or a settlement
//! channel with its own deadline; nothing here can stall the session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use super::accountant::Accountant;
use super::correlator::RequestCorrelator;
use crate::storage::TradeJournal;
use crate::strategy::pricing::{PricingConfig, QuoteAssessment, QuoteEvaluator};
use crate::strategy::TradePlan;
use crate::types::{Contract, ContractUpdate, EngineError, RequestKind, SkipReason, TradeRecord};
use crate::venue::{OutboundRequest, Reply};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub symbol: String,
    pub currency: String,
    pub proposal_timeout: Duration,
    pub buy_timeout: Duration,
    /// Lower bound on the settlement wait.
    pub settlement_floor: Duration,
    /// Settlement wait per tick of contract duration.
    pub settlement_per_tick: Duration,
    pub pricing: PricingConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            symbol: "R_10".to_string(),
            currency: "USD".to_string(),
            proposal_timeout: Duration::from_secs(2),
            buy_timeout: Duration::from_secs(5),
            settlement_floor: Duration::from_secs(20),
            settlement_per_tick: Duration::from_secs(20),
            pricing: PricingConfig::default(),
        }
    }
}

impl ExecutionConfig {
    /// `max(settlement_floor, duration_ticks × settlement_per_tick)`
    pub fn settlement_timeout(&self, duration_ticks: u32) -> Duration {
        self.settlement_per_tick
            .saturating_mul(duration_ticks)
            .max(self.settlement_floor)
    }
}

// ---------------------------------------------------------------------------
// Attempt state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    ProposalRequested,
    ProposalReceived,
    EvaluatedGo,
    EvaluatedSkip,
    BuyRequested,
    Bought,
    AwaitingSettlement,
    Settled,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Terminal result of one attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Settled(TradeRecord),
    Skipped {
        reason: SkipReason,
        assessment: QuoteAssessment,
    },
    /// Timed out or failed before a contract existed.
    Aborted {
        stage: AttemptState,
        error: EngineError,
    },
    /// Bought, but the settlement was never observed.
    Unresolved(TradeRecord),
}

impl AttemptOutcome {
    pub fn record(&self) -> Option<&TradeRecord> {
        match self {
            AttemptOutcome::Settled(r) | AttemptOutcome::Unresolved(r) => Some(r),
            _ => None,
        }
    }
}

fn advance(stage: &mut AttemptState, next: AttemptState) {
    debug!(from = %stage, to = %next, "Attempt transition");
    *stage = next;
}

// ---------------------------------------------------------------------------
// Contract book
// ---------------------------------------------------------------------------

struct TrackedContract {
    contract: Contract,
    settlement: Option<oneshot::Sender<Decimal>>,
}

/// Open contracts and their settlement channels.
#[derive(Default)]
pub struct ContractBook {
    open: HashMap<String, TrackedContract>,
}

impl ContractBook {
    /// Start tracking `contract`; the receiver yields its realized profit.
    pub fn track(&mut self, contract: Contract) -> oneshot::Receiver<Decimal> {
        let (tx, rx) = oneshot::channel();
        self.open.insert(
            contract.id.clone(),
            TrackedContract {
                contract,
                settlement: Some(tx),
            },
        );
        rx
    }

    /// Apply a venue update. Returns true when it completed the settlement.
    pub fn apply_update(&mut self, update: &ContractUpdate) -> bool {
        let Some(entry) = self.open.get_mut(&update.contract_id) else {
            trace!(contract_id = %update.contract_id, "Update for untracked contract");
            return false;
        };

        if let Some(sub) = &update.subscription_id {
            entry.contract.subscription_id.get_or_insert_with(|| sub.clone());
        }
        if !update.is_final || entry.contract.is_settled() {
            return false;
        }
        let Some(profit) = update.profit else {
            warn!(contract_id = %update.contract_id, "Final update without profit");
            return false;
        };

        entry.contract.settle(profit);
        if let Some(tx) = entry.settlement.take() {
            let _ = tx.send(profit);
        }
        true
    }

    pub fn get(&self, contract_id: &str) -> Option<&Contract> {
        self.open.get(contract_id).map(|t| &t.contract)
    }

    /// Stop tracking a contract.
    pub fn release(&mut self, contract_id: &str) -> Option<Contract> {
        self.open.remove(contract_id).map(|t| t.contract)
    }

    /// Release everything. Pending settlement waiters see a closed channel.
    pub fn drain(&mut self) -> Vec<Contract> {
        self.open.drain().map(|(_, t)| t.contract).collect()
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct TradeExecutor {
    correlator: RequestCorrelator,
    journal: Arc<dyn TradeJournal>,
    evaluator: QuoteEvaluator,
    config: ExecutionConfig,
}

impl TradeExecutor {
    pub fn new(
        correlator: RequestCorrelator,
        journal: Arc<dyn TradeJournal>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            correlator,
            journal,
            evaluator: QuoteEvaluator::new(config.pricing.clone()),
            config,
        }
    }

    /// Run one attempt for `plan` to a terminal outcome.
    pub async fn attempt(&self, plan: &TradePlan) -> AttemptOutcome {
        let candidate = &plan.candidate;
        let mut stage = AttemptState::Idle;

        // -- Proposal ------------------------------------------------------
        advance(&mut stage, AttemptState::ProposalRequested);
        let proposal = OutboundRequest::Proposal {
            symbol: self.config.symbol.clone(),
            side: candidate.side,
            threshold: candidate.threshold,
            stake: plan.stake,
            duration_ticks: plan.duration_ticks,
            currency: self.config.currency.clone(),
        };
        let quote = match self
            .correlator
            .send_and_wait(RequestKind::Proposal, &proposal, self.config.proposal_timeout)
            .await
        {
            Ok(Reply::Proposal(quote)) => quote,
            Ok(other) => return abort(stage, unexpected(RequestKind::Proposal, &other)),
            Err(e) => return abort(stage, e),
        };
        advance(&mut stage, AttemptState::ProposalReceived);

        // -- Evaluation ----------------------------------------------------
        let assessment = self.evaluator.assess(candidate, &quote, plan.stake);
        if let Err(reason) = self.evaluator.accept(&assessment) {
            advance(&mut stage, AttemptState::EvaluatedSkip);
            info!(
                side = %candidate.side,
                threshold = candidate.threshold,
                reason = %reason,
                "Quote skipped"
            );
            return AttemptOutcome::Skipped { reason, assessment };
        }
        advance(&mut stage, AttemptState::EvaluatedGo);
        info!(
            side = %candidate.side,
            threshold = candidate.threshold,
            stake = format!("${:.2}", plan.stake),
            duration_ticks = plan.duration_ticks,
            payout = format!("${:.2}", assessment.payout),
            ev = format!("{:+.4}", assessment.ev),
            payout_ratio = format!("{:.3}", assessment.payout_ratio),
            "Quote accepted"
        );

        // -- Purchase ------------------------------------------------------
        advance(&mut stage, AttemptState::BuyRequested);
        let buy = OutboundRequest::Buy {
            proposal_id: quote.proposal_id.clone(),
            price: plan.stake,
        };
        let purchase = match self
            .correlator
            .send_and_wait(RequestKind::Purchase, &buy, self.config.buy_timeout)
            .await
        {
            Ok(Reply::Purchase(purchase)) => purchase,
            Ok(other) => return abort(stage, unexpected(RequestKind::Purchase, &other)),
            Err(e) => return abort(stage, e),
        };
        let Some(contract_id) = purchase.contract_id.clone() else {
            return abort(
                stage,
                EngineError::protocol("missing_contract_id", "buy confirmation carried no contract id"),
            );
        };
        advance(&mut stage, AttemptState::Bought);

        let payout = purchase.payout.unwrap_or(quote.payout);
        let (contract, settlement) = {
            let mut book = self.correlator.book().lock().await;
            book.state.trade_no += 1;
            let contract = Contract::bought(
                contract_id.clone(),
                book.state.trade_no,
                candidate,
                plan.stake,
                payout,
            );
            let rx = book.contracts.track(contract.clone());
            (contract, rx)
        };
        info!(contract = %contract, "Contract bought");

        // -- Settlement ----------------------------------------------------
        advance(&mut stage, AttemptState::AwaitingSettlement);
        let subscribe = OutboundRequest::SubscribeContract {
            contract_id: contract_id.clone(),
        };
        if let Err(e) = self.correlator.notify(&subscribe).await {
            warn!(contract_id = %contract_id, error = %e, "Contract subscription failed");
        }

        let wait = self.config.settlement_timeout(plan.duration_ticks);
        let settled = timeout(wait, settlement).await;

        let (outcome, subscription) = {
            let mut book = self.correlator.book().lock().await;
            let released = book.contracts.release(&contract_id);
            let subscription = released.as_ref().and_then(|c| c.subscription_id.clone());

            // The final update may land between the deadline and the lock.
            let settled = match (settled, released.and_then(|c| c.profit)) {
                (Err(_), Some(profit)) | (Ok(Err(_)), Some(profit)) => {
                    debug!(contract_id = %contract_id, "Settlement arrived after the wait ended");
                    Ok(Ok(profit))
                }
                (settled, _) => settled,
            };

            let outcome = match settled {
                Ok(Ok(profit)) => {
                    advance(&mut stage, AttemptState::Settled);
                    let record = Accountant::settle(
                        &mut book.state,
                        &contract,
                        &assessment,
                        candidate.p_hat,
                        profit,
                    );
                    AttemptOutcome::Settled(record)
                }
                Ok(Err(_)) => {
                    warn!(contract_id = %contract_id, "Settlement wait cancelled");
                    AttemptOutcome::Unresolved(Accountant::unresolved(
                        &mut book.state,
                        &contract,
                        &assessment,
                        candidate.p_hat,
                    ))
                }
                Err(_) => {
                    let error = EngineError::SettlementTimeout {
                        contract_id: contract_id.clone(),
                        after: wait,
                    };
                    warn!(error = %error, "Settlement not observed");
                    AttemptOutcome::Unresolved(Accountant::unresolved(
                        &mut book.state,
                        &contract,
                        &assessment,
                        candidate.p_hat,
                    ))
                }
            };

            if let Some(record) = outcome.record() {
                book.push_recent(record.clone());
            }
            (outcome, subscription)
        };

        if let Some(subscription_id) = subscription {
            let forget = OutboundRequest::Forget { subscription_id };
            if let Err(e) = self.correlator.notify(&forget).await {
                debug!(error = %e, "Forget failed");
            }
        }

        if let Some(record) = outcome.record() {
            if let Err(e) = self.journal.append(record) {
                error!(error = %e, trade_no = record.trade_no, "Failed to write journal row");
            }
        }

        outcome
    }
}

fn abort(stage: AttemptState, error: EngineError) -> AttemptOutcome {
    warn!(stage = %stage, error = %error, "Attempt aborted");
    AttemptOutcome::Aborted { stage, error }
}

fn unexpected(expected: RequestKind, got: &Reply) -> EngineError {
    EngineError::protocol(
        "unexpected_reply",
        format!("expected {expected} reply, got {}", got.kind()),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
