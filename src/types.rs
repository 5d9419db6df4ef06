//! Shared types for the DIGITEDGE engine.
//!
//! These types form the data model used across all modules: ticks and
//! candidates flow from the data/strategy layers, contracts and the
//! session counters are mutated by the engine, and `EngineError` is the
//! single error taxonomy returned by library code.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// A single streamed quote and its terminal digit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub quote: Decimal,
    /// Final decimal digit of the quote at the venue's pip precision (0–9).
    pub digit: u8,
    /// Venue epoch seconds.
    pub epoch: i64,
    pub received_at: DateTime<Utc>,
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (digit {}) @ {}", self.quote, self.digit, self.epoch)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Contract direction relative to the barrier digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Wins when the settlement digit is strictly greater than the barrier.
    Over,
    /// Wins when the settlement digit is strictly less than the barrier.
    Under,
}

impl Side {
    /// Venue contract type for this side.
    pub fn contract_type(&self) -> &'static str {
        match self {
            Side::Over => "DIGITOVER",
            Side::Under => "DIGITUNDER",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Over => "over",
            Side::Under => "under",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Over => write!(f, "OVER"),
            Side::Under => write!(f, "UNDER"),
        }
    }
}

/// Kind of a correlated request awaiting its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Authorize,
    History,
    Proposal,
    Purchase,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Authorize => write!(f, "authorize"),
            RequestKind::History => write!(f, "history"),
            RequestKind::Proposal => write!(f, "proposal"),
            RequestKind::Purchase => write!(f, "purchase"),
        }
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Paused,
    Terminated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "RUNNING"),
            SessionStatus::Paused => write!(f, "PAUSED"),
            SessionStatus::Terminated => write!(f, "TERMINATED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy types
// ---------------------------------------------------------------------------

/// A provisionally attractive side/threshold pair.
///
/// Produced fresh every decision cycle from a window snapshot and never
/// mutated afterwards; the live quote is assessed separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub side: Side,
    /// Barrier digit (0–9).
    pub threshold: u8,
    /// Empirical win probability from the window.
    pub p_hat: f64,
    /// Win probability under the uniform-digit null.
    pub p0: f64,
    /// `p_hat - p0`
    pub edge: f64,
    /// Standardized edge.
    pub z: f64,
    /// EV per unit stake at the null's break-even odds.
    pub fair_ev: f64,
    /// Window size the estimate was computed from.
    pub sample_size: u32,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | p_hat={:.3} p0={:.2} edge={:+.3} z={:.2} fair_ev={:.3} (n={})",
            self.side,
            self.threshold,
            self.p_hat,
            self.p0,
            self.edge,
            self.z,
            self.fair_ev,
            self.sample_size,
        )
    }
}

/// A priced proposal returned by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub proposal_id: String,
    /// Gross amount paid on a win.
    pub payout: f64,
    /// Price asked for the contract.
    pub ask_price: f64,
}

/// Account details returned on authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Decimal,
    pub currency: String,
    pub login_id: Option<String>,
}

/// Purchase confirmation. A missing contract id means the buy did not
/// produce a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub contract_id: Option<String>,
    pub buy_price: Option<f64>,
    pub payout: Option<f64>,
}

/// Lifecycle update for an open contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractUpdate {
    pub contract_id: String,
    /// True once the venue reports a terminal state.
    pub is_final: bool,
    pub profit: Option<Decimal>,
    pub subscription_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    Bought,
    Settled,
}

/// A purchased contract tracked until its settlement is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub trade_no: u64,
    pub side: Side,
    pub threshold: u8,
    pub stake: f64,
    pub proposed_payout: f64,
    pub status: ContractStatus,
    pub profit: Option<Decimal>,
    pub subscription_id: Option<String>,
    pub bought_at: DateTime<Utc>,
}

impl Contract {
    /// A freshly confirmed purchase.
    pub fn bought(
        id: impl Into<String>,
        trade_no: u64,
        candidate: &Candidate,
        stake: f64,
        proposed_payout: f64,
    ) -> Self {
        Self {
            id: id.into(),
            trade_no,
            side: candidate.side,
            threshold: candidate.threshold,
            stake,
            proposed_payout,
            status: ContractStatus::Bought,
            profit: None,
            subscription_id: None,
            bought_at: Utc::now(),
        }
    }

    pub fn settle(&mut self, profit: Decimal) {
        self.profit = Some(profit);
        self.status = ContractStatus::Settled;
    }

    pub fn is_settled(&self) -> bool {
        self.status == ContractStatus::Settled
    }
}

impl fmt::Display for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} {} stake=${:.2} payout=${:.2} [{:?}]",
            self.trade_no,
            self.id,
            self.side,
            self.threshold,
            self.stake,
            self.proposed_payout,
            self.status,
        )
    }
}

/// One row of the trade journal: a bought contract and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub trade_no: u64,
    pub contract_id: String,
    pub side: Side,
    pub threshold: u8,
    pub stake: f64,
    pub payout: f64,
    /// Realized profit; `None` while unresolved.
    pub profit: Option<Decimal>,
    pub p_win: f64,
    pub net_b: f64,
    pub ev: f64,
    pub balance: Decimal,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.profit.is_some_and(|p| p > Decimal::ZERO)
    }
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profit = match self.profit {
            Some(p) => format!("{p:+.2}"),
            None => "pending".to_string(),
        };
        write!(
            f,
            "#{} {} {} stake=${:.2} payout=${:.2} profit={} p={:.3} ev={:+.3} bal=${:.2}",
            self.trade_no,
            self.side,
            self.threshold,
            self.stake,
            self.payout,
            profit,
            self.p_win,
            self.ev,
            self.balance,
        )
    }
}

// ---------------------------------------------------------------------------
// Skips and halts
// ---------------------------------------------------------------------------

/// Why a decision cycle ended without a trade. None of these are errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SkipReason {
    NotAuthorized,
    Cooldown,
    Paused { until_tick: u64 },
    NoCandidate { observed: u32 },
    PolicyReject { ev: f64, payout_ratio: f64 },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAuthorized => write!(f, "session not authorized"),
            SkipReason::Cooldown => write!(f, "cooldown"),
            SkipReason::Paused { until_tick } => write!(f, "paused until tick {until_tick}"),
            SkipReason::NoCandidate { observed } => {
                write!(f, "no candidate ({observed} digits observed)")
            }
            SkipReason::PolicyReject { ev, payout_ratio } => write!(
                f,
                "quote rejected (ev={ev:+.4}, payout_ratio={payout_ratio:.3})"
            ),
        }
    }
}

/// Why the daily risk gate ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum TerminationReason {
    TakeProfit { pnl: Decimal },
    StopLoss { pnl: Decimal },
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::TakeProfit { pnl } => write!(f, "take-profit reached ({pnl:+.2})"),
            TerminationReason::StopLoss { pnl } => write!(f, "stop-loss breached ({pnl:+.2})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Counters for one trading session. Reset only by restarting the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub balance: Decimal,
    pub start_balance: Decimal,
    pub currency: String,
    pub authorized: bool,
    pub current_stake: f64,
    pub loss_streak: u32,
    pub wins: u64,
    pub losses: u64,
    /// Bought contracts whose settlement was never observed.
    pub unresolved: u64,
    pub trade_no: u64,
    /// Live ticks observed since the session started.
    pub ticks_seen: u64,
    pub pause_until_tick: u64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | balance={:.2} {} | pnl={:+.2} | trades={} (W{}/L{}/U{}) | streak={} | stake={:.2}",
            self.status,
            self.balance,
            self.currency,
            self.session_pnl(),
            self.trade_no,
            self.wins,
            self.losses,
            self.unresolved,
            self.loss_streak,
            self.current_stake,
        )
    }
}

impl SessionState {
    pub fn new(base_stake: f64) -> Self {
        Self {
            balance: Decimal::ZERO,
            start_balance: Decimal::ZERO,
            currency: String::new(),
            authorized: false,
            current_stake: base_stake,
            loss_streak: 0,
            wins: 0,
            losses: 0,
            unresolved: 0,
            trade_no: 0,
            ticks_seen: 0,
            pause_until_tick: 0,
            status: SessionStatus::Running,
            started_at: Utc::now(),
        }
    }

    /// Set the opening balance. Only the first authorization fixes
    /// `start_balance`; later ones refresh the balance alone.
    pub fn initialize_balance(&mut self, balance: Decimal, currency: &str) {
        if !self.authorized {
            self.start_balance = balance;
            self.authorized = true;
        }
        self.balance = balance;
        self.currency = currency.to_string();
    }

    /// Cumulative profit since the session started.
    pub fn session_pnl(&self) -> Decimal {
        self.balance - self.start_balance
    }

    pub fn trades_resolved(&self) -> u64 {
        self.wins + self.losses
    }

    /// Win rate as a percentage. Returns 0.0 if no resolved trades.
    pub fn win_rate(&self) -> f64 {
        let resolved = self.trades_resolved();
        if resolved == 0 {
            0.0
        } else {
            (self.wins as f64 / resolved as f64) * 100.0
        }
    }

    pub fn is_paused(&self) -> bool {
        self.ticks_seen < self.pause_until_tick
    }

    /// Apply a realized profit. Returns true for a win.
    pub fn record_settlement(&mut self, profit: Decimal) -> bool {
        self.balance += profit;
        if profit > Decimal::ZERO {
            self.wins += 1;
            self.loss_streak = 0;
            true
        } else {
            self.losses += 1;
            self.loss_streak += 1;
            false
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Error taxonomy for the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error ({code}): {message}")]
    Protocol { code: String, message: String },

    #[error("{kind} request {tag} timed out after {after:?}")]
    RequestTimeout {
        tag: String,
        kind: RequestKind,
        after: Duration,
    },

    #[error("Settlement of contract {contract_id} not observed within {after:?}")]
    SettlementTimeout { contract_id: String, after: Duration },

    #[error("Request {tag} cancelled")]
    Cancelled { tag: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn protocol(code: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Protocol {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EngineError::RequestTimeout { .. } | EngineError::SettlementTimeout { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
