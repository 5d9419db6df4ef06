//! Strategy layer: digit-edge detection, live-quote pricing, and risk control.

pub mod edge;
pub mod pricing;
pub mod risk;

use tracing::{debug, info};

use crate::data::DigitSnapshot;
use crate::types::{Candidate, SessionState, SkipReason, TerminationReason};
use edge::StrategyEngine;
use risk::{GateVerdict, RiskController};

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// A candidate cleared by the risk gate together with its sized stake
/// and contract duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradePlan {
    pub candidate: Candidate,
    pub stake: f64,
    pub duration_ticks: u32,
}

/// Outcome of one pass through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionRecord {
    /// Nothing to do this cycle.
    Skip(SkipReason),
    /// Daily limit reached; the session must stop.
    Halt(TerminationReason),
    /// Ready for the executor.
    Trade(TradePlan),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Risk gate → edge detection → stake sizing.
///
/// Instantiate once per session and call `plan` on every decision cycle
/// with the current window snapshot.
pub struct DecisionPipeline {
    engine: StrategyEngine,
    risk: RiskController,
}

impl DecisionPipeline {
    pub fn new(engine: StrategyEngine, risk: RiskController) -> Self {
        Self { engine, risk }
    }

    pub fn risk(&self) -> &RiskController {
        &self.risk
    }

    /// Decide what to do with `snapshot`. Sets `state.current_stake` when a
    /// trade is planned.
    pub fn plan(&mut self, snapshot: &DigitSnapshot, state: &mut SessionState) -> DecisionRecord {
        if !state.authorized {
            return DecisionRecord::Skip(SkipReason::NotAuthorized);
        }

        match self.risk.gate(state) {
            GateVerdict::Terminate(reason) => return DecisionRecord::Halt(reason),
            GateVerdict::Paused { until_tick } => {
                debug!(tick = state.ticks_seen, until_tick, "Paused");
                return DecisionRecord::Skip(SkipReason::Paused { until_tick });
            }
            GateVerdict::Proceed => {}
        }

        let Some(candidate) = self.engine.evaluate(snapshot) else {
            return DecisionRecord::Skip(SkipReason::NoCandidate {
                observed: snapshot.total,
            });
        };

        let stake = self.risk.size_stake(state);
        state.current_stake = stake;
        let duration_ticks = self.risk.pick_duration();

        info!(
            candidate = %candidate,
            stake = format!("${:.2}", stake),
            duration_ticks,
            loss_streak = state.loss_streak,
            "Trade planned"
        );

        DecisionRecord::Trade(TradePlan {
            candidate,
            stake,
            duration_ticks,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
