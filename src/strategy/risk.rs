//! Risk controller.
//!
//! Sizes stakes with a capped geometric recovery curve, pauses trading
//! for a number of ticks after a run of losses, and ends the session when
//! the daily take-profit or stop-loss is hit.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::*;
use tracing::{info, warn};

use crate::types::{SessionState, SessionStatus, TerminationReason};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub base_stake: f64,
    /// Stake grows by this factor per consecutive loss.
    pub recovery_multiplier: f64,
    pub max_stake: f64,
    pub min_stake: f64,
    /// Stake cap as a fraction of the current balance (0 disables).
    pub max_stake_pct_balance: f64,
    /// Half-width of the uniform stake perturbation (0 disables).
    pub stake_jitter: f64,
    /// Session profit at which trading stops.
    pub take_profit: Decimal,
    /// Session profit (negative) at which trading stops.
    pub stop_loss: Decimal,
    /// Consecutive losses that trigger a pause (0 disables).
    pub loss_streak_pause: u32,
    /// Ticks to sit out once paused.
    pub pause_ticks: u64,
    /// Clear the loss streak when a pause ends.
    pub reset_streak_after_pause: bool,
    /// Contract durations in ticks, one drawn per trade.
    pub duration_choices: Vec<u32>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_stake: 1.0,
            recovery_multiplier: 1.2,
            max_stake: 50.0,
            min_stake: 0.35,
            max_stake_pct_balance: 0.02,
            stake_jitter: 0.05,
            take_profit: Decimal::from(40),
            stop_loss: Decimal::from(-20),
            loss_streak_pause: 3,
            pause_ticks: 6,
            reset_streak_after_pause: false,
            duration_choices: vec![1, 2],
        }
    }
}

/// Outcome of the pre-trade gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateVerdict {
    Proceed,
    Paused { until_tick: u64 },
    Terminate(TerminationReason),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct RiskController {
    config: RiskConfig,
    rng: StdRng,
}

impl RiskController {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter for tests and replays.
    pub fn with_seed(config: RiskConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Stake for the next trade given the session's loss streak and balance.
    ///
    /// `min(base × multiplier^streak, max_stake)`, capped at the balance
    /// fraction, floored at `min_stake`, then jittered inside those bounds
    /// and rounded to cents.
    pub fn size_stake(&mut self, state: &SessionState) -> f64 {
        let cfg = &self.config;
        let streak = state.loss_streak.min(i32::MAX as u32) as i32;
        let curve = cfg.base_stake * cfg.recovery_multiplier.powi(streak);

        let mut upper = cfg.max_stake;
        let balance = state.balance.to_f64().unwrap_or(0.0);
        if cfg.max_stake_pct_balance > 0.0 && balance > 0.0 {
            upper = upper.min(balance * cfg.max_stake_pct_balance);
        }
        let upper = upper.max(cfg.min_stake);

        let mut stake = curve.min(upper).max(cfg.min_stake);
        if cfg.stake_jitter > 0.0 {
            stake += self.rng.gen_range(-cfg.stake_jitter..=cfg.stake_jitter);
        }

        round_cents(stake).clamp(cfg.min_stake, upper)
    }

    /// Contract duration for the next trade, drawn from `duration_choices`.
    pub fn pick_duration(&mut self) -> u32 {
        self.config
            .duration_choices
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(1)
    }

    /// Daily gate: terminate on take-profit / stop-loss, hold while a
    /// loss-streak pause is active. Updates `state.status` to match and
    /// applies the streak reset when a pause has run out.
    pub fn gate(&self, state: &mut SessionState) -> GateVerdict {
        if let Some(reason) = self.limit_breached(state) {
            if state.status != SessionStatus::Terminated {
                warn!(
                    pnl = %state.session_pnl(),
                    reason = %reason,
                    "Daily risk limit hit. Trading stopped."
                );
            }
            state.status = SessionStatus::Terminated;
            return GateVerdict::Terminate(reason);
        }

        if state.is_paused() {
            state.status = SessionStatus::Paused;
            return GateVerdict::Paused {
                until_tick: state.pause_until_tick,
            };
        }

        self.resume_if_due(state);
        GateVerdict::Proceed
    }

    /// Leave a finished pause, resetting the loss streak if configured.
    /// Returns true when the session was resumed by this call.
    pub fn resume_if_due(&self, state: &mut SessionState) -> bool {
        if state.status != SessionStatus::Paused || state.is_paused() {
            return false;
        }
        if self.config.reset_streak_after_pause {
            state.loss_streak = 0;
        }
        info!(
            tick = state.ticks_seen,
            loss_streak = state.loss_streak,
            "Pause over, resuming"
        );
        state.status = SessionStatus::Running;
        true
    }

    /// Take-profit / stop-loss check without side effects. Compared in
    /// `Decimal` so a limit hit to the cent terminates.
    pub fn limit_breached(&self, state: &SessionState) -> Option<TerminationReason> {
        if !state.authorized {
            return None;
        }
        let pnl = state.session_pnl();
        if pnl >= self.config.take_profit {
            Some(TerminationReason::TakeProfit { pnl })
        } else if pnl <= self.config.stop_loss {
            Some(TerminationReason::StopLoss { pnl })
        } else {
            None
        }
    }

    /// Bookkeeping after a settled trade: start a pause every time the
    /// loss streak reaches a multiple of `loss_streak_pause`.
    pub fn after_settlement(&self, state: &mut SessionState) {
        let every = self.config.loss_streak_pause;
        if every == 0 || state.loss_streak == 0 || state.loss_streak % every != 0 {
            return;
        }
        state.pause_until_tick = state.ticks_seen + self.config.pause_ticks;
        state.status = SessionStatus::Paused;
        warn!(
            loss_streak = state.loss_streak,
            until_tick = state.pause_until_tick,
            "Loss streak, pausing"
        );
    }
}

fn round_cents(value: f64) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
