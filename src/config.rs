//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The API token is referenced by env-var name in the config and resolved
//! at runtime, then held as a `SecretString`.

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::*;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::executor::ExecutionConfig;
use crate::engine::session::SessionConfig;
use crate::strategy::edge::StrategyConfig;
use crate::strategy::pricing::PricingConfig;
use crate::strategy::risk::RiskConfig;
use crate::venue::deriv::endpoint_url;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub venue: VenueConfig,
    pub strategy: StrategySection,
    pub execution: ExecutionSection,
    pub risk: RiskSection,
    pub journal: JournalConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VenueConfig {
    pub endpoint: String,
    pub app_id: String,
    pub api_token_env: String,
    pub symbol: String,
    pub currency: String,
    /// Pip precision of the symbol's quotes.
    pub quote_decimals: u32,
    pub ping_interval_secs: u64,
    pub auth_timeout_secs: u64,
    pub history_timeout_secs: u64,
    /// Historical quotes used to seed the window (0 disables).
    pub warmup_history: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategySection {
    pub window_size: usize,
    pub warmup_ticks: u32,
    pub scan_min: u8,
    pub scan_max: u8,
    pub min_edge: f64,
    pub z_threshold: f64,
    #[serde(default = "enabled")]
    pub allow_over: bool,
    #[serde(default = "enabled")]
    pub allow_under: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExecutionSection {
    /// Contract durations in ticks; one is drawn per trade.
    #[serde(default = "default_durations")]
    pub duration_choices: Vec<u32>,
    pub proposal_timeout_ms: u64,
    pub buy_timeout_ms: u64,
    pub settlement_floor_secs: u64,
    pub settlement_secs_per_tick: u64,
    pub min_ev: f64,
    pub min_payout_ratio: f64,
    pub cooldown_ms: u64,
    #[serde(default = "default_tick_channel")]
    pub tick_channel_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RiskSection {
    pub base_stake: f64,
    pub recovery_multiplier: f64,
    pub max_stake: f64,
    pub min_stake: f64,
    pub max_stake_pct_balance: f64,
    pub stake_jitter: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub loss_streak_pause: u32,
    pub pause_ticks: u64,
    #[serde(default)]
    pub reset_streak_after_pause: bool,
    /// Fixed seed for stake jitter; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JournalConfig {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

fn enabled() -> bool {
    true
}

fn default_tick_channel() -> usize {
    256
}

fn default_durations() -> Vec<u32> {
    vec![1, 2]
}

/// Money amounts are configured as floats and held to the cent.
fn cents(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(2))
        .unwrap_or_default()
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The venue API token, read from the configured env var.
    pub fn api_token(&self) -> Result<SecretString> {
        let token = Self::resolve_env(&self.venue.api_token_env)?;
        if token.trim().is_empty() {
            bail!("{} is empty", self.venue.api_token_env);
        }
        Ok(SecretString::new(token))
    }

    /// Reject values that cannot produce a coherent session.
    pub fn validate(&self) -> Result<()> {
        let v = &self.venue;
        if v.symbol.is_empty() || v.currency.is_empty() {
            bail!("venue.symbol and venue.currency must be set");
        }
        if v.quote_decimals > 10 {
            bail!("venue.quote_decimals must be at most 10");
        }
        if v.ping_interval_secs == 0 {
            bail!("venue.ping_interval_secs must be positive");
        }

        let s = &self.strategy;
        if s.window_size == 0 {
            bail!("strategy.window_size must be positive");
        }
        if s.warmup_ticks as usize > s.window_size {
            bail!("strategy.warmup_ticks cannot exceed strategy.window_size");
        }
        if s.scan_min > s.scan_max || s.scan_max > 9 {
            bail!("strategy scan range must satisfy scan_min <= scan_max <= 9");
        }
        if !s.allow_over && !s.allow_under {
            bail!("at least one of strategy.allow_over / allow_under must be enabled");
        }

        let e = &self.execution;
        if e.duration_choices.is_empty()
            || e.duration_choices.iter().any(|d| !(1..=10).contains(d))
        {
            bail!("execution.duration_choices must list durations between 1 and 10 ticks");
        }
        if e.proposal_timeout_ms == 0 || e.buy_timeout_ms == 0 {
            bail!("execution timeouts must be positive");
        }
        if e.min_payout_ratio < 0.0 {
            bail!("execution.min_payout_ratio cannot be negative");
        }
        if e.tick_channel_capacity == 0 {
            bail!("execution.tick_channel_capacity must be positive");
        }

        let r = &self.risk;
        if r.min_stake <= 0.0 || r.min_stake > r.base_stake || r.base_stake > r.max_stake {
            bail!("risk stakes must satisfy 0 < min_stake <= base_stake <= max_stake");
        }
        if r.recovery_multiplier < 1.0 {
            bail!("risk.recovery_multiplier must be at least 1.0");
        }
        if !(0.0..=1.0).contains(&r.max_stake_pct_balance) {
            bail!("risk.max_stake_pct_balance must be within [0, 1]");
        }
        if r.stake_jitter < 0.0 {
            bail!("risk.stake_jitter cannot be negative");
        }
        if !r.take_profit.is_finite() || !r.stop_loss.is_finite() {
            bail!("risk.take_profit and risk.stop_loss must be finite");
        }
        if r.take_profit <= 0.0 || r.stop_loss >= 0.0 {
            bail!("risk.take_profit must be positive and risk.stop_loss negative");
        }

        if self.journal.enabled && self.journal.path.is_empty() {
            bail!("journal.path must be set when the journal is enabled");
        }
        Ok(())
    }

    pub fn endpoint(&self) -> String {
        endpoint_url(&self.venue.endpoint, &self.venue.app_id)
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        let s = &self.strategy;
        StrategyConfig {
            warmup_ticks: s.warmup_ticks,
            scan_min: s.scan_min,
            scan_max: s.scan_max,
            min_edge: s.min_edge,
            z_threshold: s.z_threshold,
            allow_over: s.allow_over,
            allow_under: s.allow_under,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        let r = &self.risk;
        RiskConfig {
            base_stake: r.base_stake,
            recovery_multiplier: r.recovery_multiplier,
            max_stake: r.max_stake,
            min_stake: r.min_stake,
            max_stake_pct_balance: r.max_stake_pct_balance,
            stake_jitter: r.stake_jitter,
            take_profit: cents(r.take_profit),
            stop_loss: cents(r.stop_loss),
            loss_streak_pause: r.loss_streak_pause,
            pause_ticks: r.pause_ticks,
            reset_streak_after_pause: r.reset_streak_after_pause,
            duration_choices: self.execution.duration_choices.clone(),
        }
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        let e = &self.execution;
        ExecutionConfig {
            symbol: self.venue.symbol.clone(),
            currency: self.venue.currency.clone(),
            proposal_timeout: Duration::from_millis(e.proposal_timeout_ms),
            buy_timeout: Duration::from_millis(e.buy_timeout_ms),
            settlement_floor: Duration::from_secs(e.settlement_floor_secs),
            settlement_per_tick: Duration::from_secs(e.settlement_secs_per_tick),
            pricing: PricingConfig {
                min_ev: e.min_ev,
                min_payout_ratio: e.min_payout_ratio,
            },
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            symbol: self.venue.symbol.clone(),
            quote_decimals: self.venue.quote_decimals,
            warmup_history: self.venue.warmup_history,
            auth_timeout: Duration::from_secs(self.venue.auth_timeout_secs),
            history_timeout: Duration::from_secs(self.venue.history_timeout_secs),
            cooldown: Duration::from_millis(self.execution.cooldown_ms),
            tick_channel_capacity: self.execution.tick_channel_capacity,
        }
    }
}
