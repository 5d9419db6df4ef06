//! Digit-edge detection.
//!
//! Scans every over/under barrier in the configured range, compares the
//! empirical win probability from the window against the uniform-digit
//! null and keeps the candidate with the highest fair EV among those
//! that clear the edge, z-score and EV gates.

use tracing::debug;

use crate::data::DigitSnapshot;
use crate::types::{Candidate, Side};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Minimum window members before any candidate is produced.
    pub warmup_ticks: u32,
    /// Lowest barrier scanned (inclusive).
    pub scan_min: u8,
    /// Highest barrier scanned (inclusive).
    pub scan_max: u8,
    /// Minimum `p_hat - p0`.
    pub min_edge: f64,
    /// Minimum standardized edge.
    pub z_threshold: f64,
    pub allow_over: bool,
    pub allow_under: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            warmup_ticks: 20,
            scan_min: 1,
            scan_max: 8,
            min_edge: 0.01,
            z_threshold: 1.64,
            allow_over: true,
            allow_under: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Standardized distance of `p_hat` from `p0` for a sample of size `n`.
/// Zero when `n` is zero or the null variance is not positive.
pub fn z_score(p_hat: f64, p0: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let var = p0 * (1.0 - p0) / n as f64;
    if var <= 0.0 {
        return 0.0;
    }
    (p_hat - p0) / var.sqrt()
}

/// EV per unit stake when a contract winning with `p_hat` pays the
/// break-even odds of the null, `b0 = 1/p0 - 1`. Reduces to
/// `p_hat / p0 - 1`; zero when either probability is not positive.
pub fn fair_ev(p_hat: f64, p0: f64) -> f64 {
    if p_hat <= 0.0 || p0 <= 0.0 {
        return 0.0;
    }
    let fair_b = 1.0 / p0 - 1.0;
    p_hat * fair_b - (1.0 - p_hat)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless candidate search over a window snapshot.
pub struct StrategyEngine {
    config: StrategyConfig,
}

impl StrategyEngine {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Best candidate for this snapshot, or `None`.
    ///
    /// Scan order is ascending barrier, OVER before UNDER at each barrier;
    /// a later candidate only displaces the incumbent with a strictly
    /// greater `fair_ev`, so ties resolve to the first found.
    pub fn evaluate(&self, snapshot: &DigitSnapshot) -> Option<Candidate> {
        let n = snapshot.total;
        if n == 0 || n < self.config.warmup_ticks {
            return None;
        }

        let freq = snapshot.frequencies();
        // prefix[i] = P(digit < i)
        let mut prefix = [0.0f64; 11];
        for d in 0..10 {
            prefix[d + 1] = prefix[d] + freq[d];
        }

        let lo = self.config.scan_min.min(9);
        let hi = self.config.scan_max.min(9);
        let mut best: Option<Candidate> = None;

        for t in lo..=hi {
            let ti = t as usize;
            let sides = [
                (Side::Over, prefix[10] - prefix[ti + 1], (9 - ti) as f64 / 10.0),
                (Side::Under, prefix[ti], ti as f64 / 10.0),
            ];

            for (side, p_hat, p0) in sides {
                let enabled = match side {
                    Side::Over => self.config.allow_over,
                    Side::Under => self.config.allow_under,
                };
                if !enabled {
                    continue;
                }

                let edge = p_hat - p0;
                let z = z_score(p_hat, p0, n);
                let ev = fair_ev(p_hat, p0);

                if edge < self.config.min_edge || z < self.config.z_threshold || ev <= 0.0 {
                    continue;
                }

                let candidate = Candidate {
                    side,
                    threshold: t,
                    p_hat,
                    p0,
                    edge,
                    z,
                    fair_ev: ev,
                    sample_size: n,
                };

                let better = best.map_or(true, |b| candidate.fair_ev > b.fair_ev);
                if better {
                    best = Some(candidate);
                }
            }
        }

        if let Some(c) = &best {
            debug!(
                side = %c.side,
                threshold = c.threshold,
                p_hat = format!("{:.3}", c.p_hat),
                edge = format!("{:+.3}", c.edge),
                z = format!("{:.2}", c.z),
                fair_ev = format!("{:.3}", c.fair_ev),
                n,
                "Candidate found"
            );
        }

        best
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
