//! Live-quote evaluation.
//!
//! The strategy's fair EV assumes idealized odds. Before buying, the
//! candidate is re-scored against the payout the venue actually quoted:
//!
//!   net_b        = (payout - ask) / ask
//!   ev           = p·net_b - (1 - p)
//!   fair_payout  = stake / p
//!   payout_ratio = payout / fair_payout

use serde::Serialize;
use tracing::debug;

use crate::types::{Candidate, Quote, SkipReason};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// EV per unit stake must be strictly above this floor.
    pub min_ev: f64,
    /// Quoted payout must be at least this fraction of the fair payout.
    pub min_payout_ratio: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            min_ev: 0.0,
            min_payout_ratio: 0.9,
        }
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// A candidate scored against a live quote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteAssessment {
    pub proposal_id: String,
    pub payout: f64,
    pub ask_price: f64,
    /// Net odds: profit per unit risked on a win.
    pub net_b: f64,
    /// EV per unit stake at the quoted odds.
    pub ev: f64,
    pub fair_payout: f64,
    pub payout_ratio: f64,
}

pub struct QuoteEvaluator {
    config: PricingConfig,
}

impl QuoteEvaluator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Score `quote` for `candidate` at `stake`.
    pub fn assess(&self, candidate: &Candidate, quote: &Quote, stake: f64) -> QuoteAssessment {
        let p = candidate.p_hat;
        let net_b = if quote.ask_price > 0.0 {
            (quote.payout - quote.ask_price) / quote.ask_price
        } else {
            0.0
        };
        let ev = p * net_b - (1.0 - p);
        let fair_payout = if p > 0.0 { stake / p } else { f64::INFINITY };
        let payout_ratio = if fair_payout.is_finite() && fair_payout > 0.0 {
            quote.payout / fair_payout
        } else {
            0.0
        };

        QuoteAssessment {
            proposal_id: quote.proposal_id.clone(),
            payout: quote.payout,
            ask_price: quote.ask_price,
            net_b,
            ev,
            fair_payout,
            payout_ratio,
        }
    }

    /// Go / skip decision on an assessment.
    pub fn accept(&self, assessment: &QuoteAssessment) -> Result<(), SkipReason> {
        let ev_ok = assessment.ev > self.config.min_ev;
        let ratio_ok = assessment.payout_ratio >= self.config.min_payout_ratio;

        if ev_ok && ratio_ok {
            return Ok(());
        }

        debug!(
            proposal_id = %assessment.proposal_id,
            ev = format!("{:+.4}", assessment.ev),
            min_ev = self.config.min_ev,
            payout_ratio = format!("{:.3}", assessment.payout_ratio),
            min_payout_ratio = self.config.min_payout_ratio,
            "Quote below policy"
        );
        Err(SkipReason::PolicyReject {
            ev: assessment.ev,
            payout_ratio: assessment.payout_ratio,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
