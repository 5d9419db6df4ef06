//! Accountant: applies contract outcomes to the session counters and
//! produces the journal row.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::strategy::pricing::QuoteAssessment;
use crate::types::{Contract, SessionState, TradeRecord};

pub struct Accountant;

impl Accountant {
    /// Book a settled contract: balance, wins/losses and loss streak.
    pub fn settle(
        state: &mut SessionState,
        contract: &Contract,
        assessment: &QuoteAssessment,
        p_win: f64,
        profit: Decimal,
    ) -> TradeRecord {
        let won = state.record_settlement(profit);

        info!(
            trade_no = contract.trade_no,
            contract_id = %contract.id,
            result = if won { "WIN" } else { "LOSS" },
            profit = %profit,
            balance = %state.balance,
            pnl = %state.session_pnl(),
            win_rate = format!("{:.1}%", state.win_rate()),
            loss_streak = state.loss_streak,
            "Trade settled"
        );

        Self::record(state, contract, assessment, p_win, Some(profit))
    }

    /// Book a contract whose settlement was never observed. Counts as
    /// neither a win nor a loss.
    pub fn unresolved(
        state: &mut SessionState,
        contract: &Contract,
        assessment: &QuoteAssessment,
        p_win: f64,
    ) -> TradeRecord {
        state.unresolved += 1;

        warn!(
            trade_no = contract.trade_no,
            contract_id = %contract.id,
            unresolved = state.unresolved,
            "Trade unresolved"
        );

        Self::record(state, contract, assessment, p_win, None)
    }

    fn record(
        state: &SessionState,
        contract: &Contract,
        assessment: &QuoteAssessment,
        p_win: f64,
        profit: Option<Decimal>,
    ) -> TradeRecord {
        TradeRecord {
            timestamp: Utc::now(),
            trade_no: contract.trade_no,
            contract_id: contract.id.clone(),
            side: contract.side,
            threshold: contract.threshold,
            stake: contract.stake,
            payout: contract.proposed_payout,
            profit,
            p_win,
            net_b: assessment.net_b,
            ev: assessment.ev,
            balance: state.balance,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candidate, Side};
    use rust_decimal_macros::dec;

    fn contract() -> Contract {
        let candidate = Candidate {
            side: Side::Under,
            threshold: 7,
            p_hat: 0.75,
            p0: 0.7,
            edge: 0.05,
            z: 1.9,
            fair_ev: 0.07,
            sample_size: 500,
        };
        Contract::bought("c-1", 3, &candidate, 2.0, 2.7)
    }

    fn assessment() -> QuoteAssessment {
        QuoteAssessment {
            proposal_id: "p".into(),
            payout: 2.7,
            ask_price: 2.0,
            net_b: 0.35,
            ev: 0.0125,
            fair_payout: 2.0 / 0.75,
            payout_ratio: 1.0125,
        }
    }

    fn state() -> SessionState {
        let mut s = SessionState::new(1.0);
        s.initialize_balance(dec!(100), "USD");
        s
    }

    #[test]
    fn test_loss_updates_counters() {
        let mut s = state();
        let record = Accountant::settle(&mut s, &contract(), &assessment(), 0.75, dec!(-3));
        assert_eq!(s.losses, 1);
        assert_eq!(s.loss_streak, 1);
        assert_eq!(s.balance, dec!(97));
        assert_eq!(record.profit, Some(dec!(-3)));
        assert_eq!(record.balance, dec!(97));
        assert_eq!(record.side, Side::Under);
        assert_eq!(record.threshold, 7);
    }

    #[test]
    fn test_win_resets_streak() {
        let mut s = state();
        s.loss_streak = 4;
        let record = Accountant::settle(&mut s, &contract(), &assessment(), 0.75, dec!(0.7));
        assert!(record.is_win());
        assert_eq!(s.wins, 1);
        assert_eq!(s.loss_streak, 0);
    }

    #[test]
    fn test_unresolved_is_not_a_result() {
        let mut s = state();
        let record = Accountant::unresolved(&mut s, &contract(), &assessment(), 0.75);
        assert_eq!(s.unresolved, 1);
        assert_eq!(s.trades_resolved(), 0);
        assert_eq!(s.balance, dec!(100));
        assert_eq!(record.profit, None);
        assert_eq!(record.trade_no, 3);
    }
}
