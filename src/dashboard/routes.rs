//! Status API route handlers.
//!
//! All endpoints return JSON built from a snapshot taken under the
//! session book lock.

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::SharedBook;
use crate::types::TradeRecord;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub authorized: bool,
    pub balance: Decimal,
    pub start_balance: Decimal,
    pub currency: String,
    pub session_pnl: Decimal,
    pub current_stake: f64,
    pub loss_streak: u32,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub unresolved: u64,
    pub win_rate: f64,
    pub ticks_seen: u64,
    pub pause_until_tick: u64,
    pub window_size: u32,
    pub digit_counts: [u32; 10],
    pub pending_requests: usize,
    pub open_contracts: usize,
    pub uptime_secs: i64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(book): State<SharedBook>) -> Json<StatusResponse> {
    let book = book.lock().await;
    let state = &book.state;
    let snapshot = book.window.snapshot();

    Json(StatusResponse {
        status: state.status.to_string(),
        authorized: state.authorized,
        balance: state.balance,
        start_balance: state.start_balance,
        currency: state.currency.clone(),
        session_pnl: state.session_pnl(),
        current_stake: state.current_stake,
        loss_streak: state.loss_streak,
        trades: state.trade_no,
        wins: state.wins,
        losses: state.losses,
        unresolved: state.unresolved,
        win_rate: state.win_rate(),
        ticks_seen: state.ticks_seen,
        pause_until_tick: state.pause_until_tick,
        window_size: snapshot.total,
        digit_counts: snapshot.counts,
        pending_requests: book.pending.len(),
        open_contracts: book.contracts.len(),
        uptime_secs: state.uptime().num_seconds(),
    })
}

/// GET /api/trades: most recent outcomes, oldest first.
pub async fn get_trades(State(book): State<SharedBook>) -> Json<Vec<TradeRecord>> {
    let book = book.lock().await;
    Json(book.recent.iter().cloned().collect())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SessionBook;
    use crate::types::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_get_status_handler() {
        let mut book = SessionBook::new(10, 1.0);
        book.state.initialize_balance(dec!(100), "USD");
        book.state.record_settlement(dec!(-2.5));
        let Json(resp) = get_status(State(book.shared())).await;
        assert_eq!(resp.balance, dec!(97.5));
        assert_eq!(resp.session_pnl, dec!(-2.5));
        assert_eq!(resp.losses, 1);
        assert_eq!(resp.loss_streak, 1);
    }

    #[tokio::test]
    async fn test_get_trades_returns_recent() {
        let mut book = SessionBook::new(10, 1.0);
        book.push_recent(TradeRecord {
            timestamp: Utc::now(),
            trade_no: 1,
            contract_id: "c".into(),
            side: Side::Over,
            threshold: 3,
            stake: 1.0,
            payout: 1.6,
            profit: None,
            p_win: 0.7,
            net_b: 0.6,
            ev: 0.12,
            balance: dec!(100),
        });
        let Json(trades) = get_trades(State(book.shared())).await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].profit, None);
    }

    #[test]
    fn test_status_response_serializes() {
        let resp = StatusResponse {
            status: "PAUSED".into(),
            authorized: true,
            balance: dec!(100),
            start_balance: dec!(110),
            currency: "USD".into(),
            session_pnl: dec!(-10),
            current_stake: 1.44,
            loss_streak: 3,
            trades: 5,
            wins: 2,
            losses: 3,
            unresolved: 0,
            win_rate: 40.0,
            ticks_seen: 600,
            pause_until_tick: 606,
            window_size: 1000,
            digit_counts: [100; 10],
            pending_requests: 0,
            open_contracts: 0,
            uptime_secs: 3600,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("PAUSED"));
        assert!(json.contains("\"pause_until_tick\":606"));
        assert!(json.contains("\"session_pnl\":-10.0"));
    }
}
