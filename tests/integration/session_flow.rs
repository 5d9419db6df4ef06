//! End-to-end session scenarios against the scripted venue.
//!
//! Each test wires a real `Session`, `Dispatcher` and `TradeExecutor`
//! together; only the socket is replaced.

use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

use digitedge::engine::correlator::RequestCorrelator;
use digitedge::engine::dispatcher::Dispatched;
use digitedge::engine::executor::{AttemptOutcome, AttemptState, ExecutionConfig};
use digitedge::engine::session::{CycleResult, Session, SessionConfig, StopReason};
use digitedge::engine::{SessionBook, SharedBook};
use digitedge::storage::{CsvJournal, NullJournal, TradeJournal, CSV_HEADER};
use digitedge::strategy::edge::{StrategyConfig, StrategyEngine};
use digitedge::strategy::risk::{RiskConfig, RiskController};
use digitedge::strategy::DecisionPipeline;
use digitedge::types::{
    EngineError, RequestKind, SessionStatus, Side, SkipReason, TerminationReason,
};
use digitedge::venue::{OutboundRequest, VenueTransport};

use crate::mock_venue::{Script, ScriptedVenue};

struct Harness {
    session: Session,
    book: SharedBook,
    venue: Arc<ScriptedVenue>,
}

fn session_config() -> SessionConfig {
    SessionConfig {
        warmup_history: 200,
        auth_timeout: Duration::from_secs(1),
        history_timeout: Duration::from_secs(1),
        cooldown: Duration::ZERO,
        tick_channel_capacity: 64,
        ..SessionConfig::default()
    }
}

/// Deterministic stakes: no jitter, no balance cap.
fn flat_risk(base_stake: f64) -> RiskConfig {
    RiskConfig {
        base_stake,
        max_stake_pct_balance: 0.0,
        stake_jitter: 0.0,
        ..RiskConfig::default()
    }
}

fn harness_with(script: Script, risk: RiskConfig, journal: Arc<dyn TradeJournal>) -> Harness {
    let book = SessionBook::new(1000, risk.base_stake).shared();
    let venue = ScriptedVenue::new(script);
    let pipeline = DecisionPipeline::new(
        StrategyEngine::new(StrategyConfig::default()),
        RiskController::with_seed(risk, 42),
    );
    let (session, dispatcher) = Session::new(
        session_config(),
        book.clone(),
        venue.clone(),
        pipeline,
        ExecutionConfig::default(),
        journal,
    );
    venue.attach(dispatcher);
    Harness {
        session,
        book,
        venue,
    }
}

fn harness(script: Script, risk: RiskConfig) -> Harness {
    harness_with(script, risk, Arc::new(NullJournal))
}

fn token() -> SecretString {
    SecretString::new("test-token".to_string())
}

fn temp_journal() -> std::path::PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("digitedge_it_journal_{}.csv", uuid::Uuid::new_v4()));
    p
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_authorizes_seeds_window_and_subscribes() {
    let mut h = harness(Script::default(), flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    {
        let b = h.book.lock().await;
        assert!(b.state.authorized);
        assert_eq!(b.state.start_balance, dec!(1000));
        assert_eq!(b.state.currency, "USD");
        assert_eq!(b.window.len(), 200);
        assert_eq!(b.window.snapshot().counts[9], 110);
        assert_eq!(b.window.snapshot().counts[0], 10);
        assert_eq!(b.state.ticks_seen, 0);
        assert!(b.pending.is_empty());
    }

    let sent = h.venue.sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0]["authorize"], "test-token");
    assert_eq!(sent[1]["ticks_history"], "R_10");
    assert_eq!(sent[1]["count"], 200);
    assert_eq!(sent[2]["ticks"], "R_10");
    assert_eq!(sent[2]["subscribe"], 1);
    assert!(sent[2].get("passthrough").is_none());
}

#[tokio::test]
async fn test_rejected_authorization_is_fatal() {
    let script = Script {
        reject_authorize: true,
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));

    let err = assert_err!(h.session.start(token()).await);
    match err {
        EngineError::Protocol { code, .. } => assert_eq!(code, "InvalidToken"),
        other => panic!("expected protocol error, got {other:?}"),
    }

    assert!(!h.book.lock().await.state.authorized);
    assert!(h.venue.sent_with("ticks").is_empty());
    assert!(h.venue.sent_with("ticks_history").is_empty());
}

#[tokio::test]
async fn test_cycle_before_authorization_does_nothing() {
    let mut h = harness(Script::default(), flat_risk(1.0));
    assert_eq!(
        h.session.run_cycle().await,
        CycleResult::Skipped(SkipReason::NotAuthorized)
    );
    assert!(h.venue.sent().is_empty());
}

#[tokio::test]
async fn test_short_window_yields_no_candidate() {
    let script = Script {
        history: vec!["1000.009".to_string(); 5],
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    assert_eq!(
        h.session.run_cycle().await,
        CycleResult::Skipped(SkipReason::NoCandidate { observed: 5 })
    );
    assert!(h.venue.sent_with("proposal").is_empty());
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_winning_trade_is_booked_and_journaled() {
    let path = temp_journal();
    let journal: Arc<dyn TradeJournal> = Arc::new(CsvJournal::open(&path).unwrap());
    let mut h = harness_with(Script::default(), flat_risk(1.0), journal);
    assert_ok!(h.session.start(token()).await);

    let record = match h.session.run_cycle().await {
        CycleResult::Attempted(AttemptOutcome::Settled(record)) => record,
        other => panic!("expected a settled trade, got {other:?}"),
    };
    assert_eq!(record.side, Side::Over);
    assert_eq!(record.threshold, 8);
    assert_eq!(record.stake, 1.0);
    assert_eq!(record.profit, Some(dec!(4)));
    assert_eq!(record.contract_id, "9001");
    assert!(record.is_win());

    {
        let b = h.book.lock().await;
        assert_eq!(b.state.trade_no, 1);
        assert_eq!(b.state.wins, 1);
        assert_eq!(b.state.loss_streak, 0);
        assert_eq!(b.state.balance, dec!(1004));
        assert!(b.contracts.is_empty());
        assert!(b.pending.is_empty());
        assert_eq!(b.recent.len(), 1);
    }

    let proposals = h.venue.sent_with("proposal");
    assert_eq!(proposals.len(), 1);
    assert_eq!(proposals[0]["contract_type"], "DIGITOVER");
    assert_eq!(proposals[0]["barrier"], "8");
    assert_eq!(proposals[0]["amount"], 1.0);
    assert_eq!(h.venue.sent_with("buy").len(), 1);
    assert_eq!(h.venue.sent_with("forget")[0]["forget"], "sub-9001");

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], CSV_HEADER);
    assert!(lines[1].contains(",1,OVER,8,1.00,5.00,4.00,"));
    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_loss_updates_counters_and_grows_next_stake() {
    let script = Script {
        settle_profit: Some(-3.0),
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(3.0));
    assert_ok!(h.session.start(token()).await);

    match h.session.run_cycle().await {
        CycleResult::Attempted(AttemptOutcome::Settled(record)) => {
            assert_eq!(record.profit, Some(dec!(-3)));
            assert!(!record.is_win());
        }
        other => panic!("expected a settled trade, got {other:?}"),
    }
    {
        let b = h.book.lock().await;
        assert_eq!(b.state.losses, 1);
        assert_eq!(b.state.loss_streak, 1);
        assert_eq!(b.state.balance, dec!(997));
        assert_eq!(b.state.status, SessionStatus::Running);
    }

    h.venue.update(|s| s.settle_profit = Some(14.4));
    assert!(matches!(
        h.session.run_cycle().await,
        CycleResult::Attempted(AttemptOutcome::Settled(_))
    ));

    let amounts: Vec<f64> = h
        .venue
        .sent_with("proposal")
        .iter()
        .filter_map(|p| p["amount"].as_f64())
        .collect();
    assert_eq!(amounts.len(), 2);
    assert!((amounts[0] - 3.0).abs() < 1e-9);
    assert!((amounts[1] - 3.6).abs() < 1e-9);

    let b = h.book.lock().await;
    assert_eq!(b.state.loss_streak, 0);
    assert_eq!(b.state.wins, 1);
    assert_eq!(b.state.trade_no, 2);
}

#[tokio::test]
async fn test_poor_quote_skips_without_buying() {
    let script = Script {
        payout_multiple: 1.2,
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    match h.session.run_cycle().await {
        CycleResult::Attempted(AttemptOutcome::Skipped { reason, .. }) => {
            assert!(matches!(reason, SkipReason::PolicyReject { .. }));
        }
        other => panic!("expected a policy skip, got {other:?}"),
    }
    assert!(h.venue.sent_with("buy").is_empty());
    assert_eq!(h.book.lock().await.state.trade_no, 0);
}

#[tokio::test(start_paused = true)]
async fn test_buy_timeout_leaves_no_contract() {
    let script = Script {
        buy_silent: true,
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    match h.session.run_cycle().await {
        CycleResult::Attempted(AttemptOutcome::Aborted { stage, error }) => {
            assert_eq!(stage, AttemptState::BuyRequested);
            assert!(matches!(
                error,
                EngineError::RequestTimeout {
                    kind: RequestKind::Purchase,
                    ..
                }
            ));
        }
        other => panic!("expected an aborted attempt, got {other:?}"),
    }

    let b = h.book.lock().await;
    assert_eq!(b.state.trade_no, 0);
    assert_eq!(b.state.wins + b.state.losses + b.state.unresolved, 0);
    assert_eq!(b.state.balance, dec!(1000));
    assert!(b.contracts.is_empty());
    assert!(b.pending.is_empty());
    drop(b);
    assert!(h.venue.sent_with("proposal_open_contract").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unobserved_settlement_is_unresolved() {
    let script = Script {
        settle_profit: None,
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    match h.session.run_cycle().await {
        CycleResult::Attempted(AttemptOutcome::Unresolved(record)) => {
            assert_eq!(record.profit, None);
        }
        other => panic!("expected an unresolved trade, got {other:?}"),
    }

    let b = h.book.lock().await;
    assert_eq!(b.state.trade_no, 1);
    assert_eq!(b.state.unresolved, 1);
    assert_eq!(b.state.wins + b.state.losses, 0);
    assert_eq!(b.state.balance, dec!(1000));
    assert!(b.contracts.is_empty());
}

#[tokio::test]
async fn test_orphan_reply_changes_nothing() {
    let mut h = harness(Script::default(), flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    let stale = r#"{"msg_type":"buy","echo_req":{"passthrough":{"tag":"stale-tag"}},
        "buy":{"contract_id":555,"buy_price":1.0}}"#;
    assert_eq!(
        h.venue.deliver(stale).await,
        Dispatched::Orphan {
            tag: Some("stale-tag".into())
        }
    );

    let untagged_error = r#"{"msg_type":"proposal","error":{"code":"RateLimit","message":"slow down"}}"#;
    assert_eq!(h.venue.deliver(untagged_error).await, Dispatched::Ignored);

    let b = h.book.lock().await;
    assert_eq!(b.state.trade_no, 0);
    assert_eq!(b.state.balance, dec!(1000));
    assert!(b.contracts.is_empty());
    assert!(b.pending.is_empty());
}

// ---------------------------------------------------------------------------
// Risk gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_loss_streak_pause_and_resume() {
    let risk = RiskConfig {
        loss_streak_pause: 1,
        pause_ticks: 2,
        ..flat_risk(1.0)
    };
    let script = Script {
        settle_profit: Some(-1.0),
        ..Script::default()
    };
    let mut h = harness(script, risk);
    assert_ok!(h.session.start(token()).await);

    assert!(matches!(
        h.session.run_cycle().await,
        CycleResult::Attempted(AttemptOutcome::Settled(_))
    ));
    {
        let b = h.book.lock().await;
        assert_eq!(b.state.status, SessionStatus::Paused);
        assert_eq!(b.state.pause_until_tick, 2);
    }

    assert_eq!(
        h.session.run_cycle().await,
        CycleResult::Skipped(SkipReason::Paused { until_tick: 2 })
    );
    assert_eq!(h.venue.sent_with("proposal").len(), 1);

    h.venue.push_tick("1000.009").await;
    h.venue.push_tick("1000.009").await;
    assert!(matches!(
        h.session.run_cycle().await,
        CycleResult::Attempted(_)
    ));

    let amounts: Vec<f64> = h
        .venue
        .sent_with("proposal")
        .iter()
        .filter_map(|p| p["amount"].as_f64())
        .collect();
    // Streak survives the pause by default.
    assert_eq!(amounts.len(), 2);
    assert!((amounts[1] - 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_stop_loss_terminates_session() {
    let risk = RiskConfig {
        stop_loss: dec!(-2.5),
        ..flat_risk(3.0)
    };
    let script = Script {
        settle_profit: Some(-3.0),
        ..Script::default()
    };
    let mut h = harness(script, risk);
    assert_ok!(h.session.start(token()).await);

    for _ in 0..3 {
        assert_eq!(h.venue.push_tick("1000.009").await, Dispatched::Tick(9));
    }

    let summary = h.session.run(std::future::pending::<()>()).await;
    match summary.reason {
        StopReason::RiskGate(TerminationReason::StopLoss { pnl }) => {
            assert_eq!(pnl, dec!(-3))
        }
        other => panic!("expected stop-loss, got {other:?}"),
    }
    assert_eq!(summary.state.status, SessionStatus::Terminated);
    assert_eq!(summary.state.losses, 1);
    assert_eq!(h.venue.sent_with("proposal").len(), 1);
    assert_eq!(h.venue.sent_with("forget_all")[0]["forget_all"], "ticks");

    assert!(matches!(
        h.session.run_cycle().await,
        CycleResult::Terminated(TerminationReason::StopLoss { .. })
    ));
    assert_eq!(h.venue.sent_with("proposal").len(), 1);
}

#[tokio::test]
async fn test_take_profit_terminates_session() {
    let risk = RiskConfig {
        take_profit: dec!(3),
        ..flat_risk(1.0)
    };
    let mut h = harness(Script::default(), risk);
    assert_ok!(h.session.start(token()).await);
    h.venue.push_tick("1000.009").await;

    let summary = h.session.run(std::future::pending::<()>()).await;
    assert!(matches!(
        summary.reason,
        StopReason::RiskGate(TerminationReason::TakeProfit { .. })
    ));
    assert_eq!(summary.state.wins, 1);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_cancels_pending_and_unsubscribes() {
    let script = Script {
        quote_silent: true,
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    let transport: Arc<dyn VenueTransport> = h.venue.clone();
    let correlator = RequestCorrelator::new(h.book.clone(), transport);
    let waiter = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            let request = OutboundRequest::Proposal {
                symbol: "R_10".into(),
                side: Side::Over,
                threshold: 8,
                stake: 1.0,
                duration_ticks: 1,
                currency: "USD".into(),
            };
            correlator
                .send_and_wait(RequestKind::Proposal, &request, Duration::from_secs(60))
                .await
        })
    };
    while correlator.pending_count().await == 0 {
        tokio::task::yield_now().await;
    }

    let summary = h.session.run(async {}).await;
    assert_eq!(summary.reason, StopReason::Shutdown);

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(EngineError::Cancelled { .. })));
    assert_eq!(correlator.pending_count().await, 0);
    assert_eq!(h.venue.sent_with("forget_all")[0]["forget_all"], "ticks");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_attempt_in_flight() {
    let script = Script {
        settle_profit: None,
        ..Script::default()
    };
    let mut h = harness(script, flat_risk(1.0));
    assert_ok!(h.session.start(token()).await);

    // Fire once the attempt is parked on its settlement wait.
    let venue = h.venue.clone();
    let shutdown = async move {
        venue.push_tick("1000.009").await;
        while venue.sent_with("proposal_open_contract").is_empty() {
            tokio::task::yield_now().await;
        }
    };

    let started = tokio::time::Instant::now();
    let summary = h.session.run(shutdown).await;
    assert_eq!(summary.reason, StopReason::Shutdown);
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(summary.state.trade_no, 1);
    assert_eq!(summary.state.unresolved, 1);
    assert_eq!(summary.state.wins + summary.state.losses, 0);
    assert_eq!(summary.state.balance, dec!(1000));

    let b = h.book.lock().await;
    assert!(b.contracts.is_empty());
    assert!(b.pending.is_empty());
    drop(b);
    assert_eq!(h.venue.sent_with("forget_all")[0]["forget_all"], "ticks");
}
