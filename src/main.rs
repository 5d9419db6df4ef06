//! DIGITEDGE: statistical over/under digit-contract execution engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects to the venue, and runs one trading session until Ctrl+C, the
//! daily risk gate, or loss of the connection.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use digitedge::config;
use digitedge::dashboard;
use digitedge::engine::session::{Session, StopReason};
use digitedge::engine::SessionBook;
use digitedge::storage::{CsvJournal, NullJournal, TradeJournal};
use digitedge::strategy::edge::StrategyEngine;
use digitedge::strategy::risk::RiskController;
use digitedge::strategy::DecisionPipeline;
use digitedge::venue::DerivConnection;

const BANNER: &str = r#"
 ____ ___ ____ ___ _____ _____ ____   ____ _____
|  _ \_ _/ ___|_ _|_   _| ____|  _ \ / ___| ____|
| | | | | |  _ | |  | | |  _| | | | | |  _|  _|
| |_| | | |_| || |  | | | |___| |_| | |_| | |___
|____/___\____|___| |_| |_____|____/ \____|_____|

  Digit over/under execution engine
  v0.1.0
"#;

/// Inbound frames buffered between the socket reader and the dispatcher.
const INBOUND_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        symbol = %cfg.venue.symbol,
        currency = %cfg.venue.currency,
        window = cfg.strategy.window_size,
        duration_choices = ?cfg.execution.duration_choices,
        base_stake = cfg.risk.base_stake,
        take_profit = cfg.risk.take_profit,
        stop_loss = cfg.risk.stop_loss,
        "DIGITEDGE starting up"
    );

    let token = cfg.api_token()?;

    // -- Components ------------------------------------------------------

    let book = SessionBook::new(cfg.strategy.window_size, cfg.risk.base_stake).shared();

    let journal: Arc<dyn TradeJournal> = if cfg.journal.enabled {
        Arc::new(CsvJournal::open(&cfg.journal.path)?)
    } else {
        warn!("Trade journal disabled");
        Arc::new(NullJournal)
    };

    let risk = match cfg.risk.seed {
        Some(seed) => RiskController::with_seed(cfg.risk_config(), seed),
        None => RiskController::new(cfg.risk_config()),
    };
    let pipeline = DecisionPipeline::new(StrategyEngine::new(cfg.strategy_config()), risk);

    let (connection, inbound) = DerivConnection::connect(
        &cfg.endpoint(),
        Duration::from_secs(cfg.venue.ping_interval_secs),
        INBOUND_CAPACITY,
    )
    .await
    .context("Failed to connect to venue")?;

    let (mut session, dispatcher) = Session::new(
        cfg.session_config(),
        book.clone(),
        Arc::new(connection),
        pipeline,
        cfg.execution_config(),
        journal,
    );
    tokio::spawn(dispatcher.run(inbound));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(book.clone(), cfg.dashboard.port).await?;
    }

    // -- Session ---------------------------------------------------------

    session.start(token).await.context("Session start failed")?;

    info!("Entering decision loop. Press Ctrl+C to stop.");
    let summary = session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let reason = match summary.reason {
        StopReason::Shutdown => "shutdown requested".to_string(),
        StopReason::FeedClosed => "connection lost".to_string(),
        StopReason::RiskGate(r) => r.to_string(),
    };
    info!(
        reason = %reason,
        state = %summary.state,
        "DIGITEDGE shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("digitedge=info"));

    let json_logging = std::env::var("DIGITEDGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
