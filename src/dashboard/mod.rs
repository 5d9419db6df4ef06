//! Status API: read-only Axum server for monitoring a running session.
//!
//! JSON only. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::engine::SharedBook;

/// Bind the status API on `port` and serve it in a background task.
pub async fn spawn_dashboard(book: SharedBook, port: u16) -> Result<()> {
    let app = build_router(book);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind status API on port {port}"))?;
    info!(port, "Status API listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Status API server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(book: SharedBook) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/trades", get(routes::get_trades))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(book)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
