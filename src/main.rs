//! finstream - Streaming Market Analytics
//!
//! Wires the full pipeline: Binance ingest -> tick bus -> sliding windows ->
//! ABC analytics -> snapshot store -> WebSocket broadcast, plus an HTTP
//! surface for health, Prometheus metrics and snapshot reads.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use finstream::analytics::{self, AnalysisService};
use finstream::broadcast::{self, SessionRegistry};
use finstream::bus::{InMemoryTickBus, TickBus, MARKET_STREAM_CHANNEL};
use finstream::config::Config;
use finstream::store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};
use finstream::websocket::BinanceFeed;
use finstream::window::WindowStore;
use finstream::AppState;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Arc::new(Config::from_env());
    info!(
        ingest = ?config.binance_symbols,
        analytics = ?config.analytics_symbols,
        broadcast = ?config.broadcast_symbols,
        "configuration loaded"
    );

    // Shared infrastructure
    let bus: Arc<dyn TickBus> = Arc::new(InMemoryTickBus::new());
    let windows = Arc::new(WindowStore::new());
    let store: Arc<dyn SnapshotStore> = match &config.snapshot_db_path {
        Some(path) => Arc::new(SqliteSnapshotStore::open(path).await?),
        None => Arc::new(MemorySnapshotStore::new()),
    };
    let registry = Arc::new(SessionRegistry::new());
    let cancel = CancellationToken::new();

    // Analytics service consumes the tick stream
    let analysis = Arc::new(AnalysisService::new(
        windows.clone(),
        store.clone(),
        &config,
    ));
    {
        let analysis = analysis.clone();
        bus.subscribe(
            MARKET_STREAM_CHANNEL,
            Arc::new(move |tick| analysis.record_tick(tick)),
        )
        .await
        .map_err(|e| anyhow::anyhow!("bus subscription failed: {e}"))?;
    }

    // Ingest feed
    let feed = BinanceFeed::new((*config).clone(), bus.clone());
    let ingest_active = feed.active_flag();
    let ingest_handle = tokio::spawn(feed.run(cancel.clone()));

    // Analytics scheduler
    let analytics_handle = tokio::spawn(analytics::run_scheduler(
        analysis.clone(),
        config.analytics_symbols.clone(),
        Duration::from_secs(config.analytics_interval_secs),
        cancel.clone(),
    ));

    // Broadcast scheduler
    let broadcast_handle = tokio::spawn(broadcast::run_broadcaster(
        registry.clone(),
        store.clone(),
        config.broadcast_symbols.clone(),
        Duration::from_secs(config.broadcast_interval_secs),
        cancel.clone(),
    ));

    // HTTP/WebSocket server
    let state = Arc::new(AppState {
        registry,
        store,
        config: config.clone(),
        ingest_active,
    });
    let server_handle = tokio::spawn(run_server(state, cancel.clone()));

    info!("all services started");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();
    bus.unsubscribe(MARKET_STREAM_CHANNEL).await;

    // Bounded grace period for in-flight work
    let drain = async {
        let _ = ingest_handle.await;
        let _ = analytics_handle.await;
        let _ = broadcast_handle.await;
        let _ = server_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "shutdown grace period elapsed");
    }

    info!("shutdown complete");
    Ok(())
}

async fn run_server(state: Arc<AppState>, cancel: CancellationToken) {
    let addr = state.config.server_addr.clone();

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .route(
            "/api/snapshot/:symbol",
            get(api_snapshot).delete(api_delete_snapshot),
        )
        .route("/ws/market/:symbol", get(broadcast::market_ws_handler))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "failed to bind server");
            return;
        }
    };

    info!(addr = %addr, "server listening");

    let shutdown = async move { cancel.cancelled().await };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %e, "server error");
    }
}

/// Latest stored snapshot as wire JSON
async fn api_snapshot(
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.store.find_latest_json(&symbol).await {
        Ok(Some(json)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("No data available for {symbol}")})),
        )
            .into_response(),
        Err(e) => {
            error!(symbol = %symbol, error = %e, "snapshot read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "snapshot store unavailable"})),
            )
                .into_response()
        }
    }
}

/// Operator action: drop the stored snapshot for a symbol
async fn api_delete_snapshot(
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.store.delete(&symbol).await {
        Ok(()) => {
            info!(symbol = %symbol, "snapshot deleted by operator");
            Json(serde_json::json!({"status": "deleted", "symbol": symbol})).into_response()
        }
        Err(e) => {
            error!(symbol = %symbol, error = %e, "snapshot delete failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "snapshot store unavailable"})),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "finstream",
        "ingestActive": state.ingest_active.load(Ordering::Relaxed),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn prometheus_metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
