//! Snapshot broadcasting over WebSocket
//!
//! Clients subscribe to one symbol at `/ws/market/{symbol}`. On open they
//! receive the current snapshot (or an error frame), afterwards the
//! broadcast scheduler pushes the latest snapshot to every open session on
//! a fixed cadence. A client text frame `"refresh"` triggers an immediate
//! send to that session only.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::store::SnapshotStore;
use crate::AppState;

type SessionSender = mpsc::UnboundedSender<String>;

/// Concurrent registry of symbol subscriptions.
///
/// Initialised once per process and torn down with it; tests construct their
/// own instance.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, HashMap<u64, SessionSender>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new session for a symbol; returns its id and the frame
    /// receiver the socket task drains
    pub async fn register(&self, symbol: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.sessions
            .write()
            .await
            .entry(symbol.to_string())
            .or_default()
            .insert(id, tx);

        metrics::ACTIVE_SESSIONS.inc();
        info!(symbol, session = id, "client connected");
        (id, rx)
    }

    /// Remove a session; the symbol's set is dropped when it empties
    pub async fn deregister(&self, symbol: &str, id: u64) {
        let mut guard = self.sessions.write().await;
        if let Some(sessions) = guard.get_mut(symbol) {
            if sessions.remove(&id).is_some() {
                metrics::ACTIVE_SESSIONS.dec();
            }
            if sessions.is_empty() {
                guard.remove(symbol);
            }
        }
        info!(symbol, session = id, "client disconnected");
    }

    /// Senders of every open session for a symbol
    pub async fn senders(&self, symbol: &str) -> Vec<(u64, SessionSender)> {
        self.sessions
            .read()
            .await
            .get(symbol)
            .map(|sessions| {
                sessions
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, symbol: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(symbol)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub async fn has_symbol(&self, symbol: &str) -> bool {
        self.sessions.read().await.contains_key(symbol)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn error_frame(symbol: &str) -> String {
    format!("{{\"error\":\"No data available for {symbol}\"}}")
}

/// Latest snapshot frame for a symbol: stored JSON, or the error frame
async fn snapshot_frame(store: &Arc<dyn SnapshotStore>, symbol: &str) -> String {
    match store.find_latest_json(symbol).await {
        Ok(Some(json)) => json,
        Ok(None) => error_frame(symbol),
        Err(e) => {
            error!(symbol, error = %e, "failed to read snapshot");
            error_frame(symbol)
        }
    }
}

/// Axum handler for `/ws/market/{symbol}`
pub async fn market_ws_handler(
    ws: WebSocketUpgrade,
    Path(symbol): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, symbol, state))
}

async fn handle_session(socket: WebSocket, symbol: String, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut frames) = state.registry.register(&symbol).await;

    // Send the current snapshot immediately on open
    let initial = snapshot_frame(&state.store, &symbol).await;
    if sink.send(Message::Text(initial)).await.is_err() {
        state.registry.deregister(&symbol, id).await;
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        debug!(symbol = %symbol, session = id, message = %text, "client message");
                        if text.trim().eq_ignore_ascii_case("refresh") {
                            let frame = snapshot_frame(&state.store, &symbol).await;
                            if sink.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(symbol = %symbol, session = id, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.deregister(&symbol, id).await;
}

/// Periodic fan-out of the latest snapshots to subscribed sessions.
///
/// Reads are non-blocking; a send failure logs and continues with the
/// remaining sessions.
pub async fn run_broadcaster(
    registry: Arc<SessionRegistry>,
    store: Arc<dyn SnapshotStore>,
    symbols: Vec<String>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(symbols = ?symbols, interval_secs = interval.as_secs(), "broadcast scheduler started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for symbol in &symbols {
                    if registry.connection_count(symbol).await == 0 {
                        continue;
                    }

                    let frame = match store.find_latest_json(symbol).await {
                        Ok(Some(json)) => json,
                        Ok(None) => {
                            debug!(symbol, "no snapshot available");
                            continue;
                        }
                        Err(e) => {
                            error!(symbol, error = %e, "failed to read snapshot");
                            continue;
                        }
                    };

                    for (id, sender) in registry.senders(symbol).await {
                        if sender.send(frame.clone()).is_err() {
                            warn!(symbol, session = id, "dropping dead session");
                            registry.deregister(symbol, id).await;
                        } else {
                            metrics::FRAMES_BROADCAST.inc();
                        }
                    }
                }
            }
        }
    }

    info!("broadcast scheduler stopped");
}
