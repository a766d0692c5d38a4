//! Snapshot persistence
//!
//! Latest snapshot per symbol behind a narrow async interface. Values are
//! stored as the wire-format JSON under `latest_snapshot:<symbol>`, so a
//! read always round-trips through the serialized contract. Both adapters
//! are callable from the non-blocking broadcast loop.

use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::model::MarketSnapshot;

const KEY_PREFIX: &str = "latest_snapshot:";

fn snapshot_key(symbol: &str) -> String {
    format!("{KEY_PREFIX}{symbol}")
}

/// Key-value repository of the latest snapshot per symbol
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, snapshot: &MarketSnapshot) -> Result<()>;
    async fn find_latest(&self, symbol: &str) -> Result<Option<MarketSnapshot>>;
    async fn delete(&self, symbol: &str) -> Result<()>;

    /// Latest snapshot already serialized for the wire, if present
    async fn find_latest_json(&self, symbol: &str) -> Result<Option<String>>;
}

/// In-process store over a concurrent map of JSON values
pub struct MemorySnapshotStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &MarketSnapshot) -> Result<()> {
        if snapshot.symbol.is_empty() {
            warn!("cannot save snapshot without symbol");
            return Ok(());
        }

        let json = serde_json::to_string(snapshot)?;
        self.entries
            .write()
            .await
            .insert(snapshot_key(&snapshot.symbol), json);
        debug!(symbol = %snapshot.symbol, "snapshot saved");
        Ok(())
    }

    async fn find_latest(&self, symbol: &str) -> Result<Option<MarketSnapshot>> {
        match self.find_latest_json(symbol).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        self.entries.write().await.remove(&snapshot_key(symbol));
        debug!(symbol, "snapshot deleted");
        Ok(())
    }

    async fn find_latest_json(&self, symbol: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(&snapshot_key(symbol)).cloned())
    }
}

/// Durable store on SQLite, WAL mode for concurrent readers
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FeedError::Storage(e.to_string()))?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        info!(path = %db_path, "snapshot database initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, snapshot: &MarketSnapshot) -> Result<()> {
        if snapshot.symbol.is_empty() {
            warn!("cannot save snapshot without symbol");
            return Ok(());
        }

        let json = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO snapshots (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
            rusqlite::params![
                snapshot_key(&snapshot.symbol),
                json,
                snapshot.timestamp.to_rfc3339(),
            ],
        )?;

        debug!(symbol = %snapshot.symbol, "snapshot saved");
        Ok(())
    }

    async fn find_latest(&self, symbol: &str) -> Result<Option<MarketSnapshot>> {
        match self.find_latest_json(symbol).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, symbol: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM snapshots WHERE key = ?1",
            [snapshot_key(symbol)],
        )?;
        debug!(symbol, "snapshot deleted");
        Ok(())
    }

    async fn find_latest_json(&self, symbol: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM snapshots WHERE key = ?1")?;
        let mut rows = stmt.query([snapshot_key(symbol)])?;

        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}
