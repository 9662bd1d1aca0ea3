//! Process-wide session registry and byte counters

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::session::SessionStats;

/// Registry entry for one live session
#[derive(Clone)]
pub struct SessionEntry {
    pub id: u64,
    pub remote: SocketAddr,
    pub connected_at: DateTime<Utc>,
    pub stats: Arc<SessionStats>,
}

/// Index of live sessions plus server-wide transfer totals.
///
/// Control connections register/deregister themselves; data connections
/// bump the byte aggregates. The aggregates are atomics so the data path
/// never takes the session lock.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<u64, SessionEntry>>,
    uploaded: AtomicU64,
    downloaded: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, entry: SessionEntry) {
        self.sessions.write().await.insert(entry.id, entry);
    }

    pub async fn remove(&self, id: u64) -> Option<SessionEntry> {
        self.sessions.write().await.remove(&id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn add_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Read-only snapshot for logging or an admin surface
    pub async fn snapshot(&self) -> RegistrySnapshot {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|entry| SessionSummary {
                id: entry.id,
                remote: entry.remote.to_string(),
                connected_at: entry.connected_at,
                uploaded_bytes: entry.stats.uploaded(),
                downloaded_bytes: entry.stats.downloaded(),
            })
            .collect();
        summaries.sort_by_key(|s| s.id);

        RegistrySnapshot {
            active_sessions: summaries.len(),
            uploaded_bytes: self.uploaded(),
            downloaded_bytes: self.downloaded(),
            sessions: summaries,
        }
    }
}

/// Snapshot of one session's public state
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub id: u64,
    pub remote: String,
    pub connected_at: DateTime<Utc>,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
}

/// Snapshot of the whole registry
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistrySnapshot {
    pub active_sessions: usize,
    pub uploaded_bytes: u64,
    pub downloaded_bytes: u64,
    pub sessions: Vec<SessionSummary>,
}
