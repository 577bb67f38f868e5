//! Per-connection liveness and context side-table.
//!
//! [`MetadataStore`] is keyed by [`ConnectionId`] and kept apart from the
//! registry, so the reader loop can refresh liveness with a point write and
//! the liveness monitor can scan without touching the registry lock.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use super::ConnectionId;

/// Liveness and context snapshot for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionMeta {
    /// Connection identity.
    pub id: ConnectionId,
    /// Peer address, if known.
    pub remote_addr: Option<SocketAddr>,
    /// Wall-clock time of the last inbound frame (or of registration).
    pub last_activity: DateTime<Utc>,
    /// Copy of the connection's application context.
    pub context: serde_json::Value,
    /// Monotonic twin of `last_activity`, used for timeout arithmetic.
    #[serde(skip)]
    pub last_seen: Instant,
}

impl ConnectionMeta {
    /// Creates a fresh record stamped with the current time.
    #[must_use]
    pub fn new(id: ConnectionId, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            remote_addr,
            last_activity: Utc::now(),
            context: serde_json::Value::Null,
            last_seen: Instant::now(),
        }
    }

    /// Time since the last recorded activity.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// Concurrent map from connection identity to [`ConnectionMeta`].
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: DashMap<ConnectionId, ConnectionMeta>,
}

impl MetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for `meta.id`.
    pub fn insert(&self, meta: ConnectionMeta) {
        self.records.insert(meta.id, meta);
    }

    /// Stamps the record with the current time. Returns `false` if the
    /// identity is unknown (already torn down).
    pub fn touch(&self, id: ConnectionId) -> bool {
        match self.records.get_mut(&id) {
            Some(mut meta) => {
                meta.last_activity = Utc::now();
                meta.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Replaces the context snapshot. Returns `false` if the identity is
    /// unknown.
    pub fn set_context(&self, id: ConnectionId, context: serde_json::Value) -> bool {
        match self.records.get_mut(&id) {
            Some(mut meta) => {
                meta.context = context;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of the record.
    #[must_use]
    pub fn get(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.records.get(&id).map(|meta| meta.clone())
    }

    /// Removes the record and returns it. Only one caller ever receives
    /// `Some` for a given identity.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.records.remove(&id).map(|(_, meta)| meta)
    }

    /// Copies every record.
    #[must_use]
    pub fn all(&self) -> Vec<ConnectionMeta> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Identities whose last activity is older than `timeout` at `now`.
    ///
    /// Shard locks are released before returning, so callers may tear the
    /// returned identities down directly.
    #[must_use]
    pub fn expired(&self, timeout: Duration, now: Instant) -> Vec<ConnectionId> {
        self.records
            .iter()
            .filter(|entry| entry.value().idle_for(now) > timeout)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
