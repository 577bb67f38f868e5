//! Authoritative collection of live connections.
//!
//! [`ConnectionRegistry`] is an unordered `Vec` behind a
//! [`tokio::sync::RwLock`]. Removal swaps the target with the last element,
//! so indices are only meaningful under the lock acquisition that produced
//! them. [`ConnectionRegistry::remove`] is the safe way to drop a
//! connection: it looks the index up by identity, then re-checks it under a
//! fresh write lock before removing.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::hooks::{ChangeKind, Hooks};
use super::{Connection, ConnectionId};

/// Lock-protected set of live connections.
///
/// # Concurrency
///
/// - `append`, `remove_at` and `remove` take the write lock.
/// - `snapshot` copies `Arc`s under a short read lock; iteration happens on
///   the copy.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<Vec<Arc<Connection>>>,
    hooks: Hooks,
}

impl ConnectionRegistry {
    /// Creates an empty registry that notifies `hooks` on membership changes.
    #[must_use]
    pub fn new(hooks: Hooks) -> Self {
        Self {
            connections: RwLock::new(Vec::new()),
            hooks,
        }
    }

    /// Appends a connection, then fires the change hook off the lock.
    pub async fn append(&self, connection: Arc<Connection>) {
        self.connections.write().await.push(connection);
        self.hooks.notify_change(ChangeKind::Added);
    }

    /// Copies the current membership as `(index, connection)` pairs.
    ///
    /// Indices may be stale as soon as the read lock is released.
    pub async fn snapshot(&self) -> Vec<(usize, Arc<Connection>)> {
        self.connections
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(index, conn)| (index, Arc::clone(conn)))
            .collect()
    }

    /// Copies the current membership without indices.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections.read().await.iter().map(Arc::clone).collect()
    }

    /// Removes the element at `index` by swapping it with the last one.
    ///
    /// Only safe when `index` was looked up under this or a more recent
    /// lock acquisition; prefer [`Self::remove`].
    pub async fn remove_at(&self, index: usize) -> Option<Arc<Connection>> {
        let removed = {
            let mut connections = self.connections.write().await;
            (index < connections.len()).then(|| connections.swap_remove(index))
        };
        if removed.is_some() {
            self.hooks.notify_change(ChangeKind::Removed);
        }
        removed
    }

    /// Removes the connection with identity `id`, if present.
    ///
    /// Looks the index up under a read lock, then re-verifies it under the
    /// write lock and re-scans if a concurrent removal moved the element.
    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let hint = self.position(id).await?;
        let removed = {
            let mut connections = self.connections.write().await;
            let index = if connections.get(hint).is_some_and(|conn| conn.id() == id) {
                Some(hint)
            } else {
                connections.iter().position(|conn| conn.id() == id)
            };
            index.map(|index| connections.swap_remove(index))
        };
        if removed.is_some() {
            self.hooks.notify_change(ChangeKind::Removed);
        }
        removed
    }

    /// Index of `id` under the current read lock.
    pub async fn position(&self, id: ConnectionId) -> Option<usize> {
        self.connections
            .read()
            .await
            .iter()
            .position(|conn| conn.id() == id)
    }

    /// Looks a connection up by identity.
    pub async fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .await
            .iter()
            .find(|conn| conn.id() == id)
            .map(Arc::clone)
    }

    /// Returns `true` if a connection with identity `id` is registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.position(id).await.is_some()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
