//! The connection hub.
//!
//! [`Hub`] owns every piece of shared connection state: the
//! [`ConnectionRegistry`], the [`MetadataStore`], the [`CallbackPipeline`]
//! and the observer [`Hooks`]. It is a cheap `Clone` handle around an
//! `Arc`, so reader loops, delivery tasks and HTTP handlers all share one
//! instance, and tests can build as many independent hubs as they like.
//!
//! ## Lifecycle
//!
//! ```text
//! upgrade ─► register ─► reader loop ─► pipeline handlers
//!                │             │
//!                │        read failure ─┐
//!                │                      ├─► teardown ─► hooks
//!                └── liveness monitor ──┘
//! ```
//!
//! The registry lock and the metadata shards are never held at the same
//! time.

mod connection;
mod dispatch;
mod hooks;
mod metadata;
mod monitor;
mod pipeline;
mod reader;
mod registry;

pub use connection::{Connection, ConnectionId, RequestInfo};
pub use dispatch::{DeliveryReport, Envelope};
pub use hooks::{CONNECTIONS_TOPIC, ChangeHook, ChangeKind, DiagnosticHook, Hooks, RemovalHook};
pub use metadata::{ConnectionMeta, MetadataStore};
pub use pipeline::{CallbackPipeline, FrameContext, FrameHandler};
pub use registry::ConnectionRegistry;

use std::sync::Arc;
use std::time::Duration;

use crate::transport::{FrameSink, Transport};

/// Timing knobs for a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSettings {
    /// Connections silent for longer than this are evicted. Also the
    /// liveness sweep interval.
    pub idle_timeout: Duration,
    /// Upper bound for a single frame write.
    pub write_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct HubInner {
    settings: HubSettings,
    registry: ConnectionRegistry,
    metadata: MetadataStore,
    pipeline: CallbackPipeline,
    hooks: Hooks,
}

/// Shared handle to the connection hub.
#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

/// Builder for a [`Hub`] with optional observer hooks.
#[derive(Debug, Default)]
pub struct HubBuilder {
    settings: HubSettings,
    hooks: Hooks,
}

impl HubBuilder {
    /// Sets all timing knobs at once.
    #[must_use]
    pub const fn settings(mut self, settings: HubSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the idle eviction timeout.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    /// Sets the per-write deadline.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.settings.write_timeout = timeout;
        self
    }

    /// Installs the membership change hook.
    #[must_use]
    pub fn on_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, ChangeKind) + Send + Sync + 'static,
    {
        self.hooks.on_change = Some(Arc::new(hook));
        self
    }

    /// Installs the removal hook.
    #[must_use]
    pub fn on_removal<F>(mut self, hook: F) -> Self
    where
        F: Fn(ConnectionMeta) + Send + Sync + 'static,
    {
        self.hooks.on_removal = Some(Arc::new(hook));
        self
    }

    /// Installs the diagnostic log hook.
    #[must_use]
    pub fn diagnostic<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.hooks.diagnostic = Some(Arc::new(hook));
        self
    }

    /// Builds the hub.
    #[must_use]
    pub fn build(self) -> Hub {
        Hub {
            inner: Arc::new(HubInner {
                settings: self.settings,
                registry: ConnectionRegistry::new(self.hooks.clone()),
                metadata: MetadataStore::new(),
                pipeline: CallbackPipeline::new(),
                hooks: self.hooks,
            }),
        }
    }
}

impl Hub {
    /// Creates a hub with the given settings and no hooks.
    #[must_use]
    pub fn new(settings: HubSettings) -> Self {
        Self::builder().settings(settings).build()
    }

    /// Starts building a hub.
    #[must_use]
    pub fn builder() -> HubBuilder {
        HubBuilder::default()
    }

    /// Timing knobs.
    #[must_use]
    pub fn settings(&self) -> HubSettings {
        self.inner.settings
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    /// The metadata side-table.
    #[must_use]
    pub fn metadata_store(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    /// Appends an inbound frame handler to the pipeline.
    pub fn register_handler<H: FrameHandler>(&self, handler: H) {
        self.inner.pipeline.register(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.pipeline.len()
    }

    /// Registers an upgraded connection without starting its reader loop.
    ///
    /// Inserts the metadata record first, then appends to the registry, so
    /// a registered connection always has metadata.
    pub async fn register(&self, sink: FrameSink, request: RequestInfo) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(sink, request));
        let id = connection.id();
        self.inner
            .metadata
            .insert(ConnectionMeta::new(id, connection.remote_addr()));
        self.inner.registry.append(Arc::clone(&connection)).await;
        self.diagnostic(
            "hub::register",
            &format!("added connection {id} from {}", display_addr(&connection)),
        );
        connection
    }

    /// Registers a connection and runs its reader loop until teardown.
    ///
    /// This is what an upgrade handler awaits.
    pub async fn serve(&self, transport: Transport, request: RequestInfo) {
        let Transport { sink, stream } = transport;
        let connection = self.register(sink, request).await;
        self.run_reader(connection, stream).await;
    }

    /// Registers a connection and spawns its reader loop.
    pub async fn accept(&self, transport: Transport, request: RequestInfo) -> Arc<Connection> {
        let Transport { sink, stream } = transport;
        let connection = self.register(sink, request).await;
        let hub = self.clone();
        let reader_conn = Arc::clone(&connection);
        tokio::spawn(async move { hub.run_reader(reader_conn, stream).await });
        connection
    }

    /// Removes a connection from every hub structure and notifies observers.
    ///
    /// Idempotent: only the first call for an identity removes anything or
    /// fires the removal hook. Returns `true` if this call removed the
    /// connection's metadata.
    pub async fn teardown(&self, id: ConnectionId, reason: &str) -> bool {
        let removed = self.inner.registry.remove(id).await;
        if let Some(connection) = removed {
            let deadline = self.inner.settings.write_timeout;
            tokio::spawn(async move { connection.close(deadline).await });
        }

        let Some(meta) = self.inner.metadata.remove(id) else {
            tracing::trace!(conn_id = %id, "teardown for unknown connection");
            return false;
        };
        tracing::info!(conn_id = %id, reason, "connection removed");
        self.inner.hooks.notify_removal(meta);
        true
    }

    /// Looks a live connection up by identity.
    pub async fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.registry.get(id).await
    }

    /// Copies the current registry membership.
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.registry.connections().await
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Returns `true` if there are no live connections.
    pub async fn is_empty(&self) -> bool {
        self.inner.registry.is_empty().await
    }

    /// Copy of the metadata record for `id`.
    #[must_use]
    pub fn metadata(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.inner.metadata.get(id)
    }

    /// Copies every metadata record.
    #[must_use]
    pub fn all_metadata(&self) -> Vec<ConnectionMeta> {
        self.inner.metadata.all()
    }

    /// Replaces a connection's application context and refreshes the
    /// metadata snapshot with a copy.
    pub fn set_context(&self, connection: &Connection, context: serde_json::Value) {
        connection.set_context(context.clone());
        self.inner.metadata.set_context(connection.id(), context);
    }

    /// Force-closes every live connection.
    ///
    /// Each reader loop observes the close and runs the normal teardown
    /// path. Returns the number of connections signalled.
    pub async fn close_all(&self) -> usize {
        let connections = self.inner.registry.connections().await;
        let deadline = self.inner.settings.write_timeout;
        let count = connections.len();
        futures_util::future::join_all(connections.iter().map(|conn| conn.close(deadline))).await;
        self.diagnostic("hub::close_all", &format!("closed {count} connections"));
        count
    }

    pub(crate) fn diagnostic(&self, source: &str, message: &str) {
        self.inner.hooks.diagnostic(source, message);
    }
}

fn display_addr(connection: &Connection) -> String {
    connection
        .remote_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.to_string())
}
