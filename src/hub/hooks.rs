//! Optional observer hooks: membership changes, removals, diagnostics.
//!
//! Every hook runs behind a panic boundary. Change and removal hooks run on
//! a spawned task so they never extend a critical section.

use std::fmt;
use std::sync::Arc;

use super::metadata::ConnectionMeta;
use crate::supervisor::contain_sync;

/// Topic key passed to the change hook for registry membership changes.
pub const CONNECTIONS_TOPIC: &str = "connections";

/// Direction of a registry membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A connection was appended.
    Added,
    /// A connection was removed.
    Removed,
}

/// Invoked with a topic key and the kind of membership change.
pub type ChangeHook = Arc<dyn Fn(&str, ChangeKind) + Send + Sync>;

/// Invoked with the metadata captured when a connection was torn down.
pub type RemovalHook = Arc<dyn Fn(ConnectionMeta) + Send + Sync>;

/// Invoked as `(source, message)` for operationally significant events.
pub type DiagnosticHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// The set of hooks a hub was built with.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) on_change: Option<ChangeHook>,
    pub(crate) on_removal: Option<RemovalHook>,
    pub(crate) diagnostic: Option<DiagnosticHook>,
}

impl Hooks {
    pub(crate) fn notify_change(&self, kind: ChangeKind) {
        let Some(hook) = self.on_change.as_ref().map(Arc::clone) else {
            return;
        };
        tokio::spawn(async move {
            if let Err(panic) = contain_sync(|| hook(CONNECTIONS_TOPIC, kind)) {
                tracing::warn!(panic = %panic, ?kind, "change hook panicked");
            }
        });
    }

    pub(crate) fn notify_removal(&self, meta: ConnectionMeta) {
        let Some(hook) = self.on_removal.as_ref().map(Arc::clone) else {
            return;
        };
        tokio::spawn(async move {
            let conn_id = meta.id;
            if let Err(panic) = contain_sync(|| hook(meta)) {
                tracing::warn!(%conn_id, panic = %panic, "removal hook panicked");
            }
        });
    }

    /// Emits a diagnostic event to `tracing` and to the diagnostic hook.
    pub(crate) fn diagnostic(&self, source: &str, message: &str) {
        tracing::info!(source, "{message}");
        if let Some(hook) = &self.diagnostic
            && let Err(panic) = contain_sync(|| hook(source, message))
        {
            tracing::warn!(source, panic = %panic, "diagnostic hook panicked");
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_change", &self.on_change.is_some())
            .field("on_removal", &self.on_removal.is_some())
            .field("diagnostic", &self.diagnostic.is_some())
            .finish()
    }
}
