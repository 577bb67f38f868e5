//! Shared application state injected into all Axum handlers.

use crate::hub::Hub;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The connection hub.
    pub hub: Hub,
    /// Largest inbound WebSocket message accepted at upgrade time.
    pub max_message_bytes: usize,
}
