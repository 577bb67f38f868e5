//! A single client session bound to a transport.
//!
//! A [`Connection`] owns the outbound half of its transport behind an async
//! mutex. That mutex is the write-serialization primitive: every dispatch
//! operation holds it for exactly one frame write, so frames from concurrent
//! senders never interleave on the wire.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use axum::http::{HeaderMap, Uri};
use chrono::{DateTime, Utc};
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

use crate::error::HubError;
use crate::transport::{Frame, FrameSink, TransportError};

/// Unique identifier for a connection.
///
/// Generated fresh (UUID v4) for every accepted connection and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Creates a new random `ConnectionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for ConnectionId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

/// Metadata of the HTTP request that was upgraded into this connection.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Peer socket address, when the server tracks connect info.
    pub remote_addr: Option<SocketAddr>,
    /// Request URI, including the query string.
    pub uri: Uri,
    /// Request headers.
    pub headers: HeaderMap,
}

impl RequestInfo {
    /// Builds request metadata from its parts.
    #[must_use]
    pub fn new(remote_addr: Option<SocketAddr>, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            remote_addr,
            uri,
            headers,
        }
    }
}

/// One logical client session.
pub struct Connection {
    id: ConnectionId,
    request: RequestInfo,
    connected_at: DateTime<Utc>,
    sink: Mutex<FrameSink>,
    context: RwLock<serde_json::Value>,
    close: Notify,
}

impl Connection {
    pub(crate) fn new(sink: FrameSink, request: RequestInfo) -> Self {
        Self {
            id: ConnectionId::new(),
            request,
            connected_at: Utc::now(),
            sink: Mutex::new(sink),
            context: RwLock::new(serde_json::Value::Null),
            close: Notify::new(),
        }
    }

    /// Connection identity.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Originating request metadata.
    #[must_use]
    pub const fn request(&self) -> &RequestInfo {
        &self.request
    }

    /// Peer address, if known.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.request.remote_addr
    }

    /// When the connection was accepted.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Returns a copy of the application context.
    #[must_use]
    pub fn context(&self) -> serde_json::Value {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the application context. Prefer [`crate::hub::Hub::set_context`],
    /// which also refreshes the metadata snapshot.
    pub fn set_context(&self, value: serde_json::Value) {
        *self.context.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Writes one frame while holding the write lock.
    ///
    /// The lock is held across the whole write and released on every exit
    /// path, including timeout. With `deadline` set, a write that does not
    /// complete in time is abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::WriteTimeout`] when the deadline elapses and
    /// [`HubError::Transport`] when the sink rejects the frame.
    pub async fn write_frame(&self, frame: Frame, deadline: Option<Duration>) -> Result<(), HubError> {
        let mut sink = self.sink.lock().await;
        let result = match deadline {
            Some(limit) => match tokio::time::timeout(limit, sink.send(frame)).await {
                Ok(sent) => sent,
                Err(_) => {
                    return Err(HubError::WriteTimeout {
                        conn_id: self.id,
                        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => sink.send(frame).await,
        };
        result.map_err(|err| HubError::Transport {
            conn_id: self.id,
            source: err,
        })
    }

    /// Force-closes the connection.
    ///
    /// Wakes the reader loop, which observes a local close as a read
    /// failure and runs the normal teardown path. The sink is closed
    /// best-effort within `deadline` so the peer receives a close frame.
    pub async fn close(&self, deadline: Duration) {
        self.signal_close();
        let closing = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(deadline, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::debug!(conn_id = %self.id, error = %err, "error closing sink"),
            Err(_) => tracing::debug!(conn_id = %self.id, "sink close timed out"),
        }
    }

    /// Signals the reader loop to stop without touching the sink.
    pub(crate) fn signal_close(&self) {
        self.close.notify_one();
    }

    /// Resolves once a close was signalled.
    pub(crate) async fn closed(&self) -> TransportError {
        self.close.notified().await;
        TransportError::ClosedLocally
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.request.remote_addr)
            .field("uri", &self.request.uri)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::memory::{self, WriteMode};

    fn connection(mode: WriteMode) -> (Connection, memory::MemoryPeer) {
        let (transport, peer) = memory::pair_with(mode);
        (Connection::new(transport.sink, RequestInfo::default()), peer)
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn id_displays_as_uuid() {
        let s = ConnectionId::new().to_string();
        assert_eq!(s.len(), 36);
        assert!(uuid::Uuid::parse_str(&s).is_ok());
    }

    #[test]
    fn context_starts_null_and_is_replaceable() {
        let (conn, _peer) = connection(WriteMode::Accept);
        assert!(conn.context().is_null());
        conn.set_context(serde_json::json!({"room": "lobby"}));
        assert_eq!(conn.context()["room"], "lobby");
    }

    #[tokio::test]
    async fn write_frame_reaches_sink() {
        let (conn, peer) = connection(WriteMode::Accept);
        tokio_test::assert_ok!(conn.write_frame(Frame::Binary(b"hi".to_vec()), None).await);
        assert_eq!(peer.frames(), vec![Frame::Binary(b"hi".to_vec())]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out_and_releases_lock() {
        let (conn, _peer) = connection(WriteMode::Stall);
        let deadline = Some(Duration::from_millis(50));
        let first = conn.write_frame(Frame::Text("a".to_string()), deadline).await;
        assert!(matches!(first, Err(HubError::WriteTimeout { after_ms: 50, .. })));
        // A second write can acquire the lock again.
        let second = conn.write_frame(Frame::Text("b".to_string()), deadline).await;
        assert!(matches!(second, Err(HubError::WriteTimeout { .. })));
    }

    #[tokio::test]
    async fn failed_write_maps_to_transport_error() {
        let (conn, _peer) = connection(WriteMode::Fail);
        let result = conn.write_frame(Frame::Text("a".to_string()), None).await;
        let Err(HubError::Transport { conn_id, .. }) = result else {
            panic!("expected transport error");
        };
        assert_eq!(conn_id, conn.id());
    }

    #[tokio::test]
    async fn close_signal_is_observed_later() {
        let (conn, _peer) = connection(WriteMode::Accept);
        conn.signal_close();
        assert_eq!(conn.closed().await, TransportError::ClosedLocally);
    }
}
