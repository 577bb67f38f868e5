//! Outbound dispatch: unicast, broadcast, keyed publish.
//!
//! Every write goes through [`Connection::write_frame`], so it holds the
//! target's write lock for exactly one frame and is bounded by the hub's
//! write deadline. Broadcast and publish spawn one detached delivery task
//! per connection in a registry snapshot; a stalled or panicking recipient
//! only affects its own delivery, and dropping the caller's future does not
//! cancel deliveries already spawned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::{Connection, ConnectionId, Hub};
use crate::error::HubError;
use crate::supervisor::contain;
use crate::transport::Frame;

/// Keyed publish/subscribe message: `{"Key": .., "Content": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Subscription key.
    #[serde(rename = "Key")]
    pub key: String,
    /// Published value.
    #[serde(rename = "Content")]
    pub content: serde_json::Value,
}

impl Envelope {
    /// Wraps `content` under `key`.
    ///
    /// The content goes through a full serialize/deserialize cycle, so the
    /// envelope shares no memory with the caller's value.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] if `content` cannot be encoded.
    pub fn new<T: Serialize + ?Sized>(key: impl Into<String>, content: &T) -> Result<Self, HubError> {
        let encoded = serde_json::to_vec(content)?;
        Ok(Self {
            key: key.into(),
            content: serde_json::from_slice(&encoded)?,
        })
    }

    /// Encodes the envelope as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] if encoding fails.
    pub fn to_frame(&self) -> Result<Frame, HubError> {
        Ok(Frame::Text(serde_json::to_string(self)?))
    }
}

/// Outcome of a fan-out to every registered connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Connections in the snapshot.
    pub attempted: usize,
    /// Deliveries that completed.
    pub delivered: usize,
    /// Deliveries that failed, timed out or panicked.
    pub failed: usize,
}

impl Hub {
    /// Sends raw bytes to one connection as a binary frame.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::WriteTimeout`] or [`HubError::Transport`] if the
    /// write fails.
    pub async fn reply(&self, connection: &Connection, data: impl Into<Vec<u8>>) -> Result<(), HubError> {
        self.write(connection, Frame::Binary(data.into())).await
    }

    /// Sends a text frame to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::WriteTimeout`] or [`HubError::Transport`] if the
    /// write fails.
    pub async fn reply_text(&self, connection: &Connection, text: impl Into<String>) -> Result<(), HubError> {
        self.write(connection, Frame::Text(text.into())).await
    }

    /// Sends a JSON-encoded value to one connection as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] if `value` cannot be encoded, or
    /// the write error.
    pub async fn reply_json<T: Serialize + ?Sized>(&self, connection: &Connection, value: &T) -> Result<(), HubError> {
        let text = serde_json::to_string(value)?;
        self.write(connection, Frame::Text(text)).await
    }

    /// Sends a keyed [`Envelope`] to one connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] if `content` cannot be encoded,
    /// or the write error.
    pub async fn reply_envelope<T: Serialize + ?Sized>(
        &self,
        connection: &Connection,
        key: &str,
        content: &T,
    ) -> Result<(), HubError> {
        let frame = Envelope::new(key, content)?.to_frame()?;
        self.write(connection, frame).await
    }

    /// Sends raw bytes to every registered connection.
    pub async fn broadcast(&self, data: impl Into<Vec<u8>>) -> DeliveryReport {
        self.fan_out(Frame::Binary(data.into()), "hub::broadcast").await
    }

    /// Sends a JSON-encoded value to every registered connection.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] if `value` cannot be encoded.
    pub async fn broadcast_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<DeliveryReport, HubError> {
        let text = serde_json::to_string(value)?;
        Ok(self.fan_out(Frame::Text(text), "hub::broadcast_json").await)
    }

    /// Publishes `content` under `key` to every registered connection.
    ///
    /// The content is copied once before fan-out; mutating the caller's
    /// value afterwards cannot change what recipients receive.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Serialization`] if `content` cannot be encoded.
    pub async fn publish<T: Serialize + ?Sized>(&self, key: &str, content: &T) -> Result<DeliveryReport, HubError> {
        let frame = Envelope::new(key, content)?.to_frame()?;
        Ok(self.fan_out(frame, "hub::publish").await)
    }

    /// Writes one frame under the connection's write lock and deadline.
    ///
    /// A hard transport failure also signals the connection to close, so
    /// its reader loop converges on teardown.
    async fn write(&self, connection: &Connection, frame: Frame) -> Result<(), HubError> {
        let deadline = Some(self.inner.settings.write_timeout);
        let result = connection.write_frame(frame, deadline).await;
        if let Err(err) = &result {
            tracing::warn!(conn_id = %connection.id(), error = %err, "write failed");
            if err.is_fatal_for_connection() {
                connection.signal_close();
            }
        }
        result
    }

    async fn fan_out(&self, frame: Frame, source: &'static str) -> DeliveryReport {
        let connections = self.inner.registry.connections().await;
        let mut report = DeliveryReport {
            attempted: connections.len(),
            ..DeliveryReport::default()
        };

        // Spawn every delivery before waiting on any of them.
        let mut deliveries: Vec<(ConnectionId, JoinHandle<Result<(), HubError>>)> =
            Vec::with_capacity(connections.len());
        for connection in connections {
            let id = connection.id();
            let frame = frame.clone();
            deliveries.push((id, tokio::spawn(deliver(self.clone(), connection, frame))));
        }

        for (id, delivery) in deliveries {
            match joined(id, delivery.await) {
                Ok(()) => report.delivered += 1,
                Err(err @ HubError::Internal(_)) => {
                    report.failed += 1;
                    self.diagnostic(source, &err.to_string());
                }
                Err(_) => report.failed += 1,
            }
        }

        tracing::debug!(
            source,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "fan-out complete"
        );
        report
    }
}

async fn deliver(hub: Hub, connection: Arc<Connection>, frame: Frame) -> Result<(), HubError> {
    let id = connection.id();
    contain(async move { hub.write(&connection, frame).await })
        .await
        .unwrap_or_else(|panic| Err(HubError::Internal(format!("delivery to {id} panicked: {panic}"))))
}

fn joined(
    id: ConnectionId,
    outcome: Result<Result<(), HubError>, tokio::task::JoinError>,
) -> Result<(), HubError> {
    outcome.unwrap_or_else(|join_err| Err(HubError::Internal(format!("delivery to {id} aborted: {join_err}"))))
}
