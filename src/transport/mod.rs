//! Transport boundary between the hub and a framed bidirectional channel.
//!
//! The hub never performs the protocol upgrade itself. An upgrade layer
//! (see [`crate::ws`]) converts its socket into a [`Transport`]: a boxed
//! [`Sink`] of outbound [`Frame`]s plus a boxed [`Stream`] of inbound ones.
//! Tests use the in-memory pair from [`memory`].

pub mod memory;

use std::fmt;
use std::pin::Pin;

use futures_util::{Sink, Stream};

/// Transport frame type, passed to every pipeline handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Raw binary frame.
    Binary,
}

/// A single data frame travelling over a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame (JSON replies, broadcasts, envelopes).
    Text(String),
    /// Raw binary frame (unicast and broadcast bytes).
    Binary(Vec<u8>),
}

impl Frame {
    /// Returns the frame type.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Text(_) => FrameKind::Text,
            Self::Binary(_) => FrameKind::Binary,
        }
    }

    /// Returns the raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Consumes the frame, returning its payload bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(data) => data,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` for an empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Failure reading from or writing to a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the channel.
    #[error("connection closed by peer")]
    ClosedByPeer,

    /// The hub closed the channel locally (eviction or operator close).
    #[error("connection closed locally")]
    ClosedLocally,

    /// Underlying I/O or protocol failure.
    #[error("transport failure: {0}")]
    Io(String),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A live, already-upgraded bidirectional framed channel.
pub struct Transport {
    /// Outbound frames. Owned exclusively by one connection's write lock.
    pub sink: FrameSink,
    /// Inbound frames. Owned exclusively by one reader loop.
    pub stream: FrameStream,
}

impl Transport {
    /// Boxes a sink/stream pair into a [`Transport`].
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Frame, Error = TransportError> + Send + 'static,
        R: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_kind_matches_variant() {
        assert_eq!(Frame::Text("a".to_string()).kind(), FrameKind::Text);
        assert_eq!(Frame::Binary(vec![1]).kind(), FrameKind::Binary);
    }

    #[test]
    fn text_frame_bytes_are_utf8() {
        let frame = Frame::Text("ping".to_string());
        assert_eq!(frame.as_bytes(), b"ping");
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.into_bytes(), b"ping".to_vec());
    }

    #[test]
    fn empty_binary_frame() {
        assert!(Frame::Binary(Vec::new()).is_empty());
    }
}
