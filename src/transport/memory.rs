//! In-memory transport used by tests and local tooling.
//!
//! [`pair`] returns a [`Transport`] for the hub and a [`MemoryPeer`] that
//! plays the client: it injects inbound frames and records every frame the
//! hub writes. The sink copies payloads into a shared byte log one byte at
//! a time, yielding between bytes, so unserialized concurrent writers
//! would visibly interleave.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::{Sink, sink, stream};
use tokio::sync::mpsc;

use super::{Frame, Transport, TransportError};

/// How the in-memory sink reacts to writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Record the frame and succeed.
    #[default]
    Accept,
    /// Never complete the write (a stalled client).
    Stall,
    /// Fail every write with [`TransportError::Io`].
    Fail,
}

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<Frame>,
    bytes: Vec<u8>,
}

/// Client side of an in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    recorded: Arc<Mutex<Recorded>>,
}

/// Creates a transport whose writes always succeed.
#[must_use]
pub fn pair() -> (Transport, MemoryPeer) {
    pair_with(WriteMode::Accept)
}

/// Creates a transport with the given write behaviour.
#[must_use]
pub fn pair_with(mode: WriteMode) -> (Transport, MemoryPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let recorded = Arc::new(Mutex::new(Recorded::default()));

    let inbound = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    let peer = MemoryPeer {
        inbound: tx,
        recorded: Arc::clone(&recorded),
    };
    if mode == WriteMode::Fail {
        return (Transport::new(RefusingSink, inbound), peer);
    }

    let outbound = sink::unfold(recorded, move |recorded, frame: Frame| async move {
        if mode == WriteMode::Stall {
            std::future::pending::<()>().await;
        }
        for byte in frame.as_bytes() {
            recorded
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .bytes
                .push(*byte);
            tokio::task::yield_now().await;
        }
        recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .push(frame);
        Ok::<_, TransportError>(recorded)
    });
    (Transport::new(outbound, inbound), peer)
}

/// Sink that stays usable but rejects every frame.
#[derive(Debug)]
struct RefusingSink;

impl Sink<Frame> for RefusingSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, _frame: Frame) -> Result<(), Self::Error> {
        Err(TransportError::Io("write refused".to_string()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

impl MemoryPeer {
    /// Delivers a text frame to the hub. Returns `false` once the reader
    /// side is gone.
    pub fn send_text(&self, text: &str) -> bool {
        self.inbound.send(Ok(Frame::Text(text.to_string()))).is_ok()
    }

    /// Delivers a binary frame to the hub.
    pub fn send_binary(&self, data: &[u8]) -> bool {
        self.inbound.send(Ok(Frame::Binary(data.to_vec()))).is_ok()
    }

    /// Makes the hub's next read fail with `err`.
    pub fn fail(&self, err: TransportError) -> bool {
        self.inbound.send(Err(err)).is_ok()
    }

    /// Frames written by the hub so far, in write order.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frames
            .clone()
    }

    /// Every payload byte written by the hub, in the order it hit the sink.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes
            .clone()
    }

    /// Waits until at least `count` frames were written or `within` elapses,
    /// returning whatever was recorded.
    pub async fn wait_for_frames(&self, count: usize, within: Duration) -> Vec<Frame> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let frames = self.frames();
            if frames.len() >= count || tokio::time::Instant::now() >= deadline {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use futures_util::{SinkExt, StreamExt};

    use super::*;

    #[tokio::test]
    async fn records_written_frames() {
        let (mut transport, peer) = pair();
        tokio_test::assert_ok!(transport.sink.send(Frame::Binary(b"ab".to_vec())).await);
        assert_eq!(peer.frames(), vec![Frame::Binary(b"ab".to_vec())]);
        assert_eq!(peer.bytes(), b"ab".to_vec());
    }

    #[tokio::test]
    async fn injected_frames_are_read_in_order() {
        let (mut transport, peer) = pair();
        assert!(peer.send_text("one"));
        assert!(peer.send_binary(b"two"));
        let Some(Ok(first)) = transport.stream.next().await else {
            panic!("expected first frame");
        };
        let Some(Ok(second)) = transport.stream.next().await else {
            panic!("expected second frame");
        };
        assert_eq!(first, Frame::Text("one".to_string()));
        assert_eq!(second, Frame::Binary(b"two".to_vec()));
    }

    #[tokio::test]
    async fn failing_sink_reports_io_error() {
        let (mut transport, peer) = pair_with(WriteMode::Fail);
        let result = transport.sink.send(Frame::Text("x".to_string())).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
        assert!(peer.frames().is_empty());
    }

    #[tokio::test]
    async fn failing_sink_keeps_failing_on_later_writes() {
        let (mut transport, _peer) = pair_with(WriteMode::Fail);
        for n in 0..3 {
            let result = transport.sink.send(Frame::Text(format!("write {n}"))).await;
            assert!(matches!(result, Err(TransportError::Io(_))));
        }
        tokio_test::assert_ok!(transport.sink.close().await);
    }

    #[tokio::test]
    async fn dropping_peer_ends_stream() {
        let (mut transport, peer) = pair();
        drop(peer);
        assert!(transport.stream.next().await.is_none());
    }
}
