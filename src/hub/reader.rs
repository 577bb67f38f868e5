//! Per-connection reader loop.
//!
//! One loop runs per registered connection. It parks on the next inbound
//! frame, refreshes liveness, and queues the frame for the connection's
//! pipeline worker. The worker runs every handler in order, each behind its
//! own panic boundary, one frame at a time, so a slow handler never delays
//! reads or liveness refreshes. The only way out of the read loop is a read
//! failure (including end-of-stream and a local close signal), which leads
//! to exactly one teardown call from here.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::{Connection, FrameContext, Hub};
use crate::supervisor::contain;
use crate::transport::{Frame, FrameStream, TransportError};

impl Hub {
    /// Runs the reader loop for `connection` until its transport fails.
    pub async fn run_reader(&self, connection: Arc<Connection>, mut stream: FrameStream) {
        let id = connection.id();
        tracing::debug!(conn_id = %id, "reader loop started");

        let (queue, pending) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().run_pipeline(Arc::clone(&connection), pending));

        let failure = loop {
            let next = tokio::select! {
                frame = stream.next() => frame,
                closed = connection.closed() => Some(Err(closed)),
            };
            match next {
                Some(Ok(frame)) => {
                    self.inner.metadata.touch(id);
                    if queue.send(frame).is_err() {
                        tracing::warn!(conn_id = %id, "pipeline worker gone, frame dropped");
                    }
                }
                Some(Err(err)) => break err,
                None => break TransportError::ClosedByPeer,
            }
        };
        // Queued frames still drain through the pipeline.
        drop(queue);

        self.diagnostic(
            "hub::reader",
            &format!("deleting connection {id} after read failure: {failure}"),
        );
        self.teardown(id, "read failure").await;
        tracing::debug!(conn_id = %id, "reader loop finished");
    }

    /// Feeds queued frames through the pipeline in arrival order until the
    /// reader loop drops its end of the queue.
    async fn run_pipeline(self, connection: Arc<Connection>, mut pending: mpsc::UnboundedReceiver<Frame>) {
        while let Some(frame) = pending.recv().await {
            self.dispatch_frame(&connection, frame).await;
        }
        tracing::trace!(conn_id = %connection.id(), "pipeline worker finished");
    }

    /// Runs every registered handler for one frame, in order.
    async fn dispatch_frame(&self, connection: &Arc<Connection>, frame: Frame) {
        let kind = frame.kind();
        let payload: Arc<[u8]> = Arc::from(frame.into_bytes());

        for (position, handler) in self.inner.pipeline.snapshot().into_iter().enumerate() {
            let ctx = FrameContext {
                connection: Arc::clone(connection),
                kind,
                id: connection.id(),
                payload: Arc::clone(&payload),
            };
            if let Err(panic) = contain(async move { handler.handle(ctx).await }).await {
                tracing::error!(
                    conn_id = %connection.id(),
                    handler = position,
                    panic = %panic,
                    "frame handler panicked"
                );
                self.diagnostic(
                    "hub::reader",
                    &format!("handler {position} panicked on connection {}: {panic}", connection.id()),
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::hub::{HubSettings, RequestInfo};
    use crate::transport::FrameKind;
    use crate::transport::memory;

    fn always_fails() {
        panic!("handler always fails");
    }

    async fn wait_until_gone(hub: &Hub, id: crate::hub::ConnectionId) {
        for _ in 0..1_000 {
            if !hub.registry().contains(id).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("connection {id} was never removed");
    }

    #[tokio::test]
    async fn frames_reach_handlers_with_kind_and_identity() {
        let hub = Hub::new(HubSettings::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.register_handler(move |frame: FrameContext| {
            let sink = Arc::clone(&sink);
            async move {
                if let Ok(mut seen) = sink.lock() {
                    seen.push((frame.id, frame.kind, frame.payload.to_vec()));
                }
            }
        });

        let (transport, peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;
        assert!(peer.send_text("hello"));
        assert!(peer.send_binary(&[1, 2, 3]));

        for _ in 0..1_000 {
            if seen.lock().map(|s| s.len()).unwrap_or_default() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let Ok(seen) = seen.lock() else {
            panic!("poisoned");
        };
        assert_eq!(
            *seen,
            vec![
                (conn.id(), FrameKind::Text, b"hello".to_vec()),
                (conn.id(), FrameKind::Binary, vec![1, 2, 3]),
            ]
        );
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_others_or_later_frames() {
        let hub = Hub::new(HubSettings::default());
        let delivered = Arc::new(AtomicUsize::new(0));
        hub.register_handler(|_frame: FrameContext| async { always_fails() });
        let counter = Arc::clone(&delivered);
        hub.register_handler(move |_frame: FrameContext| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (transport, peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;
        for n in 0..3 {
            assert!(peer.send_text(&format!("frame {n}")));
        }

        for _ in 0..1_000 {
            if delivered.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(delivered.load(Ordering::SeqCst), 3);
        assert!(hub.registry().contains(conn.id()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_refresh_last_activity() {
        let hub = Hub::new(HubSettings::default());
        let (transport, peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;
        let Some(before) = hub.metadata(conn.id()) else {
            panic!("metadata missing");
        };

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(peer.send_text("keepalive"));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let Some(after) = hub.metadata(conn.id()) else {
            panic!("metadata missing");
        };
        assert!(after.last_seen > before.last_seen);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_does_not_delay_liveness() {
        let hub = Hub::builder().idle_timeout(Duration::from_secs(10)).build();
        hub.register_handler(|_frame: FrameContext| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let (transport, peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;

        for _ in 0..5 {
            assert!(peer.send_text("tick"));
            tokio::time::sleep(Duration::from_secs(4)).await;
        }

        assert_eq!(hub.sweep_idle().await, 0);
        assert!(hub.registry().contains(conn.id()).await);
    }

    #[tokio::test]
    async fn read_error_tears_connection_down() {
        let hub = Hub::new(HubSettings::default());
        let (transport, peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;

        assert!(peer.fail(TransportError::Io("reset".to_string())));
        wait_until_gone(&hub, conn.id()).await;
        assert!(hub.metadata(conn.id()).is_none());
    }

    #[tokio::test]
    async fn peer_hangup_tears_connection_down() {
        let hub = Hub::new(HubSettings::default());
        let (transport, peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;
        drop(peer);
        wait_until_gone(&hub, conn.id()).await;
    }

    #[tokio::test]
    async fn serve_returns_after_teardown() {
        let hub = Hub::new(HubSettings::default());
        let (transport, peer) = memory::pair();
        assert!(peer.fail(TransportError::ClosedByPeer));
        hub.serve(transport, RequestInfo::default()).await;
        assert!(hub.is_empty().await);
    }
}
