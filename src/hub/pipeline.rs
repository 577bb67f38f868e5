//! Ordered, append-only list of inbound frame handlers.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;

use super::{Connection, ConnectionId};
use crate::transport::FrameKind;

/// Everything a handler learns about one inbound frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    /// Connection the frame arrived on.
    pub connection: Arc<Connection>,
    /// Transport frame type.
    pub kind: FrameKind,
    /// Identity of the connection.
    pub id: ConnectionId,
    /// Frame payload.
    pub payload: Arc<[u8]>,
}

/// Handles inbound frames.
///
/// Implemented for any `Fn(FrameContext) -> impl Future<Output = ()>`
/// closure, so most handlers are written as `move |frame| async move { .. }`.
pub trait FrameHandler: Send + Sync + 'static {
    /// Processes one frame. Panics are caught by the reader loop.
    fn handle(&self, frame: FrameContext) -> BoxFuture<'static, ()>;
}

impl<F, Fut> FrameHandler for F
where
    F: Fn(FrameContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, frame: FrameContext) -> BoxFuture<'static, ()> {
        Box::pin(self(frame))
    }
}

/// Registered handlers, invoked in registration order for every frame.
#[derive(Default)]
pub struct CallbackPipeline {
    handlers: RwLock<Vec<Arc<dyn FrameHandler>>>,
}

impl CallbackPipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler. It sees every frame read after this call returns.
    pub fn register<H: FrameHandler>(&self, handler: H) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Copies the current handler list for one dispatch.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn FrameHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Arc::clone)
            .collect()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CallbackPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackPipeline")
            .field("handlers", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::hub::RequestInfo;
    use crate::transport::memory;

    fn frame() -> FrameContext {
        let (transport, _peer) = memory::pair();
        let connection = Arc::new(Connection::new(transport.sink, RequestInfo::default()));
        FrameContext {
            id: connection.id(),
            connection,
            kind: FrameKind::Text,
            payload: Arc::from(b"hello".as_slice()),
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = CallbackPipeline::new();
        for n in 0..3 {
            let order = Arc::clone(&order);
            pipeline.register(move |_frame: FrameContext| {
                let order = Arc::clone(&order);
                async move {
                    if let Ok(mut order) = order.lock() {
                        order.push(n);
                    }
                }
            });
        }
        assert_eq!(pipeline.len(), 3);

        for handler in pipeline.snapshot() {
            handler.handle(frame()).await;
        }
        let Ok(order) = order.lock() else {
            panic!("poisoned");
        };
        assert_eq!(*order, vec![0, 1, 2]);
    }

    #[test]
    fn snapshot_is_not_retroactive() {
        let pipeline = CallbackPipeline::new();
        let before = pipeline.snapshot();
        pipeline.register(|_frame: FrameContext| async {});
        assert!(before.is_empty());
        assert_eq!(pipeline.snapshot().len(), 1);
    }
}
