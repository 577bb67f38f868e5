//! Echo handler for smoke-testing a deployment.
//!
//! Enabled with `WS_ECHO_ENABLED=true`: every inbound frame is written back
//! to its sender with the same frame type.

use crate::hub::{FrameContext, FrameHandler, Hub};
use crate::transport::FrameKind;

/// Builds a handler that echoes every frame back to its connection.
pub fn echo_handler(hub: Hub) -> impl FrameHandler {
    move |frame: FrameContext| {
        let hub = hub.clone();
        async move {
            let result = match frame.kind {
                FrameKind::Binary => hub.reply(&frame.connection, frame.payload.to_vec()).await,
                FrameKind::Text => {
                    let text = String::from_utf8_lossy(&frame.payload).into_owned();
                    hub.reply_text(&frame.connection, text).await
                }
            };
            if let Err(err) = result {
                tracing::debug!(conn_id = %frame.id, error = %err, "echo failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::hub::{HubSettings, RequestInfo};
    use crate::transport::Frame;
    use crate::transport::memory;

    #[tokio::test]
    async fn echoes_text_and_binary() {
        let hub = Hub::new(HubSettings::default());
        hub.register_handler(echo_handler(hub.clone()));
        let (transport, peer) = memory::pair();
        hub.accept(transport, RequestInfo::default()).await;

        assert!(peer.send_text("hello"));
        assert!(peer.send_binary(&[9, 8]));
        let frames = peer.wait_for_frames(2, Duration::from_secs(2)).await;
        assert_eq!(
            frames,
            vec![Frame::Text("hello".to_string()), Frame::Binary(vec![9, 8])]
        );
    }
}
