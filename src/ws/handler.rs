//! Axum WebSocket upgrade handler.

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::hub::RequestInfo;
use crate::transport::Transport;

/// `GET /ws`: Upgrade HTTP connection to WebSocket and hand it to the hub.
///
/// Failed upgrades are reported through the hub's diagnostic hook.
pub async fn ws_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(uri = %parts.uri, error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let info = RequestInfo::new(remote_addr, parts.uri, parts.headers);

    let hub = state.hub.clone();
    let failed_hub = state.hub;
    ws.max_message_size(state.max_message_bytes)
        .on_failed_upgrade(move |err| {
            failed_hub.diagnostic(
                "ws::handler",
                &format!("failed to upgrade http connection to websocket: {err}"),
            );
        })
        .on_upgrade(move |socket| async move { hub.serve(Transport::from(socket), info).await })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::Router;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;
    use crate::hub::{Hub, HubSettings};

    #[tokio::test]
    async fn plain_get_is_rejected_without_registering() {
        let hub = Hub::new(HubSettings::default());
        let app = Router::new().route("/ws", get(ws_handler)).with_state(AppState {
            hub: hub.clone(),
            max_message_bytes: 1024,
        });

        let Ok(request) = axum::http::Request::builder().uri("/ws").body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("router is infallible");
        };
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(hub.is_empty().await);
    }
}
