//! Connection administration: inspect, broadcast, publish, close.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::error::HubError;
use crate::hub::ConnectionId;

/// Body of `POST /api/v1/publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Subscription key.
    pub key: String,
    /// Value to publish.
    pub content: serde_json::Value,
}

/// `GET /api/v1/connections`: Metadata of every live connection.
pub async fn list_connections(State(state): State<AppState>) -> impl IntoResponse {
    let connections = state.hub.all_metadata();
    Json(serde_json::json!({
        "count": connections.len(),
        "connections": connections,
    }))
}

/// `GET /api/v1/connections/{id}`: Metadata of one connection.
///
/// # Errors
///
/// Returns [`HubError::ConnectionNotFound`] for an unknown identity.
pub async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, HubError> {
    let id = ConnectionId::from(id);
    let meta = state.hub.metadata(id).ok_or(HubError::ConnectionNotFound(id))?;
    Ok(Json(meta))
}

/// `DELETE /api/v1/connections`: Force-close every connection.
pub async fn close_all(State(state): State<AppState>) -> impl IntoResponse {
    let closed = state.hub.close_all().await;
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "closed": closed })))
}

/// `POST /api/v1/broadcast`: Send a JSON value to every connection.
///
/// # Errors
///
/// Returns [`HubError::Serialization`] if the body cannot be re-encoded.
pub async fn broadcast(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, HubError> {
    let report = state.hub.broadcast_json(&body).await?;
    Ok(Json(report))
}

/// `POST /api/v1/publish`: Publish a keyed envelope to every connection.
///
/// # Errors
///
/// Returns [`HubError::Serialization`] if the content cannot be encoded.
pub async fn publish(
    State(state): State<AppState>,
    Json(body): Json<PublishRequest>,
) -> Result<impl IntoResponse, HubError> {
    let report = state.hub.publish(&body.key, &body.content).await?;
    Ok(Json(report))
}

/// Connection administration routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/connections", get(list_connections).delete(close_all))
        .route("/connections/{id}", get(get_connection))
        .route("/broadcast", post(broadcast))
        .route("/publish", post(publish))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::hub::{Envelope, Hub, HubSettings, RequestInfo};
    use crate::transport::{Frame, memory};

    fn app(hub: &Hub) -> Router {
        crate::api::build_router().with_state(AppState {
            hub: hub.clone(),
            max_message_bytes: 1024,
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("readable body");
        };
        let Ok(json) = serde_json::from_slice(&bytes) else {
            panic!("json body");
        };
        json
    }

    #[tokio::test]
    async fn lists_registered_connections() {
        let hub = Hub::new(HubSettings::default());
        let (transport, _peer) = memory::pair();
        let conn = hub.accept(transport, RequestInfo::default()).await;

        let Ok(request) = Request::builder().uri("/api/v1/connections").body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app(&hub).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["connections"][0]["id"], conn.id().to_string());
    }

    #[tokio::test]
    async fn unknown_connection_is_404() {
        let hub = Hub::new(HubSettings::default());
        let uri = format!("/api/v1/connections/{}", ConnectionId::new());
        let Ok(request) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        let Ok(response) = app(&hub).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], 2001);
    }

    #[tokio::test]
    async fn publish_endpoint_fans_out_envelope() {
        let hub = Hub::new(HubSettings::default());
        let (transport, peer) = memory::pair();
        hub.accept(transport, RequestInfo::default()).await;

        let Ok(request) = Request::builder()
            .method("POST")
            .uri("/api/v1/publish")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"key":"temp","content":42}"#))
        else {
            panic!("valid request");
        };
        let Ok(response) = app(&hub).oneshot(request).await else {
            panic!("infallible");
        };
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["delivered"], 1);

        let frames = peer.wait_for_frames(1, Duration::from_secs(2)).await;
        let Some(Frame::Text(text)) = frames.first() else {
            panic!("expected a text frame");
        };
        let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
            panic!("envelope");
        };
        assert_eq!(envelope.key, "temp");
        assert_eq!(envelope.content, serde_json::json!(42));
    }
}
