//! Hub error types with HTTP status code mapping.
//!
//! [`HubError`] is the central error type for hub operations. Each variant
//! maps to a numeric code and an HTTP status so the admin endpoints can
//! return a structured JSON error response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::hub::ConnectionId;
use crate::transport::TransportError;

/// Structured JSON error response body.
///
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "connection not found: 6f1c..."
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Errors produced by hub operations.
///
/// # Error Code Ranges
///
/// | Range     | Category   | HTTP Status               |
/// |-----------|------------|---------------------------|
/// | 1000–1999 | Encoding   | 400 Bad Request           |
/// | 2000–2999 | Not Found  | 404 Not Found             |
/// | 3000–3999 | Server     | 500 Internal Server Error |
/// | 5000–5999 | Transport  | 502 / 504                 |
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The connection's transport rejected a read or write.
    #[error("transport error on connection {conn_id}: {source}")]
    Transport {
        /// Affected connection.
        conn_id: ConnectionId,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// A write did not complete before its deadline.
    #[error("write to connection {conn_id} timed out after {after_ms} ms")]
    WriteTimeout {
        /// Affected connection.
        conn_id: ConnectionId,
        /// Deadline that elapsed, in milliseconds.
        after_ms: u64,
    },

    /// No live connection with this identity.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Payload could not be encoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A delivery task panicked or was aborted.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Serialization(_) => 1001,
            Self::ConnectionNotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Transport { .. } => 5001,
            Self::WriteTimeout { .. } => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::WriteTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns `true` if the connection should be closed after this error.
    ///
    /// Hard transport failures end the session; timeouts only abort the
    /// one delivery.
    #[must_use]
    pub const fn is_fatal_for_connection(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
