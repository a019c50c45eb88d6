//! Core error type for the agentry registry.
//!
//! `RegistryError` is used throughout the core domain (store, discovery,
//! proxy, client). When the `axum` feature is enabled, it also implements
//! `IntoResponse` so it can be used directly as an axum handler error type.
//! Every variant carries a stable machine-readable kind string (see
//! [`RegistryError::kind`]) which HTTP adapters put in structured error
//! bodies alongside the human-readable message.

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service discovery failed: {0}")]
    Discovery(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Remote returned HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Stable kind string for structured error bodies and log filtering.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Discovery(_) => "service_discovery_error",
            Self::Transport(_) => "transport_error",
            Self::Timeout(_) => "timeout_error",
            Self::RemoteStatus { .. } => "remote_status_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Database(_) | Self::Internal(_) => "internal_error",
        }
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RegistryError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) | RegistryError::Discovery(_) => StatusCode::NOT_FOUND,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
            RegistryError::Transport(_)
            | RegistryError::RemoteStatus { .. }
            | RegistryError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            RegistryError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RegistryError::Database(_) | RegistryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(
            RegistryError::Validation("x".to_string()).kind(),
            "validation_error"
        );
        assert_eq!(RegistryError::NotFound("x".to_string()).kind(), "not_found");
        assert_eq!(RegistryError::Conflict("x".to_string()).kind(), "conflict");
        assert_eq!(
            RegistryError::Discovery("x".to_string()).kind(),
            "service_discovery_error"
        );
        assert_eq!(
            RegistryError::RemoteStatus {
                status: 500,
                body: String::new()
            }
            .kind(),
            "remote_status_error"
        );
    }
}
