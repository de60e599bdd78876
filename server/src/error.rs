//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fanout_hub::{ConfigError, HubError};

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Hub operation failed.
    #[error("hub error: {0}")]
    Hub(#[from] HubError),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Hub(HubError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Hub(HubError::Serialization(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status() {
        assert_eq!(
            ServerError::Hub(HubError::Stopped).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServerError::Hub(HubError::Serialization("x".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Config(ConfigError::InvalidPingInterval).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display() {
        let err = ServerError::Hub(HubError::Stopped);
        assert_eq!(err.to_string(), "hub error: hub is stopped");
    }

    #[test]
    fn test_error_into_response() {
        let response = ServerError::Hub(HubError::Stopped).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
