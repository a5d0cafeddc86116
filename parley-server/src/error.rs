use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::providers::Provider;

/// Every failure a request can surface, mapped onto an HTTP status by the
/// `IntoResponse` impl below. Adapters and the orchestrator never retry;
/// errors propagate unchanged up to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad or missing caller input.
    #[error("{0}")]
    Validation(String),

    /// Required credential or setting absent. A deployment defect, not a
    /// retryable condition.
    #[error("{0}")]
    Configuration(String),

    /// The upstream provider failed: network error, non-2xx status, or a
    /// payload we could not parse. Tagged with the provider so telemetry can
    /// tell an unreachable local server from a cloud rejection.
    #[error("{provider} error: {detail}")]
    Provider { provider: Provider, detail: String },

    /// Unknown conversation id on a history lookup.
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    pub fn provider(provider: Provider, detail: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Configuration(_) | ApiError::Provider { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
