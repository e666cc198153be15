use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn upstream<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Upstream(err.to_string())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Upstream(msg) if looks_like_missing_model(msg) => ErrorClass::ModelUnavailable,
            ApiError::Upstream(_) => ErrorClass::Transport,
            ApiError::ServiceUnavailable(_) => ErrorClass::ModelUnavailable,
            ApiError::BadRequest(_) => ErrorClass::InvalidInput,
            ApiError::Internal(_) => ErrorClass::Internal,
        }
    }
}

/// Coarse grouping used when logging failures out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    ModelUnavailable,
    InvalidInput,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transport => "transport",
            ErrorClass::ModelUnavailable => "model_unavailable",
            ErrorClass::InvalidInput => "invalid_input",
            ErrorClass::Internal => "internal",
        }
    }
}

fn looks_like_missing_model(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("model") && (lower.contains("not found") || lower.contains("pull"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_classified_separately_from_transport() {
        let missing = ApiError::Upstream("model 'gemma:2b' not found, try pulling it first".into());
        let refused = ApiError::Upstream("error sending request: connection refused".into());

        assert_eq!(missing.class(), ErrorClass::ModelUnavailable);
        assert_eq!(refused.class(), ErrorClass::Transport);
        assert_eq!(ApiError::BadRequest("x".into()).class(), ErrorClass::InvalidInput);
    }
}
