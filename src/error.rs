use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Configuration error
    ConfigError(String),
    /// Malformed or missing caller input (names the offending field)
    InvalidInput(String),
    /// No classification candidates, or rate unresolved after the full fallback chain
    NotFound(String),
    /// Upstream rate authority timed out (absorbed by the fallback chain)
    UpstreamTimeout(String),
    /// Upstream rate authority returned an error status
    UpstreamError { status: StatusCode, message: String },
    /// Internal server error
    InternalError(String),
    /// HTTP request error (preserves reqwest::Error for timeout detection)
    HttpRequest(reqwest::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::UpstreamTimeout(msg) => write!(f, "Upstream timeout: {}", msg),
            Self::UpstreamError { status, message } => {
                write!(f, "Upstream error ({}): {}", status, message)
            }
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
            Self::HttpRequest(err) => write!(f, "HTTP request error: {}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::ConfigError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::UpstreamTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone()),
            Self::UpstreamError { status, message } => (*status, message.clone()),
            Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::HttpRequest(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

pub fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::ConfigError(_) => "config_error",
        AppError::InvalidInput(_) => "invalid_input",
        AppError::NotFound(_) => "not_found",
        AppError::UpstreamTimeout(_) => "upstream_timeout",
        AppError::UpstreamError { .. } => "upstream_error",
        AppError::InternalError(_) => "internal_error",
        AppError::HttpRequest(_) => "http_request_error",
    }
}

/// Whether an error is the kind the rate fallback chain absorbs.
///
/// Timeouts, connection failures and 5xx responses move the chain to the
/// next fallback level. Invalid input and config errors do not: they are
/// returned to the caller immediately.
pub fn is_fallback_eligible(error: &AppError) -> bool {
    match error {
        AppError::UpstreamTimeout(_) => true,
        AppError::NotFound(_) => true,
        AppError::HttpRequest(e) => {
            e.is_connect() || e.is_timeout() || e.status().map_or(true, |s| s.is_server_error())
        }
        AppError::UpstreamError { status, .. } => status.is_server_error(),
        AppError::InternalError(_) => true,
        AppError::InvalidInput(_) => false,
        AppError::ConfigError(_) => false,
    }
}

// Implement conversions from common error types
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpRequest(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::NotFound("no rate for 8471300100/XX".to_string());
        assert_eq!(error.to_string(), "Not found: no rate for 8471300100/XX");
    }

    #[test]
    fn test_error_type_name() {
        assert_eq!(
            error_type_name(&AppError::InvalidInput("quantity".to_string())),
            "invalid_input"
        );
        assert_eq!(
            error_type_name(&AppError::UpstreamTimeout("10s".to_string())),
            "upstream_timeout"
        );
    }

    #[test]
    fn test_fallback_eligibility() {
        assert!(is_fallback_eligible(&AppError::UpstreamTimeout(
            "rate authority".to_string()
        )));
        assert!(is_fallback_eligible(&AppError::UpstreamError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "down".to_string(),
        }));
        assert!(!is_fallback_eligible(&AppError::InvalidInput(
            "unit_price".to_string()
        )));
        assert!(!is_fallback_eligible(&AppError::UpstreamError {
            status: StatusCode::UNAUTHORIZED,
            message: "bad key".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_error_response() {
        let error = AppError::InvalidInput("limit must be between 1 and 100".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
