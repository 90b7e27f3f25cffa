//! Forward module error types
//!
//! Every failure that can be reported before the first response byte. Once a
//! stream is open, faults travel in-band instead (see `relay`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::transform::TransformError;

/// Error types for the forward module
#[derive(Debug)]
pub enum ForwardError {
    /// Credential missing or malformed
    Authentication(String),
    /// Malformed inbound body, missing field, or unparseable upstream reply
    InvalidRequest { message: String, details: Option<Value> },
    /// Upstream unreachable, 5xx, or timed out. Callers may retry.
    ServiceUnavailable { service: String, reason: String },
    /// A pipeline step failed or produced invalid output
    Transform(TransformError),
    /// Anything else
    Internal(String),
}

impl ForwardError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ForwardError::InvalidRequest {
            message: message.into(),
            details: None,
        }
    }

    pub fn unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        ForwardError::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ForwardError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ForwardError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::Transform(_) | ForwardError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ForwardError::Authentication(_) => "authentication_error",
            ForwardError::InvalidRequest { .. } => "invalid_request_error",
            ForwardError::ServiceUnavailable { .. } => "service_unavailable",
            ForwardError::Transform(_) => "transform_error",
            ForwardError::Internal(_) => "internal_error",
        }
    }
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            ForwardError::InvalidRequest { message, .. } => {
                write!(f, "Invalid request: {}", message)
            }
            ForwardError::ServiceUnavailable { service, reason } => {
                write!(f, "Service unavailable: {} ({})", service, reason)
            }
            ForwardError::Transform(err) => write!(f, "{}", err),
            ForwardError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardError::Transform(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransformError> for ForwardError {
    fn from(err: TransformError) -> Self {
        ForwardError::Transform(err)
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = self.error_type();

        let mut error = json!({
            "type": error_type,
            "message": self.to_string(),
        });
        match &self {
            ForwardError::InvalidRequest {
                details: Some(details),
                ..
            } => {
                error["details"] = details.clone();
            }
            ForwardError::ServiceUnavailable { service, .. } => {
                error["service"] = json!(service);
            }
            ForwardError::Transform(err) => {
                error["step"] = json!(err.step());
            }
            _ => {}
        }

        // Full cause chain goes to the log, not the client
        let cause = std::error::Error::source(&self)
            .and_then(|e| e.source())
            .map(|c| c.to_string())
            .unwrap_or_default();
        crate::logger::error(
            "forward_error",
            &format!(
                "Returning error response: status={}, type={}, message={}, cause={}",
                status.as_u16(),
                error_type,
                self,
                cause
            ),
        );

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type alias for forward operations
pub type ForwardResult<T> = Result<T, ForwardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ForwardError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ForwardError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ForwardError::unavailable("openai", "timeout").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ForwardError::from(TransformError::ValidationFailed { step: "s" }).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn transform_error_keeps_step_name() {
        let err = ForwardError::from(TransformError::ValidationFailed {
            step: "tools_merger",
        });
        assert!(err.to_string().contains("tools_merger"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
