use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ai::core::ProviderError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication errors (AUTH_xxx)
    AuthMissingToken,
    AuthInvalidToken,

    // Quota errors (QUOTA_xxx)
    QuotaExceeded,

    // Resource errors (RESOURCE_xxx)
    ResourceNotFound,
    ResourceConflict,
    ResourceConversationNotFound,
    ResourceAssistantNotFound,
    ResourceProviderDisabled,

    // Provider errors (PROVIDER_xxx)
    ProviderTimeout,
    ProviderRejected,
    ProviderConfiguration,

    // System errors (SYSTEM_xxx)
    SystemDatabaseError,
    SystemInternalError,
    SystemStreamingError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthMissingToken => "AUTH_MISSING_TOKEN",
            ErrorCode::AuthInvalidToken => "AUTH_INVALID_TOKEN",

            ErrorCode::QuotaExceeded => "QUOTA_EXCEEDED",

            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ResourceConflict => "RESOURCE_CONFLICT",
            ErrorCode::ResourceConversationNotFound => "RESOURCE_CONVERSATION_NOT_FOUND",
            ErrorCode::ResourceAssistantNotFound => "RESOURCE_ASSISTANT_NOT_FOUND",
            ErrorCode::ResourceProviderDisabled => "RESOURCE_PROVIDER_DISABLED",

            ErrorCode::ProviderTimeout => "PROVIDER_TIMEOUT",
            ErrorCode::ProviderRejected => "PROVIDER_REJECTED",
            ErrorCode::ProviderConfiguration => "PROVIDER_CONFIGURATION",

            ErrorCode::SystemDatabaseError => "SYSTEM_DATABASE_ERROR",
            ErrorCode::SystemInternalError => "SYSTEM_INTERNAL_ERROR",
            ErrorCode::SystemStreamingError => "SYSTEM_STREAMING_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::AuthMissingToken | ErrorCode::AuthInvalidToken => StatusCode::UNAUTHORIZED,

            // Distinct status so clients can route to an upgrade flow.
            ErrorCode::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,

            ErrorCode::ResourceNotFound
            | ErrorCode::ResourceConversationNotFound
            | ErrorCode::ResourceAssistantNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ResourceConflict => StatusCode::CONFLICT,
            ErrorCode::ResourceProviderDisabled => StatusCode::FORBIDDEN,

            ErrorCode::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::ProviderRejected => StatusCode::BAD_GATEWAY,

            ErrorCode::ProviderConfiguration
            | ErrorCode::SystemDatabaseError
            | ErrorCode::SystemInternalError
            | ErrorCode::SystemStreamingError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppError {
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn conversation_not_found() -> Self {
        Self::new(
            ErrorCode::ResourceConversationNotFound,
            "Conversation not found",
        )
    }

    pub fn assistant_not_found() -> Self {
        Self::new(ErrorCode::ResourceAssistantNotFound, "Assistant not found")
    }

    pub fn quota_exceeded() -> Self {
        Self::new(
            ErrorCode::QuotaExceeded,
            "Token balance is too low for a new message",
        )
    }

    pub fn turn_in_flight() -> Self {
        Self::new(
            ErrorCode::ResourceConflict,
            "A message is already being processed for this conversation",
        )
    }

    pub fn database_error() -> Self {
        Self::new(ErrorCode::SystemDatabaseError, "Database error")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SystemInternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ApiError {
            error: self.message,
            error_code: self.code.as_str().to_string(),
            details: self.details,
        };
        (status, Json(body)).into_response()
    }
}

/// User-safe mapping from provider failures. Upstream bodies stay in the
/// logs; the message here is what reaches the client.
impl From<&ProviderError> for AppError {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::Timeout => AppError::new(
                ErrorCode::ProviderTimeout,
                "The model took too long to respond, please try again",
            ),
            ProviderError::Rejected { message, .. } => {
                AppError::new(ErrorCode::ProviderRejected, message.clone())
            }
            ProviderError::StaleThread => AppError::new(
                ErrorCode::ProviderRejected,
                "The assistant session expired, please send your message again",
            ),
            ProviderError::Configuration(_) => AppError::new(
                ErrorCode::ProviderConfiguration,
                "The assistant is not configured correctly",
            ),
            ProviderError::Transport(_) => AppError::new(
                ErrorCode::ProviderRejected,
                "Could not reach the model provider",
            ),
            ProviderError::Protocol(_) => AppError::new(
                ErrorCode::SystemStreamingError,
                "The model response ended unexpectedly",
            ),
        }
    }
}

pub type ApiResult<T> = Result<(StatusCode, T), AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_has_a_distinct_code_and_status() {
        let err = AppError::quota_exceeded();
        assert_eq!(err.code().as_str(), "QUOTA_EXCEEDED");
        assert_eq!(err.code().status_code(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn provider_errors_map_without_leaking_detail() {
        let err = AppError::from(&ProviderError::Configuration(
            "api key sk-secret is missing".to_string(),
        ));
        assert!(!err.to_string().contains("sk-secret"));
        assert_eq!(err.code().as_str(), "PROVIDER_CONFIGURATION");

        let err = AppError::from(&ProviderError::Timeout);
        assert_eq!(err.code().as_str(), "PROVIDER_TIMEOUT");
    }
}
