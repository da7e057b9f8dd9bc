//! API error types and response handling.
//!
//! Handlers return [`ApiError`], which renders as a status code plus a
//! uniform JSON [`ErrorResponse`] body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use apiforge_core::ApiforgeError;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400 Bad Request - invalid input from the client.
    #[error("Bad Request: {message}")]
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - the resource does not exist.
    #[error("Not Found: {message}")]
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - the operation clashes with current state.
    #[error("Conflict: {message}")]
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Structured context, such as the contested sync key.
        details: Option<serde_json::Value>,
    },

    /// 422 Unprocessable Entity - well-formed but unusable settings.
    #[error("Unprocessable Entity: {message}")]
    Unprocessable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - unexpected server-side failure.
    #[error("Internal Error: {message}")]
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<String>,
    },
}

impl ApiError {
    /// A 400 with the given code.
    pub fn bad_request(error_code: &str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }

    /// A 404 with the given code.
    pub fn not_found(error_code: &str, message: impl Into<String>) -> Self {
        Self::NotFound {
            error_code: error_code.to_string(),
            message: message.into(),
        }
    }
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "sync_in_progress",
    "message": "Sync already in progress for 'petstore'. Wait for it to finish and retry.",
    "details": {"key": "petstore"}
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "descriptor_not_found").
    #[schema(example = "descriptor_not_found")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "No descriptor with id 'abc'")]
    pub message: String,

    /// Optional additional details.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest { error_code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::NotFound { error_code, message } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::Conflict {
                error_code,
                message,
                details,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details,
                },
            ),

            Self::Unprocessable { error_code, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(serde_json::Value::String),
                    },
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert from apiforge_core errors.
impl From<ApiforgeError> for ApiError {
    fn from(err: ApiforgeError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err.http_status_code() {
            400 => Self::BadRequest { error_code, message },
            404 => Self::NotFound { error_code, message },
            409 => {
                let details = match &err {
                    ApiforgeError::SyncInProgress(key) => Some(serde_json::json!({ "key": key })),
                    ApiforgeError::DescriptorTypeChanged { id, .. } => {
                        Some(serde_json::json!({ "id": id }))
                    }
                    _ => None,
                };
                Self::Conflict {
                    error_code,
                    message,
                    details,
                }
            }
            422 => Self::Unprocessable { error_code, message },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<apiforge_core::SearchError> for ApiError {
    fn from(err: apiforge_core::SearchError) -> Self {
        Self::from(ApiforgeError::from(err))
    }
}

impl From<apiforge_core::SyncError> for ApiError {
    fn from(err: apiforge_core::SyncError) -> Self {
        Self::from(ApiforgeError::from(err))
    }
}

impl From<apiforge_core::StoreError> for ApiError {
    fn from(err: apiforge_core::StoreError) -> Self {
        Self::from(ApiforgeError::from(err))
    }
}

impl From<apiforge_core::UsageError> for ApiError {
    fn from(err: apiforge_core::UsageError) -> Self {
        Self::from(ApiforgeError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::bad_request("invalid_page", "page must be at least 1");
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_sync_conflict_carries_key() {
        let err = ApiError::from(apiforge_core::SyncError::AlreadyInProgress {
            key: "petstore".to_string(),
        });
        match err {
            ApiError::Conflict {
                error_code,
                details,
                ..
            } => {
                assert_eq!(error_code, "sync_in_progress");
                assert_eq!(details.unwrap()["key"], "petstore");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_store_errors_map_to_status() {
        let missing = ApiError::from(apiforge_core::StoreError::SourceNotFound("x".into()));
        assert!(matches!(missing, ApiError::NotFound { ref error_code, .. } if error_code == "source_not_found"));

        let invalid = ApiError::from(apiforge_core::StoreError::InvalidSource("../x".into()));
        assert!(matches!(invalid, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "descriptor_not_found".to_string(),
            message: "No descriptor with id 'abc'".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("descriptor_not_found"));
    }
}
