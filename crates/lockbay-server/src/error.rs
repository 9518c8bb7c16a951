use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use lockbay_core::Error as CoreError;
use lockbay_storage::StorageError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and storage error enums and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON
/// error responses; this is the only place error kinds are translated
/// to status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `lockbay_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A persistence error from `lockbay_storage`.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Duplicate admissions answer with the surviving command id so
        // the issuer can poll it instead of retrying blindly.
        if let AppError::Storage(StorageError::DuplicateCommand { existing_id }) = &self {
            let body = json!({
                "error": self.to_string(),
                "code": "DUPLICATE_COMMAND",
                "existing_id": existing_id,
            });
            return (StatusCode::CONFLICT, axum::Json(body)).into_response();
        }

        let (status, code, message) = match &self {
            // --- Domain errors ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict { message, .. } => {
                    (StatusCode::CONFLICT, "CONFLICT", message.clone())
                }
                CoreError::StaleVersion { .. } => {
                    (StatusCode::CONFLICT, "STALE_VERSION", core.to_string())
                }
                CoreError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", core.to_string())
                }
                CoreError::ZoneConfig(msg) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "ZONE_CONFIG", msg.clone())
                }
                CoreError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", core.to_string())
                }
                CoreError::Hardware { .. } => {
                    tracing::error!(error = %core, "Hardware error surfaced at the API");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "HARDWARE_ERROR",
                        core.to_string(),
                    )
                }
                CoreError::Config(msg) => {
                    tracing::error!(error = %msg, "Configuration error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Storage errors ---
            AppError::Storage(storage) => match storage {
                StorageError::DuplicateCommand { .. } => unreachable!("handled above"),
                StorageError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", storage.to_string())
                }
                StorageError::CommandNotClaimable { .. } => {
                    (StatusCode::CONFLICT, "NOT_CLAIMABLE", storage.to_string())
                }
                StorageError::VersionConflict { .. } => {
                    (StatusCode::CONFLICT, "STALE_VERSION", storage.to_string())
                }
                other => {
                    tracing::error!(error = %other, "Storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let err = AppError::Core(CoreError::validation("locker id out of range"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_duplicate_maps_to_409() {
        let err = AppError::Storage(StorageError::DuplicateCommand {
            existing_id: "abc".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_zone_config_maps_to_422() {
        let err = AppError::Core(CoreError::ZoneConfig("overlap".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = AppError::Core(CoreError::not_found("locker", "7"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
