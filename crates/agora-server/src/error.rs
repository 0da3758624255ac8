use std::future::Future;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use agora_store::StoreError;

/// The error taxonomy every handler speaks.
///
/// Each variant maps to one stable machine-checkable `category` string;
/// clients branch on the category, never on the message text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: storage call exceeded its deadline")]
    ServiceTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "authentication_required",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Conflict(_) => "conflict",
            Self::ServiceTimeout => "service_timeout",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Internal details stay in the logs.
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
            "category": self.category(),
        });

        (self.status_code(), axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound("record not found".into()),
            StoreError::AlreadyExists => ApiError::Conflict("record already exists".into()),
            StoreError::StateConflict => {
                ApiError::Conflict("record changed concurrently, retry".into())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Run a store (or collaborator) call under the configured deadline.
///
/// An elapsed deadline surfaces as [`ApiError::ServiceTimeout`] so the
/// caller gets a deterministic unavailable error instead of hanging.
pub async fn bounded<T, F>(deadline: Duration, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = agora_store::Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::ServiceTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_stable() {
        assert_eq!(ApiError::AuthenticationRequired.category(), "authentication_required");
        assert_eq!(ApiError::PermissionDenied("x".into()).category(), "permission_denied");
        assert_eq!(ApiError::NotFound("x".into()).category(), "not_found");
        assert_eq!(ApiError::ServiceTimeout.category(), "service_timeout");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::PermissionDenied("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::ServiceTimeout.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn bounded_converts_hang_to_timeout() {
        let result: Result<(), ApiError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ApiError::ServiceTimeout)));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let result = bounded(Duration::from_secs(1), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);

        let result: Result<(), ApiError> =
            bounded(Duration::from_secs(1), async { Err(StoreError::NotFound) }).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
