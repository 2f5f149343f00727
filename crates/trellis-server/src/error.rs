//! HTTP error responses.
//!
//! Every failure leaves the server as `{"error": <code>, "message": <detail>}`
//! with a status derived from the engine's [`ErrorKind`].

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use trellis::ErrorKind;

/// Error returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] trellis::Error),

    /// The request body could not be decoded.
    #[error("invalid request body: {0}")]
    Body(#[from] JsonRejection),

    /// A path parameter could not be decoded.
    #[error("invalid path parameter: {0}")]
    Path(#[from] PathRejection),

    /// The query string could not be decoded.
    #[error("invalid query string: {0}")]
    Query(#[from] QueryRejection),
}

/// Result type for route handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Short machine-readable code.
    pub error: &'static str,

    /// Human-readable detail.
    pub message: String,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(err) => match err.kind() {
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::ValidationFailed | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::Store | ErrorKind::Audit | ErrorKind::Config => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Body(_) | Self::Path(_) | Self::Query(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short code placed in the `error` field.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(trellis::Error::DependenciesNotFound(_)) => "dependency_not_found",
            Self::Engine(err) => match err.kind() {
                ErrorKind::Conflict => "name_conflict",
                ErrorKind::NotFound => "flag_not_found",
                ErrorKind::ValidationFailed => "dependency_validation_failed",
                ErrorKind::InvalidInput => "invalid_input",
                ErrorKind::Store | ErrorKind::Audit | ErrorKind::Config => "internal_error",
            },
            Self::Body(_) | Self::Path(_) | Self::Query(_) => "invalid_input",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use trellis::domain::FlagId;
    use trellis::error::StoreError;

    #[rstest]
    #[case::conflict(trellis::Error::NameConflict("x".into()), StatusCode::CONFLICT)]
    #[case::not_found(trellis::Error::FlagNotFound(FlagId(1)), StatusCode::NOT_FOUND)]
    #[case::inactive(
        trellis::Error::InactiveDependencies { inactive: vec![FlagId(2)] },
        StatusCode::BAD_REQUEST
    )]
    #[case::missing(trellis::Error::DependenciesNotFound(vec![FlagId(3)]), StatusCode::NOT_FOUND)]
    #[case::reason(trellis::Error::InvalidReason("empty".into()), StatusCode::BAD_REQUEST)]
    #[case::store(
        trellis::Error::Store(StoreError::Backend("down".into())),
        StatusCode::INTERNAL_SERVER_ERROR
    )]
    fn engine_errors_map_to_status(#[case] err: trellis::Error, #[case] expected: StatusCode) {
        assert_eq!(ApiError::from(err).status(), expected);
    }
}
