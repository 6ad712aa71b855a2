//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use nudge_domain::error::NudgeError;

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`NudgeError`] to an HTTP response with an appropriate status code.
#[derive(Debug)]
pub struct ApiError(NudgeError);

impl From<NudgeError> for ApiError {
    fn from(err: NudgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            NudgeError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            NudgeError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            NudgeError::Plugin(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            NudgeError::ChannelClosed(task) => {
                tracing::error!(task, "engine task unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "engine unavailable".to_string(),
                )
            }
            NudgeError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use nudge_domain::error::{NotFoundError, ValidationError};

    use super::*;

    #[test]
    fn should_map_not_found_to_404() {
        let response = ApiError::from(NudgeError::from(NotFoundError {
            entity: "Pack",
            id: "ghost".to_string(),
        }))
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn should_map_validation_to_400() {
        let response =
            ApiError::from(NudgeError::from(ValidationError::EmptyPackId)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn should_map_closed_engine_to_503() {
        let response = ApiError::from(NudgeError::ChannelClosed("director")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
