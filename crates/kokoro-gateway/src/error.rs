use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kokoro_core::error::KokoroError;
use kokoro_queue::QueueError;
use serde_json::json;
use tracing::error;

/// Error returned by every API handler. Renders as `{"error", "code"}`.
#[derive(Debug)]
pub struct ApiError(pub KokoroError);

impl ApiError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self(KokoroError::AuthFailed(reason.into()))
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self(KokoroError::Validation(reason.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            KokoroError::Validation(_) | KokoroError::Serialization(_) => StatusCode::BAD_REQUEST,
            KokoroError::NotFound { .. } => StatusCode::NOT_FOUND,
            KokoroError::Conflict(_) => StatusCode::CONFLICT,
            KokoroError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl<E: Into<KokoroError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

/// Queue failures surface as 500 through the generic arm.
pub fn queue_error(e: QueueError) -> ApiError {
    ApiError(KokoroError::QueueUnavailable(e.to_string()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }
        (
            status,
            Json(json!({ "error": self.0.to_string(), "code": self.0.code() })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kokoro_reminders::ReminderError;

    #[test]
    fn statuses_follow_the_error_kind() {
        let cases = [
            (ApiError::bad_request("x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (
                ApiError::from(ReminderError::NotFound { id: "r".into() }),
                StatusCode::NOT_FOUND,
            ),
            (
                queue_error(QueueError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status);
        }
    }
}
