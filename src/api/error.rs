// Maps `EngineError` to an HTTP status and the `{error_code, message}` body
// every handler returns on failure (spec §7 "each failed item/request
// carries error_code + error_message").

use crate::error::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub struct ApiError(pub EngineError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error_code: &'static str,
    message: String,
}

fn status_for(err: &EngineError) -> StatusCode {
    use EngineError::*;
    match err {
        LibraryNotFound(_) | ItemNotFound(_) | JobNotFound(_) | PersonNotFound(_) | FaceNotFound(_)
        | FileNotFound(_) | NotFound(_) => StatusCode::NOT_FOUND,
        InvalidPath(_) => StatusCode::BAD_REQUEST,
        AuthInvalid => StatusCode::UNAUTHORIZED,
        OriginRejected(_) => StatusCode::FORBIDDEN,
        Cancelled => StatusCode::CONFLICT,
        LockContention => StatusCode::SERVICE_UNAVAILABLE,
        DependencyMissing(_) | ModelMissing(_) | OfflineBlocked(_) => StatusCode::SERVICE_UNAVAILABLE,
        AlreadyRunning | ConflictingEngine | EngineStartupTimeout => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "unhandled request error");
        }
        let body = ErrorBody {
            error_code: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
