use crate::services::ServiceError;
use crate::utils::multipart::MultipartError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn status_and_message(self) -> (StatusCode, String, Option<&'static str>) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg, None),
            AppError::Service(e) => {
                let kind = Some(e.kind());
                match e {
                    ServiceError::MalformedRequest(msg) => (StatusCode::BAD_REQUEST, msg, kind),
                    ServiceError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, kind),
                    other => {
                        tracing::error!("❌ {} ({})", other, other.kind());
                        (StatusCode::INTERNAL_SERVER_ERROR, other.to_string(), kind)
                    }
                }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, kind) = self.status_and_message();

        let body = match kind {
            Some(kind) => json!({ "ok": false, "error": message, "kind": kind }),
            None => json!({ "ok": false, "error": message }),
        };

        (status, Json(body)).into_response()
    }
}
