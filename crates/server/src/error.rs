use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
    Pipeline(OrchestratorError),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    error: String,
    message: String,
    /// Request field that failed validation
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message, field) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg, None)
            }
            AppError::Pipeline(err) => match err.rejected_field() {
                Some(field) => (
                    StatusCode::BAD_REQUEST,
                    "request_malformed",
                    err.to_string(),
                    Some(field.to_string()),
                ),
                None => {
                    tracing::error!("Pipeline error: {:?}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "pipeline_error",
                        err.to_string(),
                        None,
                    )
                }
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            field,
        });

        (status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Pipeline(err)
    }
}
