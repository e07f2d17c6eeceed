use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{ErrorBody, JobError, ValidationError};
use tracing::error;

/// Error de los handlers HTTP. Los errores internos se registran completos
/// y al cliente sólo le llega un mensaje genérico.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(m) => {
                error!("error interno: {}", m);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Validation(v) => v.into(),
            JobError::NotFound(_) => ApiError::NotFound("Task not found".to_string()),
            JobError::InvalidState { .. } => {
                ApiError::BadRequest("Generation not completed".to_string())
            }
            JobError::ArtifactMissing { .. } => {
                ApiError::NotFound("Generated file not found on disk".to_string())
            }
            other @ (JobError::Generation(_) | JobError::Io(_)) => {
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        ApiError::BadRequest(format!("invalid multipart body: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TaskStatus;
    use std::path::PathBuf;

    fn status_of(e: JobError) -> StatusCode {
        ApiError::from(e).into_response().status()
    }

    #[test]
    fn mapea_errores_de_tarea_a_codigos_http() {
        assert_eq!(
            status_of(JobError::NotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(JobError::InvalidState {
                id: "x".to_string(),
                status: TaskStatus::Processing,
                expected: TaskStatus::Completed,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(JobError::ArtifactMissing {
                path: PathBuf::from("/app/output/x/a.wav"),
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ValidationError::UnsupportedAudioLength(100).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(JobError::Io(std::io::Error::other("disco lleno"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
