//! API error types with structured JSON responses.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::inference::ModelError;
use crate::pipeline::ingest::IngestError;
use crate::pipeline::ollama::OllamaError;

/// Error body returned on every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(detail) => tracing::error!(detail, "API internal error"),
            ApiError::ModelUnavailable(detail) => tracing::error!(detail, "Model unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        if err.is_validation() {
            ApiError::Validation(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::InvalidImage | ExtractionError::ImageTooLarge(_) => {
                ApiError::Validation(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        match &err {
            ModelError::Ollama(OllamaError::NotReachable(_))
            | ModelError::Ollama(OllamaError::ModelNotFound(_))
            | ModelError::ModelNotFound(_) => ApiError::ModelUnavailable(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::Validation(err.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Worker task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_returns_400_with_message() {
        let response = ApiError::Validation("patient_note cannot be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "patient_note cannot be empty");
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn internal_returns_500_and_exposes_message() {
        let response = ApiError::Internal("disk full".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "disk full");
        assert_eq!(json["code"], "INTERNAL");
    }

    #[tokio::test]
    async fn model_unavailable_returns_503() {
        let response = ApiError::ModelUnavailable("ocr".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["code"], "MODEL_UNAVAILABLE");
    }

    #[test]
    fn ingest_validation_maps_to_400() {
        let err: ApiError = IngestError::NothingProvided.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "At least one of patient_note, patient_json_text, or images must be provided"
        );
    }

    #[test]
    fn ingest_storage_maps_to_500() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ApiError = IngestError::Storage(io).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_image_maps_to_400() {
        let err: ApiError = ExtractionError::InvalidImage.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid image format");
    }

    #[test]
    fn oversized_image_maps_to_400() {
        let err: ApiError = ExtractionError::ImageTooLarge("20000x1".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Image too large: 20000x1");
    }

    #[test]
    fn ocr_failure_maps_to_500() {
        let err: ApiError = ExtractionError::OcrProcessing("boom".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unreachable_backend_maps_to_503() {
        let err: ApiError =
            ModelError::Ollama(OllamaError::NotReachable("http://x".into())).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        let err: ApiError = ModelError::Classification("nan".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
