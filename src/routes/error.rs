use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GenerationError;
use crate::storage::StorageError;

/// JSON error response: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "detail": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidFileName(_) => ApiError::bad_request(err.to_string()),
            StorageError::Io(e) => ApiError::internal_error(format!("Storage error: {}", e)),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidRequest(_)
            | GenerationError::UnsupportedFormat(_)
            | GenerationError::DataLoad(_)
            | GenerationError::FieldMissing { .. } => ApiError::bad_request(err.to_string()),
            GenerationError::TemplateNotFound(_) => ApiError::not_found(err.to_string()),
            GenerationError::Storage(e) => ApiError::from(e),
            GenerationError::Render { .. } | GenerationError::Archive(_) => {
                ApiError::internal_error(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;

    #[test]
    fn test_generation_error_status_codes() {
        let cases = [
            (GenerationError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (GenerationError::UnsupportedFormat("a.gif".into()), StatusCode::BAD_REQUEST),
            (
                GenerationError::FieldMissing {
                    row: 1,
                    field: "nombre".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (GenerationError::TemplateNotFound("a.png".into()), StatusCode::NOT_FOUND),
            (
                GenerationError::Render {
                    name: "Ana".into(),
                    source: RenderError::EmptyDocument,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (GenerationError::Archive("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                GenerationError::Storage(StorageError::InvalidFileName("../x".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn test_response_body_carries_detail() {
        let response = ApiError::not_found("Template not found: a.png").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "detail": "Template not found: a.png" }));
    }
}
