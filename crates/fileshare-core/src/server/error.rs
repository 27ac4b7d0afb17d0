use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;

use crate::catalog::CatalogError;
use crate::server::storage::StorageError;

/// HTTP 层错误，响应体为纯文本
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("File not found")]
    NotFound,

    #[error("Upload exceeds the size limit")]
    PayloadTooLarge,

    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(cause) = &self {
            error!("Request failed: {}", cause);
        }
        (self.status_code(), self.to_string()).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::EmptyName => ApiError::BadRequest("No file selected".to_string()),
            StorageError::Escapes(name) => {
                ApiError::BadRequest(format!("Invalid filename: {name}"))
            }
            StorageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ApiError::NotFound
            }
            StorageError::Io(io) => ApiError::Internal(io.to_string()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        ApiError::Internal(format!("catalog: {e}"))
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(e.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        assert_eq!(
            ApiError::from(StorageError::EmptyName).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StorageError::Escapes("../x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(
            ApiError::from(StorageError::Io(missing)).status_code(),
            StatusCode::NOT_FOUND
        );
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(
            ApiError::from(StorageError::Io(denied)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_hides_cause() {
        let err = ApiError::Internal("disk on fire".into());
        assert_eq!(err.to_string(), "Internal server error");
    }
}
