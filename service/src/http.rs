//! HTTP error envelope for the catalog listings.
//!
//! Handlers return `Result<Json<T>, ApiError>`; any [`CatalogError`] converts
//! with `?` into a `{ "status": <TAG>, "message": <text> }` body carrying the
//! matching status code.

use crate::catalog::CatalogError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// Error returned by catalog handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    status: StatusCode,
    /// Machine-readable tag
    tag: &'static str,
    /// Human-readable message
    message: String,
}

impl ApiError {
    /// Create an error with an explicit status and tag.
    #[must_use]
    pub const fn new(status: StatusCode, tag: &'static str, message: String) -> Self {
        Self {
            status,
            tag,
            message,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Envelope tag.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        self.tag
    }

    /// Envelope message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let (status, tag) = match &e {
            CatalogError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CatalogError::InvalidPage { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            CatalogError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR")
            }
            CatalogError::Timeout => (StatusCode::REQUEST_TIMEOUT, "TIMEOUT"),
        };
        Self::new(status, tag, e.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tag, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    status: &'a str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, tag = self.tag, message = %self.message, "Internal server error");
        }

        let body = Json(Envelope {
            status: self.tag,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_found_maps_to_404_envelope() {
        let (status, body) = body_json(CatalogError::NotFound("show with id 'X' is not found".into()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "NOT_FOUND");
        assert_eq!(body["message"], "show with id 'X' is not found");
    }

    #[tokio::test]
    async fn invalid_page_maps_to_400() {
        let (status, body) = body_json(CatalogError::InvalidPage { page: 0, size: 10 }.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn infrastructure_maps_to_500() {
        let (status, body) = body_json(CatalogError::Infrastructure("pool closed".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "INTERNAL_SERVER_ERROR");
        assert_eq!(body["message"], "catalog read failed: pool closed");
    }

    #[test]
    fn timeout_maps_to_408() {
        let error = ApiError::from(CatalogError::Timeout);
        assert_eq!(error.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(error.tag(), "TIMEOUT");
        assert_eq!(error.to_string(), "[TIMEOUT] catalog read timed out");
    }
}
