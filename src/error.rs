use std::time::Duration;

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Error envelope written to clients as `{"code":...,"message":"..."}`.
/// `detail` only ever goes to the logs.
#[derive(Debug, Clone, Serialize, Error)]
#[error("code: {code} message: {message}")]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    #[serde(skip)]
    detail: Option<String>,
    #[serde(skip)]
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn missing_access_token(detail: impl Into<String>) -> Self {
        Self {
            code: StatusCode::UNAUTHORIZED.as_u16(),
            message: "Missing access token".to_owned(),
            detail: Some(detail.into()),
            retry_after: None,
        }
    }

    /// Rejection is backpressure, not a fault; the wait hint rides along in
    /// the message and in a Retry-After header.
    pub fn too_many_requests(retry_after: Duration) -> Self {
        Self {
            code: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: format!(
                "Too many requests: {:.2}ms left until reset",
                retry_after.as_secs_f64() * 1000.0
            ),
            detail: None,
            retry_after: Some(retry_after),
        }
    }

    pub fn not_found(uri: impl std::fmt::Display) -> Self {
        Self {
            code: StatusCode::NOT_FOUND.as_u16(),
            message: format!("{uri} not found"),
            detail: None,
            retry_after: None,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "Something went wrong :(".to_owned(),
            detail: Some(detail.into()),
            retry_after: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                code = self.code,
                detail = self.detail.as_deref().unwrap_or(""),
                "{}",
                self.message
            );
        } else {
            tracing::warn!(
                code = self.code,
                detail = self.detail.as_deref().unwrap_or(""),
                "{}",
                self.message
            );
        }

        let retry_after = self.retry_after;
        let mut response = (status, Json(&self)).into_response();
        if let Some(wait) = retry_after {
            let secs = wait.as_secs_f64().ceil() as u64;
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
