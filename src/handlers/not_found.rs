use axum::http::Uri;

use crate::error::ApiError;

// fallback for unmatched routes
pub async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError::not_found(uri)
}
