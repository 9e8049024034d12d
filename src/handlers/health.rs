use axum::Json;
use axum::response::IntoResponse;

// health handler - open endpoint, no auth and no throttling
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
