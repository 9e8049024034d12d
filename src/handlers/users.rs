use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct User {
    pub id: u64,
    pub email: String,
}

// GET /v1/users - the resource the throttle protects. User records live in
// a backing store this service does not own yet, so the collection is empty.
pub async fn get_users() -> Json<Vec<User>> {
    Json(Vec::new())
}
