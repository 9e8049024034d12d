use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::metrics::{
    REQUEST_LATENCY, REQUEST_TOTAL, REQUESTS_REJECTED, REQUESTS_UNAUTHORIZED, TRACKED_CALLERS,
};
use crate::rate_limit::Decision;
use crate::state::AppState;

/// Caller identity resolved from the Authorization header. The raw bearer
/// token doubles as the limiter key.
#[derive(Clone)]
pub struct CallerToken(pub String);

// short digest for log lines - raw tokens never hit the logs
fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token);
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(12);
    digest
}

// Logs every request with its outcome and feeds the request metrics
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let latency = start.elapsed();
    REQUEST_TOTAL.inc();
    REQUEST_LATENCY.observe(latency.as_secs_f64());
    info!(
        environment = %state.environment,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = latency.as_secs_f64() * 1000.0,
        "handler response"
    );
    response
}

// Requires `Authorization: Bearer <token>` and stashes the token in the
// request extensions. Requests without a usable credential are turned away
// here, before the limiter is ever consulted.
pub async fn require_bearer_token(mut req: Request, next: Next) -> Response {
    let Some(header) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        REQUESTS_UNAUTHORIZED.inc();
        return ApiError::missing_access_token("no Authorization header").into_response();
    };

    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") || parts[1].is_empty() {
        REQUESTS_UNAUTHORIZED.inc();
        return ApiError::missing_access_token("malformed bearer credential").into_response();
    }

    let token = parts[1].to_owned();
    req.extensions_mut().insert(CallerToken(token));
    next.run(req).await
}

// Asks the limiter whether this caller may proceed. Rejections become 429
// responses carrying the time left until the window resets.
pub async fn check_limits(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(CallerToken(token)) = req.extensions().get::<CallerToken>().cloned() else {
        return ApiError::internal("caller token missing from request extensions").into_response();
    };

    match state.limiter.admit(&token, Instant::now()) {
        Decision::Allowed => {
            TRACKED_CALLERS.set(state.limiter.tracked_callers() as f64);
            next.run(req).await
        }
        Decision::Rejected { retry_after } => {
            REQUESTS_REJECTED.inc();
            warn!(
                caller = %token_digest(&token),
                retry_ms = retry_after.as_secs_f64() * 1000.0,
                "rate limit exceeded"
            );
            ApiError::too_many_requests(retry_after).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::util::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::handlers::get_users;

    fn test_state(n: u32, m: u64) -> Arc<AppState> {
        let mut config = Config::default();
        config.environment = "test".to_owned();
        config.throttling.n = n;
        config.throttling.m = m;
        Arc::new(AppState::new(&config))
    }

    // protected route wired the way main() wires /v1: auth outside, limits inside
    fn guarded_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/v1/users", get(get_users))
            .layer(axum::middleware::from_fn_with_state(state, check_limits))
            .layer(axum::middleware::from_fn(require_bearer_token))
    }

    fn get_with_token(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/v1/users")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn valid_token_passes_through() {
        let app = guarded_app(test_state(5, 1000));

        let response = app.oneshot(get_with_token("valid-token")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn missing_authorization_header_is_401() {
        let app = guarded_app(test_state(5, 1000));

        let request = Request::builder()
            .uri("/v1/users")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"code": 401, "message": "Missing access token"})
        );
    }

    #[tokio::test]
    async fn malformed_credentials_are_401() {
        for auth in ["Basic dXNlcg==", "Bearer", "Bearer ", "Bearer a b"] {
            let app = guarded_app(test_state(5, 1000));
            let request = Request::builder()
                .uri("/v1/users")
                .header("Authorization", auth)
                .body(Body::empty())
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "auth: {auth:?}");
        }
    }

    #[tokio::test]
    async fn bearer_scheme_is_case_insensitive() {
        let app = guarded_app(test_state(5, 1000));

        let request = Request::builder()
            .uri("/v1/users")
            .header("Authorization", "bearer lowercase-scheme")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn zero_limit_rejects_the_first_request() {
        let app = guarded_app(test_state(0, 1000));

        let response = app.oneshot(get_with_token("any-token")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let body = body_json(response).await;
        assert_eq!(body["code"], 429);
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Too many requests:")
        );
    }

    #[tokio::test]
    async fn rejection_carries_a_retry_after_header() {
        let app = guarded_app(test_state(1, 30_000));

        let first = app.clone().oneshot(get_with_token("patient")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get_with_token("patient")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            second.headers().get("retry-after").unwrap().to_str().unwrap(),
            "30"
        );
    }

    // one request per window admitted, the next one bounced, admitted
    // again after sleeping the window out
    #[tokio::test]
    async fn alternates_between_admit_and_reject_across_windows() {
        let app = guarded_app(test_state(1, 150));
        let expected = [
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::OK,
        ];

        for (i, want) in expected.iter().enumerate() {
            let response = app
                .clone()
                .oneshot(get_with_token("sequenced"))
                .await
                .unwrap();
            assert_eq!(response.status(), *want, "request {}", i + 1);

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }

    #[tokio::test]
    async fn separate_tokens_get_separate_windows() {
        let app = guarded_app(test_state(1, 60_000));

        let first = app.clone().oneshot(get_with_token("token-a")).await.unwrap();
        let second = app.clone().oneshot(get_with_token("token-b")).await.unwrap();
        let third = app.oneshot(get_with_token("token-a")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn token_digest_is_short_and_stable() {
        assert_eq!(token_digest("secret"), token_digest("secret"));
        assert_ne!(token_digest("secret"), token_digest("secret2"));
        assert_eq!(token_digest("secret").len(), 12);
    }
}
