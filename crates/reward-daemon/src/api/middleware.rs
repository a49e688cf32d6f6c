//! Bearer-token auth and a global QPS limiter in front of every route.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use governor::{Quota, RateLimiter};
use governor::state::{InMemoryState, NotKeyed};
use governor::clock::DefaultClock;
use std::num::NonZeroU32;
use std::sync::Arc;

use super::state::ApiState;

pub type ApiRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub fn build_rate_limiter(requests_per_minute: u32) -> Arc<ApiRateLimiter> {
    let per_minute = NonZeroU32::new(requests_per_minute.max(1)).unwrap();
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

pub async fn require_bearer_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.bearer_token.as_ref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if reward_crypto::constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            Ok(next.run(request).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<ApiRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if limiter.check().is_err() {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(request).await)
}
