//! HTTP facade: the only network-facing surface the daemon exposes,
//! backed by axum instead of a hand-rolled socket parser.

mod error;
mod handlers;
mod middleware;
mod state;

pub use state::ApiState;

use axum::routing::get;
use axum::Router;
use middleware::{build_rate_limiter, rate_limit, require_bearer_token};
use reward_types::RewardResult;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: ApiState) -> Router {
    let limiter = build_rate_limiter(state.config.requests_per_minute);

    let protected = Router::new()
        .route("/users", axum::routing::post(handlers::create_user))
        .route("/users/:address", get(handlers::get_user))
        .route("/positions/register/bulk", axum::routing::post(handlers::register_positions_bulk))
        .route("/positions/eligible/:address", get(handlers::eligible_positions))
        .route("/positions/user/:user_id", get(handlers::positions_for_user))
        .route("/rewards/user/:user_id", get(handlers::rewards_for_user))
        .route("/rewards/user/:user_id/stats", get(handlers::reward_stats))
        .route("/rewards/user/:user_id/claimable", get(handlers::claimable_for_user))
        .route("/rewards/claim/:user_id", axum::routing::post(handlers::claim_rewards))
        .route("/rewards/program-analytics", get(handlers::program_analytics))
        .route("/trading-fees/pool-apr", get(handlers::pool_apr))
        .route("/position-lifecycle/status", get(handlers::lifecycle_status))
        .route("/position-lifecycle/check-user/:address", axum::routing::post(handlers::check_user))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .route_layer(axum::middleware::from_fn_with_state(limiter, rate_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

pub async fn serve(state: ApiState, bind_addr: &str) -> RewardResult<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| reward_types::RewardError::Config(format!("invalid api.bind_addr: {e}")))?;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| reward_types::RewardError::Internal(format!("binding {addr}: {e}")))?;
    tracing::info!(%addr, "HTTP facade listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| reward_types::RewardError::Internal(e.to_string()))
}
