//! Router assembly

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::handlers;
use crate::middleware::{request_id_middleware, RateLimitLayer};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .route("/health/liveness", get(handlers::liveness))
        .route("/health/readiness", get(handlers::readiness))
        .with_state(state.clone());

    if state.settings.rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(
            state.settings.rate_limit.requests_per_minute,
            state.settings.rate_limit.burst_size,
        ));
    }

    // Outermost last: request ids must exist before rate limiting runs
    router
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
