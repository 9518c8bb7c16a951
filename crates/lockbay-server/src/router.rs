//! Route table assembly.

use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::routes::{commands, health, kiosks, lockers};
use crate::state::AppState;

/// Build the full application router.
///
/// Everything but `/health` lives under `/api/v1`.
pub fn build_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    let api = Router::new()
        .route("/commands", post(commands::submit))
        .route("/commands/{id}/claim", post(commands::claim))
        .route("/commands/{id}/result", post(commands::result))
        .route("/kiosks", get(kiosks::list))
        .route("/kiosks/heartbeat", post(kiosks::heartbeat))
        .route("/kiosks/{id}", get(kiosks::show))
        .route("/kiosks/{id}/commands", get(commands::pending))
        .route("/kiosks/{id}/recover", post(commands::recover))
        .route(
            "/kiosks/{id}/relay-cards",
            put(kiosks::replace_relay_cards),
        )
        .route(
            "/kiosks/{id}/zones",
            get(kiosks::zones).put(kiosks::replace_zones),
        )
        .route("/kiosks/{id}/lockers", get(lockers::list))
        .route(
            "/kiosks/{id}/lockers/{locker}/reserve",
            post(lockers::reserve),
        )
        .route(
            "/kiosks/{id}/lockers/{locker}/release",
            post(lockers::release),
        );

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
