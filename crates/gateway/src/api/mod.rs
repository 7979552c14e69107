pub mod auth;
pub mod health;
pub mod scheduler;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// `/v1/health` is public; everything else is gated behind the
/// `AUTOAPPLY_API_TOKEN` bearer-token middleware (no-op in dev mode, see
/// [`auth::require_api_token`]).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health::health));

    let protected = Router::new()
        .route("/scheduler/settings", get(scheduler::get_settings))
        .route("/scheduler/settings", post(scheduler::update_settings))
        .route("/scheduler/status", get(scheduler::status))
        .route("/scheduler/run", post(scheduler::run_now))
        .route("/scheduler/stop", post(scheduler::stop))
        .route("/scheduler/history", get(scheduler::history))
        .route("/scheduler/run/:id", get(scheduler::get_run))
        .route("/apply/bulk/stream", post(scheduler::apply_bulk_stream))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
