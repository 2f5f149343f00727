//! Route table.

mod flags;

use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/flags", post(flags::create_flag))
        .route(
            "/flags/{id}",
            get(flags::get_flag).patch(flags::update_flag),
        )
        .route("/flags/{id}/logs", get(flags::flag_logs));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
