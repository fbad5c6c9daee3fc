use std::sync::Arc;

use axum::{routing::get, Router};

use billing_cell::router::billing_routes;
use clinic_utils::state::AppState;
use scheduling_cell::router::scheduling_routes;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .merge(scheduling_routes(state.clone()))
        .merge(billing_routes(state))
}
