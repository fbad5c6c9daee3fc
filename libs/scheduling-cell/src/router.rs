// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use clinic_utils::extractor::auth_middleware;
use clinic_utils::state::AppState;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppState>) -> Router {
    // All scheduling operations require authentication
    let protected_routes = Router::new()
        // Sessions
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/search", get(handlers::search_sessions))
        .route(
            "/sessions/{session_id}",
            get(handlers::get_session).put(handlers::update_session),
        )
        .route("/sessions/{session_id}/cancel", post(handlers::cancel_session))
        // Availability
        .route("/availability", post(handlers::create_availability_rule))
        .route(
            "/availability/therapists/{therapist_id}",
            get(handlers::list_therapist_rules),
        )
        .route("/availability/slots", get(handlers::find_open_slots))
        .route(
            "/availability/unavailability",
            post(handlers::create_unavailability).get(handlers::list_unavailability),
        )
        .route(
            "/availability/{rule_id}",
            put(handlers::update_availability_rule).delete(handlers::deactivate_availability_rule),
        )
        // Reschedules
        .route("/reschedules", post(handlers::create_reschedule))
        .route(
            "/reschedules/sessions/{session_id}",
            get(handlers::list_session_reschedules),
        )
        .route(
            "/reschedules/{request_id}/approve",
            post(handlers::approve_reschedule),
        )
        .route(
            "/reschedules/{request_id}/reject",
            post(handlers::reject_reschedule),
        )
        .route(
            "/reschedules/{request_id}/cancel",
            post(handlers::cancel_reschedule),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
