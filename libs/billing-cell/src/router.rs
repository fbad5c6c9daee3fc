// libs/billing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use clinic_utils::extractor::auth_middleware;
use clinic_utils::state::AppState;

use crate::handlers;

pub fn billing_routes(state: Arc<AppState>) -> Router {
    // All billing operations require authentication
    let protected_routes = Router::new()
        .route("/invoices", post(handlers::create_invoice))
        .route("/invoices/{invoice_id}", get(handlers::get_invoice))
        .route(
            "/invoices/patients/{patient_id}",
            get(handlers::list_patient_invoices),
        )
        .route("/payments", post(handlers::record_payment))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new().merge(protected_routes).with_state(state)
}
