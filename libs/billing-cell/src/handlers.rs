// libs/billing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use clinic_models::auth::{AuthContext, Role};
use clinic_models::error::AppError;
use clinic_utils::state::AppState;

use crate::models::{CreateInvoiceRequest, RecordPaymentRequest};
use crate::services::ledger::InvoiceLedgerService;

// ==============================================================================
// INVOICE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_invoice(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_manage_billing() {
        return Err(AppError::Forbidden(
            "Only operators and admins can create invoices".to_string(),
        ));
    }

    let ledger = InvoiceLedgerService::new(&state);
    let outcome = ledger.create_invoice(&context, request).await?;

    Ok(Json(json!({
        "success": true,
        "invoice": outcome.invoice,
        "line_items": outcome.line_items,
        "patient_balances": outcome.patient_balances,
        "message": "Invoice created successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let ledger = InvoiceLedgerService::new(&state);
    let detail = ledger.get_invoice(&context, invoice_id).await?;

    // Staff see everything; a patient only their own invoices.
    let is_owning_patient =
        context.role == Role::Patient && detail.invoice.patient_id == context.user_id;
    if !context.role.can_manage_billing() && !is_owning_patient {
        return Err(AppError::Forbidden(
            "Not allowed to view this invoice".to_string(),
        ));
    }

    Ok(Json(json!({
        "invoice": detail.invoice,
        "line_items": detail.line_items
    })))
}

#[axum::debug_handler]
pub async fn list_patient_invoices(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let is_self = context.role == Role::Patient && patient_id == context.user_id;
    if !context.role.can_manage_billing() && !is_self {
        return Err(AppError::Forbidden(
            "Not allowed to view this patient's invoices".to_string(),
        ));
    }

    let ledger = InvoiceLedgerService::new(&state);
    let invoices = ledger.list_invoices_for_patient(&context, patient_id).await?;

    Ok(Json(json!({
        "invoices": invoices,
        "count": invoices.len()
    })))
}

// ==============================================================================
// PAYMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_manage_billing() {
        return Err(AppError::Forbidden(
            "Only operators and admins can record payments".to_string(),
        ));
    }

    let ledger = InvoiceLedgerService::new(&state);
    let outcome = ledger.record_payment(&context, request).await?;

    Ok(Json(json!({
        "success": true,
        "payment": outcome.payment,
        "patient_balances": outcome.patient_balances,
        "message": "Payment recorded successfully"
    })))
}
