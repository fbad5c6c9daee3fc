// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use clinic_models::auth::{AuthContext, Role};
use clinic_models::error::AppError;
use clinic_store::{SessionFilter, SessionStatus};
use clinic_utils::state::AppState;

use crate::models::{
    CancelSessionRequest, CreateAvailabilityRuleRequest, CreateRescheduleRequest,
    CreateSessionRequest, CreateUnavailabilityRequest, ReviewRescheduleRequest,
    UpdateAvailabilityRuleRequest, UpdateSessionRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::reschedule::RescheduleWorkflowService;
use crate::services::scheduler::SessionSchedulerService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionQueryParams {
    pub patient_id: Option<Uuid>,
    pub therapist_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct OpenSlotsQuery {
    pub therapist_id: Uuid,
    pub therapy_type_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct UnavailabilityQuery {
    pub therapist_id: Uuid,
    pub date: NaiveDate,
}

// ==============================================================================
// SESSION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients may book for themselves; everyone else needs a calendar role.
    if !context.role.can_manage_sessions() && request.patient_id != context.user_id {
        return Err(AppError::Forbidden(
            "Not allowed to book sessions for this patient".to_string(),
        ));
    }

    let scheduler = SessionSchedulerService::new(&state);
    let session = scheduler.create(&context, request).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
        "message": "Session booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn search_sessions(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<SessionQueryParams>,
) -> Result<Json<Value>, AppError> {
    let mut filter = SessionFilter {
        patient_id: params.patient_id,
        therapist_id: params.therapist_id,
        statuses: params.status.map(|status| vec![status]),
        date: params.date,
        from_date: params.from_date,
        to_date: params.to_date,
    };
    // Non-staff only ever see their own calendar.
    match context.role {
        Role::Patient => filter.patient_id = Some(context.user_id),
        Role::Therapist => filter.therapist_id = Some(context.user_id),
        _ => {}
    }

    let scheduler = SessionSchedulerService::new(&state);
    let sessions = scheduler.search(&context, &filter).await?;

    Ok(Json(json!({
        "sessions": sessions,
        "count": sessions.len()
    })))
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let scheduler = SessionSchedulerService::new(&state);
    let session = scheduler.get(&context, session_id).await?;

    let involved =
        session.patient_id == context.user_id || session.therapist_id == context.user_id;
    if !context.role.is_staff() && !involved {
        return Err(AppError::Forbidden(
            "Not allowed to view this session".to_string(),
        ));
    }

    Ok(Json(json!({ "session": session })))
}

#[axum::debug_handler]
pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let scheduler = SessionSchedulerService::new(&state);

    let session = scheduler.get(&context, session_id).await?;
    let is_own_calendar =
        context.role == Role::Therapist && session.therapist_id == context.user_id;
    if !context.role.is_staff() && !is_own_calendar {
        return Err(AppError::Forbidden(
            "Not allowed to modify this session".to_string(),
        ));
    }

    let session = scheduler.update(&context, session_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
        "message": "Session updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CancelSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let scheduler = SessionSchedulerService::new(&state);

    let session = scheduler.get(&context, session_id).await?;
    let involved =
        session.patient_id == context.user_id || session.therapist_id == context.user_id;
    if !context.role.is_staff() && !involved {
        return Err(AppError::Forbidden(
            "Not allowed to cancel this session".to_string(),
        ));
    }

    let outcome = scheduler.cancel(&context, session_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "session": outcome.session,
        "reversal": outcome.reversal,
        "message": "Session cancelled successfully"
    })))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_availability_rule(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateAvailabilityRuleRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_manage_availability() {
        return Err(AppError::Forbidden(
            "Only therapists and staff can manage availability".to_string(),
        ));
    }

    let availability = AvailabilityService::new(&state);
    let rule = availability.create_rule(&context, request).await?;

    Ok(Json(json!({
        "success": true,
        "rule": rule,
        "message": "Availability rule created successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_therapist_rules(
    State(state): State<Arc<AppState>>,
    Path(therapist_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let rules = availability.list_rules(&context, therapist_id).await?;

    Ok(Json(json!({
        "rules": rules,
        "count": rules.len()
    })))
}

#[axum::debug_handler]
pub async fn update_availability_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<UpdateAvailabilityRuleRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_manage_availability() {
        return Err(AppError::Forbidden(
            "Only therapists and staff can manage availability".to_string(),
        ));
    }

    let availability = AvailabilityService::new(&state);
    let rule = availability.update_rule(&context, rule_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "rule": rule,
        "message": "Availability rule updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn deactivate_availability_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_manage_availability() {
        return Err(AppError::Forbidden(
            "Only therapists and staff can manage availability".to_string(),
        ));
    }

    let availability = AvailabilityService::new(&state);
    let rule = availability.deactivate_rule(&context, rule_id).await?;

    Ok(Json(json!({
        "success": true,
        "rule": rule,
        "message": "Availability rule deactivated"
    })))
}

#[axum::debug_handler]
pub async fn create_unavailability(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateUnavailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_manage_availability() {
        return Err(AppError::Forbidden(
            "Only therapists and staff can manage availability".to_string(),
        ));
    }

    let availability = AvailabilityService::new(&state);
    let period = availability.create_period(&context, request).await?;

    Ok(Json(json!({
        "success": true,
        "period": period,
        "message": "Unavailability recorded successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_unavailability(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<UnavailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let periods = availability
        .list_periods(&context, params.therapist_id, params.date)
        .await?;

    Ok(Json(json!({
        "periods": periods,
        "count": periods.len()
    })))
}

#[axum::debug_handler]
pub async fn find_open_slots(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Query(params): Query<OpenSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let availability = AvailabilityService::new(&state);
    let slots = availability
        .find_open_slots(&context, params.therapist_id, params.therapy_type_id, params.date)
        .await?;

    Ok(Json(json!({
        "slots": slots,
        "count": slots.len()
    })))
}

// ==============================================================================
// RESCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_reschedule(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<CreateRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    if context.role != Role::Therapist {
        return Err(AppError::Forbidden(
            "Only therapists can request reschedules".to_string(),
        ));
    }

    let workflow = RescheduleWorkflowService::new(&state);
    let reschedule = workflow.create(&context, request).await?;

    Ok(Json(json!({
        "success": true,
        "request": reschedule,
        "message": "Reschedule request filed successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_session_reschedules(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let workflow = RescheduleWorkflowService::new(&state);
    let requests = workflow.list_for_session(&context, session_id).await?;

    Ok(Json(json!({
        "requests": requests,
        "count": requests.len()
    })))
}

#[axum::debug_handler]
pub async fn approve_reschedule(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(review): Json<ReviewRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_review_reschedules() {
        return Err(AppError::Forbidden(
            "Only operators and admins can review reschedule requests".to_string(),
        ));
    }

    let workflow = RescheduleWorkflowService::new(&state);
    let reschedule = workflow.approve(&context, request_id, review).await?;

    Ok(Json(json!({
        "success": true,
        "request": reschedule,
        "message": "Reschedule request approved"
    })))
}

#[axum::debug_handler]
pub async fn reject_reschedule(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
    Json(review): Json<ReviewRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    if !context.role.can_review_reschedules() {
        return Err(AppError::Forbidden(
            "Only operators and admins can review reschedule requests".to_string(),
        ));
    }

    let workflow = RescheduleWorkflowService::new(&state);
    let reschedule = workflow.reject(&context, request_id, review).await?;

    Ok(Json(json!({
        "success": true,
        "request": reschedule,
        "message": "Reschedule request rejected"
    })))
}

#[axum::debug_handler]
pub async fn cancel_reschedule(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
    Extension(context): Extension<AuthContext>,
) -> Result<Json<Value>, AppError> {
    let workflow = RescheduleWorkflowService::new(&state);
    let reschedule = workflow.cancel(&context, request_id).await?;

    Ok(Json(json!({
        "success": true,
        "request": reschedule,
        "message": "Reschedule request withdrawn"
    })))
}
