// libs/scheduling-cell/src/services/reschedule.rs
use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use clinic_models::auth::AuthContext;
use clinic_store::{
    AuditEvent, AuditSink, ClinicStore, RescheduleRequest, RescheduleStatus, Session,
    SessionStatus,
};
use clinic_utils::clock::Clock;
use clinic_utils::state::AppState;

use crate::models::{CreateRescheduleRequest, ReviewRescheduleRequest, SchedulingError};
use crate::services::scheduler::SessionSchedulerService;
use crate::timewindow::{minutes_since_midnight, time_from_minutes, TimeWindow};

/// Minimum lead time, in hours, between filing a reschedule request and
/// the session's start. A session exactly this far away still qualifies.
pub const RESCHEDULE_NOTICE_HOURS: i64 = 48;

/// Therapist-initiated reschedules. The therapist files a request against
/// their own upcoming session; staff approve or reject it. Approval moves
/// the session in the same transaction that closes the request, and the
/// reviewer's judgement replaces the availability and conflict checks.
pub struct RescheduleWorkflowService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    scheduler: SessionSchedulerService,
}

impl RescheduleWorkflowService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            audit: Arc::clone(&state.audit),
            scheduler: SessionSchedulerService::new(state),
        }
    }

    /// File a reschedule request for a scheduled session.
    pub async fn create(
        &self,
        context: &AuthContext,
        request: CreateRescheduleRequest,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        // **Step 1: Only the session's own therapist may file, and only
        // while the session is still scheduled**
        let session = tx
            .get_session(tenant, request.session_id)
            .await?
            .ok_or(SchedulingError::SessionNotFound)?;
        if session.status != SessionStatus::Scheduled {
            return Err(SchedulingError::SessionLocked);
        }
        if session.therapist_id != context.user_id {
            return Err(SchedulingError::Forbidden(
                "Only the session's own therapist can request a reschedule".into(),
            ));
        }

        // **Step 2: Enforce the notice period against the current start**
        let lead = session.starts_at() - self.clock.now();
        if lead < Duration::hours(RESCHEDULE_NOTICE_HOURS) {
            warn!(
                "Reschedule for session {} filed {}h before start, need {}h",
                session.id,
                lead.num_hours(),
                RESCHEDULE_NOTICE_HOURS
            );
            return Err(SchedulingError::TooLateToReschedule(RESCHEDULE_NOTICE_HOURS));
        }

        // **Step 3: One open request per session**
        if tx
            .find_pending_reschedule(tenant, session.id)
            .await?
            .is_some()
        {
            return Err(SchedulingError::PendingRequestExists);
        }

        // **Step 4: Validate the requested slot and persist**
        let requested_end = match request.requested_end_time {
            Some(end) => end,
            None => preserve_duration(&session, request.requested_start_time)?,
        };
        TimeWindow::from_times(request.requested_start_time, requested_end)?;

        let now = self.clock.now();
        let reschedule = RescheduleRequest {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            session_id: session.id,
            therapist_id: session.therapist_id,
            requested_date: request.requested_date,
            requested_start_time: request.requested_start_time,
            requested_end_time: requested_end,
            reason: request.reason,
            status: RescheduleStatus::Pending,
            reviewed_by: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_reschedule_request(tenant, reschedule.clone())
            .await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "reschedule.create",
                "reschedule_request",
                reschedule.id,
                json!({
                    "session_id": reschedule.session_id,
                    "requested_date": reschedule.requested_date,
                    "requested_start_time": reschedule.requested_start_time,
                    "requested_end_time": reschedule.requested_end_time,
                    "reason": reschedule.reason,
                }),
            ))
            .await;

        info!(
            "Reschedule {} filed for session {} -> {} {}-{}",
            reschedule.id,
            reschedule.session_id,
            reschedule.requested_date,
            reschedule.requested_start_time,
            reschedule.requested_end_time
        );
        Ok(reschedule)
    }

    /// Approve a pending request: move the session to the requested slot
    /// and close the request, atomically.
    pub async fn approve(
        &self,
        context: &AuthContext,
        request_id: Uuid,
        review: ReviewRescheduleRequest,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut reschedule = tx
            .get_reschedule_request(tenant, request_id)
            .await?
            .ok_or(SchedulingError::RequestNotFound)?;
        if reschedule.status != RescheduleStatus::Pending {
            return Err(SchedulingError::RequestNotPending);
        }

        // **Step 1: Move the session inside our transaction**
        self.scheduler
            .apply_approved_reschedule(
                tx.as_mut(),
                tenant,
                reschedule.session_id,
                reschedule.requested_date,
                reschedule.requested_start_time,
                reschedule.requested_end_time,
            )
            .await?;

        // **Step 2: Close the request with the reviewer's verdict**
        reschedule.status = RescheduleStatus::Approved;
        reschedule.reviewed_by = Some(context.user_id);
        reschedule.review_notes = review.notes;
        reschedule.updated_at = self.clock.now();
        tx.update_reschedule_request(tenant, reschedule.clone())
            .await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "reschedule.approve",
                "reschedule_request",
                reschedule.id,
                json!({
                    "session_id": reschedule.session_id,
                    "requested_date": reschedule.requested_date,
                    "review_notes": reschedule.review_notes,
                }),
            ))
            .await;

        info!(
            "Reschedule {} approved, session {} moved",
            reschedule.id, reschedule.session_id
        );
        Ok(reschedule)
    }

    /// Reject a pending request. The session keeps its current slot.
    pub async fn reject(
        &self,
        context: &AuthContext,
        request_id: Uuid,
        review: ReviewRescheduleRequest,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut reschedule = tx
            .get_reschedule_request(tenant, request_id)
            .await?
            .ok_or(SchedulingError::RequestNotFound)?;
        if reschedule.status != RescheduleStatus::Pending {
            return Err(SchedulingError::RequestNotPending);
        }

        reschedule.status = RescheduleStatus::Rejected;
        reschedule.reviewed_by = Some(context.user_id);
        reschedule.review_notes = review.notes;
        reschedule.updated_at = self.clock.now();
        tx.update_reschedule_request(tenant, reschedule.clone())
            .await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "reschedule.reject",
                "reschedule_request",
                reschedule.id,
                json!({
                    "session_id": reschedule.session_id,
                    "review_notes": reschedule.review_notes,
                }),
            ))
            .await;

        info!("Reschedule {} rejected", reschedule.id);
        Ok(reschedule)
    }

    /// Withdraw a pending request. Only the therapist who filed it may.
    pub async fn cancel(
        &self,
        context: &AuthContext,
        request_id: Uuid,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut reschedule = tx
            .get_reschedule_request(tenant, request_id)
            .await?
            .ok_or(SchedulingError::RequestNotFound)?;
        if reschedule.therapist_id != context.user_id {
            return Err(SchedulingError::Forbidden(
                "Only the requesting therapist can withdraw a reschedule".into(),
            ));
        }
        if reschedule.status != RescheduleStatus::Pending {
            return Err(SchedulingError::RequestNotPending);
        }

        reschedule.status = RescheduleStatus::Cancelled;
        reschedule.updated_at = self.clock.now();
        tx.update_reschedule_request(tenant, reschedule.clone())
            .await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "reschedule.cancel",
                "reschedule_request",
                reschedule.id,
                json!({ "session_id": reschedule.session_id }),
            ))
            .await;

        info!("Reschedule {} withdrawn", reschedule.id);
        Ok(reschedule)
    }

    /// Requests filed against one session, oldest first. Staff see any
    /// session's history; others only sessions they are part of.
    pub async fn list_for_session(
        &self,
        context: &AuthContext,
        session_id: Uuid,
    ) -> Result<Vec<RescheduleRequest>, SchedulingError> {
        let tenant = context.tenant_id;
        let tx = self.store.begin().await?;

        let session = tx
            .get_session(tenant, session_id)
            .await?
            .ok_or(SchedulingError::SessionNotFound)?;
        let involved =
            session.therapist_id == context.user_id || session.patient_id == context.user_id;
        if !context.role.can_review_reschedules() && !involved {
            return Err(SchedulingError::Forbidden(
                "Not allowed to view this session's reschedule requests".into(),
            ));
        }

        let mut requests = tx.list_reschedule_requests(tenant, session_id).await?;
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }
}

/// Requested start plus the session's current duration, as a time of day.
fn preserve_duration(
    session: &Session,
    requested_start: chrono::NaiveTime,
) -> Result<chrono::NaiveTime, SchedulingError> {
    let current = TimeWindow::from_times(session.start_time, session.end_time)?;
    let end = minutes_since_midnight(requested_start)
        .checked_add(current.duration_minutes())
        .ok_or(SchedulingError::InvalidTimeRange)?;
    time_from_minutes(end)
}
