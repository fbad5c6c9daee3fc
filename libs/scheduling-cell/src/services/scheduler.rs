// libs/scheduling-cell/src/services/scheduler.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use billing_cell::InvoiceLedgerService;
use clinic_models::auth::AuthContext;
use clinic_models::TenantId;
use clinic_store::{
    AuditEvent, AuditSink, ClinicStore, ClinicTx, Session, SessionFilter, SessionStatus,
};
use clinic_utils::clock::Clock;
use clinic_utils::state::AppState;

use crate::models::{
    CancelSessionRequest, CancellationOutcome, CreateSessionRequest, SchedulingError,
    UpdateSessionRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::conflict::ConflictDetectionService;
use crate::services::pricing::PricingService;
use crate::timewindow::{minutes_since_midnight, time_from_minutes, TimeWindow};

/// Books, moves and closes out sessions. Every mutation runs its checks
/// and its write inside one transaction, so a booking can never pass the
/// conflict check against reads another booking has already invalidated.
///
/// Status machine: Scheduled -> {Completed, Cancelled, NoShow}; the three
/// target states are terminal. Cancellation goes through `cancel` only,
/// because it has to reverse the session out of the invoice ledger.
pub struct SessionSchedulerService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    availability: AvailabilityService,
    conflicts: ConflictDetectionService,
    pricing: PricingService,
    ledger: InvoiceLedgerService,
}

impl SessionSchedulerService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            audit: Arc::clone(&state.audit),
            availability: AvailabilityService::new(state),
            conflicts: ConflictDetectionService::new(),
            pricing: PricingService::new(),
            ledger: InvoiceLedgerService::new(state),
        }
    }

    /// Book a new session.
    pub async fn create(
        &self,
        context: &AuthContext,
        request: CreateSessionRequest,
    ) -> Result<Session, SchedulingError> {
        info!(
            "Booking session for patient {} with therapist {} on {}",
            request.patient_id, request.therapist_id, request.date
        );

        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        // **Step 1: Everyone involved must exist and be active**
        tx.get_patient(tenant, request.patient_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(SchedulingError::PatientNotFound)?;
        tx.get_therapist(tenant, request.therapist_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapistNotFound)?;
        let therapy_type = tx
            .get_therapy_type(tenant, request.therapy_type_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapyTypeNotFound)?;

        // **Step 2: Resolve the price; it also supplies the default duration**
        let quote = self
            .pricing
            .resolve(tx.as_ref(), tenant, request.therapist_id, &therapy_type)
            .await?;
        let end_time = match request.end_time {
            Some(end) => end,
            None => end_after(request.start_time, quote.duration_minutes)?,
        };
        let window = TimeWindow::from_times(request.start_time, end_time)?;

        // **Step 3: The therapist must offer the slot, exceptions included**
        if !self
            .availability
            .is_available_on(
                tx.as_ref(),
                tenant,
                request.therapist_id,
                request.therapy_type_id,
                request.date,
                window,
            )
            .await?
        {
            return Err(SchedulingError::TherapistNotAvailable);
        }

        // **Step 4: Neither side may already be booked**
        if self
            .conflicts
            .therapist_has_conflict(tx.as_ref(), tenant, request.therapist_id, request.date, window, None)
            .await?
        {
            return Err(SchedulingError::TherapistConflict);
        }
        if self
            .conflicts
            .patient_has_conflict(tx.as_ref(), tenant, request.patient_id, request.date, window, None)
            .await?
        {
            return Err(SchedulingError::PatientConflict);
        }

        // **Step 5: Persist with the cost snapshot**
        let now = self.clock.now();
        let session = Session {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            patient_id: request.patient_id,
            therapist_id: request.therapist_id,
            therapy_type_id: request.therapy_type_id,
            date: request.date,
            start_time: request.start_time,
            end_time,
            status: SessionStatus::Scheduled,
            cost: quote.cost,
            cancel_reason: None,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        };
        tx.insert_session(tenant, session.clone()).await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "session.create",
                "session",
                session.id,
                json!({
                    "patient_id": session.patient_id,
                    "therapist_id": session.therapist_id,
                    "date": session.date,
                    "start_time": session.start_time,
                    "end_time": session.end_time,
                    "cost": session.cost,
                    "price_source": quote.source,
                }),
            ))
            .await;

        info!(
            "Session {} booked on {} {}-{} (cost {} via {})",
            session.id, session.date, session.start_time, session.end_time, session.cost, quote.source
        );
        Ok(session)
    }

    /// Patch a scheduled session: move it in time, close it out, or edit
    /// notes. A time patch re-runs the full booking checks against the new
    /// slot, with the session's own row excluded from conflict detection.
    pub async fn update(
        &self,
        context: &AuthContext,
        session_id: Uuid,
        request: UpdateSessionRequest,
    ) -> Result<Session, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut session = tx
            .get_session(tenant, session_id)
            .await?
            .ok_or(SchedulingError::SessionNotFound)?;
        if session.status.is_terminal() {
            return Err(SchedulingError::SessionLocked);
        }

        // **Step 1: Apply the time patch and re-run the booking checks**
        let moves =
            request.date.is_some() || request.start_time.is_some() || request.end_time.is_some();
        if moves {
            if let Some(date) = request.date {
                session.date = date;
            }
            if let Some(start_time) = request.start_time {
                session.start_time = start_time;
            }
            if let Some(end_time) = request.end_time {
                session.end_time = end_time;
            }
            let window = TimeWindow::from_times(session.start_time, session.end_time)?;

            if !self
                .availability
                .is_available_on(
                    tx.as_ref(),
                    tenant,
                    session.therapist_id,
                    session.therapy_type_id,
                    session.date,
                    window,
                )
                .await?
            {
                return Err(SchedulingError::TherapistNotAvailable);
            }
            if self
                .conflicts
                .therapist_has_conflict(
                    tx.as_ref(),
                    tenant,
                    session.therapist_id,
                    session.date,
                    window,
                    Some(session.id),
                )
                .await?
            {
                return Err(SchedulingError::TherapistConflict);
            }
            if self
                .conflicts
                .patient_has_conflict(
                    tx.as_ref(),
                    tenant,
                    session.patient_id,
                    session.date,
                    window,
                    Some(session.id),
                )
                .await?
            {
                return Err(SchedulingError::PatientConflict);
            }
        }

        // **Step 2: A status patch may only close the session out**
        if let Some(status) = request.status {
            if !matches!(status, SessionStatus::Completed | SessionStatus::NoShow) {
                return Err(SchedulingError::InvalidStatusTransition {
                    from: session.status,
                    to: status,
                });
            }
            session.status = status;
        }

        if let Some(notes) = request.notes {
            session.notes = Some(notes);
        }

        session.updated_at = self.clock.now();
        tx.update_session(tenant, session.clone()).await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "session.update",
                "session",
                session.id,
                json!({
                    "date": session.date,
                    "start_time": session.start_time,
                    "end_time": session.end_time,
                    "status": session.status,
                }),
            ))
            .await;

        info!("Session {} updated (now {})", session.id, session.status);
        Ok(session)
    }

    /// Cancel a scheduled session and reverse its financial footprint in
    /// the same transaction, so the session row and the ledger can never
    /// disagree about whether the cancellation happened.
    pub async fn cancel(
        &self,
        context: &AuthContext,
        session_id: Uuid,
        request: CancelSessionRequest,
    ) -> Result<CancellationOutcome, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut session = tx
            .get_session(tenant, session_id)
            .await?
            .ok_or(SchedulingError::SessionNotFound)?;
        match session.status {
            SessionStatus::Cancelled => return Err(SchedulingError::AlreadyCancelled),
            SessionStatus::Completed => return Err(SchedulingError::AlreadyCompleted),
            SessionStatus::NoShow => return Err(SchedulingError::SessionLocked),
            SessionStatus::Scheduled => {}
        }

        // **Step 1: Undo the session's effect on the invoice ledger**
        let reversal = self
            .ledger
            .reverse_for_cancelled_session(tx.as_mut(), tenant, &session)
            .await?;

        // **Step 2: Mark the session itself**
        session.status = SessionStatus::Cancelled;
        session.cancel_reason = request.reason;
        session.updated_at = self.clock.now();
        tx.update_session(tenant, session.clone()).await?;
        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "session.cancel",
                "session",
                session.id,
                json!({
                    "reason": session.cancel_reason,
                    "adjustment": reversal.adjustment,
                    "credit_added": reversal.credit_added,
                    "dues_reduced": reversal.dues_reduced,
                }),
            ))
            .await;

        info!(
            "Session {} cancelled ({}: credit +{}, dues -{})",
            session.id, reversal.adjustment, reversal.credit_added, reversal.dues_reduced
        );
        Ok(CancellationOutcome { session, reversal })
    }

    /// Move a session to its approved reschedule slot. Runs inside the
    /// reschedule workflow's transaction; the reviewer's approval stands
    /// in for the availability and conflict checks.
    pub async fn apply_approved_reschedule(
        &self,
        tx: &mut dyn ClinicTx,
        tenant: TenantId,
        session_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Session, SchedulingError> {
        let mut session = tx
            .get_session(tenant, session_id)
            .await?
            .ok_or(SchedulingError::SessionNotFound)?;
        if session.status != SessionStatus::Scheduled {
            return Err(SchedulingError::SessionLocked);
        }

        session.date = date;
        session.start_time = start_time;
        session.end_time = end_time;
        session.updated_at = self.clock.now();
        tx.update_session(tenant, session.clone()).await?;

        info!(
            "Session {} moved to {} {}-{} by approved reschedule",
            session.id, date, start_time, end_time
        );
        Ok(session)
    }

    pub async fn get(
        &self,
        context: &AuthContext,
        session_id: Uuid,
    ) -> Result<Session, SchedulingError> {
        let tx = self.store.begin().await?;
        tx.get_session(context.tenant_id, session_id)
            .await?
            .ok_or(SchedulingError::SessionNotFound)
    }

    pub async fn search(
        &self,
        context: &AuthContext,
        filter: &SessionFilter,
    ) -> Result<Vec<Session>, SchedulingError> {
        let tx = self.store.begin().await?;
        let mut sessions = tx.search_sessions(context.tenant_id, filter).await?;
        sessions.sort_by_key(|s| (s.date, s.start_time));
        Ok(sessions)
    }
}

/// Start plus a duration, as a time of day. Fails when the session would
/// run past midnight.
fn end_after(start: NaiveTime, duration_minutes: i32) -> Result<NaiveTime, SchedulingError> {
    let duration = u16::try_from(duration_minutes).map_err(|_| SchedulingError::InvalidTimeRange)?;
    let end = minutes_since_midnight(start)
        .checked_add(duration)
        .ok_or(SchedulingError::InvalidTimeRange)?;
    time_from_minutes(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_after_adds_duration() {
        let start = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert_eq!(
            end_after(start, 90).unwrap(),
            NaiveTime::from_hms_opt(11, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_end_after_rejects_past_midnight() {
        let start = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
        assert!(end_after(start, 60).is_err());
        assert!(end_after(start, -10).is_err());
    }
}
