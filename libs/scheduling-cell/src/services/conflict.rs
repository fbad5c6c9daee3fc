// libs/scheduling-cell/src/services/conflict.rs
use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use clinic_models::TenantId;
use clinic_store::{ClinicTx, SessionFilter};

use crate::models::SchedulingError;
use crate::timewindow::TimeWindow;

/// Detects double-bookings against the calendar-blocking sessions of one
/// date. Scheduled and completed sessions block; cancelled and no-show
/// sessions free their slot.
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    pub fn new() -> Self {
        Self
    }

    /// Whether the therapist already has a blocking session overlapping
    /// `window` on `date`. Pass `exclude_session_id` when re-checking a
    /// session's own move so it does not collide with itself.
    pub async fn therapist_has_conflict(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        date: NaiveDate,
        window: TimeWindow,
        exclude_session_id: Option<Uuid>,
    ) -> Result<bool, SchedulingError> {
        let filter = SessionFilter {
            therapist_id: Some(therapist_id),
            ..SessionFilter::blocking_on(date)
        };
        let found = self
            .any_overlap(tx, tenant, &filter, window, exclude_session_id)
            .await?;
        if found {
            warn!(
                "Therapist {} already booked during {}-{} on {}",
                therapist_id,
                window.start_minutes(),
                window.end_minutes(),
                date
            );
        }
        Ok(found)
    }

    /// Same check against the patient's own calendar. A patient cannot sit
    /// in two sessions at once, whoever the therapist is.
    pub async fn patient_has_conflict(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        patient_id: Uuid,
        date: NaiveDate,
        window: TimeWindow,
        exclude_session_id: Option<Uuid>,
    ) -> Result<bool, SchedulingError> {
        let filter = SessionFilter {
            patient_id: Some(patient_id),
            ..SessionFilter::blocking_on(date)
        };
        let found = self
            .any_overlap(tx, tenant, &filter, window, exclude_session_id)
            .await?;
        if found {
            warn!(
                "Patient {} already booked during {}-{} on {}",
                patient_id,
                window.start_minutes(),
                window.end_minutes(),
                date
            );
        }
        Ok(found)
    }

    async fn any_overlap(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        filter: &SessionFilter,
        window: TimeWindow,
        exclude_session_id: Option<Uuid>,
    ) -> Result<bool, SchedulingError> {
        let sessions = tx.search_sessions(tenant, filter).await?;
        debug!(
            "Checking {} blocking sessions for overlap",
            sessions.len()
        );

        for session in sessions {
            if Some(session.id) == exclude_session_id {
                continue;
            }
            let existing = TimeWindow::from_times(session.start_time, session.end_time)?;
            if window.overlaps(&existing) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Default for ConflictDetectionService {
    fn default() -> Self {
        Self::new()
    }
}
