// libs/scheduling-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clinic_models::auth::{AuthContext, Role};
use clinic_models::TenantId;
use clinic_store::{
    ClinicStore, ClinicTx, SessionFilter, TherapistAvailability, TherapistUnavailability,
};
use clinic_utils::clock::Clock;
use clinic_utils::state::AppState;

use crate::models::{
    CreateAvailabilityRuleRequest, CreateUnavailabilityRequest, OpenSlot, SchedulingError,
    UpdateAvailabilityRuleRequest,
};
use crate::services::pricing::PricingService;
use crate::timewindow::{day_of_week, time_from_minutes, TimeWindow};

/// Answers "can this therapist take this slot?" from two layers: weekly
/// recurring rules grant time, unavailability periods take it away for
/// concrete dates. A window is only available when a single active rule
/// contains it whole; adjacent rules do not combine.
pub struct AvailabilityService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    pricing: PricingService,
}

impl AvailabilityService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            pricing: PricingService::new(),
        }
    }

    // ==============================================================================
    // RESOLUTION (runs inside the caller's transaction)
    // ==============================================================================

    /// Whether one active rule for (therapist, therapy type, weekday)
    /// fully contains the window.
    pub async fn is_available(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        day_of_week: i32,
        window: TimeWindow,
    ) -> Result<bool, SchedulingError> {
        let rules = self
            .day_rules(tx, tenant, therapist_id, therapy_type_id, day_of_week)
            .await?;

        for rule in &rules {
            let offered = TimeWindow::from_times(rule.start_time, rule.end_time)?;
            if offered.contains(&window) {
                return Ok(true);
            }
        }

        debug!(
            "No single rule of therapist {} covers minutes {}-{} on day {}",
            therapist_id,
            window.start_minutes(),
            window.end_minutes(),
            day_of_week
        );
        Ok(false)
    }

    /// Exception-aware variant for a concrete date: the recurring rules
    /// must grant the window AND no unavailability period may block it.
    /// Periods without time bounds block their whole day.
    pub async fn is_available_on(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        date: NaiveDate,
        window: TimeWindow,
    ) -> Result<bool, SchedulingError> {
        if !self
            .is_available(tx, tenant, therapist_id, therapy_type_id, day_of_week(date), window)
            .await?
        {
            return Ok(false);
        }

        let periods = tx.list_unavailability_on(tenant, therapist_id, date).await?;
        for period in &periods {
            match (period.start_time, period.end_time) {
                (Some(start), Some(end)) => {
                    let blocked = TimeWindow::from_times(start, end)?;
                    if window.overlaps(&blocked) {
                        debug!(
                            "Unavailability {} blocks therapist {} during {}-{} on {}",
                            period.id, therapist_id, start, end, date
                        );
                        return Ok(false);
                    }
                }
                _ => {
                    debug!(
                        "Whole-day unavailability {} blocks therapist {} on {}",
                        period.id, therapist_id, date
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Bookable slots on one date, stepping each rule window by the slot
    /// duration and dropping anything an unavailability period or an
    /// existing booking touches.
    pub async fn open_slots(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        date: NaiveDate,
        duration_minutes: u16,
    ) -> Result<Vec<OpenSlot>, SchedulingError> {
        if duration_minutes == 0 {
            return Err(SchedulingError::InvalidTimeRange);
        }

        let rules = self
            .day_rules(tx, tenant, therapist_id, therapy_type_id, day_of_week(date))
            .await?;
        if rules.is_empty() {
            debug!("Therapist {} offers nothing on {}", therapist_id, date);
            return Ok(Vec::new());
        }

        let periods = tx.list_unavailability_on(tenant, therapist_id, date).await?;
        if periods
            .iter()
            .any(|p| p.start_time.is_none() || p.end_time.is_none())
        {
            debug!("Therapist {} is blocked for the whole of {}", therapist_id, date);
            return Ok(Vec::new());
        }
        let mut blocked = Vec::with_capacity(periods.len());
        for period in &periods {
            if let (Some(start), Some(end)) = (period.start_time, period.end_time) {
                blocked.push(TimeWindow::from_times(start, end)?);
            }
        }

        let filter = SessionFilter {
            therapist_id: Some(therapist_id),
            ..SessionFilter::blocking_on(date)
        };
        let mut booked = Vec::new();
        for session in tx.search_sessions(tenant, &filter).await? {
            booked.push(TimeWindow::from_times(session.start_time, session.end_time)?);
        }

        let mut slots = Vec::new();
        for rule in &rules {
            let offered = TimeWindow::from_times(rule.start_time, rule.end_time)?;
            let mut cursor = offered.start_minutes();
            while let Some(end) = cursor
                .checked_add(duration_minutes)
                .filter(|end| *end <= offered.end_minutes())
            {
                let candidate = TimeWindow::from_minutes(cursor, end)?;
                let clear = !blocked.iter().any(|b| candidate.overlaps(b))
                    && !booked.iter().any(|b| candidate.overlaps(b));
                if clear {
                    slots.push(OpenSlot {
                        start_time: time_from_minutes(cursor)?,
                        end_time: time_from_minutes(end)?,
                    });
                }
                cursor = end;
            }
        }

        slots.sort_by_key(|slot| slot.start_time);
        debug!(
            "Found {} open {}-minute slots for therapist {} on {}",
            slots.len(),
            duration_minutes,
            therapist_id,
            date
        );
        Ok(slots)
    }

    // ==============================================================================
    // RULE MANAGEMENT
    // ==============================================================================

    pub async fn create_rule(
        &self,
        context: &AuthContext,
        request: CreateAvailabilityRuleRequest,
    ) -> Result<TherapistAvailability, SchedulingError> {
        info!(
            "Creating availability rule for therapist {} on day {} ({} to {})",
            request.therapist_id, request.day_of_week, request.start_time, request.end_time
        );

        if !(0..=6).contains(&request.day_of_week) {
            return Err(SchedulingError::InvalidDayOfWeek);
        }
        let window = TimeWindow::from_times(request.start_time, request.end_time)?;
        self.ensure_own_calendar(context, request.therapist_id)?;

        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        tx.get_therapist(tenant, request.therapist_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapistNotFound)?;
        tx.get_therapy_type(tenant, request.therapy_type_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapyTypeNotFound)?;

        self.ensure_no_rule_overlap(
            tx.as_ref(),
            tenant,
            request.therapist_id,
            request.therapy_type_id,
            request.day_of_week,
            window,
            None,
        )
        .await?;

        let now = self.clock.now();
        let rule = TherapistAvailability {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            therapist_id: request.therapist_id,
            therapy_type_id: request.therapy_type_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tx.insert_availability_rule(tenant, rule.clone()).await?;
        tx.commit().await?;

        info!("Availability rule {} created", rule.id);
        Ok(rule)
    }

    pub async fn update_rule(
        &self,
        context: &AuthContext,
        rule_id: Uuid,
        request: UpdateAvailabilityRuleRequest,
    ) -> Result<TherapistAvailability, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut rule = tx
            .get_availability_rule(tenant, rule_id)
            .await?
            .ok_or(SchedulingError::RuleNotFound)?;
        self.ensure_own_calendar(context, rule.therapist_id)?;

        if let Some(start_time) = request.start_time {
            rule.start_time = start_time;
        }
        if let Some(end_time) = request.end_time {
            rule.end_time = end_time;
        }
        if let Some(is_active) = request.is_active {
            rule.is_active = is_active;
        }

        let window = TimeWindow::from_times(rule.start_time, rule.end_time)?;
        if rule.is_active {
            self.ensure_no_rule_overlap(
                tx.as_ref(),
                tenant,
                rule.therapist_id,
                rule.therapy_type_id,
                rule.day_of_week,
                window,
                Some(rule.id),
            )
            .await?;
        }

        rule.updated_at = self.clock.now();
        tx.update_availability_rule(tenant, rule.clone()).await?;
        tx.commit().await?;

        info!(
            "Availability rule {} updated ({} to {}, active: {})",
            rule.id, rule.start_time, rule.end_time, rule.is_active
        );
        Ok(rule)
    }

    /// Soft removal: the rule stops granting availability but stays on
    /// record.
    pub async fn deactivate_rule(
        &self,
        context: &AuthContext,
        rule_id: Uuid,
    ) -> Result<TherapistAvailability, SchedulingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut rule = tx
            .get_availability_rule(tenant, rule_id)
            .await?
            .ok_or(SchedulingError::RuleNotFound)?;
        self.ensure_own_calendar(context, rule.therapist_id)?;

        rule.is_active = false;
        rule.updated_at = self.clock.now();
        tx.update_availability_rule(tenant, rule.clone()).await?;
        tx.commit().await?;

        info!("Availability rule {} deactivated", rule.id);
        Ok(rule)
    }

    pub async fn list_rules(
        &self,
        context: &AuthContext,
        therapist_id: Uuid,
    ) -> Result<Vec<TherapistAvailability>, SchedulingError> {
        let tenant = context.tenant_id;
        let tx = self.store.begin().await?;

        tx.get_therapist(tenant, therapist_id)
            .await?
            .ok_or(SchedulingError::TherapistNotFound)?;

        let mut rules = tx.list_availability_rules(tenant, therapist_id).await?;
        rules.sort_by_key(|rule| (rule.day_of_week, rule.start_time));
        Ok(rules)
    }

    // ==============================================================================
    // UNAVAILABILITY MANAGEMENT
    // ==============================================================================

    pub async fn create_period(
        &self,
        context: &AuthContext,
        request: CreateUnavailabilityRequest,
    ) -> Result<TherapistUnavailability, SchedulingError> {
        if request.end_date < request.start_date {
            return Err(SchedulingError::InvalidDateRange);
        }
        match (request.start_time, request.end_time) {
            (None, None) => {}
            (Some(start), Some(end)) => {
                TimeWindow::from_times(start, end)?;
            }
            _ => return Err(SchedulingError::InvalidTimeRange),
        }
        self.ensure_own_calendar(context, request.therapist_id)?;

        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        tx.get_therapist(tenant, request.therapist_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapistNotFound)?;

        let period = TherapistUnavailability {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            therapist_id: request.therapist_id,
            start_date: request.start_date,
            end_date: request.end_date,
            start_time: request.start_time,
            end_time: request.end_time,
            reason: request.reason,
            notes: request.notes,
            created_at: self.clock.now(),
        };
        tx.insert_unavailability(tenant, period.clone()).await?;
        tx.commit().await?;

        info!(
            "Unavailability {} recorded for therapist {} ({} to {})",
            period.id, period.therapist_id, period.start_date, period.end_date
        );
        Ok(period)
    }

    /// Periods that cover one date.
    pub async fn list_periods(
        &self,
        context: &AuthContext,
        therapist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TherapistUnavailability>, SchedulingError> {
        let tenant = context.tenant_id;
        let tx = self.store.begin().await?;

        tx.get_therapist(tenant, therapist_id)
            .await?
            .ok_or(SchedulingError::TherapistNotFound)?;

        Ok(tx.list_unavailability_on(tenant, therapist_id, date).await?)
    }

    /// Handler entry for the slot search: resolves the slot duration from
    /// pricing, then enumerates.
    pub async fn find_open_slots(
        &self,
        context: &AuthContext,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<OpenSlot>, SchedulingError> {
        let tenant = context.tenant_id;
        let tx = self.store.begin().await?;

        tx.get_therapist(tenant, therapist_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapistNotFound)?;
        let therapy_type = tx
            .get_therapy_type(tenant, therapy_type_id)
            .await?
            .filter(|t| t.is_active)
            .ok_or(SchedulingError::TherapyTypeNotFound)?;

        let quote = self
            .pricing
            .resolve(tx.as_ref(), tenant, therapist_id, &therapy_type)
            .await?;
        let duration = u16::try_from(quote.duration_minutes)
            .map_err(|_| SchedulingError::InvalidTimeRange)?;

        self.open_slots(tx.as_ref(), tenant, therapist_id, therapy_type_id, date, duration)
            .await
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    /// Therapists may only touch their own calendar; back-office staff any.
    fn ensure_own_calendar(
        &self,
        context: &AuthContext,
        therapist_id: Uuid,
    ) -> Result<(), SchedulingError> {
        if context.role == Role::Therapist && therapist_id != context.user_id {
            return Err(SchedulingError::Forbidden(
                "Therapists can only manage their own calendar".to_string(),
            ));
        }
        Ok(())
    }

    /// Active rules for one (therapist, therapy type, weekday).
    async fn day_rules(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        day_of_week: i32,
    ) -> Result<Vec<TherapistAvailability>, SchedulingError> {
        let rules = tx.list_availability_rules(tenant, therapist_id).await?;
        Ok(rules
            .into_iter()
            .filter(|rule| {
                rule.is_active
                    && rule.day_of_week == day_of_week
                    && rule.therapy_type_id == therapy_type_id
            })
            .collect())
    }

    async fn ensure_no_rule_overlap(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        day_of_week: i32,
        window: TimeWindow,
        exclude_rule_id: Option<Uuid>,
    ) -> Result<(), SchedulingError> {
        let rules = tx.list_availability_rules(tenant, therapist_id).await?;
        for rule in rules {
            if Some(rule.id) == exclude_rule_id
                || !rule.is_active
                || rule.day_of_week != day_of_week
                || rule.therapy_type_id != therapy_type_id
            {
                continue;
            }
            let existing = TimeWindow::from_times(rule.start_time, rule.end_time)?;
            if window.overlaps(&existing) {
                warn!(
                    "Rule for therapist {} on day {} overlaps existing rule {}",
                    therapist_id, day_of_week, rule.id
                );
                return Err(SchedulingError::OverlappingRule);
            }
        }
        Ok(())
    }
}
