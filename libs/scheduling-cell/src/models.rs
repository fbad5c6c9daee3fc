// libs/scheduling-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use billing_cell::models::{BillingError, LedgerReversal};
use clinic_models::error::AppError;
use clinic_store::{Session, SessionStatus, StoreError};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub therapy_type_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Defaults to start time plus the resolved therapy duration.
    pub end_time: Option<NaiveTime>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateSessionRequest {
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// Only `completed` and `no_show` are reachable this way; cancellation
    /// has its own endpoint because it touches the ledger.
    pub status: Option<SessionStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelSessionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAvailabilityRuleRequest {
    pub therapist_id: Uuid,
    pub therapy_type_id: Uuid,
    /// 0 = Sunday through 6 = Saturday.
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateAvailabilityRuleRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUnavailabilityRequest {
    pub therapist_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Absent time bounds block the whole day(s).
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRescheduleRequest {
    pub session_id: Uuid,
    pub requested_date: NaiveDate,
    pub requested_start_time: NaiveTime,
    /// Defaults to preserving the session's current duration.
    pub requested_end_time: Option<NaiveTime>,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReviewRescheduleRequest {
    pub notes: Option<String>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

/// Resolved price for a (therapist, therapy type) pair at one moment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub cost: Decimal,
    pub duration_minutes: i32,
    pub source: PriceSource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    TherapistSpecific,
    TherapyTypeDefault,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::TherapistSpecific => write!(f, "therapist_specific"),
            PriceSource::TherapyTypeDefault => write!(f, "therapy_type_default"),
        }
    }
}

/// A bookable gap on a therapist's day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// What a cancellation did: the final session record plus the ledger
/// adjustment the billing cell performed for it.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub session: Session,
    pub reversal: LedgerReversal,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Patient not found")]
    PatientNotFound,

    #[error("Therapist not found")]
    TherapistNotFound,

    #[error("Therapy type not found")]
    TherapyTypeNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Availability rule not found")]
    RuleNotFound,

    #[error("Reschedule request not found")]
    RequestNotFound,

    #[error("Start time must be before end time")]
    InvalidTimeRange,

    #[error("Start date must not be after end date")]
    InvalidDateRange,

    #[error("Day of week must be between 0 (Sunday) and 6 (Saturday)")]
    InvalidDayOfWeek,

    #[error("Therapist is not available at the requested time")]
    TherapistNotAvailable,

    #[error("Therapist already has a session at the requested time")]
    TherapistConflict,

    #[error("Patient already has a session at the requested time")]
    PatientConflict,

    #[error("Availability rule overlaps an existing rule for that day")]
    OverlappingRule,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Session is already cancelled")]
    AlreadyCancelled,

    #[error("Completed sessions cannot be cancelled")]
    AlreadyCompleted,

    #[error("Session can no longer be modified")]
    SessionLocked,

    #[error("A pending reschedule request already exists for this session")]
    PendingRequestExists,

    #[error("Reschedule requests need at least {0} hours of notice")]
    TooLateToReschedule(i64),

    #[error("Reschedule request is not pending")]
    RequestNotPending,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Billing error: {0}")]
    Billing(#[from] BillingError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::PatientNotFound
            | SchedulingError::TherapistNotFound
            | SchedulingError::TherapyTypeNotFound
            | SchedulingError::SessionNotFound
            | SchedulingError::RuleNotFound
            | SchedulingError::RequestNotFound => AppError::NotFound(err.to_string()),

            SchedulingError::InvalidTimeRange
            | SchedulingError::InvalidDateRange
            | SchedulingError::InvalidDayOfWeek => AppError::ValidationError(err.to_string()),

            SchedulingError::TherapistNotAvailable
            | SchedulingError::TherapistConflict
            | SchedulingError::PatientConflict
            | SchedulingError::OverlappingRule
            | SchedulingError::InvalidStatusTransition { .. }
            | SchedulingError::AlreadyCancelled
            | SchedulingError::AlreadyCompleted
            | SchedulingError::SessionLocked
            | SchedulingError::PendingRequestExists
            | SchedulingError::TooLateToReschedule(_)
            | SchedulingError::RequestNotPending => AppError::Conflict(err.to_string()),

            SchedulingError::Forbidden(msg) => AppError::Forbidden(msg),

            SchedulingError::Billing(inner) => AppError::from(inner),

            SchedulingError::Store(inner) => AppError::Storage(inner.to_string()),
        }
    }
}
