// libs/shared/store/src/records.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use clinic_models::TenantId;

// ==============================================================================
// PEOPLE AND CATALOG
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub full_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    /// Prepaid/refunded money the patient can spend on future invoices.
    /// Mutated only by the invoice ledger and the payment recording path.
    pub credit_balance: Decimal,
    /// Sum of unpaid invoice amounts across the patient's active invoices.
    pub total_outstanding_dues: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Therapist {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub full_name: String,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapyType {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub default_cost: Decimal,
    pub default_duration_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Therapist-specific price for one therapy type. When active it takes
/// precedence over the therapy type defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistPricing {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub therapist_id: Uuid,
    pub therapy_type_id: Uuid,
    pub cost: Decimal,
    pub duration_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// SESSIONS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub patient_id: Uuid,
    pub therapist_id: Uuid,
    pub therapy_type_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: SessionStatus,
    /// Price snapshot taken when the session was created. Later pricing
    /// changes never affect it.
    pub cost: Decimal,
    pub cancel_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Wall-clock start instant of the session, used for lead-time checks.
    pub fn starts_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_naive_utc_and_offset(self.date.and_time(self.start_time), Utc)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl SessionStatus {
    /// Statuses that occupy the calendar for conflict detection.
    pub fn blocks_calendar(&self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Scheduled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Scheduled => write!(f, "scheduled"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
            SessionStatus::NoShow => write!(f, "no_show"),
        }
    }
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

/// Weekly recurring availability rule. `day_of_week` is 0-6 with 0 = Sunday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistAvailability {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub therapist_id: Uuid,
    pub therapy_type_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Exceptional unavailability: overrides the weekly rules for its date range.
/// When the time bounds are absent the whole day is blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistUnavailability {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub therapist_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub reason: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// RESCHEDULING
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub session_id: Uuid,
    pub therapist_id: Uuid,
    pub requested_date: NaiveDate,
    pub requested_start_time: NaiveTime,
    pub requested_end_time: NaiveTime,
    pub reason: String,
    pub status: RescheduleStatus,
    pub reviewed_by: Option<Uuid>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl fmt::Display for RescheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescheduleStatus::Pending => write!(f, "pending"),
            RescheduleStatus::Approved => write!(f, "approved"),
            RescheduleStatus::Rejected => write!(f, "rejected"),
            RescheduleStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// BILLING
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub patient_id: Uuid,
    /// Formatted `INV-<year>-<NNN>`, unique per tenant and year among
    /// active invoices.
    pub invoice_number: String,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub credit_used: Decimal,
    pub outstanding_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub confirmed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Active,
    Void,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Active => write!(f, "active"),
            InvoiceStatus::Void => write!(f, "void"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Credit,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Cash => write!(f, "cash"),
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Credit => write!(f, "credit"),
        }
    }
}

/// One billed session on an invoice. A session can be attached to at most
/// one invoice at a time; the store enforces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub invoice_id: Uuid,
    pub session_id: Uuid,
    pub cost: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Standalone payment taken outside invoice creation, e.g. a patient
/// topping up their credit at the front desk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientPayment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub patient_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}
