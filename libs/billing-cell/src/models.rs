// libs/billing-cell/src/models.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use clinic_models::error::AppError;
use clinic_store::{Invoice, InvoiceLineItem, PatientPayment, PaymentMethod, StoreError};

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceRequest {
    pub patient_id: Uuid,
    /// Sessions to bill. Each must belong to the patient, be uninvoiced
    /// and not cancelled.
    pub session_ids: Vec<Uuid>,
    #[serde(default)]
    pub paid_amount: Decimal,
    #[serde(default)]
    pub credit_used: Decimal,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordPaymentRequest {
    pub patient_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub notes: Option<String>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

/// Patient money counters as they stand after an operation, echoed back so
/// the front desk never has to re-fetch the patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientBalances {
    pub credit_balance: Decimal,
    pub total_outstanding_dues: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceOutcome {
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
    pub patient_balances: PatientBalances,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub payment: PatientPayment,
    pub patient_balances: PatientBalances,
}

/// Which patient counter a cancellation reversal touched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAdjustment {
    /// Invoice was settled; the session's cost came back as credit.
    Credit,
    /// Invoice still had dues; outstanding shrank instead.
    Dues,
    /// Session was never invoiced; nothing to reverse.
    None,
}

impl fmt::Display for LedgerAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerAdjustment::Credit => write!(f, "credit"),
            LedgerAdjustment::Dues => write!(f, "dues"),
            LedgerAdjustment::None => write!(f, "none"),
        }
    }
}

/// What cancelling one session did to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerReversal {
    pub credit_added: Decimal,
    pub dues_reduced: Decimal,
    pub adjustment: LedgerAdjustment,
}

impl LedgerReversal {
    pub fn untouched() -> Self {
        Self {
            credit_added: Decimal::ZERO,
            dues_reduced: Decimal::ZERO,
            adjustment: LedgerAdjustment::None,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Patient not found")]
    PatientNotFound,

    #[error("Invoice not found")]
    InvoiceNotFound,

    #[error("At least one session must be selected")]
    NoSessionsSelected,

    #[error("Session appears more than once in the selection: {0}")]
    DuplicateSessionSelected(Uuid),

    #[error("Session cannot be invoiced: {0}")]
    SessionsInvalid(Uuid),

    #[error("Session is already attached to an invoice: {0}")]
    AlreadyInvoiced(Uuid),

    #[error("Paid amount and credit used must not be negative")]
    NegativeAmount,

    #[error("Payment amount must be greater than zero")]
    InvalidPaymentAmount,

    #[error("Credit used exceeds the patient's credit balance")]
    InsufficientCredit,

    #[error("Credit used exceeds the invoice total")]
    CreditExceedsTotal,

    #[error("Paid amount plus credit exceeds the invoice total")]
    PaymentExceedsTotal,

    #[error("Could not allocate an invoice number after {0} attempts")]
    InvoiceNumberExhausted(u32),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::PatientNotFound | BillingError::InvoiceNotFound => {
                AppError::NotFound(err.to_string())
            }

            BillingError::NoSessionsSelected
            | BillingError::DuplicateSessionSelected(_)
            | BillingError::NegativeAmount
            | BillingError::InvalidPaymentAmount => AppError::ValidationError(err.to_string()),

            BillingError::SessionsInvalid(_)
            | BillingError::AlreadyInvoiced(_)
            | BillingError::InsufficientCredit
            | BillingError::CreditExceedsTotal
            | BillingError::PaymentExceedsTotal => AppError::Conflict(err.to_string()),

            BillingError::InvoiceNumberExhausted(_) => AppError::Unavailable(err.to_string()),

            BillingError::Store(inner) => AppError::Storage(inner.to_string()),
        }
    }
}
