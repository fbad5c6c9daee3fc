// libs/shared/store/src/error.rs
use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced by the persistence layer. Uniqueness violations get
/// their own variants so callers can react (retry a number, report a
/// concurrent invoice) instead of treating them as opaque backend faults.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invoice number already in use: {0}")]
    DuplicateInvoiceNumber(String),

    #[error("Session is already attached to an invoice: {0}")]
    DuplicateLineItem(Uuid),

    #[error("Record not found for update: {0}")]
    RecordMissing(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
