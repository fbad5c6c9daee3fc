pub mod audit;
pub mod error;
pub mod memory;
pub mod records;
pub mod store;

pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use records::{
    Invoice, InvoiceLineItem, InvoiceStatus, Patient, PatientPayment, PaymentMethod,
    RescheduleRequest, RescheduleStatus, Session, SessionStatus, Therapist,
    TherapistAvailability, TherapistPricing, TherapistUnavailability, TherapyType,
};
pub use store::{ClinicStore, ClinicTx, SessionFilter};
