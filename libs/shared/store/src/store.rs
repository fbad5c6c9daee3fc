// libs/shared/store/src/store.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use clinic_models::TenantId;

use crate::error::StoreError;
use crate::records::{
    Invoice, InvoiceLineItem, Patient, PatientPayment, RescheduleRequest, Session, SessionStatus,
    Therapist, TherapistAvailability, TherapistPricing, TherapistUnavailability, TherapyType,
};

/// Entry point to the persistence layer. Every mutation happens inside a
/// transaction obtained from `begin`; dropping the transaction without
/// committing discards its writes.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn ClinicTx>, StoreError>;
}

/// Criteria for session lookups. Every field is optional; absent fields
/// do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub patient_id: Option<Uuid>,
    pub therapist_id: Option<Uuid>,
    pub statuses: Option<Vec<SessionStatus>>,
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl SessionFilter {
    /// Sessions that occupy a calendar slot on one date, for conflict
    /// detection.
    pub fn blocking_on(date: NaiveDate) -> Self {
        Self {
            statuses: Some(vec![SessionStatus::Scheduled, SessionStatus::Completed]),
            date: Some(date),
            ..Self::default()
        }
    }
}

/// One unit of work against the store. All reads and writes of a
/// multi-step operation go through the same transaction so its checks and
/// its effects are atomic. The tenant is an explicit argument on every
/// method; implementations must never return rows from another tenant.
#[async_trait]
pub trait ClinicTx: Send + Sync {
    // --- patients ---
    async fn insert_patient(&mut self, tenant: TenantId, patient: Patient)
        -> Result<(), StoreError>;
    async fn get_patient(&self, tenant: TenantId, id: Uuid) -> Result<Option<Patient>, StoreError>;
    async fn update_patient(&mut self, tenant: TenantId, patient: Patient)
        -> Result<(), StoreError>;

    // --- therapists ---
    async fn insert_therapist(
        &mut self,
        tenant: TenantId,
        therapist: Therapist,
    ) -> Result<(), StoreError>;
    async fn get_therapist(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<Therapist>, StoreError>;

    // --- therapy types ---
    async fn insert_therapy_type(
        &mut self,
        tenant: TenantId,
        therapy_type: TherapyType,
    ) -> Result<(), StoreError>;
    async fn get_therapy_type(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<TherapyType>, StoreError>;

    // --- therapist pricing ---
    async fn insert_pricing(
        &mut self,
        tenant: TenantId,
        pricing: TherapistPricing,
    ) -> Result<(), StoreError>;
    async fn find_active_pricing(
        &self,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
    ) -> Result<Option<TherapistPricing>, StoreError>;

    // --- sessions ---
    async fn insert_session(&mut self, tenant: TenantId, session: Session)
        -> Result<(), StoreError>;
    async fn get_session(&self, tenant: TenantId, id: Uuid) -> Result<Option<Session>, StoreError>;
    async fn update_session(&mut self, tenant: TenantId, session: Session)
        -> Result<(), StoreError>;
    async fn search_sessions(
        &self,
        tenant: TenantId,
        filter: &SessionFilter,
    ) -> Result<Vec<Session>, StoreError>;

    // --- availability rules ---
    async fn insert_availability_rule(
        &mut self,
        tenant: TenantId,
        rule: TherapistAvailability,
    ) -> Result<(), StoreError>;
    async fn get_availability_rule(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<TherapistAvailability>, StoreError>;
    async fn update_availability_rule(
        &mut self,
        tenant: TenantId,
        rule: TherapistAvailability,
    ) -> Result<(), StoreError>;
    async fn list_availability_rules(
        &self,
        tenant: TenantId,
        therapist_id: Uuid,
    ) -> Result<Vec<TherapistAvailability>, StoreError>;

    // --- unavailability periods ---
    async fn insert_unavailability(
        &mut self,
        tenant: TenantId,
        period: TherapistUnavailability,
    ) -> Result<(), StoreError>;
    /// Periods whose date range covers `date`.
    async fn list_unavailability_on(
        &self,
        tenant: TenantId,
        therapist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TherapistUnavailability>, StoreError>;

    // --- reschedule requests ---
    async fn insert_reschedule_request(
        &mut self,
        tenant: TenantId,
        request: RescheduleRequest,
    ) -> Result<(), StoreError>;
    async fn get_reschedule_request(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<RescheduleRequest>, StoreError>;
    async fn update_reschedule_request(
        &mut self,
        tenant: TenantId,
        request: RescheduleRequest,
    ) -> Result<(), StoreError>;
    async fn list_reschedule_requests(
        &self,
        tenant: TenantId,
        session_id: Uuid,
    ) -> Result<Vec<RescheduleRequest>, StoreError>;
    async fn find_pending_reschedule(
        &self,
        tenant: TenantId,
        session_id: Uuid,
    ) -> Result<Option<RescheduleRequest>, StoreError>;

    // --- invoices ---
    /// Fails with `DuplicateInvoiceNumber` when another active invoice of
    /// the tenant already carries the same number.
    async fn insert_invoice(&mut self, tenant: TenantId, invoice: Invoice)
        -> Result<(), StoreError>;
    async fn get_invoice(&self, tenant: TenantId, id: Uuid) -> Result<Option<Invoice>, StoreError>;
    async fn update_invoice(&mut self, tenant: TenantId, invoice: Invoice)
        -> Result<(), StoreError>;
    async fn list_invoices_for_patient(
        &self,
        tenant: TenantId,
        patient_id: Uuid,
    ) -> Result<Vec<Invoice>, StoreError>;
    /// Numbers of all active invoices of the tenant, for sequence
    /// allocation.
    async fn active_invoice_numbers(&self, tenant: TenantId) -> Result<Vec<String>, StoreError>;

    // --- invoice line items ---
    /// Fails with `DuplicateLineItem` when the session is already attached
    /// to an invoice.
    async fn insert_line_item(
        &mut self,
        tenant: TenantId,
        item: InvoiceLineItem,
    ) -> Result<(), StoreError>;
    async fn list_line_items(
        &self,
        tenant: TenantId,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLineItem>, StoreError>;
    async fn find_line_item_for_session(
        &self,
        tenant: TenantId,
        session_id: Uuid,
    ) -> Result<Option<InvoiceLineItem>, StoreError>;
    async fn delete_line_item(&mut self, tenant: TenantId, id: Uuid) -> Result<(), StoreError>;

    // --- payments ---
    async fn insert_payment(
        &mut self,
        tenant: TenantId,
        payment: PatientPayment,
    ) -> Result<(), StoreError>;

    /// Make the transaction's writes visible. Without this call the
    /// transaction rolls back when dropped.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
