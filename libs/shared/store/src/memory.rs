// libs/shared/store/src/memory.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use clinic_models::TenantId;

use crate::error::StoreError;
use crate::records::{
    Invoice, InvoiceLineItem, InvoiceStatus, Patient, PatientPayment, RescheduleRequest,
    RescheduleStatus, Session, Therapist, TherapistAvailability, TherapistPricing,
    TherapistUnavailability, TherapyType,
};
use crate::store::{ClinicStore, ClinicTx, SessionFilter};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    patients: HashMap<Uuid, Patient>,
    therapists: HashMap<Uuid, Therapist>,
    therapy_types: HashMap<Uuid, TherapyType>,
    pricing: HashMap<Uuid, TherapistPricing>,
    sessions: HashMap<Uuid, Session>,
    availability_rules: HashMap<Uuid, TherapistAvailability>,
    unavailability: HashMap<Uuid, TherapistUnavailability>,
    reschedule_requests: HashMap<Uuid, RescheduleRequest>,
    invoices: HashMap<Uuid, Invoice>,
    line_items: HashMap<Uuid, InvoiceLineItem>,
    payments: HashMap<Uuid, PatientPayment>,
}

/// In-process store. A transaction takes the single state lock for its
/// whole lifetime, so transactions are serialized: what a transaction
/// reads cannot change before it commits.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClinicStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn ClinicTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

/// Writes go to a working copy; `commit` swaps it into the shared state.
/// Dropping the transaction discards the copy, which is the rollback.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl ClinicTx for MemoryTx {
    async fn insert_patient(
        &mut self,
        tenant: TenantId,
        patient: Patient,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(patient.tenant_id, tenant);
        self.working.patients.insert(patient.id, patient);
        Ok(())
    }

    async fn get_patient(&self, tenant: TenantId, id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self
            .working
            .patients
            .get(&id)
            .filter(|p| p.tenant_id == tenant)
            .cloned())
    }

    async fn update_patient(
        &mut self,
        tenant: TenantId,
        patient: Patient,
    ) -> Result<(), StoreError> {
        match self.working.patients.get_mut(&patient.id) {
            Some(existing) if existing.tenant_id == tenant => {
                *existing = patient;
                Ok(())
            }
            _ => Err(StoreError::RecordMissing(patient.id)),
        }
    }

    async fn insert_therapist(
        &mut self,
        tenant: TenantId,
        therapist: Therapist,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(therapist.tenant_id, tenant);
        self.working.therapists.insert(therapist.id, therapist);
        Ok(())
    }

    async fn get_therapist(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<Therapist>, StoreError> {
        Ok(self
            .working
            .therapists
            .get(&id)
            .filter(|t| t.tenant_id == tenant)
            .cloned())
    }

    async fn insert_therapy_type(
        &mut self,
        tenant: TenantId,
        therapy_type: TherapyType,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(therapy_type.tenant_id, tenant);
        self.working
            .therapy_types
            .insert(therapy_type.id, therapy_type);
        Ok(())
    }

    async fn get_therapy_type(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<TherapyType>, StoreError> {
        Ok(self
            .working
            .therapy_types
            .get(&id)
            .filter(|t| t.tenant_id == tenant)
            .cloned())
    }

    async fn insert_pricing(
        &mut self,
        tenant: TenantId,
        pricing: TherapistPricing,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(pricing.tenant_id, tenant);
        self.working.pricing.insert(pricing.id, pricing);
        Ok(())
    }

    async fn find_active_pricing(
        &self,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
    ) -> Result<Option<TherapistPricing>, StoreError> {
        Ok(self
            .working
            .pricing
            .values()
            .find(|p| {
                p.tenant_id == tenant
                    && p.therapist_id == therapist_id
                    && p.therapy_type_id == therapy_type_id
                    && p.is_active
            })
            .cloned())
    }

    async fn insert_session(
        &mut self,
        tenant: TenantId,
        session: Session,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(session.tenant_id, tenant);
        self.working.sessions.insert(session.id, session);
        Ok(())
    }

    async fn get_session(&self, tenant: TenantId, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self
            .working
            .sessions
            .get(&id)
            .filter(|s| s.tenant_id == tenant)
            .cloned())
    }

    async fn update_session(
        &mut self,
        tenant: TenantId,
        session: Session,
    ) -> Result<(), StoreError> {
        match self.working.sessions.get_mut(&session.id) {
            Some(existing) if existing.tenant_id == tenant => {
                *existing = session;
                Ok(())
            }
            _ => Err(StoreError::RecordMissing(session.id)),
        }
    }

    async fn search_sessions(
        &self,
        tenant: TenantId,
        filter: &SessionFilter,
    ) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .working
            .sessions
            .values()
            .filter(|s| s.tenant_id == tenant)
            .filter(|s| filter.patient_id.map_or(true, |id| s.patient_id == id))
            .filter(|s| filter.therapist_id.map_or(true, |id| s.therapist_id == id))
            .filter(|s| {
                filter
                    .statuses
                    .as_ref()
                    .map_or(true, |statuses| statuses.contains(&s.status))
            })
            .filter(|s| filter.date.map_or(true, |d| s.date == d))
            .filter(|s| filter.from_date.map_or(true, |d| s.date >= d))
            .filter(|s| filter.to_date.map_or(true, |d| s.date <= d))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.date, s.start_time, s.id));
        Ok(sessions)
    }

    async fn insert_availability_rule(
        &mut self,
        tenant: TenantId,
        rule: TherapistAvailability,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(rule.tenant_id, tenant);
        self.working.availability_rules.insert(rule.id, rule);
        Ok(())
    }

    async fn get_availability_rule(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<TherapistAvailability>, StoreError> {
        Ok(self
            .working
            .availability_rules
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned())
    }

    async fn update_availability_rule(
        &mut self,
        tenant: TenantId,
        rule: TherapistAvailability,
    ) -> Result<(), StoreError> {
        match self.working.availability_rules.get_mut(&rule.id) {
            Some(existing) if existing.tenant_id == tenant => {
                *existing = rule;
                Ok(())
            }
            _ => Err(StoreError::RecordMissing(rule.id)),
        }
    }

    async fn list_availability_rules(
        &self,
        tenant: TenantId,
        therapist_id: Uuid,
    ) -> Result<Vec<TherapistAvailability>, StoreError> {
        let mut rules: Vec<TherapistAvailability> = self
            .working
            .availability_rules
            .values()
            .filter(|r| r.tenant_id == tenant && r.therapist_id == therapist_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.day_of_week, r.start_time, r.id));
        Ok(rules)
    }

    async fn insert_unavailability(
        &mut self,
        tenant: TenantId,
        period: TherapistUnavailability,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(period.tenant_id, tenant);
        self.working.unavailability.insert(period.id, period);
        Ok(())
    }

    async fn list_unavailability_on(
        &self,
        tenant: TenantId,
        therapist_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TherapistUnavailability>, StoreError> {
        let mut periods: Vec<TherapistUnavailability> = self
            .working
            .unavailability
            .values()
            .filter(|u| {
                u.tenant_id == tenant
                    && u.therapist_id == therapist_id
                    && u.start_date <= date
                    && date <= u.end_date
            })
            .cloned()
            .collect();
        periods.sort_by_key(|u| (u.start_date, u.id));
        Ok(periods)
    }

    async fn insert_reschedule_request(
        &mut self,
        tenant: TenantId,
        request: RescheduleRequest,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(request.tenant_id, tenant);
        self.working.reschedule_requests.insert(request.id, request);
        Ok(())
    }

    async fn get_reschedule_request(
        &self,
        tenant: TenantId,
        id: Uuid,
    ) -> Result<Option<RescheduleRequest>, StoreError> {
        Ok(self
            .working
            .reschedule_requests
            .get(&id)
            .filter(|r| r.tenant_id == tenant)
            .cloned())
    }

    async fn update_reschedule_request(
        &mut self,
        tenant: TenantId,
        request: RescheduleRequest,
    ) -> Result<(), StoreError> {
        match self.working.reschedule_requests.get_mut(&request.id) {
            Some(existing) if existing.tenant_id == tenant => {
                *existing = request;
                Ok(())
            }
            _ => Err(StoreError::RecordMissing(request.id)),
        }
    }

    async fn list_reschedule_requests(
        &self,
        tenant: TenantId,
        session_id: Uuid,
    ) -> Result<Vec<RescheduleRequest>, StoreError> {
        let mut requests: Vec<RescheduleRequest> = self
            .working
            .reschedule_requests
            .values()
            .filter(|r| r.tenant_id == tenant && r.session_id == session_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    async fn find_pending_reschedule(
        &self,
        tenant: TenantId,
        session_id: Uuid,
    ) -> Result<Option<RescheduleRequest>, StoreError> {
        Ok(self
            .working
            .reschedule_requests
            .values()
            .find(|r| {
                r.tenant_id == tenant
                    && r.session_id == session_id
                    && r.status == RescheduleStatus::Pending
            })
            .cloned())
    }

    async fn insert_invoice(
        &mut self,
        tenant: TenantId,
        invoice: Invoice,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(invoice.tenant_id, tenant);
        if invoice.status == InvoiceStatus::Active {
            let clash = self.working.invoices.values().any(|i| {
                i.tenant_id == tenant
                    && i.id != invoice.id
                    && i.status == InvoiceStatus::Active
                    && i.invoice_number == invoice.invoice_number
            });
            if clash {
                return Err(StoreError::DuplicateInvoiceNumber(invoice.invoice_number));
            }
        }
        self.working.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    async fn get_invoice(&self, tenant: TenantId, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .working
            .invoices
            .get(&id)
            .filter(|i| i.tenant_id == tenant)
            .cloned())
    }

    async fn update_invoice(
        &mut self,
        tenant: TenantId,
        invoice: Invoice,
    ) -> Result<(), StoreError> {
        match self.working.invoices.get_mut(&invoice.id) {
            Some(existing) if existing.tenant_id == tenant => {
                *existing = invoice;
                Ok(())
            }
            _ => Err(StoreError::RecordMissing(invoice.id)),
        }
    }

    async fn list_invoices_for_patient(
        &self,
        tenant: TenantId,
        patient_id: Uuid,
    ) -> Result<Vec<Invoice>, StoreError> {
        let mut invoices: Vec<Invoice> = self
            .working
            .invoices
            .values()
            .filter(|i| i.tenant_id == tenant && i.patient_id == patient_id)
            .cloned()
            .collect();
        invoices.sort_by_key(|i| (i.created_at, i.id));
        Ok(invoices)
    }

    async fn active_invoice_numbers(&self, tenant: TenantId) -> Result<Vec<String>, StoreError> {
        let mut numbers: Vec<String> = self
            .working
            .invoices
            .values()
            .filter(|i| i.tenant_id == tenant && i.status == InvoiceStatus::Active)
            .map(|i| i.invoice_number.clone())
            .collect();
        numbers.sort();
        Ok(numbers)
    }

    async fn insert_line_item(
        &mut self,
        tenant: TenantId,
        item: InvoiceLineItem,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(item.tenant_id, tenant);
        let claimed = self
            .working
            .line_items
            .values()
            .any(|li| li.tenant_id == tenant && li.session_id == item.session_id);
        if claimed {
            return Err(StoreError::DuplicateLineItem(item.session_id));
        }
        self.working.line_items.insert(item.id, item);
        Ok(())
    }

    async fn list_line_items(
        &self,
        tenant: TenantId,
        invoice_id: Uuid,
    ) -> Result<Vec<InvoiceLineItem>, StoreError> {
        let mut items: Vec<InvoiceLineItem> = self
            .working
            .line_items
            .values()
            .filter(|li| li.tenant_id == tenant && li.invoice_id == invoice_id)
            .cloned()
            .collect();
        items.sort_by_key(|li| (li.created_at, li.id));
        Ok(items)
    }

    async fn find_line_item_for_session(
        &self,
        tenant: TenantId,
        session_id: Uuid,
    ) -> Result<Option<InvoiceLineItem>, StoreError> {
        Ok(self
            .working
            .line_items
            .values()
            .find(|li| li.tenant_id == tenant && li.session_id == session_id)
            .cloned())
    }

    async fn delete_line_item(&mut self, tenant: TenantId, id: Uuid) -> Result<(), StoreError> {
        match self.working.line_items.get(&id) {
            Some(item) if item.tenant_id == tenant => {
                self.working.line_items.remove(&id);
                Ok(())
            }
            _ => Err(StoreError::RecordMissing(id)),
        }
    }

    async fn insert_payment(
        &mut self,
        tenant: TenantId,
        payment: PatientPayment,
    ) -> Result<(), StoreError> {
        debug_assert_eq!(payment.tenant_id, tenant);
        self.working.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
