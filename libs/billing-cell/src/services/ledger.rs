// libs/billing-cell/src/services/ledger.rs
use std::sync::Arc;

use chrono::Datelike;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use clinic_models::auth::AuthContext;
use clinic_models::TenantId;
use clinic_store::{
    AuditEvent, AuditSink, ClinicStore, ClinicTx, Invoice, InvoiceLineItem, InvoiceStatus,
    PatientPayment, PaymentMethod, Session, SessionStatus, StoreError,
};
use clinic_utils::clock::Clock;
use clinic_utils::state::AppState;

use crate::models::{
    BillingError, CreateInvoiceRequest, InvoiceDetail, InvoiceOutcome, LedgerAdjustment,
    LedgerReversal, PatientBalances, PaymentOutcome, RecordPaymentRequest,
};
use crate::services::numbering::InvoiceNumbering;

/// The invoice ledger. Every mutation runs inside one store transaction;
/// patient balances are touched nowhere else, so
/// `total == paid + credit_used + outstanding` holds at creation and the
/// patient counters stay consistent with the invoices underneath them.
pub struct InvoiceLedgerService {
    store: Arc<dyn ClinicStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    numbering: InvoiceNumbering,
    max_number_attempts: u32,
}

impl InvoiceLedgerService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: Arc::clone(&state.store),
            clock: Arc::clone(&state.clock),
            audit: Arc::clone(&state.audit),
            numbering: InvoiceNumbering::new(),
            max_number_attempts: state.config.invoice_max_attempts,
        }
    }

    /// Turn a set of the patient's sessions into an invoice.
    ///
    /// The whole attempt runs in one transaction. Losing the invoice-number
    /// race abandons that transaction and retries the operation from the
    /// top with fresh reads, up to the configured attempt limit.
    pub async fn create_invoice(
        &self,
        context: &AuthContext,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceOutcome, BillingError> {
        info!(
            "Creating invoice for patient {} covering {} sessions",
            request.patient_id,
            request.session_ids.len()
        );

        // **Step 1: Validate the request shape before touching the store**
        self.validate_invoice_request(&request)?;

        // **Step 2: Attempt the transactional create, retrying number races**
        for attempt in 1..=self.max_number_attempts {
            match self.try_create_invoice(context, &request).await {
                Ok(outcome) => {
                    self.audit
                        .record(AuditEvent::new(
                            context.tenant_id,
                            context.user_id,
                            "invoice.create",
                            "invoice",
                            outcome.invoice.id,
                            json!({
                                "invoice_number": outcome.invoice.invoice_number,
                                "total_amount": outcome.invoice.total_amount,
                                "paid_amount": outcome.invoice.paid_amount,
                                "credit_used": outcome.invoice.credit_used,
                                "outstanding_amount": outcome.invoice.outstanding_amount,
                                "session_ids": request.session_ids,
                            }),
                        ))
                        .await;

                    info!(
                        "Invoice {} created for patient {} (total {}, outstanding {})",
                        outcome.invoice.invoice_number,
                        request.patient_id,
                        outcome.invoice.total_amount,
                        outcome.invoice.outstanding_amount
                    );
                    return Ok(outcome);
                }
                Err(BillingError::Store(StoreError::DuplicateInvoiceNumber(number)))
                    if attempt < self.max_number_attempts =>
                {
                    warn!(
                        "Invoice number {} lost the allocation race, retrying (attempt {}/{})",
                        number, attempt, self.max_number_attempts
                    );
                    let jitter = rand::thread_rng().gen_range(0..25u64);
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        20 * attempt as u64 + jitter,
                    ))
                    .await;
                }
                Err(BillingError::Store(StoreError::DuplicateInvoiceNumber(number))) => {
                    warn!(
                        "Invoice number {} still colliding after {} attempts, giving up",
                        number, self.max_number_attempts
                    );
                    return Err(BillingError::InvoiceNumberExhausted(
                        self.max_number_attempts,
                    ));
                }
                Err(other) => return Err(other),
            }
        }

        Err(BillingError::InvoiceNumberExhausted(
            self.max_number_attempts,
        ))
    }

    /// Reverse one cancelled session out of the ledger, inside the caller's
    /// transaction so the cancellation and its financial effect commit or
    /// roll back together.
    ///
    /// Settled invoice: the session's cost comes back as patient credit.
    /// Open invoice: outstanding shrinks by at most what is still owed.
    /// When the invoice loses its last line item it is voided, freeing its
    /// number for reuse.
    pub async fn reverse_for_cancelled_session(
        &self,
        tx: &mut dyn ClinicTx,
        tenant: TenantId,
        session: &Session,
    ) -> Result<LedgerReversal, BillingError> {
        let Some(line_item) = tx.find_line_item_for_session(tenant, session.id).await? else {
            debug!("Session {} is uninvoiced, nothing to reverse", session.id);
            return Ok(LedgerReversal::untouched());
        };

        let mut invoice = tx
            .get_invoice(tenant, line_item.invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound)?;
        let mut patient = tx
            .get_patient(tenant, session.patient_id)
            .await?
            .ok_or(BillingError::PatientNotFound)?;

        let now = self.clock.now();

        let reversal = if invoice.outstanding_amount.is_zero() {
            // Fully settled: money already changed hands, so the patient
            // gets the session's cost back as spendable credit.
            patient.credit_balance += session.cost;
            invoice.total_amount -= session.cost;
            LedgerReversal {
                credit_added: session.cost,
                dues_reduced: Decimal::ZERO,
                adjustment: LedgerAdjustment::Credit,
            }
        } else {
            // Still owed: forgive dues first, clamped to what is actually
            // outstanding so neither counter can go negative.
            let reduced = session.cost.min(invoice.outstanding_amount);
            invoice.outstanding_amount -= reduced;
            invoice.total_amount -= session.cost;
            patient.total_outstanding_dues -= reduced;
            LedgerReversal {
                credit_added: Decimal::ZERO,
                dues_reduced: reduced,
                adjustment: LedgerAdjustment::Dues,
            }
        };

        tx.delete_line_item(tenant, line_item.id).await?;

        let remaining = tx.list_line_items(tenant, invoice.id).await?;
        if remaining.is_empty() {
            debug!(
                "Invoice {} has no line items left, voiding it",
                invoice.invoice_number
            );
            invoice.status = InvoiceStatus::Void;
            invoice.total_amount = Decimal::ZERO;
            invoice.outstanding_amount = Decimal::ZERO;
        }

        invoice.updated_at = now;
        patient.updated_at = now;
        tx.update_invoice(tenant, invoice).await?;
        tx.update_patient(tenant, patient).await?;

        info!(
            "Reversed session {} from the ledger ({}: credit +{}, dues -{})",
            session.id, reversal.adjustment, reversal.credit_added, reversal.dues_reduced
        );
        Ok(reversal)
    }

    /// Record a payment taken outside invoice creation. A `credit` payment
    /// tops up the patient's spendable balance; cash and card are only
    /// written down.
    pub async fn record_payment(
        &self,
        context: &AuthContext,
        request: RecordPaymentRequest,
    ) -> Result<PaymentOutcome, BillingError> {
        if request.amount <= Decimal::ZERO {
            return Err(BillingError::InvalidPaymentAmount);
        }

        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        let mut patient = tx
            .get_patient(tenant, request.patient_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(BillingError::PatientNotFound)?;

        let now = self.clock.now();
        let payment = PatientPayment {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            patient_id: request.patient_id,
            amount: request.amount,
            method: request.method,
            notes: request.notes,
            recorded_by: context.user_id,
            created_at: now,
        };
        tx.insert_payment(tenant, payment.clone()).await?;

        if request.method == PaymentMethod::Credit {
            patient.credit_balance += request.amount;
            patient.updated_at = now;
            tx.update_patient(tenant, patient.clone()).await?;
        }

        tx.commit().await?;

        self.audit
            .record(AuditEvent::new(
                tenant,
                context.user_id,
                "payment.record",
                "payment",
                payment.id,
                json!({
                    "patient_id": payment.patient_id,
                    "amount": payment.amount,
                    "method": payment.method,
                }),
            ))
            .await;

        info!(
            "Recorded {} payment of {} for patient {}",
            payment.method, payment.amount, payment.patient_id
        );
        Ok(PaymentOutcome {
            payment,
            patient_balances: PatientBalances {
                credit_balance: patient.credit_balance,
                total_outstanding_dues: patient.total_outstanding_dues,
            },
        })
    }

    pub async fn get_invoice(
        &self,
        context: &AuthContext,
        invoice_id: Uuid,
    ) -> Result<InvoiceDetail, BillingError> {
        let tenant = context.tenant_id;
        let tx = self.store.begin().await?;

        let invoice = tx
            .get_invoice(tenant, invoice_id)
            .await?
            .ok_or(BillingError::InvoiceNotFound)?;
        let line_items = tx.list_line_items(tenant, invoice_id).await?;

        Ok(InvoiceDetail {
            invoice,
            line_items,
        })
    }

    pub async fn list_invoices_for_patient(
        &self,
        context: &AuthContext,
        patient_id: Uuid,
    ) -> Result<Vec<Invoice>, BillingError> {
        let tenant = context.tenant_id;
        let tx = self.store.begin().await?;

        if tx.get_patient(tenant, patient_id).await?.is_none() {
            return Err(BillingError::PatientNotFound);
        }

        Ok(tx.list_invoices_for_patient(tenant, patient_id).await?)
    }

    // ==============================================================================
    // PRIVATE HELPERS
    // ==============================================================================

    fn validate_invoice_request(&self, request: &CreateInvoiceRequest) -> Result<(), BillingError> {
        if request.session_ids.is_empty() {
            return Err(BillingError::NoSessionsSelected);
        }

        for (index, id) in request.session_ids.iter().enumerate() {
            if request.session_ids[..index].contains(id) {
                return Err(BillingError::DuplicateSessionSelected(*id));
            }
        }

        if request.paid_amount < Decimal::ZERO || request.credit_used < Decimal::ZERO {
            return Err(BillingError::NegativeAmount);
        }

        Ok(())
    }

    /// One transactional attempt: reads, money checks, number allocation
    /// and all writes. Any error drops the transaction uncommitted.
    async fn try_create_invoice(
        &self,
        context: &AuthContext,
        request: &CreateInvoiceRequest,
    ) -> Result<InvoiceOutcome, BillingError> {
        let tenant = context.tenant_id;
        let mut tx = self.store.begin().await?;

        // **Step 1: Patient must exist and be active**
        let mut patient = tx
            .get_patient(tenant, request.patient_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(BillingError::PatientNotFound)?;

        // **Step 2: Collect the sessions and check each is billable**
        let mut sessions = Vec::with_capacity(request.session_ids.len());
        for session_id in &request.session_ids {
            let session = tx
                .get_session(tenant, *session_id)
                .await?
                .ok_or(BillingError::SessionsInvalid(*session_id))?;

            if session.patient_id != request.patient_id
                || session.status == SessionStatus::Cancelled
            {
                return Err(BillingError::SessionsInvalid(*session_id));
            }
            if tx
                .find_line_item_for_session(tenant, *session_id)
                .await?
                .is_some()
            {
                return Err(BillingError::AlreadyInvoiced(*session_id));
            }
            sessions.push(session);
        }

        // **Step 3: Total from the creation-time cost snapshots**
        let total: Decimal = sessions.iter().map(|s| s.cost).sum();

        // **Step 4: Money checks against the patient's balances**
        if request.credit_used > patient.credit_balance {
            return Err(BillingError::InsufficientCredit);
        }
        if request.credit_used > total {
            return Err(BillingError::CreditExceedsTotal);
        }
        if request.paid_amount + request.credit_used > total {
            return Err(BillingError::PaymentExceedsTotal);
        }
        let outstanding = total - request.paid_amount - request.credit_used;

        // **Step 5: Allocate the next invoice number for this year**
        let year = self.clock.now().year();
        let active_numbers = tx.active_invoice_numbers(tenant).await?;
        let invoice_number = self.numbering.next(&active_numbers, year);
        debug!(
            "Allocating invoice number {} for patient {}",
            invoice_number, request.patient_id
        );

        // **Step 6: Persist the invoice; a number collision surfaces here**
        let now = self.clock.now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            patient_id: request.patient_id,
            invoice_number,
            total_amount: total,
            paid_amount: request.paid_amount,
            credit_used: request.credit_used,
            outstanding_amount: outstanding,
            payment_method: request.payment_method,
            status: InvoiceStatus::Active,
            notes: request.notes.clone(),
            confirmed_by: Some(context.user_id),
            created_at: now,
            updated_at: now,
        };
        tx.insert_invoice(tenant, invoice.clone()).await?;

        // **Step 7: One line item per session**
        let mut line_items = Vec::with_capacity(sessions.len());
        for session in &sessions {
            let description = match tx.get_therapy_type(tenant, session.therapy_type_id).await? {
                Some(therapy_type) => format!("{} on {}", therapy_type.name, session.date),
                None => format!("Session on {}", session.date),
            };
            let item = InvoiceLineItem {
                id: Uuid::new_v4(),
                tenant_id: tenant,
                invoice_id: invoice.id,
                session_id: session.id,
                cost: session.cost,
                description,
                created_at: now,
            };
            tx.insert_line_item(tenant, item.clone())
                .await
                .map_err(|err| match err {
                    // A concurrent invoice claimed the session first.
                    StoreError::DuplicateLineItem(session_id) => {
                        BillingError::AlreadyInvoiced(session_id)
                    }
                    other => BillingError::Store(other),
                })?;
            line_items.push(item);
        }

        // **Step 8: Move the patient's counters**
        patient.credit_balance -= request.credit_used;
        patient.total_outstanding_dues += outstanding;
        patient.updated_at = now;
        tx.update_patient(tenant, patient.clone()).await?;

        tx.commit().await?;

        Ok(InvoiceOutcome {
            invoice,
            line_items,
            patient_balances: PatientBalances {
                credit_balance: patient.credit_balance,
                total_outstanding_dues: patient.total_outstanding_dues,
            },
        })
    }
}
