use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use billing_cell::models::{
    BillingError, CreateInvoiceRequest, LedgerAdjustment, LedgerReversal, RecordPaymentRequest,
};
use billing_cell::services::ledger::InvoiceLedgerService;
use clinic_models::auth::{AuthContext, Role};
use clinic_models::TenantId;
use clinic_store::{
    AuditEvent, AuditSink, ClinicStore, InvoiceStatus, MemoryStore, Patient, PaymentMethod,
    SessionStatus,
};
use clinic_utils::clock::ManualClock;
use clinic_utils::state::AppState;
use clinic_utils::test_utils::{date, instant, seeds, time, RecordingAuditSink, TestConfig};

struct LedgerTestEnv {
    state: AppState,
    store: MemoryStore,
    tenant: TenantId,
    context: AuthContext,
    audit: Arc<RecordingAuditSink>,
}

fn setup() -> LedgerTestEnv {
    let store = MemoryStore::new();
    let clock = ManualClock::new(instant("2026-03-01T12:00:00Z"));
    let audit = Arc::new(RecordingAuditSink::new());
    let tenant = TenantId::new();

    let state = AppState::new(
        TestConfig::default().to_app_config(),
        Arc::new(store.clone()),
        Arc::new(clock),
        audit.clone(),
    );

    let context = AuthContext {
        user_id: Uuid::new_v4(),
        tenant_id: tenant,
        role: Role::Operator,
        email: Some("frontdesk@clinic.example".to_string()),
    };

    LedgerTestEnv {
        state,
        store,
        tenant,
        context,
        audit,
    }
}

struct Seeded {
    patient: Patient,
    therapist_id: Uuid,
    therapy_type_id: Uuid,
}

async fn seed_people(env: &LedgerTestEnv, credit_balance: Decimal) -> Seeded {
    let mut patient = seeds::patient(env.tenant);
    patient.credit_balance = credit_balance;
    let therapist = seeds::therapist(env.tenant);
    let therapy_type = seeds::therapy_type(env.tenant, "CBT", dec!(200), 60);

    let mut tx = env.store.begin().await.unwrap();
    tx.insert_patient(env.tenant, patient.clone()).await.unwrap();
    tx.insert_therapist(env.tenant, therapist.clone())
        .await
        .unwrap();
    tx.insert_therapy_type(env.tenant, therapy_type.clone())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    Seeded {
        patient,
        therapist_id: therapist.id,
        therapy_type_id: therapy_type.id,
    }
}

async fn add_session(env: &LedgerTestEnv, seeded: &Seeded, cost: Decimal) -> Uuid {
    add_session_with_status(env, seeded, cost, SessionStatus::Scheduled).await
}

async fn add_session_with_status(
    env: &LedgerTestEnv,
    seeded: &Seeded,
    cost: Decimal,
    status: SessionStatus,
) -> Uuid {
    let session = seeds::session(
        env.tenant,
        seeded.patient.id,
        seeded.therapist_id,
        seeded.therapy_type_id,
        date("2026-03-02"),
        time(9, 0),
        time(10, 0),
        cost,
        status,
    );
    let id = session.id;

    let mut tx = env.store.begin().await.unwrap();
    tx.insert_session(env.tenant, session).await.unwrap();
    tx.commit().await.unwrap();
    id
}

fn invoice_request(patient_id: Uuid, session_ids: Vec<Uuid>) -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        patient_id,
        session_ids,
        paid_amount: Decimal::ZERO,
        credit_used: Decimal::ZERO,
        payment_method: PaymentMethod::Cash,
        notes: None,
    }
}

// ==============================================================================
// INVOICE CREATION
// ==============================================================================

#[tokio::test]
async fn test_invoice_arithmetic_holds_at_creation() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session_a = add_session(&env, &seeded, dec!(100)).await;
    let session_b = add_session(&env, &seeded, dec!(80)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(100),
        ..invoice_request(seeded.patient.id, vec![session_a, session_b])
    };
    let outcome = ledger.create_invoice(&env.context, request).await.unwrap();

    let invoice = &outcome.invoice;
    assert_eq!(invoice.invoice_number, "INV-2026-001");
    assert_eq!(invoice.total_amount, dec!(180));
    assert_eq!(invoice.paid_amount, dec!(100));
    assert_eq!(invoice.credit_used, Decimal::ZERO);
    assert_eq!(invoice.outstanding_amount, dec!(80));
    assert_eq!(
        invoice.total_amount,
        invoice.paid_amount + invoice.credit_used + invoice.outstanding_amount
    );
    assert_eq!(invoice.status, InvoiceStatus::Active);

    assert_eq!(outcome.line_items.len(), 2);
    assert!(outcome.line_items[0].description.contains("CBT"));

    assert_eq!(outcome.patient_balances.credit_balance, Decimal::ZERO);
    assert_eq!(outcome.patient_balances.total_outstanding_dues, dec!(80));

    assert!(env.audit.actions().contains(&"invoice.create".to_string()));
}

#[tokio::test]
async fn test_credit_and_cash_settle_invoice_in_full() {
    // Patient holds 300 of credit and books two 200 sessions; paying 100
    // cash plus all the credit settles the 400 invoice completely.
    let env = setup();
    let seeded = seed_people(&env, dec!(300)).await;
    let session_a = add_session(&env, &seeded, dec!(200)).await;
    let session_b = add_session(&env, &seeded, dec!(200)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(100),
        credit_used: dec!(300),
        payment_method: PaymentMethod::Card,
        ..invoice_request(seeded.patient.id, vec![session_a, session_b])
    };
    let outcome = ledger.create_invoice(&env.context, request).await.unwrap();

    assert_eq!(outcome.invoice.total_amount, dec!(400));
    assert_eq!(outcome.invoice.outstanding_amount, Decimal::ZERO);
    assert_eq!(outcome.patient_balances.credit_balance, Decimal::ZERO);
    assert_eq!(
        outcome.patient_balances.total_outstanding_dues,
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_sequential_invoices_number_in_order() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    for expected in ["INV-2026-001", "INV-2026-002", "INV-2026-003"] {
        let session = add_session(&env, &seeded, dec!(50)).await;
        let outcome = ledger
            .create_invoice(
                &env.context,
                invoice_request(seeded.patient.id, vec![session]),
            )
            .await
            .unwrap();
        assert_eq!(outcome.invoice.invoice_number, expected);
    }
}

#[tokio::test]
async fn test_concurrent_invoice_creations_get_distinct_numbers() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let mut session_ids = Vec::new();
    for _ in 0..4 {
        session_ids.push(add_session(&env, &seeded, dec!(75)).await);
    }
    let ledger = InvoiceLedgerService::new(&env.state);

    let outcomes = join_all(session_ids.iter().map(|session_id| {
        ledger.create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![*session_id]),
        )
    }))
    .await;

    let mut numbers: Vec<String> = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap().invoice.invoice_number)
        .collect();
    numbers.sort();
    assert_eq!(
        numbers,
        vec![
            "INV-2026-001",
            "INV-2026-002",
            "INV-2026-003",
            "INV-2026-004"
        ]
    );
}

// ==============================================================================
// INVOICE CREATION FAILURES
// ==============================================================================

#[tokio::test]
async fn test_invoice_requires_sessions() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let err = ledger
        .create_invoice(&env.context, invoice_request(seeded.patient.id, vec![]))
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::NoSessionsSelected);
}

#[tokio::test]
async fn test_invoice_rejects_duplicate_session_selection() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let err = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![session, session]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::DuplicateSessionSelected(id) if id == session);
}

#[tokio::test]
async fn test_invoice_rejects_negative_amounts() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(-1),
        ..invoice_request(seeded.patient.id, vec![session])
    };
    let err = ledger
        .create_invoice(&env.context, request)
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::NegativeAmount);
}

#[tokio::test]
async fn test_invoice_requires_active_patient() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    // Unknown patient id.
    let err = ledger
        .create_invoice(&env.context, invoice_request(Uuid::new_v4(), vec![session]))
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::PatientNotFound);

    // Deactivated patient.
    let mut deactivated = seeded.patient.clone();
    deactivated.is_active = false;
    let mut tx = env.store.begin().await.unwrap();
    tx.update_patient(env.tenant, deactivated).await.unwrap();
    tx.commit().await.unwrap();

    let err = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![session]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::PatientNotFound);
}

#[tokio::test]
async fn test_invoice_rejects_foreign_and_cancelled_sessions() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let other = seed_people(&env, Decimal::ZERO).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    // Session belonging to a different patient.
    let foreign = add_session(&env, &other, dec!(100)).await;
    let err = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![foreign]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::SessionsInvalid(id) if id == foreign);

    // Cancelled session.
    let cancelled =
        add_session_with_status(&env, &seeded, dec!(100), SessionStatus::Cancelled).await;
    let err = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![cancelled]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::SessionsInvalid(id) if id == cancelled);
}

#[tokio::test]
async fn test_session_can_only_be_invoiced_once() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![session]),
        )
        .await
        .unwrap();

    let err = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![session]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::AlreadyInvoiced(id) if id == session);
}

#[tokio::test]
async fn test_invoice_money_limits() {
    let env = setup();
    let seeded = seed_people(&env, dec!(300)).await;
    let session = add_session(&env, &seeded, dec!(200)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    // More credit than the patient holds.
    let request = CreateInvoiceRequest {
        credit_used: dec!(301),
        ..invoice_request(seeded.patient.id, vec![session])
    };
    let err = ledger
        .create_invoice(&env.context, request)
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::InsufficientCredit);

    // More credit than the invoice total.
    let request = CreateInvoiceRequest {
        credit_used: dec!(250),
        ..invoice_request(seeded.patient.id, vec![session])
    };
    let err = ledger
        .create_invoice(&env.context, request)
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::CreditExceedsTotal);

    // Paid plus credit over the total is rejected, never clamped.
    let request = CreateInvoiceRequest {
        paid_amount: dec!(150),
        credit_used: dec!(100),
        ..invoice_request(seeded.patient.id, vec![session])
    };
    let err = ledger
        .create_invoice(&env.context, request)
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::PaymentExceedsTotal);
}

#[tokio::test]
async fn test_failed_create_leaves_ledger_untouched() {
    let env = setup();
    let seeded = seed_people(&env, dec!(50)).await;
    let invoiced = add_session(&env, &seeded, dec!(100)).await;
    let fresh = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![invoiced]),
        )
        .await
        .unwrap();

    // The fresh session is checked before the already-invoiced one, so the
    // attempt fails partway through its reads.
    let request = CreateInvoiceRequest {
        credit_used: dec!(50),
        ..invoice_request(seeded.patient.id, vec![fresh, invoiced])
    };
    let err = ledger
        .create_invoice(&env.context, request)
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::AlreadyInvoiced(_));

    // Nothing from the failed attempt is visible.
    let tx = env.store.begin().await.unwrap();
    let patient = tx
        .get_patient(env.tenant, seeded.patient.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.credit_balance, dec!(50));
    assert_eq!(patient.total_outstanding_dues, dec!(100));
    assert!(tx
        .find_line_item_for_session(env.tenant, fresh)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        tx.active_invoice_numbers(env.tenant).await.unwrap().len(),
        1
    );
}

// ==============================================================================
// CANCELLATION REVERSAL
// ==============================================================================

async fn reverse_session(
    env: &LedgerTestEnv,
    ledger: &InvoiceLedgerService,
    session_id: Uuid,
) -> LedgerReversal {
    let mut tx = env.store.begin().await.unwrap();
    let session = tx
        .get_session(env.tenant, session_id)
        .await
        .unwrap()
        .unwrap();
    let reversal = ledger
        .reverse_for_cancelled_session(tx.as_mut(), env.tenant, &session)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    reversal
}

#[tokio::test]
async fn test_cancelling_settled_session_returns_cost_as_credit() {
    // Settled 400 invoice over two 200 sessions; reversing one hands the
    // 200 back as credit and keeps the other line item billed.
    let env = setup();
    let seeded = seed_people(&env, dec!(300)).await;
    let session_a = add_session(&env, &seeded, dec!(200)).await;
    let session_b = add_session(&env, &seeded, dec!(200)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(100),
        credit_used: dec!(300),
        ..invoice_request(seeded.patient.id, vec![session_a, session_b])
    };
    let outcome = ledger.create_invoice(&env.context, request).await.unwrap();

    let reversal = reverse_session(&env, &ledger, session_a).await;
    assert_eq!(reversal.adjustment, LedgerAdjustment::Credit);
    assert_eq!(reversal.credit_added, dec!(200));
    assert_eq!(reversal.dues_reduced, Decimal::ZERO);

    let detail = ledger
        .get_invoice(&env.context, outcome.invoice.id)
        .await
        .unwrap();
    assert_eq!(detail.invoice.status, InvoiceStatus::Active);
    assert_eq!(detail.invoice.total_amount, dec!(200));
    assert_eq!(detail.line_items.len(), 1);
    assert_eq!(detail.line_items[0].session_id, session_b);

    let tx = env.store.begin().await.unwrap();
    let patient = tx
        .get_patient(env.tenant, seeded.patient.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.credit_balance, dec!(200));
}

#[tokio::test]
async fn test_cancelling_unpaid_session_reduces_outstanding() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session_a = add_session(&env, &seeded, dec!(200)).await;
    let session_b = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(50),
        ..invoice_request(seeded.patient.id, vec![session_a, session_b])
    };
    let outcome = ledger.create_invoice(&env.context, request).await.unwrap();
    assert_eq!(outcome.invoice.outstanding_amount, dec!(250));

    let reversal = reverse_session(&env, &ledger, session_a).await;
    assert_eq!(reversal.adjustment, LedgerAdjustment::Dues);
    assert_eq!(reversal.dues_reduced, dec!(200));
    assert_eq!(reversal.credit_added, Decimal::ZERO);

    let detail = ledger
        .get_invoice(&env.context, outcome.invoice.id)
        .await
        .unwrap();
    assert_eq!(detail.invoice.outstanding_amount, dec!(50));
    assert_eq!(detail.invoice.total_amount, dec!(100));

    let tx = env.store.begin().await.unwrap();
    let patient = tx
        .get_patient(env.tenant, seeded.patient.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.total_outstanding_dues, dec!(50));
    assert_eq!(patient.credit_balance, Decimal::ZERO);
}

#[tokio::test]
async fn test_dues_reduction_clamps_to_outstanding() {
    // Mostly-paid invoice: outstanding 40 is less than the 200 session
    // being reversed, so only 40 of dues comes off.
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session_a = add_session(&env, &seeded, dec!(200)).await;
    let session_b = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(260),
        ..invoice_request(seeded.patient.id, vec![session_a, session_b])
    };
    ledger.create_invoice(&env.context, request).await.unwrap();

    let reversal = reverse_session(&env, &ledger, session_a).await;
    assert_eq!(reversal.adjustment, LedgerAdjustment::Dues);
    assert_eq!(reversal.dues_reduced, dec!(40));

    let tx = env.store.begin().await.unwrap();
    let patient = tx
        .get_patient(env.tenant, seeded.patient.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.total_outstanding_dues, Decimal::ZERO);
}

#[tokio::test]
async fn test_reversing_last_line_item_voids_invoice_and_frees_number() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let request = CreateInvoiceRequest {
        paid_amount: dec!(100),
        ..invoice_request(seeded.patient.id, vec![session])
    };
    let outcome = ledger.create_invoice(&env.context, request).await.unwrap();
    assert_eq!(outcome.invoice.invoice_number, "INV-2026-001");

    let reversal = reverse_session(&env, &ledger, session).await;
    assert_eq!(reversal.adjustment, LedgerAdjustment::Credit);

    let detail = ledger
        .get_invoice(&env.context, outcome.invoice.id)
        .await
        .unwrap();
    assert_eq!(detail.invoice.status, InvoiceStatus::Void);
    assert_eq!(detail.invoice.total_amount, Decimal::ZERO);
    assert_eq!(detail.invoice.outstanding_amount, Decimal::ZERO);
    assert!(detail.line_items.is_empty());

    // The voided number is no longer active, so the next invoice takes it.
    let next_session = add_session(&env, &seeded, dec!(50)).await;
    let next = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![next_session]),
        )
        .await
        .unwrap();
    assert_eq!(next.invoice.invoice_number, "INV-2026-001");
}

#[tokio::test]
async fn test_uninvoiced_session_reversal_is_a_no_op() {
    let env = setup();
    let seeded = seed_people(&env, dec!(70)).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let reversal = reverse_session(&env, &ledger, session).await;
    assert_eq!(reversal.adjustment, LedgerAdjustment::None);
    assert_eq!(reversal.credit_added, Decimal::ZERO);
    assert_eq!(reversal.dues_reduced, Decimal::ZERO);

    let tx = env.store.begin().await.unwrap();
    let patient = tx
        .get_patient(env.tenant, seeded.patient.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.credit_balance, dec!(70));
}

// ==============================================================================
// PAYMENTS AND READS
// ==============================================================================

#[tokio::test]
async fn test_credit_payment_tops_up_balance() {
    let env = setup();
    let seeded = seed_people(&env, dec!(10)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let outcome = ledger
        .record_payment(
            &env.context,
            RecordPaymentRequest {
                patient_id: seeded.patient.id,
                amount: dec!(150),
                method: PaymentMethod::Credit,
                notes: Some("Front desk top-up".to_string()),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.patient_balances.credit_balance, dec!(160));
    assert_eq!(outcome.payment.recorded_by, env.context.user_id);
    assert!(env.audit.actions().contains(&"payment.record".to_string()));
}

#[tokio::test]
async fn test_cash_payment_leaves_credit_balance_alone() {
    let env = setup();
    let seeded = seed_people(&env, dec!(10)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let outcome = ledger
        .record_payment(
            &env.context,
            RecordPaymentRequest {
                patient_id: seeded.patient.id,
                amount: dec!(80),
                method: PaymentMethod::Cash,
                notes: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.patient_balances.credit_balance, dec!(10));
}

#[tokio::test]
async fn test_payment_amount_must_be_positive() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    for amount in [Decimal::ZERO, dec!(-5)] {
        let err = ledger
            .record_payment(
                &env.context,
                RecordPaymentRequest {
                    patient_id: seeded.patient.id,
                    amount,
                    method: PaymentMethod::Cash,
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, BillingError::InvalidPaymentAmount);
    }
}

#[tokio::test]
async fn test_invoices_are_tenant_scoped() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let session = add_session(&env, &seeded, dec!(100)).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    let outcome = ledger
        .create_invoice(
            &env.context,
            invoice_request(seeded.patient.id, vec![session]),
        )
        .await
        .unwrap();

    let foreign_context = AuthContext {
        tenant_id: TenantId::new(),
        ..env.context.clone()
    };
    let err = ledger
        .get_invoice(&foreign_context, outcome.invoice.id)
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::InvoiceNotFound);
}

#[tokio::test]
async fn test_list_invoices_for_patient() {
    let env = setup();
    let seeded = seed_people(&env, Decimal::ZERO).await;
    let ledger = InvoiceLedgerService::new(&env.state);

    for _ in 0..2 {
        let session = add_session(&env, &seeded, dec!(100)).await;
        ledger
            .create_invoice(
                &env.context,
                invoice_request(seeded.patient.id, vec![session]),
            )
            .await
            .unwrap();
    }

    let invoices = ledger
        .list_invoices_for_patient(&env.context, seeded.patient.id)
        .await
        .unwrap();
    assert_eq!(invoices.len(), 2);

    let err = ledger
        .list_invoices_for_patient(&env.context, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, BillingError::PatientNotFound);
}

// ==============================================================================
// AUDIT CONTRACT
// ==============================================================================

mockall::mock! {
    AuditRecorder {}

    #[async_trait]
    impl AuditSink for AuditRecorder {
        async fn record(&self, event: AuditEvent);
    }
}

#[tokio::test]
async fn test_invoice_creation_emits_exactly_one_audit_event() {
    let store = MemoryStore::new();
    let tenant = TenantId::new();

    let mut mock_audit = MockAuditRecorder::new();
    mock_audit
        .expect_record()
        .withf(|event| event.action == "invoice.create" && event.entity_type == "invoice")
        .times(1)
        .return_const(());

    let state = AppState::new(
        TestConfig::default().to_app_config(),
        Arc::new(store.clone()),
        Arc::new(ManualClock::new(instant("2026-03-01T12:00:00Z"))),
        Arc::new(mock_audit),
    );
    let context = AuthContext {
        user_id: Uuid::new_v4(),
        tenant_id: tenant,
        role: Role::Admin,
        email: None,
    };

    let patient = seeds::patient(tenant);
    let therapist = seeds::therapist(tenant);
    let therapy_type = seeds::therapy_type(tenant, "EMDR", dec!(120), 90);
    let session = seeds::session(
        tenant,
        patient.id,
        therapist.id,
        therapy_type.id,
        date("2026-03-02"),
        time(9, 0),
        time(10, 30),
        dec!(120),
        SessionStatus::Scheduled,
    );
    let session_id = session.id;
    let mut tx = store.begin().await.unwrap();
    tx.insert_patient(tenant, patient.clone()).await.unwrap();
    tx.insert_therapist(tenant, therapist).await.unwrap();
    tx.insert_therapy_type(tenant, therapy_type).await.unwrap();
    tx.insert_session(tenant, session).await.unwrap();
    tx.commit().await.unwrap();

    let ledger = InvoiceLedgerService::new(&state);
    ledger
        .create_invoice(&context, invoice_request(patient.id, vec![session_id]))
        .await
        .unwrap();
}
