use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime};
use rust_decimal_macros::dec;
use uuid::Uuid;

use clinic_models::auth::{AuthContext, Role};
use clinic_models::TenantId;
use clinic_store::{ClinicStore, MemoryStore, Patient, RescheduleStatus, Session, SessionStatus};
use clinic_utils::clock::ManualClock;
use clinic_utils::state::AppState;
use clinic_utils::test_utils::{date, instant, seeds, time, RecordingAuditSink, TestConfig};
use scheduling_cell::models::{
    CancelSessionRequest, CreateRescheduleRequest, CreateSessionRequest, ReviewRescheduleRequest,
    SchedulingError, UpdateSessionRequest,
};
use scheduling_cell::services::reschedule::RescheduleWorkflowService;
use scheduling_cell::services::scheduler::SessionSchedulerService;

struct RescheduleTestEnv {
    state: AppState,
    store: MemoryStore,
    tenant: TenantId,
    operator: AuthContext,
    clock: Arc<ManualClock>,
    audit: Arc<RecordingAuditSink>,
}

fn setup() -> RescheduleTestEnv {
    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(instant("2026-03-01T12:00:00Z")));
    let audit = Arc::new(RecordingAuditSink::new());
    let tenant = TenantId::new();

    let state = AppState::new(
        TestConfig::default().to_app_config(),
        Arc::new(store.clone()),
        clock.clone(),
        audit.clone(),
    );

    let operator = AuthContext {
        user_id: Uuid::new_v4(),
        tenant_id: tenant,
        role: Role::Operator,
        email: Some("frontdesk@clinic.example".to_string()),
    };

    RescheduleTestEnv {
        state,
        store,
        tenant,
        operator,
        clock,
        audit,
    }
}

struct Seeded {
    patient: Patient,
    therapist_id: Uuid,
    therapy_type_id: Uuid,
}

/// Patient, therapist, 60-minute CBT at 200 and a Monday 9-12 rule.
/// 2026-03-02, 03-09 and 03-16 are Mondays.
async fn seed_calendar(env: &RescheduleTestEnv) -> Seeded {
    let patient = seeds::patient(env.tenant);
    let therapist = seeds::therapist(env.tenant);
    let therapy_type = seeds::therapy_type(env.tenant, "CBT", dec!(200), 60);
    let rule = seeds::availability_rule(
        env.tenant,
        therapist.id,
        therapy_type.id,
        1,
        time(9, 0),
        time(12, 0),
    );

    let mut tx = env.store.begin().await.unwrap();
    tx.insert_patient(env.tenant, patient.clone()).await.unwrap();
    tx.insert_therapist(env.tenant, therapist.clone())
        .await
        .unwrap();
    tx.insert_therapy_type(env.tenant, therapy_type.clone())
        .await
        .unwrap();
    tx.insert_availability_rule(env.tenant, rule).await.unwrap();
    tx.commit().await.unwrap();

    Seeded {
        patient,
        therapist_id: therapist.id,
        therapy_type_id: therapy_type.id,
    }
}

fn as_therapist(env: &RescheduleTestEnv, seeded: &Seeded) -> AuthContext {
    AuthContext {
        user_id: seeded.therapist_id,
        tenant_id: env.tenant,
        role: Role::Therapist,
        email: Some("sam.hale@example.com".to_string()),
    }
}

/// Session a week out, comfortably past the notice window.
async fn book(env: &RescheduleTestEnv, seeded: &Seeded, on: NaiveDate, start: NaiveTime) -> Session {
    let scheduler = SessionSchedulerService::new(&env.state);
    scheduler
        .create(
            &env.operator,
            CreateSessionRequest {
                patient_id: seeded.patient.id,
                therapist_id: seeded.therapist_id,
                therapy_type_id: seeded.therapy_type_id,
                date: on,
                start_time: start,
                end_time: None,
                notes: None,
            },
        )
        .await
        .unwrap()
}

fn reschedule_to(session_id: Uuid, on: NaiveDate, start: NaiveTime) -> CreateRescheduleRequest {
    CreateRescheduleRequest {
        session_id,
        requested_date: on,
        requested_start_time: start,
        requested_end_time: None,
        reason: "Schedule conflict".to_string(),
    }
}

// ==============================================================================
// FILING
// ==============================================================================

#[tokio::test]
async fn test_filing_defaults_end_to_preserve_duration() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);

    let request = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(session.id, date("2026-03-16"), time(14, 0)),
        )
        .await
        .unwrap();

    assert_eq!(request.status, RescheduleStatus::Pending);
    assert_eq!(request.therapist_id, seeded.therapist_id);
    assert_eq!(request.requested_end_time, time(15, 0));
    assert_eq!(request.reviewed_by, None);
    assert!(env.audit.actions().contains(&"reschedule.create".to_string()));
}

#[tokio::test]
async fn test_only_the_owning_therapist_may_file() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);

    // A different therapist login.
    let stranger = AuthContext {
        user_id: Uuid::new_v4(),
        tenant_id: env.tenant,
        role: Role::Therapist,
        email: None,
    };
    let err = workflow
        .create(
            &stranger,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::Forbidden(_));

    let err = workflow
        .create(
            &env.operator,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::Forbidden(_));

    let err = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(Uuid::new_v4(), date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::SessionNotFound);
}

#[tokio::test]
async fn test_only_scheduled_sessions_can_be_rescheduled() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let scheduler = SessionSchedulerService::new(&env.state);
    let workflow = RescheduleWorkflowService::new(&env.state);

    let completed = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    scheduler
        .update(
            &env.operator,
            completed.id,
            UpdateSessionRequest {
                status: Some(SessionStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(completed.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::SessionLocked);

    let cancelled = book(&env, &seeded, date("2026-03-16"), time(10, 0)).await;
    scheduler
        .cancel(
            &env.operator,
            cancelled.id,
            CancelSessionRequest { reason: None },
        )
        .await
        .unwrap();
    let err = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(cancelled.id, date("2026-03-23"), time(10, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::SessionLocked);
}

#[tokio::test]
async fn test_notice_window_closes_exactly_48_hours_out() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);
    let therapist = as_therapist(&env, &seeded);

    // Exactly 48 hours before the start still qualifies.
    env.clock.set(instant("2026-03-07T10:00:00Z"));
    let request = workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();
    workflow.cancel(&therapist, request.id).await.unwrap();

    // One minute later it does not.
    env.clock.advance(Duration::minutes(1));
    let err = workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::TooLateToReschedule(48));
}

#[tokio::test]
async fn test_one_pending_request_per_session() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);
    let therapist = as_therapist(&env, &seeded);

    let first = workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();

    let err = workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(11, 0)),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::PendingRequestExists);

    // A closed request no longer blocks a new one.
    workflow
        .reject(&env.operator, first.id, ReviewRescheduleRequest::default())
        .await
        .unwrap();
    workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(11, 0)),
        )
        .await
        .unwrap();
}

// ==============================================================================
// REVIEW
// ==============================================================================

#[tokio::test]
async fn test_approval_moves_the_session_and_trusts_the_reviewer() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let other_patient = seeds::patient(env.tenant);
    let mut tx = env.store.begin().await.unwrap();
    tx.insert_patient(env.tenant, other_patient.clone())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let scheduler = SessionSchedulerService::new(&env.state);
    let workflow = RescheduleWorkflowService::new(&env.state);

    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    // Another booking already sits on the requested slot.
    scheduler
        .create(
            &env.operator,
            CreateSessionRequest {
                patient_id: other_patient.id,
                therapist_id: seeded.therapist_id,
                therapy_type_id: seeded.therapy_type_id,
                date: date("2026-03-16"),
                start_time: time(10, 0),
                end_time: None,
                notes: None,
            },
        )
        .await
        .unwrap();

    let request = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();

    // The reviewer's approval stands in for availability and conflict
    // checks, so the move lands even on the occupied slot.
    let approved = workflow
        .approve(
            &env.operator,
            request.id,
            ReviewRescheduleRequest {
                notes: Some("double-booked deliberately, group slot".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(approved.status, RescheduleStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(env.operator.user_id));
    assert_eq!(
        approved.review_notes.as_deref(),
        Some("double-booked deliberately, group slot")
    );

    let moved = scheduler.get(&env.operator, session.id).await.unwrap();
    assert_eq!(moved.date, date("2026-03-16"));
    assert_eq!(moved.start_time, time(10, 0));
    assert_eq!(moved.end_time, time(11, 0));
    assert!(env.audit.actions().contains(&"reschedule.approve".to_string()));
}

#[tokio::test]
async fn test_rejection_leaves_the_session_alone() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let scheduler = SessionSchedulerService::new(&env.state);
    let workflow = RescheduleWorkflowService::new(&env.state);

    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let request = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(session.id, date("2026-03-16"), time(14, 0)),
        )
        .await
        .unwrap();

    let rejected = workflow
        .reject(
            &env.operator,
            request.id,
            ReviewRescheduleRequest {
                notes: Some("patient prefers the original slot".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, RescheduleStatus::Rejected);
    assert_eq!(rejected.reviewed_by, Some(env.operator.user_id));

    let untouched = scheduler.get(&env.operator, session.id).await.unwrap();
    assert_eq!(untouched.date, date("2026-03-09"));
    assert_eq!(untouched.start_time, time(10, 0));
    assert!(env.audit.actions().contains(&"reschedule.reject".to_string()));
}

#[tokio::test]
async fn test_review_requires_a_pending_request() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);

    let err = workflow
        .approve(
            &env.operator,
            Uuid::new_v4(),
            ReviewRescheduleRequest::default(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::RequestNotFound);

    let request = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();
    workflow
        .approve(&env.operator, request.id, ReviewRescheduleRequest::default())
        .await
        .unwrap();

    let err = workflow
        .approve(&env.operator, request.id, ReviewRescheduleRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::RequestNotPending);
    let err = workflow
        .reject(&env.operator, request.id, ReviewRescheduleRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::RequestNotPending);
}

#[tokio::test]
async fn test_approval_fails_once_the_session_closed() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let scheduler = SessionSchedulerService::new(&env.state);
    let workflow = RescheduleWorkflowService::new(&env.state);

    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let request = workflow
        .create(
            &as_therapist(&env, &seeded),
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();

    scheduler
        .cancel(&env.operator, session.id, CancelSessionRequest { reason: None })
        .await
        .unwrap();

    let err = workflow
        .approve(&env.operator, request.id, ReviewRescheduleRequest::default())
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::SessionLocked);

    // The failed approval must not have closed the request.
    let requests = workflow
        .list_for_session(&env.operator, session.id)
        .await
        .unwrap();
    assert_eq!(requests[0].status, RescheduleStatus::Pending);
}

// ==============================================================================
// WITHDRAWAL AND LISTING
// ==============================================================================

#[tokio::test]
async fn test_withdrawal_is_owner_only() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);
    let therapist = as_therapist(&env, &seeded);

    let request = workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();

    let err = workflow
        .cancel(&env.operator, request.id)
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::Forbidden(_));

    let withdrawn = workflow.cancel(&therapist, request.id).await.unwrap();
    assert_eq!(withdrawn.status, RescheduleStatus::Cancelled);
    assert!(env.audit.actions().contains(&"reschedule.cancel".to_string()));

    let err = workflow.cancel(&therapist, request.id).await.unwrap_err();
    assert_matches!(err, SchedulingError::RequestNotPending);
}

#[tokio::test]
async fn test_listing_is_scoped_to_staff_and_participants() {
    let env = setup();
    let seeded = seed_calendar(&env).await;
    let session = book(&env, &seeded, date("2026-03-09"), time(10, 0)).await;
    let workflow = RescheduleWorkflowService::new(&env.state);
    let therapist = as_therapist(&env, &seeded);

    let first = workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(10, 0)),
        )
        .await
        .unwrap();
    workflow
        .reject(&env.operator, first.id, ReviewRescheduleRequest::default())
        .await
        .unwrap();
    workflow
        .create(
            &therapist,
            reschedule_to(session.id, date("2026-03-16"), time(11, 0)),
        )
        .await
        .unwrap();

    // Oldest first, for staff and for both participants.
    let seen = workflow
        .list_for_session(&env.operator, session.id)
        .await
        .unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].status, RescheduleStatus::Rejected);
    assert_eq!(seen[1].status, RescheduleStatus::Pending);

    let patient_context = AuthContext {
        user_id: seeded.patient.id,
        tenant_id: env.tenant,
        role: Role::Patient,
        email: None,
    };
    assert_eq!(
        workflow
            .list_for_session(&patient_context, session.id)
            .await
            .unwrap()
            .len(),
        2
    );

    let outsider = AuthContext {
        user_id: Uuid::new_v4(),
        tenant_id: env.tenant,
        role: Role::Patient,
        email: None,
    };
    let err = workflow
        .list_for_session(&outsider, session.id)
        .await
        .unwrap_err();
    assert_matches!(err, SchedulingError::Forbidden(_));
}
