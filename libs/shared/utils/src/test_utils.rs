use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use clinic_config::AppConfig;
use clinic_models::auth::Role;
use clinic_models::TenantId;
use clinic_store::{
    AuditEvent, AuditSink, Patient, Session, SessionStatus, Therapist, TherapistAvailability,
    TherapistPricing, TherapistUnavailability, TherapyType,
};

pub struct TestConfig {
    pub jwt_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: Role,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new(),
            email: "test@example.com".to_string(),
            role: Role::Patient,
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new(),
            email: email.to_string(),
            role,
        }
    }

    pub fn therapist(email: &str) -> Self {
        Self::new(email, Role::Therapist)
    }

    pub fn operator(email: &str) -> Self {
        Self::new(email, Role::Operator)
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, Role::Admin)
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, Role::Patient)
    }

    /// Same user pinned to a known tenant, for multi-user tests.
    pub fn in_tenant(mut self, tenant: TenantId) -> Self {
        self.tenant_id = tenant;
        self
    }

    /// Same user acting as a specific person record (therapist login that
    /// owns a therapist row, for example).
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "tenant_id": user.tenant_id,
            "role": user.role,
            "email": user.email,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Audit sink that keeps every event in memory so tests can assert on the
/// trail.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("valid test date")
}

pub fn time(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).expect("valid test time")
}

pub fn instant(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid test instant")
}

/// Record builders with workable defaults. Tests override what they care
/// about and seed through a store transaction.
pub mod seeds {
    use super::*;

    pub fn patient(tenant: TenantId) -> Patient {
        let now = Utc::now();
        Patient {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            full_name: "Alex Reed".to_string(),
            email: Some("alex.reed@example.com".to_string()),
            is_active: true,
            credit_balance: Decimal::ZERO,
            total_outstanding_dues: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn therapist(tenant: TenantId) -> Therapist {
        let now = Utc::now();
        Therapist {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            full_name: "Dr. Sam Hale".to_string(),
            email: Some("sam.hale@example.com".to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn therapy_type(
        tenant: TenantId,
        name: &str,
        default_cost: Decimal,
        default_duration_minutes: i32,
    ) -> TherapyType {
        let now = Utc::now();
        TherapyType {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            name: name.to_string(),
            default_cost,
            default_duration_minutes,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pricing(
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        cost: Decimal,
        duration_minutes: i32,
    ) -> TherapistPricing {
        let now = Utc::now();
        TherapistPricing {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            therapist_id,
            therapy_type_id,
            cost,
            duration_minutes,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn availability_rule(
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        day_of_week: i32,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> TherapistAvailability {
        let now = Utc::now();
        TherapistAvailability {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            therapist_id,
            therapy_type_id,
            day_of_week,
            start_time,
            end_time,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn unavailability(
        tenant: TenantId,
        therapist_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> TherapistUnavailability {
        TherapistUnavailability {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            therapist_id,
            start_date,
            end_date,
            start_time: None,
            end_time: None,
            reason: "Leave".to_string(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    pub fn session(
        tenant: TenantId,
        patient_id: Uuid,
        therapist_id: Uuid,
        therapy_type_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        cost: Decimal,
        status: SessionStatus,
    ) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            patient_id,
            therapist_id,
            therapy_type_id,
            date,
            start_time,
            end_time,
            status,
            cost,
            cancel_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}
