use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::tenant::TenantId;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub role: Role,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Operator,
    Therapist,
    Patient,
}

impl Role {
    /// Back-office staff see and manage every calendar in the tenant.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator)
    }

    /// Reschedule requests are reviewed by back-office staff.
    pub fn can_review_reschedules(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator)
    }

    pub fn can_manage_billing(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator)
    }

    pub fn can_manage_availability(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator | Role::Therapist)
    }

    /// Who may book sessions for any patient. Patients can still book for
    /// themselves; handlers check that separately.
    pub fn can_manage_sessions(&self) -> bool {
        matches!(self, Role::Admin | Role::Operator | Role::Therapist)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Therapist => "therapist",
            Role::Patient => "patient",
        };
        write!(f, "{}", s)
    }
}

/// Authenticated request identity, inserted into request extensions by the
/// auth middleware. Tenant and actor always travel together from here; no
/// handler or service reads them from anywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub tenant_id: TenantId,
    pub role: Role,
    pub email: Option<String>,
}
