// libs/shared/store/src/audit.rs
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use clinic_models::TenantId;

/// One entry for the audit trail: who did what to which record. Storage
/// of the trail lives outside this system; we only emit events.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    pub actor: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub changes: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        tenant_id: TenantId,
        actor: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id,
            actor,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            changes,
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Default sink: structured log lines under the `audit` target. A real
/// deployment points a collector at them.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            tenant = %event.tenant_id,
            actor = %event.actor,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            changes = %event.changes,
            "audit event"
        );
    }
}
