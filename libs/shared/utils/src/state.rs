use std::sync::Arc;

use clinic_config::AppConfig;
use clinic_store::{AuditSink, ClinicStore};

use crate::clock::Clock;

/// Everything the routers need, threaded through axum state. Handlers
/// construct their services from these per request.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn ClinicStore>,
    pub clock: Arc<dyn Clock>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ClinicStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
            audit,
        }
    }
}
