// libs/scheduling-cell/src/services/pricing.rs
use tracing::debug;
use uuid::Uuid;

use clinic_models::TenantId;
use clinic_store::{ClinicTx, TherapyType};

use crate::models::{PriceQuote, PriceSource, SchedulingError};

/// Resolves what one session of a therapy type costs for a given
/// therapist. An active therapist-specific pricing row wins; the therapy
/// type defaults apply otherwise. The resolved numbers are snapshotted
/// onto the session at booking time.
pub struct PricingService;

impl PricingService {
    pub fn new() -> Self {
        Self
    }

    /// Runs inside the caller's transaction so the quote and the booking
    /// that uses it see the same pricing rows.
    pub async fn resolve(
        &self,
        tx: &dyn ClinicTx,
        tenant: TenantId,
        therapist_id: Uuid,
        therapy_type: &TherapyType,
    ) -> Result<PriceQuote, SchedulingError> {
        if let Some(pricing) = tx
            .find_active_pricing(tenant, therapist_id, therapy_type.id)
            .await?
        {
            debug!(
                "Therapist {} has specific pricing for {}: {} / {} minutes",
                therapist_id, therapy_type.name, pricing.cost, pricing.duration_minutes
            );
            return Ok(PriceQuote {
                cost: pricing.cost,
                duration_minutes: pricing.duration_minutes,
                source: PriceSource::TherapistSpecific,
            });
        }

        debug!(
            "No therapist pricing for {} / {}, using therapy type defaults",
            therapist_id, therapy_type.name
        );
        Ok(PriceQuote {
            cost: therapy_type.default_cost,
            duration_minutes: therapy_type.default_duration_minutes,
            source: PriceSource::TherapyTypeDefault,
        })
    }
}

impl Default for PricingService {
    fn default() -> Self {
        Self::new()
    }
}
