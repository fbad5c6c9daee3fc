pub mod availability;
pub mod conflict;
pub mod pricing;
pub mod reschedule;
pub mod scheduler;

pub use availability::AvailabilityService;
pub use conflict::ConflictDetectionService;
pub use pricing::PricingService;
pub use reschedule::{RescheduleWorkflowService, RESCHEDULE_NOTICE_HOURS};
pub use scheduler::SessionSchedulerService;
