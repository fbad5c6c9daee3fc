pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod timewindow;

pub use models::*;
pub use router::scheduling_routes;
pub use services::*;
pub use timewindow::TimeWindow;
