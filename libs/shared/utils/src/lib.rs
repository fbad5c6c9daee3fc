pub mod clock;
pub mod extractor;
pub mod jwt;
pub mod state;
pub mod test_utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use extractor::auth_middleware;
pub use state::AppState;
