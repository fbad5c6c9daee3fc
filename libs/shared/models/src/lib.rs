pub mod auth;
pub mod error;
pub mod tenant;

pub use auth::{AuthContext, JwtClaims, JwtHeader, Role};
pub use error::AppError;
pub use tenant::TenantId;
