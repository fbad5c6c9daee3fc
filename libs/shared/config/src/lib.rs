use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub invoice_max_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            jwt_secret: env::var("CLINIC_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            bind_host: env::var("CLINIC_BIND_HOST")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_BIND_HOST not set, using default");
                    "0.0.0.0".to_string()
                }),
            bind_port: env::var("CLINIC_BIND_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| {
                    warn!("CLINIC_BIND_PORT not set or invalid, using default");
                    3000
                }),
            invoice_max_attempts: env::var("CLINIC_INVOICE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 3000,
            invoice_max_attempts: 5,
        }
    }
}
