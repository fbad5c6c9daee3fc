use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use clinic_models::auth::AuthContext;
use clinic_models::error::AppError;

use crate::jwt::validate_token;
use crate::state::AppState;

/// Authentication middleware: verifies the bearer token and makes the
/// caller's identity (user, tenant, role) available to handlers.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Auth(
            "Invalid authorization header format".to_string(),
        ));
    }

    let token = &auth_value[7..];

    let context = validate_token(token, &state.config.jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Fetch the auth context a handler's middleware stored on the request.
pub fn extract_context<B>(request: &Request<B>) -> Result<AuthContext, AppError> {
    request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| AppError::Auth("Auth context not found in request extensions".to_string()))
}
