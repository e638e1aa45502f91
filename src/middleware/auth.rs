use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{decode_token, Claims};
use crate::AppState;

/// Extract and validate JWT token from Authorization header
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = decode_token(auth.token(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn ensure_role(request: &Request, role: UserRole, message: &str) -> AppResult<()> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))?;

    if claims.role != role {
        return Err(AppError::Forbidden(message.to_string()));
    }
    Ok(())
}

/// Require admin role
pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    ensure_role(&request, UserRole::Admin, "Admin access required")?;
    Ok(next.run(request).await)
}

/// Require provider role
pub async fn require_provider(request: Request, next: Next) -> AppResult<Response> {
    ensure_role(&request, UserRole::Provider, "Provider access required")?;
    Ok(next.run(request).await)
}

/// Require customer role
pub async fn require_customer(request: Request, next: Next) -> AppResult<Response> {
    ensure_role(&request, UserRole::Customer, "Customer access required")?;
    Ok(next.run(request).await)
}
