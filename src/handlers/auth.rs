use axum::{extract::State, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::issue_token;
use crate::utils::password::{hash_password, verify_password};
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

impl From<user::Model> for UserInfo {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            role: u.role,
        }
    }
}

impl RegisterRequest {
    fn validate(&self) -> AppResult<()> {
        if self.role == UserRole::Admin {
            return Err(AppError::Validation(
                "Role must be customer or provider".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AppError::Validation(
                "First and last name are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Register a customer or provider account
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();

    // Check if email already exists
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let new_user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        first_name: Set(payload.first_name.trim().to_string()),
        last_name: Set(payload.last_name.trim().to_string()),
        phone: Set(payload.phone.filter(|p| !p.trim().is_empty())),
        role: Set(payload.role),
        created_at: Set(Utc::now().fixed_offset()),
    };

    let user = new_user.insert(&state.db).await?;
    tracing::info!(user_id = %user.id, role = ?user.role, "User registered");

    let token = issue_token(&user, &state.config)?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(payload.email.trim().to_lowercase()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let token = issue_token(&user, &state.config)?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: UserRole, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: "karim@example.com".to_string(),
            password: password.to_string(),
            first_name: "Karim".to_string(),
            last_name: "Bennani".to_string(),
            phone: None,
            role,
        }
    }

    #[test]
    fn test_admin_cannot_self_register() {
        let err = request(UserRole::Admin, "long-enough").validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_password_length() {
        assert!(request(UserRole::Customer, "short").validate().is_err());
        assert!(request(UserRole::Provider, "long-enough").validate().is_ok());
    }
}
