use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};

/// Bearer token payload. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, email: &str, role: UserRole, ttl: Duration) -> Self {
        let issued = Utc::now();
        Self {
            sub: user_id,
            email: email.to_string(),
            role,
            exp: (issued + ttl).timestamp(),
            iat: issued.timestamp(),
        }
    }

    pub fn for_user(user: &user::Model, ttl: Duration) -> Self {
        Self::new(user.id, &user.email, user.role, ttl)
    }
}

pub fn encode_token(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
}

/// Signed token for a freshly authenticated user, valid for the configured hours.
pub fn issue_token(user: &user::Model, config: &Config) -> AppResult<String> {
    let claims = Claims::for_user(user, Duration::hours(config.jwt_expiration_hours));
    encode_token(&claims, &config.jwt_secret)
}

/// Checks signature and expiry. Any failure is a 401.
pub fn decode_token(token: &str, secret: &str) -> AppResult<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;
    Ok(data.claims)
}
