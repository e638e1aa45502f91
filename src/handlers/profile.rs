use axum::{extract::State, Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::entities::{customer_profile, provider_profile};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RoleProfile {
    Customer(customer_profile::Model),
    Provider(provider_profile::Model),
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: user::Model,
    pub profile: Option<RoleProfile>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertProfileRequest {
    pub company_name: Option<String>,
    pub business_license: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get the caller's account and role profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<ProfileResponse>> {
    let user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let profile = match user.role {
        UserRole::Admin => None,
        UserRole::Customer => customer_profile::Entity::find()
            .filter(customer_profile::Column::UserId.eq(user.id))
            .one(&state.db)
            .await?
            .map(RoleProfile::Customer),
        UserRole::Provider => provider_profile::Entity::find()
            .filter(provider_profile::Column::UserId.eq(user.id))
            .one(&state.db)
            .await?
            .map(RoleProfile::Provider),
    };

    Ok(Json(ProfileResponse { user, profile }))
}

/// Create or update the caller's customer or provider profile
pub async fn upsert_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpsertProfileRequest>,
) -> AppResult<Json<RoleProfile>> {
    let now = Utc::now().fixed_offset();

    let profile = match claims.role {
        UserRole::Admin => {
            return Err(AppError::BusinessRule(
                "Admin accounts have no customer or provider profile".to_string(),
            ))
        }
        UserRole::Customer => {
            let existing = customer_profile::Entity::find()
                .filter(customer_profile::Column::UserId.eq(claims.sub))
                .one(&state.db)
                .await?;

            let saved = match existing {
                Some(p) => {
                    let mut active: customer_profile::ActiveModel = p.into();
                    active.company_name = Set(clean(payload.company_name));
                    active.address = Set(clean(payload.address));
                    active.city = Set(clean(payload.city));
                    active.phone = Set(clean(payload.phone));
                    active.updated_at = Set(now);
                    active.update(&state.db).await?
                }
                None => {
                    customer_profile::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        user_id: Set(claims.sub),
                        company_name: Set(clean(payload.company_name)),
                        address: Set(clean(payload.address)),
                        city: Set(clean(payload.city)),
                        phone: Set(clean(payload.phone)),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&state.db)
                    .await?
                }
            };
            RoleProfile::Customer(saved)
        }
        UserRole::Provider => {
            let company_name = clean(payload.company_name).ok_or_else(|| {
                AppError::Validation("company_name is required for providers".to_string())
            })?;

            let existing = provider_profile::Entity::find()
                .filter(provider_profile::Column::UserId.eq(claims.sub))
                .one(&state.db)
                .await?;

            let saved = match existing {
                Some(p) => {
                    let mut active: provider_profile::ActiveModel = p.into();
                    active.company_name = Set(company_name);
                    active.business_license = Set(clean(payload.business_license));
                    active.address = Set(clean(payload.address));
                    active.city = Set(clean(payload.city));
                    active.updated_at = Set(now);
                    active.update(&state.db).await?
                }
                None => {
                    provider_profile::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        user_id: Set(claims.sub),
                        company_name: Set(company_name),
                        business_license: Set(clean(payload.business_license)),
                        address: Set(clean(payload.address)),
                        city: Set(clean(payload.city)),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&state.db)
                    .await?
                }
            };
            RoleProfile::Provider(saved)
        }
    };

    tracing::info!(user_id = %claims.sub, role = ?claims.role, "Profile saved");
    Ok(Json(profile))
}
