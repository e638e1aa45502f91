use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{extension::postgres::PgExpr, Expr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::entities::provider_profile;
use crate::entities::truck::{self, PricingType, ServiceType, TruckStatus};
use crate::error::{AppError, AppResult};
use crate::services::fleet;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TruckFilters {
    pub service_type: Option<ServiceType>,
    /// Free text over truck type, make and model.
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTruckRequest {
    pub service_type: ServiceType,
    pub truck_type: String,
    pub license_plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub capacity_weight: Option<Decimal>,
    pub capacity_volume: Option<Decimal>,
    pub pricing_type: Option<PricingType>,
    pub price_per_km: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTruckRequest {
    pub truck_type: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub capacity_weight: Option<Decimal>,
    pub capacity_volume: Option<Decimal>,
    pub pricing_type: Option<PricingType>,
    pub price_per_km: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
    pub status: Option<TruckStatus>,
}

async fn provider_profile_id(state: &AppState, claims: &Claims) -> AppResult<Uuid> {
    provider_profile::Entity::find()
        .filter(provider_profile::Column::UserId.eq(claims.sub))
        .one(&state.db)
        .await?
        .map(|p| p.id)
        .ok_or_else(|| {
            AppError::BusinessRule(
                "Provider profile not found. Please complete your profile first.".to_string(),
            )
        })
}

async fn owned_truck(state: &AppState, claims: &Claims, id: Uuid) -> AppResult<truck::Model> {
    let profile_id = provider_profile_id(state, claims).await?;
    let truck = fleet::find_by_id(&state.db, id).await?;

    if truck.provider_id != profile_id {
        return Err(AppError::Forbidden(
            "You do not have permission to manage this truck".to_string(),
        ));
    }
    Ok(truck)
}

/// List bookable equipment
pub async fn list_trucks(
    State(state): State<AppState>,
    Query(filters): Query<TruckFilters>,
) -> AppResult<Json<Vec<truck::Model>>> {
    let mut query = truck::Entity::find().filter(truck::Column::Status.eq(TruckStatus::Active));

    if let Some(service_type) = filters.service_type {
        query = query.filter(truck::Column::ServiceType.eq(service_type));
    }
    if let Some(search) = filters.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        query = query.filter(
            Condition::any()
                .add(Expr::col(truck::Column::TruckType).ilike(pattern.as_str()))
                .add(Expr::col(truck::Column::Make).ilike(pattern.as_str()))
                .add(Expr::col(truck::Column::Model).ilike(pattern.as_str())),
        );
    }

    let trucks = query
        .order_by_desc(truck::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(Json(trucks))
}

/// Get a single truck
pub async fn get_truck(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<truck::Model>> {
    Ok(Json(fleet::find_by_id(&state.db, id).await?))
}

/// List the calling provider's trucks
pub async fn my_trucks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<truck::Model>>> {
    let profile_id = provider_profile_id(&state, &claims).await?;

    let trucks = truck::Entity::find()
        .filter(truck::Column::ProviderId.eq(profile_id))
        .order_by_desc(truck::Column::CreatedAt)
        .all(&state.db)
        .await?;
    Ok(Json(trucks))
}

/// Register a truck or rental equipment (provider)
pub async fn create_truck(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTruckRequest>,
) -> AppResult<Json<truck::Model>> {
    let profile_id = provider_profile_id(&state, &claims).await?;

    let license_plate = payload.license_plate.trim().to_uppercase();
    if license_plate.is_empty() || payload.truck_type.trim().is_empty() {
        return Err(AppError::Validation(
            "truck_type and license_plate are required".to_string(),
        ));
    }

    let pricing_type = payload.pricing_type.unwrap_or(PricingType::PerKm);
    fleet::validate_pricing(
        payload.service_type,
        pricing_type,
        payload.price_per_km,
        payload.fixed_price,
        payload.monthly_rate,
    )?;

    let existing = truck::Entity::find()
        .filter(truck::Column::LicensePlate.eq(&license_plate))
        .one(&state.db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("License plate already registered".to_string()));
    }

    let now = Utc::now().fixed_offset();
    let truck = truck::ActiveModel {
        id: Set(Uuid::new_v4()),
        provider_id: Set(profile_id),
        service_type: Set(payload.service_type),
        truck_type: Set(payload.truck_type.trim().to_string()),
        license_plate: Set(license_plate),
        make: Set(payload.make),
        model: Set(payload.model),
        year: Set(payload.year),
        capacity_weight: Set(payload.capacity_weight),
        capacity_volume: Set(payload.capacity_volume),
        pricing_type: Set(pricing_type),
        price_per_km: Set(payload.price_per_km),
        fixed_price: Set(payload.fixed_price),
        monthly_rate: Set(payload.monthly_rate),
        status: Set(TruckStatus::Active),
        total_revenue: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(truck_id = %truck.id, provider_id = %profile_id, "Truck registered");
    Ok(Json(truck))
}

/// Update a truck (owner only)
pub async fn update_truck(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTruckRequest>,
) -> AppResult<Json<truck::Model>> {
    let truck = owned_truck(&state, &claims, id).await?;

    if let Some(status) = payload.status {
        if status == TruckStatus::Rented {
            return Err(AppError::Validation(
                "The rented status is set by bookings".to_string(),
            ));
        }
        if truck.status == TruckStatus::Rented {
            return Err(AppError::BusinessRule(
                "Truck is currently rented".to_string(),
            ));
        }
    }

    let pricing_type = payload.pricing_type.unwrap_or(truck.pricing_type);
    let price_per_km = payload.price_per_km.or(truck.price_per_km);
    let fixed_price = payload.fixed_price.or(truck.fixed_price);
    let monthly_rate = payload.monthly_rate.or(truck.monthly_rate);
    fleet::validate_pricing(truck.service_type, pricing_type, price_per_km, fixed_price, monthly_rate)?;

    let mut active: truck::ActiveModel = truck.into();
    if let Some(truck_type) = payload.truck_type.filter(|t| !t.trim().is_empty()) {
        active.truck_type = Set(truck_type.trim().to_string());
    }
    if payload.make.is_some() {
        active.make = Set(payload.make);
    }
    if payload.model.is_some() {
        active.model = Set(payload.model);
    }
    if payload.year.is_some() {
        active.year = Set(payload.year);
    }
    if payload.capacity_weight.is_some() {
        active.capacity_weight = Set(payload.capacity_weight);
    }
    if payload.capacity_volume.is_some() {
        active.capacity_volume = Set(payload.capacity_volume);
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    active.pricing_type = Set(pricing_type);
    active.price_per_km = Set(price_per_km);
    active.fixed_price = Set(fixed_price);
    active.monthly_rate = Set(monthly_rate);
    active.updated_at = Set(Utc::now().fixed_offset());

    let truck = active.update(&state.db).await?;
    tracing::info!(truck_id = %truck.id, status = truck.status.as_str(), "Truck updated");
    Ok(Json(truck))
}

/// Delete a truck (owner only, no open bookings)
pub async fn delete_truck(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let truck = owned_truck(&state, &claims, id).await?;
    let detached = fleet::delete_truck(&state.db, truck.id, false).await?;

    Ok(Json(json!({
        "message": "Truck deleted successfully",
        "bookings_preserved": detached,
    })))
}
