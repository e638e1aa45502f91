//! Truck and rental equipment repository operations used by the booking
//! flow, plus equipment deletion with booking snapshots.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::booking::{self, BookingStatus};
use crate::entities::truck::{self, PricingType, ServiceType, TruckStatus};
use crate::error::{AppError, AppResult};
use crate::services::pricing::PricingBasis;

/// Billing and capacity fields kept on a booking once its equipment is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruckSnapshot {
    pub id: Uuid,
    pub license_plate: String,
    pub truck_type: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub service_type: ServiceType,
    pub pricing_type: PricingType,
    pub price_per_km: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
    pub capacity_weight: Option<Decimal>,
    pub capacity_volume: Option<Decimal>,
}

impl From<&truck::Model> for TruckSnapshot {
    fn from(t: &truck::Model) -> Self {
        Self {
            id: t.id,
            license_plate: t.license_plate.clone(),
            truck_type: t.truck_type.clone(),
            make: t.make.clone(),
            model: t.model.clone(),
            service_type: t.service_type,
            pricing_type: t.pricing_type,
            price_per_km: t.price_per_km,
            fixed_price: t.fixed_price,
            monthly_rate: t.monthly_rate,
            capacity_weight: t.capacity_weight,
            capacity_volume: t.capacity_volume,
        }
    }
}

impl TruckSnapshot {
    pub fn pricing_basis(&self) -> PricingBasis {
        PricingBasis {
            pricing_type: self.pricing_type,
            price_per_km: self.price_per_km,
            fixed_price: self.fixed_price,
            monthly_rate: self.monthly_rate,
        }
    }

    /// Snapshot stored on a booking, if any and if readable.
    pub fn from_booking(b: &booking::Model) -> Option<Self> {
        let json = b.deleted_truck_info.clone()?;
        match serde_json::from_value(json) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(booking_id = %b.id, error = %e, "Unreadable truck snapshot");
                None
            }
        }
    }
}

impl truck::Model {
    pub fn pricing_basis(&self) -> PricingBasis {
        PricingBasis {
            pricing_type: self.pricing_type,
            price_per_km: self.price_per_km,
            fixed_price: self.fixed_price,
            monthly_rate: self.monthly_rate,
        }
    }
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<truck::Model> {
    truck::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Truck not found".to_string()))
}

/// Same as [`find_by_id`] but holds a row lock until the transaction ends.
pub async fn find_by_id_locked<C: ConnectionTrait>(db: &C, id: Uuid) -> AppResult<truck::Model> {
    truck::Entity::find_by_id(id)
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Truck not found".to_string()))
}

pub async fn set_status<C: ConnectionTrait>(db: &C, id: Uuid, status: TruckStatus) -> AppResult<()> {
    truck::Entity::update_many()
        .set(truck::ActiveModel {
            status: Set(status),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        })
        .filter(truck::Column::Id.eq(id))
        .exec(db)
        .await?;

    tracing::debug!(truck_id = %id, status = status.as_str(), "Truck status updated");
    Ok(())
}

/// Add `amount` to the truck's cumulative revenue in a single statement.
pub async fn update_revenue<C: ConnectionTrait>(db: &C, id: Uuid, amount: Decimal) -> AppResult<()> {
    truck::Entity::update_many()
        .col_expr(
            truck::Column::TotalRevenue,
            Expr::col(truck::Column::TotalRevenue).add(amount),
        )
        .col_expr(truck::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(truck::Column::Id.eq(id))
        .exec(db)
        .await?;

    tracing::debug!(truck_id = %id, amount = %amount, "Truck revenue credited");
    Ok(())
}

/// Rate fields an equipment listing must carry for its service type.
pub fn validate_pricing(
    service_type: ServiceType,
    pricing_type: PricingType,
    price_per_km: Option<Decimal>,
    fixed_price: Option<Decimal>,
    monthly_rate: Option<Decimal>,
) -> AppResult<()> {
    let is_positive = |v: Option<Decimal>| v.is_some_and(|v| v > Decimal::ZERO);

    match service_type {
        ServiceType::Rental if !is_positive(monthly_rate) => Err(AppError::Validation(
            "Rental equipment requires a positive monthly_rate".to_string(),
        )),
        ServiceType::Transport => match pricing_type {
            PricingType::PerKm if !is_positive(price_per_km) => Err(AppError::Validation(
                "Per-km pricing requires a positive price_per_km".to_string(),
            )),
            PricingType::Fixed if !is_positive(fixed_price) => Err(AppError::Validation(
                "Fixed pricing requires a positive fixed_price".to_string(),
            )),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Remove a truck. Bookings that reference it keep a snapshot of its
/// pricing and lose the foreign key. Unless `force` is set, deletion is
/// refused while any booking on the truck is still open.
pub async fn delete_truck(db: &DatabaseConnection, truck_id: Uuid, force: bool) -> AppResult<u64> {
    let txn = db.begin().await?;

    let truck = find_by_id_locked(&txn, truck_id).await?;

    if !force {
        let open = booking::Entity::find()
            .filter(booking::Column::TruckId.eq(truck_id))
            .filter(booking::Column::Status.is_not_in(BookingStatus::CLOSED))
            .count(&txn)
            .await?;

        if open > 0 {
            return Err(AppError::BusinessRule(format!(
                "Cannot delete truck with {} active booking(s). Complete or cancel them first.",
                open
            )));
        }
    }

    let snapshot = serde_json::to_value(TruckSnapshot::from(&truck))
        .map_err(|e| AppError::Internal(format!("Failed to snapshot truck: {}", e)))?;

    let detached = booking::Entity::update_many()
        .set(booking::ActiveModel {
            deleted_truck_info: Set(Some(snapshot)),
            truck_id: Set(None),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        })
        .filter(booking::Column::TruckId.eq(truck_id))
        .exec(&txn)
        .await?
        .rows_affected;

    let active: truck::ActiveModel = truck.into();
    active.delete(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        truck_id = %truck_id,
        bookings_detached = detached,
        forced = force,
        "Truck deleted"
    );
    Ok(detached)
}
