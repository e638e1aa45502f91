use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "service_type")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[sea_orm(string_value = "transport")]
    Transport,
    #[sea_orm(string_value = "rental")]
    Rental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "pricing_type")]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    #[sea_orm(string_value = "per_km")]
    PerKm,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Availability of a truck. `Rented` is only ever set by booking transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "truck_status")]
#[serde(rename_all = "snake_case")]
pub enum TruckStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
    #[sea_orm(string_value = "rented")]
    Rented,
}

impl TruckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckStatus::Active => "active",
            TruckStatus::Inactive => "inactive",
            TruckStatus::Maintenance => "maintenance",
            TruckStatus::Rented => "rented",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "truck")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_type: ServiceType,
    pub truck_type: String,
    #[sea_orm(unique)]
    pub license_plate: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub capacity_weight: Option<Decimal>,
    pub capacity_volume: Option<Decimal>,
    pub pricing_type: PricingType,
    pub price_per_km: Option<Decimal>,
    pub fixed_price: Option<Decimal>,
    pub monthly_rate: Option<Decimal>,
    pub status: TruckStatus,
    pub total_revenue: Decimal,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::provider_profile::Entity",
        from = "Column::ProviderId",
        to = "super::provider_profile::Column::Id"
    )]
    Provider,
    #[sea_orm(has_many = "super::booking::Entity")]
    Bookings,
}

impl Related<super::provider_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
