use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub use super::truck::ServiceType;

/// Lifecycle state of a booking. See `services::lifecycle` for the
/// allowed transitions between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "booking_status")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[sea_orm(string_value = "pending_review")]
    PendingReview,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "in_transit")]
    InTransit,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingReview => "pending_review",
            BookingStatus::Approved => "approved",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InTransit => "in_transit",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }

    /// Statuses that no longer hold the equipment.
    pub const CLOSED: [BookingStatus; 3] = [
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Rejected,
    ];

    pub fn is_closed(&self) -> bool {
        Self::CLOSED.contains(self)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "booking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub truck_id: Option<Uuid>,
    pub provider_id: Uuid,
    pub service_type: ServiceType,
    pub pickup_address: Option<String>,
    pub pickup_city: Option<String>,
    pub destination_address: Option<String>,
    pub destination_city: Option<String>,
    pub pickup_date: Date,
    pub pickup_time: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub cargo_description: Option<String>,
    pub cargo_weight: Option<Decimal>,
    pub cargo_volume: Option<Decimal>,
    pub estimated_distance: Option<Decimal>,
    pub total_price: Decimal,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub rental_start: Option<DateTimeWithTimeZone>,
    pub rental_end: Option<DateTimeWithTimeZone>,
    pub work_address: Option<String>,
    pub operator_required: bool,
    pub operator_provided: bool,
    pub rental_duration_hours: Option<i32>,
    pub rental_duration_days: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub purpose_description: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub deleted_truck_info: Option<Json>,
    pub deleted_by_customer_at: Option<DateTimeWithTimeZone>,
    pub deleted_by_provider_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Human-facing short reference, the first eight characters of the id.
    pub fn reference(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    /// "A → B" for transport, the work address for rentals.
    pub fn route_label(&self) -> String {
        match self.service_type {
            ServiceType::Transport => format!(
                "{} → {}",
                self.pickup_city.as_deref().unwrap_or("?"),
                self.destination_city.as_deref().unwrap_or("?")
            ),
            ServiceType::Rental => format!(
                "equipment rental at {}",
                self.work_address.as_deref().unwrap_or("unspecified site")
            ),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer_profile::Entity",
        from = "Column::CustomerId",
        to = "super::customer_profile::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::truck::Entity",
        from = "Column::TruckId",
        to = "super::truck::Column::Id"
    )]
    Truck,
    #[sea_orm(
        belongs_to = "super::provider_profile::Entity",
        from = "Column::ProviderId",
        to = "super::provider_profile::Column::Id"
    )]
    Provider,
    #[sea_orm(has_many = "super::booking_status_history::Entity")]
    StatusHistory,
}

impl Related<super::customer_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::truck::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Truck.def()
    }
}

impl Related<super::booking_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
