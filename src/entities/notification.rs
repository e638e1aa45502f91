use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "notification_kind")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[sea_orm(string_value = "booking_created")]
    BookingCreated,
    #[sea_orm(string_value = "booking_request")]
    BookingRequest,
    #[sea_orm(string_value = "booking_status")]
    BookingStatus,
    #[sea_orm(string_value = "booking_updated")]
    BookingUpdated,
    #[sea_orm(string_value = "admin_alert")]
    AdminAlert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "notification_priority")]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
}

/// In-app notification. Rows with `dispatched_at = NULL` form the outbox
/// drained by `services::notifications::Dispatcher`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub booking_id: Option<Uuid>,
    pub priority: NotificationPriority,
    pub is_read: bool,
    #[serde(skip_serializing)]
    pub attempts: i32,
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    #[serde(skip_serializing)]
    pub dispatched_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
