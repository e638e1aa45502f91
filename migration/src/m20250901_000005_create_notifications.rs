use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250901_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(NotificationKind::Enum)
                    .values([
                        NotificationKind::BookingCreated,
                        NotificationKind::BookingRequest,
                        NotificationKind::BookingStatus,
                        NotificationKind::BookingUpdated,
                        NotificationKind::AdminAlert,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(NotificationPriority::Enum)
                    .values([
                        NotificationPriority::Low,
                        NotificationPriority::Medium,
                        NotificationPriority::High,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notification::Table)
                    .if_not_exists()
                    .col(uuid(Notification::Id).primary_key())
                    .col(uuid(Notification::UserId).not_null())
                    .col(
                        ColumnDef::new(Notification::Kind)
                            .custom(NotificationKind::Enum)
                            .not_null(),
                    )
                    .col(string_len(Notification::Title, 255).not_null())
                    .col(text(Notification::Message).not_null())
                    .col(uuid_null(Notification::BookingId))
                    .col(
                        ColumnDef::new(Notification::Priority)
                            .custom(NotificationPriority::Enum)
                            .not_null(),
                    )
                    .col(boolean(Notification::IsRead).not_null().default(false))
                    .col(integer(Notification::Attempts).not_null().default(0))
                    .col(text_null(Notification::LastError))
                    .col(timestamp_with_time_zone_null(Notification::DispatchedAt))
                    .col(
                        timestamp_with_time_zone(Notification::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_user")
                            .from(Notification::Table, Notification::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notification_pending")
                    .table(Notification::Table)
                    .col(Notification::DispatchedAt)
                    .col(Notification::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notification::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(NotificationPriority::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(NotificationKind::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Notification {
    Table,
    Id,
    UserId,
    Kind,
    Title,
    Message,
    BookingId,
    Priority,
    IsRead,
    Attempts,
    LastError,
    DispatchedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum NotificationKind {
    #[sea_orm(iden = "notification_kind")]
    Enum,
    #[sea_orm(iden = "booking_created")]
    BookingCreated,
    #[sea_orm(iden = "booking_request")]
    BookingRequest,
    #[sea_orm(iden = "booking_status")]
    BookingStatus,
    #[sea_orm(iden = "booking_updated")]
    BookingUpdated,
    #[sea_orm(iden = "admin_alert")]
    AdminAlert,
}

#[derive(DeriveIden)]
enum NotificationPriority {
    #[sea_orm(iden = "notification_priority")]
    Enum,
    #[sea_orm(iden = "low")]
    Low,
    #[sea_orm(iden = "medium")]
    Medium,
    #[sea_orm(iden = "high")]
    High,
}
