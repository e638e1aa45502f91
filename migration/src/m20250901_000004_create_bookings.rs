use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250901_000001_create_users::User;
use super::m20250901_000002_create_profiles::{CustomerProfile, ProviderProfile};
use super::m20250901_000003_create_trucks::{ServiceType, Truck};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(BookingStatus::Enum)
                    .values([
                        BookingStatus::PendingReview,
                        BookingStatus::Approved,
                        BookingStatus::Confirmed,
                        BookingStatus::InTransit,
                        BookingStatus::Active,
                        BookingStatus::Completed,
                        BookingStatus::Cancelled,
                        BookingStatus::Rejected,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Booking::Table)
                    .if_not_exists()
                    .col(uuid(Booking::Id).primary_key())
                    .col(uuid(Booking::CustomerId).not_null())
                    .col(uuid_null(Booking::TruckId))
                    .col(uuid(Booking::ProviderId).not_null())
                    .col(
                        ColumnDef::new(Booking::ServiceType)
                            .custom(ServiceType::Enum)
                            .not_null(),
                    )
                    .col(string_len_null(Booking::PickupAddress, 255))
                    .col(string_len_null(Booking::PickupCity, 100))
                    .col(string_len_null(Booking::DestinationAddress, 255))
                    .col(string_len_null(Booking::DestinationCity, 100))
                    .col(date(Booking::PickupDate).not_null())
                    .col(string_len_null(Booking::PickupTime, 5))
                    .col(text_null(Booking::CargoDescription))
                    .col(decimal_len_null(Booking::CargoWeight, 10, 2))
                    .col(decimal_len_null(Booking::CargoVolume, 10, 2))
                    .col(decimal_len_null(Booking::EstimatedDistance, 10, 2))
                    .col(decimal_len(Booking::TotalPrice, 12, 2).not_null())
                    .col(text_null(Booking::Notes))
                    .col(
                        ColumnDef::new(Booking::Status)
                            .custom(BookingStatus::Enum)
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(Booking::RentalStart))
                    .col(timestamp_with_time_zone_null(Booking::RentalEnd))
                    .col(string_len_null(Booking::WorkAddress, 255))
                    .col(boolean(Booking::OperatorRequired).not_null().default(false))
                    .col(boolean(Booking::OperatorProvided).not_null().default(false))
                    .col(integer_null(Booking::RentalDurationHours))
                    .col(integer_null(Booking::RentalDurationDays))
                    .col(text_null(Booking::PurposeDescription))
                    .col(json_binary_null(Booking::DeletedTruckInfo))
                    .col(timestamp_with_time_zone_null(Booking::DeletedByCustomerAt))
                    .col(timestamp_with_time_zone_null(Booking::DeletedByProviderAt))
                    .col(
                        timestamp_with_time_zone(Booking::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Booking::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_customer")
                            .from(Booking::Table, Booking::CustomerId)
                            .to(CustomerProfile::Table, CustomerProfile::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_truck")
                            .from(Booking::Table, Booking::TruckId)
                            .to(Truck::Table, Truck::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_booking_provider")
                            .from(Booking::Table, Booking::ProviderId)
                            .to(ProviderProfile::Table, ProviderProfile::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_booking_truck_window")
                    .table(Booking::Table)
                    .col(Booking::TruckId)
                    .col(Booking::RentalStart)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BookingStatusHistory::Table)
                    .if_not_exists()
                    .col(uuid(BookingStatusHistory::Id).primary_key())
                    .col(uuid(BookingStatusHistory::BookingId).not_null())
                    .col(
                        ColumnDef::new(BookingStatusHistory::Status)
                            .custom(BookingStatus::Enum)
                            .not_null(),
                    )
                    .col(uuid_null(BookingStatusHistory::ChangedBy))
                    .col(text_null(BookingStatusHistory::Notes))
                    .col(
                        timestamp_with_time_zone(BookingStatusHistory::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_status_history_booking")
                            .from(BookingStatusHistory::Table, BookingStatusHistory::BookingId)
                            .to(Booking::Table, Booking::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_status_history_user")
                            .from(BookingStatusHistory::Table, BookingStatusHistory::ChangedBy)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BookingStatusHistory::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Booking::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(BookingStatus::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Booking {
    Table,
    Id,
    CustomerId,
    TruckId,
    ProviderId,
    ServiceType,
    PickupAddress,
    PickupCity,
    DestinationAddress,
    DestinationCity,
    PickupDate,
    PickupTime,
    CargoDescription,
    CargoWeight,
    CargoVolume,
    EstimatedDistance,
    TotalPrice,
    Notes,
    Status,
    RentalStart,
    RentalEnd,
    WorkAddress,
    OperatorRequired,
    OperatorProvided,
    RentalDurationHours,
    RentalDurationDays,
    PurposeDescription,
    DeletedTruckInfo,
    DeletedByCustomerAt,
    DeletedByProviderAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum BookingStatusHistory {
    Table,
    Id,
    BookingId,
    Status,
    ChangedBy,
    Notes,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum BookingStatus {
    #[sea_orm(iden = "booking_status")]
    Enum,
    #[sea_orm(iden = "pending_review")]
    PendingReview,
    #[sea_orm(iden = "approved")]
    Approved,
    #[sea_orm(iden = "confirmed")]
    Confirmed,
    #[sea_orm(iden = "in_transit")]
    InTransit,
    #[sea_orm(iden = "active")]
    Active,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "cancelled")]
    Cancelled,
    #[sea_orm(iden = "rejected")]
    Rejected,
}
