use sea_orm_migration::{prelude::*, schema::*, sea_orm::sea_query::extension::postgres::Type};

use super::m20250901_000002_create_profiles::ProviderProfile;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(ServiceType::Enum)
                    .values([ServiceType::Transport, ServiceType::Rental])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(PricingType::Enum)
                    .values([PricingType::PerKm, PricingType::Fixed])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(TruckStatus::Enum)
                    .values([
                        TruckStatus::Active,
                        TruckStatus::Inactive,
                        TruckStatus::Maintenance,
                        TruckStatus::Rented,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Truck::Table)
                    .if_not_exists()
                    .col(uuid(Truck::Id).primary_key())
                    .col(uuid(Truck::ProviderId).not_null())
                    .col(
                        ColumnDef::new(Truck::ServiceType)
                            .custom(ServiceType::Enum)
                            .not_null(),
                    )
                    .col(string_len(Truck::TruckType, 50).not_null())
                    .col(string_len(Truck::LicensePlate, 20).not_null().unique_key())
                    .col(string_len_null(Truck::Make, 50))
                    .col(string_len_null(Truck::Model, 50))
                    .col(integer_null(Truck::Year))
                    .col(decimal_len_null(Truck::CapacityWeight, 10, 2))
                    .col(decimal_len_null(Truck::CapacityVolume, 10, 2))
                    .col(
                        ColumnDef::new(Truck::PricingType)
                            .custom(PricingType::Enum)
                            .not_null(),
                    )
                    .col(decimal_len_null(Truck::PricePerKm, 10, 2))
                    .col(decimal_len_null(Truck::FixedPrice, 12, 2))
                    .col(decimal_len_null(Truck::MonthlyRate, 12, 2))
                    .col(
                        ColumnDef::new(Truck::Status)
                            .custom(TruckStatus::Enum)
                            .not_null(),
                    )
                    .col(
                        decimal_len(Truck::TotalRevenue, 14, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        timestamp_with_time_zone(Truck::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Truck::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_truck_provider")
                            .from(Truck::Table, Truck::ProviderId)
                            .to(ProviderProfile::Table, ProviderProfile::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Truck::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(TruckStatus::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(PricingType::Enum).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ServiceType::Enum).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Truck {
    Table,
    Id,
    ProviderId,
    ServiceType,
    TruckType,
    LicensePlate,
    Make,
    Model,
    Year,
    CapacityWeight,
    CapacityVolume,
    PricingType,
    PricePerKm,
    FixedPrice,
    MonthlyRate,
    Status,
    TotalRevenue,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum ServiceType {
    #[sea_orm(iden = "service_type")]
    Enum,
    #[sea_orm(iden = "transport")]
    Transport,
    #[sea_orm(iden = "rental")]
    Rental,
}

#[derive(DeriveIden)]
pub enum PricingType {
    #[sea_orm(iden = "pricing_type")]
    Enum,
    #[sea_orm(iden = "per_km")]
    PerKm,
    #[sea_orm(iden = "fixed")]
    Fixed,
}

#[derive(DeriveIden)]
pub enum TruckStatus {
    #[sea_orm(iden = "truck_status")]
    Enum,
    #[sea_orm(iden = "active")]
    Active,
    #[sea_orm(iden = "inactive")]
    Inactive,
    #[sea_orm(iden = "maintenance")]
    Maintenance,
    #[sea_orm(iden = "rented")]
    Rented,
}
