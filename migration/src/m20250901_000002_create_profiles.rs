use sea_orm_migration::{prelude::*, schema::*};

use super::m20250901_000001_create_users::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerProfile::Table)
                    .if_not_exists()
                    .col(uuid(CustomerProfile::Id).primary_key())
                    .col(uuid(CustomerProfile::UserId).not_null().unique_key())
                    .col(string_len_null(CustomerProfile::CompanyName, 100))
                    .col(string_len_null(CustomerProfile::Address, 255))
                    .col(string_len_null(CustomerProfile::City, 100))
                    .col(string_len_null(CustomerProfile::Phone, 30))
                    .col(
                        timestamp_with_time_zone(CustomerProfile::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(CustomerProfile::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_customer_profile_user")
                            .from(CustomerProfile::Table, CustomerProfile::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProviderProfile::Table)
                    .if_not_exists()
                    .col(uuid(ProviderProfile::Id).primary_key())
                    .col(uuid(ProviderProfile::UserId).not_null().unique_key())
                    .col(string_len(ProviderProfile::CompanyName, 100).not_null())
                    .col(string_len_null(ProviderProfile::BusinessLicense, 50))
                    .col(string_len_null(ProviderProfile::Address, 255))
                    .col(string_len_null(ProviderProfile::City, 100))
                    .col(
                        timestamp_with_time_zone(ProviderProfile::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(ProviderProfile::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_provider_profile_user")
                            .from(ProviderProfile::Table, ProviderProfile::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderProfile::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(CustomerProfile::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CustomerProfile {
    Table,
    Id,
    UserId,
    CompanyName,
    Address,
    City,
    Phone,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum ProviderProfile {
    Table,
    Id,
    UserId,
    CompanyName,
    BusinessLicense,
    Address,
    City,
    CreatedAt,
    UpdatedAt,
}
