pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_users;
mod m20250901_000002_create_profiles;
mod m20250901_000003_create_trucks;
mod m20250901_000004_create_bookings;
mod m20250901_000005_create_notifications;
mod m20250915_000001_add_rental_overlap_exclusion;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_users::Migration),
            Box::new(m20250901_000002_create_profiles::Migration),
            Box::new(m20250901_000003_create_trucks::Migration),
            Box::new(m20250901_000004_create_bookings::Migration),
            Box::new(m20250901_000005_create_notifications::Migration),
            Box::new(m20250915_000001_add_rental_overlap_exclusion::Migration),
        ]
    }
}
