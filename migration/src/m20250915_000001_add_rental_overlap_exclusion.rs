use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("CREATE EXTENSION IF NOT EXISTS btree_gist")
            .await?;

        // Live rental windows on the same equipment may not intersect
        db.execute_unprepared(
            r#"ALTER TABLE "booking"
               ADD CONSTRAINT "booking_rental_no_overlap"
               EXCLUDE USING gist (
                   "truck_id" WITH =,
                   tstzrange("rental_start", "rental_end", '[)') WITH &&
               )
               WHERE (
                   "service_type" = 'rental'
                   AND "truck_id" IS NOT NULL
                   AND "status" NOT IN ('completed', 'cancelled', 'rejected')
               )"#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"ALTER TABLE "booking" DROP CONSTRAINT IF EXISTS "booking_rental_no_overlap""#,
            )
            .await?;

        Ok(())
    }
}
