use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_metric_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        conn.execute_unprepared(CREATE_COUNTERS).await?;
        conn.execute_unprepared(CREATE_GAUGES).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        conn.execute_unprepared("DROP TABLE IF EXISTS gauge_metrics")
            .await?;
        conn.execute_unprepared("DROP TABLE IF EXISTS counter_metrics")
            .await?;
        Ok(())
    }
}

// Portable between PostgreSQL and SQLite.
const CREATE_COUNTERS: &str = "
CREATE TABLE IF NOT EXISTS counter_metrics (
    name TEXT PRIMARY KEY NOT NULL,
    value BIGINT NOT NULL
)";

const CREATE_GAUGES: &str = "
CREATE TABLE IF NOT EXISTS gauge_metrics (
    name TEXT PRIMARY KEY NOT NULL,
    value DOUBLE PRECISION NOT NULL
)";
