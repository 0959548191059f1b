use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::Path;
use std::time::Duration;

use crate::config::Config;

pub const MIGRATIONS_DIR: &str = "./migrations";

/// Opens the pool and checks it with `SELECT 1` before handing it out.
pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    let migrator = Migrator::new(Path::new(MIGRATIONS_DIR)).await?;
    migrator.run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Inserts users `1..=count` with a zero balance. Existing users are left untouched.
pub async fn seed_users(pool: &PgPool, count: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (id, balance)
        SELECT id, 0 FROM generate_series(1::BIGINT, $1::BIGINT) AS id
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(count)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
