use crate::error::DbError;
use dotenvy::dotenv;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::env;
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL database.
///
/// Reads `DATABASE_URL` from the environment (loading `.env` first if one is
/// present) and returns a pool that can be shared across the entire
/// application.
pub async fn connect() -> Result<PgPool, DbError> {
    // A missing .env file is fine in deployed environments where the URL
    // comes from the real environment.
    dotenv().ok();

    let database_url = env::var("DATABASE_URL")
        .map_err(|_e| DbError::ConnectionConfigError("DATABASE_URL must be set.".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    tracing::info!("Database connection pool established");
    Ok(pool)
}

/// Applies any pending schema migrations.
///
/// Called at startup so the schema is always up-to-date before the first
/// query runs.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
