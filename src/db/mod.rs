pub mod models;
pub mod queries;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::errors::{AppError, Store};

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 2;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 1;

/// Open the job's pool and bring the schema up to date.
///
/// The caller owns the pool and must `close()` it before exiting.
pub async fn connect(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(|e| AppError::Connectivity {
            store: Store::Relational,
            source: Box::new(e),
        })?;

    if let Err(e) = sqlx::migrate!().run(&pool).await {
        pool.close().await;
        return Err(AppError::Query {
            store: Store::Relational,
            query: "run migrations",
            source: Box::new(e),
        });
    }

    tracing::info!("Database migrations completed");
    Ok(pool)
}
