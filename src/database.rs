//! Database pool construction and schema migrations.

use crate::config::DatabaseSettings;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Build the shared connection pool.
///
/// `test_before_acquire` pings connections before handing them out so a
/// restarted database does not surface as a burst of stale-connection errors
/// inside message handlers.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .test_before_acquire(true)
        .connect(&settings.url)
        .await
}

/// Apply pending migrations. Safe to run from either worker; migrations are
/// idempotent and the catalog DDL is guarded with `IF NOT EXISTS`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
