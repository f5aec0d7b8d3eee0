use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use octorelay_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// Opens the SQLite pool described by `config`.
///
/// Associations and tokens are written from concurrent request handlers, so
/// every connection runs in WAL mode and SQLite's busy timeout is derived
/// from the configured acquire timeout: a locked writer waits as long as
/// the pool itself would before giving up.
pub async fn connect(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let acquire_timeout_secs = config.timeout_secs.max(1);
    let busy_timeout_ms = acquire_timeout_secs.saturating_mul(1_000).min(30_000);

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
}
