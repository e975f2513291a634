//! Persistent store. SQLite via `DB_PATH`; every multi-row mutation
//! (signal transitions, reconciler auto-heal, exit archive) runs inside a
//! single `sqlx::Transaction` rather than ad-hoc pool connections.

pub mod cooldown;
pub mod errors;
pub mod execution_quality;
pub mod health;
pub mod ignore_list;
pub mod positions;
pub mod price_cache;
pub mod signals;
pub mod trade_history;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub const ENV_DB_PATH: &str = "DB_PATH";

/// Connect to the SQLite database named by `DB_PATH`, creating the file if
/// it does not already exist.
pub async fn connect_from_env() -> Result<SqlitePool> {
    let path = std::env::var(ENV_DB_PATH).with_context(|| format!("missing env var {ENV_DB_PATH}"))?;
    connect(&path).await
}

pub async fn connect(path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .with_context(|| format!("invalid DB_PATH {path}"))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to sqlite database")?;

    Ok(pool)
}

/// Run embedded SQLx migrations. Idempotent: re-running against an
/// already-migrated database is a no-op.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Connectivity + schema-presence check used by the CLI's `db status` command.
pub async fn status(pool: &SqlitePool) -> Result<DbStatus> {
    let (one,): (i64,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (signal_count,): (i64,) = sqlx::query_as("select count(*) from signals")
        .fetch_one(pool)
        .await
        .context("signals table missing; run migrations")?;

    Ok(DbStatus {
        connected: one == 1,
        signal_count,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub connected: bool,
    pub signal_count: i64,
}

/// Append one row to `error_log`. Used by every component's fallible path
/// that needs to surface an error without aborting the tick.
pub async fn insert_error_log(
    pool: &SqlitePool,
    severity: &str,
    component: &str,
    message: &str,
) -> Result<()> {
    sqlx::query("INSERT INTO error_log (timestamp, severity, component, message) VALUES (?, ?, ?, ?)")
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(severity)
        .bind(component)
        .bind(message)
        .execute(pool)
        .await
        .context("insert_error_log failed")?;
    Ok(())
}
