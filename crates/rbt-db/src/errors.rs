//! `error_log` and `data_quality_log` access.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;

pub async fn log_data_quality(
    pool: &SqlitePool,
    ticker: &str,
    severity: &str,
    code: &str,
    detail: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO data_quality_log (timestamp, ticker, severity, code, detail) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(ticker)
    .bind(severity)
    .bind(code)
    .bind(detail)
    .execute(pool)
    .await
    .context("log_data_quality failed")?;
    Ok(())
}

/// Count of ERROR/CRITICAL data-quality and error-log rows since UTC
/// midnight — the input to Sentinel's data-errors-today check.
pub async fn count_errors_today(pool: &SqlitePool) -> Result<i64> {
    let midnight = Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap();
    let midnight_utc = chrono::DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc);

    let (count,): (i64,) = sqlx::query_as(
        "SELECT \
           (SELECT COUNT(*) FROM error_log WHERE timestamp >= ? AND severity IN ('ERROR','CRITICAL')) + \
           (SELECT COUNT(*) FROM data_quality_log WHERE timestamp >= ? AND severity IN ('ERROR','CRITICAL'))",
    )
    .bind(midnight_utc.to_rfc3339())
    .bind(midnight_utc.to_rfc3339())
    .fetch_one(pool)
    .await
    .context("count_errors_today failed")?;
    Ok(count)
}
