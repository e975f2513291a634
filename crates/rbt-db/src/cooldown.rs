//! `cooldown_map` table access.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub async fn set_cooldown(
    pool: &SqlitePool,
    ticker: &str,
    strategy: &str,
    cooldown_until: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO cooldown_map (ticker, strategy, cooldown_until) VALUES (?, ?, ?) \
         ON CONFLICT(ticker, strategy) DO UPDATE SET cooldown_until = excluded.cooldown_until",
    )
    .bind(ticker)
    .bind(strategy)
    .bind(cooldown_until.to_rfc3339())
    .execute(pool)
    .await
    .context("set_cooldown failed")?;
    Ok(())
}

/// `None` if no cooldown row exists for the pair.
pub async fn cooldown_until(pool: &SqlitePool, ticker: &str, strategy: &str) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT cooldown_until FROM cooldown_map WHERE ticker = ? AND strategy = ?",
    )
    .bind(ticker)
    .bind(strategy)
    .fetch_optional(pool)
    .await
    .context("cooldown_until failed")?;

    row.map(|(s,)| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .context("malformed cooldown_until timestamp")
}
