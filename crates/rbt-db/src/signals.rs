//! `signals` table access. All status transitions go through
//! [`transition`], which runs inside one transaction so a crash mid-write
//! leaves the pre-transition row intact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rbt_schemas::{Signal, SignalStatus};
use sqlx::{Row, SqlitePool};

fn row_to_signal(row: &sqlx::sqlite::SqliteRow) -> Result<Signal> {
    let status: String = row.try_get("status")?;
    let trigger_time: String = row.try_get("trigger_time")?;
    let cooldown_until: Option<String> = row.try_get("cooldown_until")?;
    Ok(Signal {
        signal_id: row.try_get("signal_id")?,
        ticker: row.try_get("ticker")?,
        strategy: row.try_get("strategy")?,
        trigger_time: DateTime::parse_from_rfc3339(&trigger_time)?.with_timezone(&Utc),
        trigger_price: row.try_get("trigger_price")?,
        rebound_bottom: row.try_get("rebound_bottom")?,
        go_in_price: row.try_get("go_in_price")?,
        profit_target: row.try_get("profit_target")?,
        stop_loss: row.try_get("stop_loss")?,
        confidence: row.try_get("confidence")?,
        status: SignalStatus::parse(&status).context("unknown signal status in db")?,
        cooldown_until: cooldown_until
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()?,
    })
}

/// Returns `Ok(true)` if inserted, `Ok(false)` if a row with this id already
/// exists (the caller treats that as the idempotent `EXISTS` case).
pub async fn insert_kiv(pool: &SqlitePool, signal: &Signal) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO signals \
         (signal_id, ticker, strategy, trigger_time, trigger_price, rebound_bottom, \
          go_in_price, profit_target, stop_loss, confidence, status, cooldown_until) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&signal.signal_id)
    .bind(&signal.ticker)
    .bind(&signal.strategy)
    .bind(signal.trigger_time.to_rfc3339())
    .bind(signal.trigger_price)
    .bind(signal.rebound_bottom)
    .bind(signal.go_in_price)
    .bind(signal.profit_target)
    .bind(signal.stop_loss)
    .bind(signal.confidence)
    .bind(signal.status.as_str())
    .bind(signal.cooldown_until.map(|t| t.to_rfc3339()))
    .execute(pool)
    .await
    .context("insert_kiv failed")?;
    Ok(result.rows_affected() == 1)
}

/// Any row in {KIV, CONFIRMED} for this (ticker, strategy) — at most one can
/// exist by the partial unique index.
pub async fn find_active(pool: &SqlitePool, ticker: &str, strategy: &str) -> Result<Option<Signal>> {
    let row = sqlx::query(
        "SELECT * FROM signals WHERE ticker = ? AND strategy = ? \
         AND status IN ('KIV', 'CONFIRMED') LIMIT 1",
    )
    .bind(ticker)
    .bind(strategy)
    .fetch_optional(pool)
    .await
    .context("find_active failed")?;
    row.as_ref().map(row_to_signal).transpose()
}

pub async fn find_newest_kiv(pool: &SqlitePool, ticker: &str, strategy: &str) -> Result<Option<Signal>> {
    let row = sqlx::query(
        "SELECT * FROM signals WHERE ticker = ? AND strategy = ? AND status = 'KIV' \
         ORDER BY trigger_time DESC LIMIT 1",
    )
    .bind(ticker)
    .bind(strategy)
    .fetch_optional(pool)
    .await
    .context("find_newest_kiv failed")?;
    row.as_ref().map(row_to_signal).transpose()
}

/// All rows in {KIV, CONFIRMED}, for the KIV sheet export tab.
pub async fn find_all_kiv_and_confirmed(pool: &SqlitePool) -> Result<Vec<Signal>> {
    let rows = sqlx::query("SELECT * FROM signals WHERE status IN ('KIV', 'CONFIRMED') ORDER BY trigger_time DESC")
        .fetch_all(pool)
        .await
        .context("find_all_kiv_and_confirmed failed")?;
    rows.iter().map(row_to_signal).collect()
}

pub async fn find_all_confirmed(pool: &SqlitePool) -> Result<Vec<Signal>> {
    let rows = sqlx::query("SELECT * FROM signals WHERE status = 'CONFIRMED' ORDER BY confidence DESC")
        .fetch_all(pool)
        .await
        .context("find_all_confirmed failed")?;
    rows.iter().map(row_to_signal).collect()
}

/// Guarded transition: only succeeds if `from` matches the row's current
/// status, enforcing the one-directional state graph at the storage layer.
pub async fn transition(
    pool: &SqlitePool,
    signal_id: &str,
    from: SignalStatus,
    to: SignalStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE signals SET status = ? WHERE signal_id = ? AND status = ?")
        .bind(to.as_str())
        .bind(signal_id)
        .bind(from.as_str())
        .execute(pool)
        .await
        .context("transition failed")?;
    Ok(result.rows_affected() == 1)
}
