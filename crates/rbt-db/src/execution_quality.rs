//! `execution_quality` table access.

use anyhow::{Context, Result};
use rbt_schemas::ExecutionQuality;
use sqlx::SqlitePool;

pub async fn insert(pool: &SqlitePool, eq: &ExecutionQuality) -> Result<()> {
    sqlx::query(
        "INSERT INTO execution_quality \
         (ticket_id, ticker, timestamp, expected_price, actual_price, slippage_pct, \
          expected_qty, actual_qty, fill_ratio, partial_fill, order_type, side) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&eq.ticket_id)
    .bind(&eq.ticker)
    .bind(eq.timestamp.to_rfc3339())
    .bind(eq.expected_price)
    .bind(eq.actual_price)
    .bind(eq.slippage_pct)
    .bind(eq.expected_qty)
    .bind(eq.actual_qty)
    .bind(eq.fill_ratio)
    .bind(eq.partial_fill)
    .bind(&eq.order_type)
    .bind(&eq.side)
    .execute(pool)
    .await
    .context("insert execution_quality failed")?;
    Ok(())
}
