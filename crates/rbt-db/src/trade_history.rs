//! Read side of the append-only `trade_history` table. Writes happen
//! exclusively through [`crate::positions::archive_closed`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rbt_schemas::{TradeHistoryEntry, WinLoss};
use sqlx::{Row, SqlitePool};

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<TradeHistoryEntry> {
    let exit_time: String = row.try_get("exit_time")?;
    let win_loss: String = row.try_get("win_loss")?;
    Ok(TradeHistoryEntry {
        ticket_id: row.try_get("ticket_id")?,
        exit_time: DateTime::parse_from_rfc3339(&exit_time)?.with_timezone(&Utc),
        ticker: row.try_get("ticker")?,
        strategy: row.try_get("strategy")?,
        entry_price: row.try_get("entry_price")?,
        exit_price: row.try_get("exit_price")?,
        quantity: row.try_get("quantity")?,
        pnl_pct: row.try_get("pnl_pct")?,
        win_loss: if win_loss == "WIN" { WinLoss::Win } else { WinLoss::Loss },
        exit_reason: row.try_get("exit_reason")?,
    })
}

/// Sum of `pnl_pct × entry_price × quantity` for trades closed since UTC
/// midnight of `as_of` — the realized half of Daily Limits.
pub async fn realized_pnl_since_midnight(pool: &SqlitePool, as_of: DateTime<Utc>) -> Result<f64> {
    let midnight = as_of.date_naive().and_hms_opt(0, 0, 0).unwrap();
    let midnight_utc = DateTime::<Utc>::from_naive_utc_and_offset(midnight, Utc);

    let rows = sqlx::query("SELECT * FROM trade_history WHERE exit_time >= ?")
        .bind(midnight_utc.to_rfc3339())
        .fetch_all(pool)
        .await
        .context("realized_pnl_since_midnight failed")?;

    let mut total = 0.0;
    for row in &rows {
        let entry = row_to_entry(row)?;
        total += entry.pnl_pct * entry.entry_price * entry.quantity as f64;
    }
    Ok(total)
}
