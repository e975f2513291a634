//! `positions` table access. Ownership: the Executor creates rows,
//! the Exit Monitor drives OPEN → CLOSING → CLOSED, the Reconciler may
//! overwrite `entry_price` within tolerance or insert broker-discovered
//! rows, and must never delete a broker-confirmed position.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rbt_schemas::{Position, PositionStatus};
use sqlx::{Row, SqlitePool};

fn row_to_position(row: &sqlx::sqlite::SqliteRow) -> Result<Position> {
    let status: String = row.try_get("status")?;
    let entry_time: String = row.try_get("entry_time")?;
    let exit_time: Option<String> = row.try_get("exit_time")?;
    Ok(Position {
        ticket_id: row.try_get("ticket_id")?,
        ticker: row.try_get("ticker")?,
        strategy: row.try_get("strategy")?,
        entry_time: DateTime::parse_from_rfc3339(&entry_time)?.with_timezone(&Utc),
        entry_price: row.try_get("entry_price")?,
        quantity: row.try_get("quantity")?,
        current_price: row.try_get("current_price")?,
        stop_loss: row.try_get("stop_loss")?,
        status: PositionStatus::parse(&status).context("unknown position status in db")?,
        exit_signal: row.try_get("exit_signal")?,
        exit_time: exit_time
            .map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
            .transpose()?,
        exit_price: row.try_get("exit_price")?,
    })
}

pub async fn insert(pool: &SqlitePool, position: &Position) -> Result<()> {
    sqlx::query(
        "INSERT INTO positions \
         (ticket_id, ticker, strategy, entry_time, entry_price, quantity, current_price, \
          stop_loss, status, exit_signal, exit_time, exit_price) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&position.ticket_id)
    .bind(&position.ticker)
    .bind(&position.strategy)
    .bind(position.entry_time.to_rfc3339())
    .bind(position.entry_price)
    .bind(position.quantity)
    .bind(position.current_price)
    .bind(position.stop_loss)
    .bind(position.status.as_str())
    .bind(&position.exit_signal)
    .bind(position.exit_time.map(|t| t.to_rfc3339()))
    .bind(position.exit_price)
    .execute(pool)
    .await
    .context("insert position failed")?;
    Ok(())
}

pub async fn find_open_or_closing(pool: &SqlitePool, ticker: &str) -> Result<Option<Position>> {
    let row = sqlx::query(
        "SELECT * FROM positions WHERE ticker = ? AND status IN ('OPEN', 'CLOSING') LIMIT 1",
    )
    .bind(ticker)
    .fetch_optional(pool)
    .await
    .context("find_open_or_closing failed")?;
    row.as_ref().map(row_to_position).transpose()
}

pub async fn all_open_or_closing(pool: &SqlitePool) -> Result<Vec<Position>> {
    let rows = sqlx::query("SELECT * FROM positions WHERE status IN ('OPEN', 'CLOSING')")
        .fetch_all(pool)
        .await
        .context("all_open_or_closing failed")?;
    rows.iter().map(row_to_position).collect()
}

pub async fn all_open(pool: &SqlitePool) -> Result<Vec<Position>> {
    let rows = sqlx::query("SELECT * FROM positions WHERE status = 'OPEN'")
        .fetch_all(pool)
        .await
        .context("all_open failed")?;
    rows.iter().map(row_to_position).collect()
}

pub async fn update_current_price(pool: &SqlitePool, ticker: &str, price: f64) -> Result<()> {
    sqlx::query("UPDATE positions SET current_price = ? WHERE ticker = ? AND status IN ('OPEN', 'CLOSING')")
        .bind(price)
        .bind(ticker)
        .execute(pool)
        .await
        .context("update_current_price failed")?;
    Ok(())
}

pub async fn set_closing(pool: &SqlitePool, ticket_id: &str, exit_signal: &str) -> Result<()> {
    sqlx::query("UPDATE positions SET status = 'CLOSING', exit_signal = ? WHERE ticket_id = ? AND status = 'OPEN'")
        .bind(exit_signal)
        .bind(ticket_id)
        .execute(pool)
        .await
        .context("set_closing failed")?;
    Ok(())
}

/// Reconciler-only: overwrite `entry_price` after a price-drift auto-heal.
pub async fn overwrite_entry_price(pool: &SqlitePool, ticker: &str, entry_price: f64) -> Result<()> {
    sqlx::query("UPDATE positions SET entry_price = ? WHERE ticker = ? AND status IN ('OPEN', 'CLOSING')")
        .bind(entry_price)
        .bind(ticker)
        .execute(pool)
        .await
        .context("overwrite_entry_price failed")?;
    Ok(())
}

/// Archives a closing position into `trade_history` and flips it to CLOSED,
/// inside one transaction.
pub async fn archive_closed(
    pool: &SqlitePool,
    ticket_id: &str,
    exit_time: DateTime<Utc>,
    exit_price: f64,
    exit_reason: &str,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin archive_closed tx")?;

    let row = sqlx::query("SELECT * FROM positions WHERE ticket_id = ?")
        .bind(ticket_id)
        .fetch_one(&mut *tx)
        .await
        .context("position not found for archive")?;
    let position = row_to_position(&row)?;

    let pnl_pct = rbt_schemas::TradeHistoryEntry::pnl_pct(position.entry_price, exit_price);
    let win_loss = if pnl_pct >= 0.0 {
        rbt_schemas::WinLoss::Win
    } else {
        rbt_schemas::WinLoss::Loss
    };

    sqlx::query(
        "INSERT INTO trade_history \
         (ticket_id, exit_time, ticker, strategy, entry_price, exit_price, quantity, pnl_pct, win_loss, exit_reason) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(ticket_id)
    .bind(exit_time.to_rfc3339())
    .bind(&position.ticker)
    .bind(&position.strategy)
    .bind(position.entry_price)
    .bind(exit_price)
    .bind(position.quantity)
    .bind(pnl_pct)
    .bind(win_loss.as_str())
    .bind(exit_reason)
    .execute(&mut *tx)
    .await
    .context("insert trade_history failed")?;

    sqlx::query(
        "UPDATE positions SET status = 'CLOSED', exit_time = ?, exit_price = ? WHERE ticket_id = ?",
    )
    .bind(exit_time.to_rfc3339())
    .bind(exit_price)
    .bind(ticket_id)
    .execute(&mut *tx)
    .await
    .context("update position to closed failed")?;

    tx.commit().await.context("commit archive_closed tx")?;
    Ok(())
}
