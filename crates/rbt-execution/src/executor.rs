//! Executor: submits entries and exits to the broker, parks
//! unfilled LIMIT orders in the pending map, and appends an
//! `ExecutionQuality` row for every fill — immediate or polled.

use anyhow::Result;
use chrono::Utc;
use rbt_schemas::broker::{Broker, OrderType, Side, SubmitOrderRequest};
use rbt_schemas::{ExecutionQuality, Position, PositionStatus};
use sqlx::SqlitePool;

use crate::pending::{ticket_id, PendingIntent, PendingMap, PendingOrder};

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Filled { ticket_id: String, fill_price: f64, qty: i64 },
    Pending { order_id: String },
    Failed { error: String },
}

/// `order_type = LIMIT` or `MARKET`; LIMIT orders that don't fill
/// immediately are parked, not retried.
pub async fn execute_entry(
    pool: &SqlitePool,
    broker: &dyn Broker,
    pending: &PendingMap,
    ticker: &str,
    strategy: &str,
    price: f64,
    qty: i64,
    stop_loss: f64,
    order_type: OrderType,
) -> Result<ExecutionOutcome> {
    let ticket = ticket_id();
    let request = SubmitOrderRequest {
        symbol: ticker.to_string(),
        qty,
        side: Side::Buy,
        order_type,
        limit_price: matches!(order_type, OrderType::Limit).then_some(price),
        client_order_id: ticket.clone(),
    };

    let order = match broker.submit_order(request) {
        Ok(order) => order,
        Err(e) => return Ok(ExecutionOutcome::Failed { error: e.to_string() }),
    };

    if order.is_filled() {
        let fill_price = order.filled_avg_price.unwrap();
        let fill_qty = order.filled_qty;
        record_fill(pool, &ticket, ticker, Side::Buy, order_type, price, qty, fill_price, fill_qty).await?;

        let position = Position {
            ticket_id: ticket.clone(),
            ticker: ticker.to_string(),
            strategy: strategy.to_string(),
            entry_time: Utc::now(),
            entry_price: fill_price,
            quantity: fill_qty,
            current_price: fill_price,
            stop_loss,
            status: PositionStatus::Open,
            exit_signal: None,
            exit_time: None,
            exit_price: None,
        };
        rbt_db::positions::insert(pool, &position).await?;

        return Ok(ExecutionOutcome::Filled { ticket_id: ticket, fill_price, qty: fill_qty });
    }

    pending.insert(PendingOrder {
        order_id: order.id.clone(),
        ticket_id: ticket,
        ticker: ticker.to_string(),
        side: Side::Buy,
        expected_price: price,
        expected_qty: qty,
        order_type: order_type_label(order_type),
        submitted_at: Utc::now(),
        intent: PendingIntent::Entry { strategy: strategy.to_string(), stop_loss },
    });

    Ok(ExecutionOutcome::Pending { order_id: order.id })
}

/// Stop-loss exits are always MARKET regardless of the requested order type.
/// `position_ticket_id` is the existing position's ticket, reused as the
/// client order id so a fill resolves back to the right `positions` row.
pub async fn execute_exit(
    pool: &SqlitePool,
    broker: &dyn Broker,
    pending: &PendingMap,
    position_ticket_id: &str,
    ticker: &str,
    qty: i64,
    order_type: OrderType,
    limit_price: Option<f64>,
    reason: &str,
    is_stop_loss: bool,
) -> Result<ExecutionOutcome> {
    let effective_type = if is_stop_loss { OrderType::Market } else { order_type };
    let expected_price = limit_price.unwrap_or(0.0);

    let request = SubmitOrderRequest {
        symbol: ticker.to_string(),
        qty,
        side: Side::Sell,
        order_type: effective_type,
        limit_price: matches!(effective_type, OrderType::Limit).then_some(expected_price),
        client_order_id: position_ticket_id.to_string(),
    };

    let order = match broker.submit_order(request) {
        Ok(order) => order,
        Err(e) => return Ok(ExecutionOutcome::Failed { error: e.to_string() }),
    };

    if order.is_filled() {
        let fill_price = order.filled_avg_price.unwrap();
        let fill_qty = order.filled_qty;
        record_fill(pool, position_ticket_id, ticker, Side::Sell, effective_type, expected_price, qty, fill_price, fill_qty).await?;
        rbt_db::positions::archive_closed(pool, position_ticket_id, Utc::now(), fill_price, reason).await?;
        return Ok(ExecutionOutcome::Filled { ticket_id: position_ticket_id.to_string(), fill_price, qty: fill_qty });
    }

    pending.insert(PendingOrder {
        order_id: order.id.clone(),
        ticket_id: position_ticket_id.to_string(),
        ticker: ticker.to_string(),
        side: Side::Sell,
        expected_price,
        expected_qty: qty,
        order_type: order_type_label(effective_type),
        submitted_at: Utc::now(),
        intent: PendingIntent::Exit { exit_reason: reason.to_string() },
    });

    Ok(ExecutionOutcome::Pending { order_id: order.id })
}

/// Polled every tick: on fill, apply the same local-state transition an
/// immediate fill would have triggered; on cancel/reject, drop the entry.
pub async fn check_pending_orders(pool: &SqlitePool, broker: &dyn Broker, pending: &PendingMap) -> Result<()> {
    for entry in pending.snapshot() {
        let order = match broker.get_order_by_id(&entry.order_id) {
            Ok(order) => order,
            Err(_) => continue,
        };

        if order.is_filled() {
            let fill_price = order.filled_avg_price.unwrap();
            let fill_qty = order.filled_qty;
            record_fill(
                pool,
                &entry.ticket_id,
                &entry.ticker,
                entry.side,
                order_type_from_label(entry.order_type),
                entry.expected_price,
                entry.expected_qty,
                fill_price,
                fill_qty,
            )
            .await?;

            match &entry.intent {
                PendingIntent::Entry { strategy, stop_loss } => {
                    let position = Position {
                        ticket_id: entry.ticket_id.clone(),
                        ticker: entry.ticker.clone(),
                        strategy: strategy.clone(),
                        entry_time: Utc::now(),
                        entry_price: fill_price,
                        quantity: fill_qty,
                        current_price: fill_price,
                        stop_loss: *stop_loss,
                        status: PositionStatus::Open,
                        exit_signal: None,
                        exit_time: None,
                        exit_price: None,
                    };
                    rbt_db::positions::insert(pool, &position).await?;
                }
                PendingIntent::Exit { exit_reason } => {
                    rbt_db::positions::archive_closed(pool, &entry.ticket_id, Utc::now(), fill_price, exit_reason).await?;
                }
            }

            pending.remove(&entry.order_id);
        } else if order.canceled_at.is_some() || order.rejected_at.is_some() {
            pending.remove(&entry.order_id);
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn record_fill(
    pool: &SqlitePool,
    ticket_id: &str,
    ticker: &str,
    side: Side,
    order_type: OrderType,
    expected_price: f64,
    expected_qty: i64,
    actual_price: f64,
    actual_qty: i64,
) -> Result<()> {
    let quality = ExecutionQuality::new(
        ticket_id,
        ticker,
        Utc::now(),
        expected_price,
        actual_price,
        expected_qty,
        actual_qty,
        order_type.as_str(),
        side.as_str(),
    );
    rbt_db::execution_quality::insert(pool, &quality).await
}

fn order_type_label(order_type: OrderType) -> &'static str {
    order_type.as_str()
}

fn order_type_from_label(label: &str) -> OrderType {
    match label {
        "LIMIT" => OrderType::Limit,
        _ => OrderType::Market,
    }
}
