//! Exit Monitor: the three exit paths, checked in order every tick.
//! Stop loss first (real-time risk), then strategy-driven CLOSING, then the
//! forced pre-close sweep. A cooldown is set after every exit, regardless
//! of path.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rbt_calendar::Calendar;
use rbt_risk::cooldown::CooldownReason;
use rbt_schemas::broker::{Broker, OrderType};
use rbt_schemas::PositionStatus;
use sqlx::SqlitePool;

use crate::executor::{execute_exit, ExecutionOutcome};
use crate::pending::PendingMap;

pub const DEFAULT_FORCE_CLOSE_MINUTES: i64 = 5;
pub const PRE_CLOSE_WARNING_MINUTES: i64 = 15;

#[derive(Debug, Clone)]
pub struct ExitEvent {
    pub ticker: String,
    pub reason: &'static str,
    pub outcome: ExecutionOutcome,
}

/// For each OPEN position, compares `(price - entry) / entry` against the
/// position's stored fractional stop-loss threshold.
pub async fn check_stop_losses(
    pool: &SqlitePool,
    broker: &dyn Broker,
    pending: &PendingMap,
    prices: &HashMap<String, f64>,
    now: DateTime<Utc>,
) -> Result<Vec<ExitEvent>> {
    let mut events = Vec::new();
    for position in rbt_db::positions::all_open(pool).await? {
        let Some(&price) = prices.get(&position.ticker) else { continue };
        rbt_db::positions::update_current_price(pool, &position.ticker, price).await?;

        let pct = (price - position.entry_price) / position.entry_price;
        if pct <= -position.stop_loss {
            let outcome = execute_exit(
                pool,
                broker,
                pending,
                &position.ticket_id,
                &position.ticker,
                position.quantity,
                OrderType::Market,
                None,
                "STOP_LOSS",
                true,
            )
            .await?;

            if matches!(outcome, ExecutionOutcome::Filled { .. }) {
                rbt_risk::cooldown::set_cooldown(pool, &position.ticker, &position.strategy, CooldownReason::StopLoss, now).await?;
            }
            events.push(ExitEvent { ticker: position.ticker, reason: "STOP_LOSS", outcome });
        }
    }
    Ok(events)
}

/// Positions already marked CLOSING (externally, by a strategy signal) get
/// a LIMIT sell at the last known price.
pub async fn check_strategy_exits(pool: &SqlitePool, broker: &dyn Broker, pending: &PendingMap, now: DateTime<Utc>) -> Result<Vec<ExitEvent>> {
    let mut events = Vec::new();
    let open_and_closing = rbt_db::positions::all_open_or_closing(pool).await?;
    for position in open_and_closing.into_iter().filter(|p| p.status == PositionStatus::Closing) {
        let reason = position.exit_signal.clone().unwrap_or_else(|| "STRATEGY_EXIT".to_string());
        let outcome = execute_exit(
            pool,
            broker,
            pending,
            &position.ticket_id,
            &position.ticker,
            position.quantity,
            OrderType::Limit,
            Some(position.current_price),
            &reason,
            false,
        )
        .await?;

        if matches!(outcome, ExecutionOutcome::Filled { .. }) {
            let cooldown_reason = if reason == "TAKE_PROFIT" { CooldownReason::TakeProfit } else { CooldownReason::Other };
            rbt_risk::cooldown::set_cooldown(pool, &position.ticker, &position.strategy, cooldown_reason, now).await?;
        }
        events.push(ExitEvent { ticker: position.ticker, reason: "STRATEGY_EXIT", outcome });
    }
    Ok(events)
}

#[derive(Debug, Clone)]
pub enum PreCloseOutcome {
    ForcedExits(Vec<ExitEvent>),
    Warning,
    None,
}

/// Inside `force_close_minutes` of the close, MARKET-sells every OPEN
/// position. Inside the wider pre-close window, emits a warning but leaves
/// positions untouched.
pub async fn check_forced_preclose(
    pool: &SqlitePool,
    broker: &dyn Broker,
    pending: &PendingMap,
    calendar: &Calendar,
    now: DateTime<Utc>,
    force_close_minutes: i64,
) -> Result<PreCloseOutcome> {
    let Some(minutes_until_close) = calendar.minutes_until_close(now) else {
        return Ok(PreCloseOutcome::None);
    };

    if minutes_until_close <= force_close_minutes {
        let mut events = Vec::new();
        for position in rbt_db::positions::all_open(pool).await? {
            let outcome = execute_exit(
                pool,
                broker,
                pending,
                &position.ticket_id,
                &position.ticker,
                position.quantity,
                OrderType::Market,
                None,
                "FORCE_CLOSE",
                false,
            )
            .await?;

            if matches!(outcome, ExecutionOutcome::Filled { .. }) {
                rbt_risk::cooldown::set_cooldown(pool, &position.ticker, &position.strategy, CooldownReason::Other, now).await?;
            }
            events.push(ExitEvent { ticker: position.ticker, reason: "FORCE_CLOSE", outcome });
        }
        return Ok(PreCloseOutcome::ForcedExits(events));
    }

    if minutes_until_close <= PRE_CLOSE_WARNING_MINUTES {
        return Ok(PreCloseOutcome::Warning);
    }

    Ok(PreCloseOutcome::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbt_schemas::broker::{BrokerError, BrokerOrder, BrokerPosition, SubmitOrderRequest};
    use rbt_schemas::Position;
    use std::sync::Mutex;

    struct FakeBroker {
        next_fill_price: Mutex<f64>,
    }

    impl Broker for FakeBroker {
        fn submit_order(&self, req: SubmitOrderRequest) -> std::result::Result<BrokerOrder, BrokerError> {
            let price = *self.next_fill_price.lock().unwrap();
            Ok(BrokerOrder {
                id: format!("order-{}", req.client_order_id),
                client_order_id: req.client_order_id,
                filled_at: Some(Utc::now()),
                filled_avg_price: Some(price),
                filled_qty: req.qty,
                canceled_at: None,
                rejected_at: None,
            })
        }
        fn get_order_by_id(&self, _id: &str) -> std::result::Result<BrokerOrder, BrokerError> {
            Err(BrokerError::NotFound("unused in this test".to_string()))
        }
        fn get_open_position(&self, _symbol: &str) -> std::result::Result<Option<BrokerPosition>, BrokerError> {
            Ok(None)
        }
        fn get_all_positions(&self) -> std::result::Result<Vec<BrokerPosition>, BrokerError> {
            Ok(vec![])
        }
        fn cancel_order_by_id(&self, _id: &str) -> std::result::Result<(), BrokerError> {
            Ok(())
        }
        fn list_open_orders(&self) -> std::result::Result<Vec<BrokerOrder>, BrokerError> {
            Ok(vec![])
        }
    }

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade.db");
        let pool = rbt_db::connect(path.to_str().unwrap()).await.unwrap();
        rbt_db::migrate(&pool).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn stop_loss_triggers_at_threshold_and_sets_cooldown() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        let position = Position {
            ticket_id: "TKT-aaaaaaaa".to_string(),
            ticker: "ACME".to_string(),
            strategy: "RSI".to_string(),
            entry_time: now,
            entry_price: 10.21,
            quantity: 19,
            current_price: 10.21,
            stop_loss: 0.039,
            status: PositionStatus::Open,
            exit_signal: None,
            exit_time: None,
            exit_price: None,
        };
        rbt_db::positions::insert(&pool, &position).await.unwrap();

        let broker = FakeBroker { next_fill_price: Mutex::new(9.80) };
        let pending = PendingMap::new();
        let mut prices = HashMap::new();
        prices.insert("ACME".to_string(), 9.80);

        let events = check_stop_losses(&pool, &broker, &pending, &prices, now).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].outcome, ExecutionOutcome::Filled { .. }));
        assert!(rbt_risk::cooldown::is_on_cooldown(&pool, "ACME", "RSI", now).await.unwrap());
        assert!(rbt_db::positions::all_open(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn above_threshold_does_not_trigger() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        let position = Position {
            ticket_id: "TKT-bbbbbbbb".to_string(),
            ticker: "ACME".to_string(),
            strategy: "RSI".to_string(),
            entry_time: now,
            entry_price: 10.21,
            quantity: 19,
            current_price: 10.21,
            stop_loss: 0.039,
            status: PositionStatus::Open,
            exit_signal: None,
            exit_time: None,
            exit_price: None,
        };
        rbt_db::positions::insert(&pool, &position).await.unwrap();

        let broker = FakeBroker { next_fill_price: Mutex::new(10.05) };
        let pending = PendingMap::new();
        let mut prices = HashMap::new();
        prices.insert("ACME".to_string(), 10.05);

        let events = check_stop_losses(&pool, &broker, &pending, &prices, now).await.unwrap();
        assert!(events.is_empty());
        assert_eq!(rbt_db::positions::all_open(&pool).await.unwrap().len(), 1);
    }
}
