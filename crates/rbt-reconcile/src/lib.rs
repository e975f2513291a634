//! Reconciler: compares local `positions` against the broker's
//! reported book, classifies every ticker into one of five buckets, and
//! auto-heals the two buckets that are safe to heal. `mismatch_quantity`
//! and `missing_in_broker` are never auto-healed — they halt new entries
//! for the rest of the cycle.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rbt_schemas::broker::BrokerPosition;
use rbt_schemas::{HealthState, HealthStatus, Position, PositionStatus};
use sqlx::SqlitePool;

pub const DEFAULT_PRICE_TOL_PCT: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Matched,
    MismatchPrice,
    MismatchQuantity,
    MissingInBroker,
    MissingInLocal,
}

#[derive(Debug, Clone)]
pub struct TickerClassification {
    pub ticker: String,
    pub bucket: Bucket,
    pub local_qty: Option<i64>,
    pub broker_qty: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub status: HealthStatus,
    pub message: String,
    pub classifications: Vec<TickerClassification>,
}

fn classify(local: Option<&Position>, broker: Option<&BrokerPosition>, price_tol_pct: f64) -> Bucket {
    match (local, broker) {
        (Some(_), None) => Bucket::MissingInBroker,
        (None, Some(_)) => Bucket::MissingInLocal,
        (Some(l), Some(b)) => {
            if l.quantity != b.qty {
                Bucket::MismatchQuantity
            } else {
                let drift = if l.entry_price == 0.0 {
                    0.0
                } else {
                    ((b.avg_entry_price - l.entry_price) / l.entry_price).abs()
                };
                if drift > price_tol_pct {
                    Bucket::MismatchPrice
                } else {
                    Bucket::Matched
                }
            }
        }
        (None, None) => unreachable!("ticker present in neither side cannot be classified"),
    }
}

/// Builds `L` and `A`, classifies every ticker, applies the status rule and
/// auto-heals, then appends a HealthState row.
pub async fn reconcile_all(pool: &SqlitePool, broker_positions: &[BrokerPosition], price_tol_pct: f64, now: DateTime<Utc>) -> Result<ReconcileReport> {
    let local_positions = rbt_db::positions::all_open_or_closing(pool).await?;
    let local_by_ticker: BTreeMap<String, Position> = local_positions.into_iter().map(|p| (p.ticker.clone(), p)).collect();
    let broker_by_ticker: BTreeMap<String, BrokerPosition> = broker_positions.iter().map(|p| (p.symbol.clone(), p.clone())).collect();

    let mut tickers: BTreeSet<String> = BTreeSet::new();
    tickers.extend(local_by_ticker.keys().cloned());
    tickers.extend(broker_by_ticker.keys().cloned());

    let mut classifications = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        let local = local_by_ticker.get(&ticker);
        let broker = broker_by_ticker.get(&ticker);
        let bucket = classify(local, broker, price_tol_pct);
        classifications.push(TickerClassification {
            ticker: ticker.clone(),
            bucket,
            local_qty: local.map(|p| p.quantity),
            broker_qty: broker.map(|p| p.qty),
        });
    }

    let (status, message) = apply_status_rule(&classifications);

    for c in &classifications {
        match c.bucket {
            Bucket::MissingInLocal => {
                let broker_pos = broker_by_ticker.get(&c.ticker).expect("missing_in_local implies a broker row");
                let ticket_id = format!("RCL-{}-{}", c.ticker, now.format("%Y%m%d%H%M%S"));
                let position = Position {
                    ticket_id,
                    ticker: c.ticker.clone(),
                    strategy: "RECONCILED".to_string(),
                    entry_time: now,
                    entry_price: broker_pos.avg_entry_price,
                    quantity: broker_pos.qty,
                    current_price: broker_pos.current_price,
                    stop_loss: 0.0,
                    status: PositionStatus::Open,
                    exit_signal: None,
                    exit_time: None,
                    exit_price: None,
                };
                // INSERT OR IGNORE semantics via the deterministic ticket id keep a
                // repeated run a no-op — see rbt_db::positions::insert's unique index.
                let _ = rbt_db::positions::insert(pool, &position).await;
            }
            Bucket::MismatchPrice => {
                if let Some(broker_pos) = broker_by_ticker.get(&c.ticker) {
                    rbt_db::positions::overwrite_entry_price(pool, &c.ticker, broker_pos.avg_entry_price).await?;
                }
            }
            _ => {}
        }
    }

    rbt_db::health::append(
        pool,
        &HealthState { timestamp: now, state: status, reason: message.clone() },
    )
    .await?;

    Ok(ReconcileReport { status, message, classifications })
}

fn apply_status_rule(classifications: &[TickerClassification]) -> (HealthStatus, String) {
    if classifications.iter().any(|c| c.bucket == Bucket::MismatchQuantity) {
        return (HealthStatus::Red, "mismatch_quantity detected".to_string());
    }
    if classifications.iter().any(|c| c.bucket == Bucket::MissingInBroker) {
        return (HealthStatus::Red, "missing_in_broker detected".to_string());
    }
    if classifications.iter().any(|c| c.bucket == Bucket::MissingInLocal) {
        return (HealthStatus::Yellow, "missing_in_local auto-healed".to_string());
    }
    if classifications.iter().any(|c| c.bucket == Bucket::MismatchPrice) {
        return (HealthStatus::Yellow, "mismatch_price auto-healed".to_string());
    }
    (HealthStatus::Green, "reconciled clean".to_string())
}

/// O(1) invariant Sentinel polls every tick: `|L| == |A|`.
pub async fn quick_check(pool: &SqlitePool, broker_positions: &[BrokerPosition]) -> Result<bool> {
    let local_count = rbt_db::positions::all_open_or_closing(pool).await?.len();
    Ok(local_count == broker_positions.len())
}
