//! Signal Engine: the KIV → CONFIRMED → EXECUTED/REJECTED/EXPIRED
//! state machine. Every transition is a guarded, single-row `UPDATE` in
//! `rbt-db::signals`, so a crash mid-transition always leaves the
//! pre-transition row intact.
//!
//! ```text
//! KIV → CONFIRMED   (on bounce)
//! KIV → EXPIRED     (on age > kiv_timeout)
//! CONFIRMED → EXECUTED (on fill)
//! CONFIRMED → REJECTED (on risk-gate denial)
//! CONFIRMED → EXPIRED  (on age > confirmed_timeout)
//! ```
//! No other transitions are legal; terminal states are immutable.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use rbt_schemas::{Signal, SignalStatus};
use sqlx::SqlitePool;

pub const KIV_TIMEOUT: Duration = Duration::hours(4);
pub const CONFIRMED_TIMEOUT: Duration = Duration::hours(2);
pub const BOUNCE_PCT: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    Added,
    Exists,
    RejectedCooldown,
}

#[derive(Debug, Clone)]
pub struct AddResult {
    pub status: AddStatus,
    pub signal_id: String,
}

/// Price quintuple a KIV candidate is seeded with.
#[derive(Debug, Clone, Copy)]
pub struct KivPrices {
    pub trigger_price: f64,
    pub rebound_bottom: f64,
    pub go_in_price: f64,
    pub profit_target: f64,
    pub stop_loss: f64,
}

fn signal_id(ticker: &str, strategy: &str, trigger_time: DateTime<Utc>) -> String {
    format!("{ticker}_{strategy}_{}", trigger_time.format("%Y%m%d%H"))
}

/// Checks Cooldown, then idempotency, before inserting a fresh KIV row.
pub async fn add_to_kiv(
    pool: &SqlitePool,
    ticker: &str,
    strategy: &str,
    prices: KivPrices,
    confidence: f64,
    now: DateTime<Utc>,
) -> Result<AddResult> {
    if rbt_risk::cooldown::is_on_cooldown(pool, ticker, strategy, now).await? {
        return Ok(AddResult { status: AddStatus::RejectedCooldown, signal_id: String::new() });
    }

    if let Some(existing) = rbt_db::signals::find_active(pool, ticker, strategy).await? {
        return Ok(AddResult { status: AddStatus::Exists, signal_id: existing.signal_id });
    }

    let id = signal_id(ticker, strategy, now);
    let signal = Signal {
        signal_id: id.clone(),
        ticker: ticker.to_string(),
        strategy: strategy.to_string(),
        trigger_time: now,
        trigger_price: prices.trigger_price,
        rebound_bottom: prices.rebound_bottom,
        go_in_price: prices.go_in_price,
        profit_target: prices.profit_target,
        stop_loss: prices.stop_loss,
        confidence,
        status: SignalStatus::Kiv,
        cooldown_until: None,
    };

    let inserted = rbt_db::signals::insert_kiv(pool, &signal).await?;
    if inserted {
        Ok(AddResult { status: AddStatus::Added, signal_id: id })
    } else {
        // Lost a race against an identical hourly-bucket insert; idempotent.
        Ok(AddResult { status: AddStatus::Exists, signal_id: id })
    }
}

#[derive(Debug, Clone)]
pub enum ConfirmationResult {
    Confirmed(Signal),
    Expired,
    NotYet,
    NoKiv,
}

/// Finds the newest KIV row for `(ticker, strategy)`; expires it if stale,
/// confirms it on bounce, otherwise leaves it untouched.
pub async fn check_confirmation(
    pool: &SqlitePool,
    ticker: &str,
    strategy: &str,
    current_price: f64,
    now: DateTime<Utc>,
) -> Result<ConfirmationResult> {
    let Some(candidate) = rbt_db::signals::find_newest_kiv(pool, ticker, strategy).await? else {
        return Ok(ConfirmationResult::NoKiv);
    };

    if now - candidate.trigger_time > KIV_TIMEOUT {
        let moved = rbt_db::signals::transition(pool, &candidate.signal_id, SignalStatus::Kiv, SignalStatus::Expired).await?;
        if !moved {
            bail!("signal {} changed state concurrently", candidate.signal_id);
        }
        return Ok(ConfirmationResult::Expired);
    }

    let bounce_threshold = candidate.rebound_bottom * (1.0 + BOUNCE_PCT);
    if current_price >= bounce_threshold {
        let moved = rbt_db::signals::transition(pool, &candidate.signal_id, SignalStatus::Kiv, SignalStatus::Confirmed).await?;
        if !moved {
            bail!("signal {} changed state concurrently", candidate.signal_id);
        }
        let mut confirmed = candidate;
        confirmed.status = SignalStatus::Confirmed;
        return Ok(ConfirmationResult::Confirmed(confirmed));
    }

    Ok(ConfirmationResult::NotYet)
}

/// Expires stale CONFIRMED rows (age measured from `trigger_time`, the KIV
/// creation time, not the later CONFIRMED transition), then returns the
/// survivors above `min_confidence`, sorted descending.
pub async fn get_confirmed_signals(pool: &SqlitePool, min_confidence: f64, now: DateTime<Utc>) -> Result<Vec<Signal>> {
    let confirmed = rbt_db::signals::find_all_confirmed(pool).await?;
    let mut survivors = Vec::with_capacity(confirmed.len());

    for signal in confirmed {
        if now - signal.trigger_time > CONFIRMED_TIMEOUT {
            rbt_db::signals::transition(pool, &signal.signal_id, SignalStatus::Confirmed, SignalStatus::Expired).await?;
            continue;
        }
        if signal.confidence >= min_confidence {
            survivors.push(signal);
        }
    }

    survivors.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    Ok(survivors)
}

pub async fn mark_executed(pool: &SqlitePool, signal_id: &str) -> Result<bool> {
    rbt_db::signals::transition(pool, signal_id, SignalStatus::Confirmed, SignalStatus::Executed).await
}

pub async fn reject_signal(pool: &SqlitePool, signal_id: &str) -> Result<bool> {
    rbt_db::signals::transition(pool, signal_id, SignalStatus::Confirmed, SignalStatus::Rejected).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade.db");
        let pool = rbt_db::connect(path.to_str().unwrap()).await.unwrap();
        rbt_db::migrate(&pool).await.unwrap();
        (pool, dir)
    }

    fn acme_prices() -> KivPrices {
        KivPrices {
            trigger_price: 10.00,
            rebound_bottom: 10.00,
            go_in_price: 10.20,
            profit_target: 10.50,
            stop_loss: 9.80,
        }
    }

    #[tokio::test]
    async fn add_then_add_again_is_idempotent() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        let first = add_to_kiv(&pool, "ACME", "RSI", acme_prices(), 75.0, now).await.unwrap();
        assert_eq!(first.status, AddStatus::Added);

        let second = add_to_kiv(&pool, "ACME", "RSI", acme_prices(), 75.0, now).await.unwrap();
        assert_eq!(second.status, AddStatus::Exists);
        assert_eq!(second.signal_id, first.signal_id);
    }

    #[tokio::test]
    async fn confirmation_follows_the_bounce_threshold() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        add_to_kiv(&pool, "ACME", "RSI", acme_prices(), 75.0, now).await.unwrap();

        let still_kiv = check_confirmation(&pool, "ACME", "RSI", 10.05, now).await.unwrap();
        assert!(matches!(still_kiv, ConfirmationResult::NotYet));

        let confirmed = check_confirmation(&pool, "ACME", "RSI", 10.11, now).await.unwrap();
        assert!(matches!(confirmed, ConfirmationResult::Confirmed(_)));
    }

    #[tokio::test]
    async fn stale_kiv_expires_instead_of_confirming() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        add_to_kiv(&pool, "ACME", "RSI", acme_prices(), 75.0, now).await.unwrap();

        let later = now + Duration::hours(5);
        let result = check_confirmation(&pool, "ACME", "RSI", 10.11, later).await.unwrap();
        assert!(matches!(result, ConfirmationResult::Expired));
    }

    #[tokio::test]
    async fn confirmed_signal_expires_after_confirmed_timeout() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        add_to_kiv(&pool, "ACME", "RSI", acme_prices(), 75.0, now).await.unwrap();
        check_confirmation(&pool, "ACME", "RSI", 10.11, now).await.unwrap();

        let later = now + Duration::hours(3);
        let survivors = get_confirmed_signals(&pool, 0.0, later).await.unwrap();
        assert!(survivors.is_empty());
    }

    #[tokio::test]
    async fn on_cooldown_rejects_new_kiv() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        rbt_risk::cooldown::set_cooldown(&pool, "ACME", "RSI", rbt_risk::cooldown::CooldownReason::StopLoss, now)
            .await
            .unwrap();

        let result = add_to_kiv(&pool, "ACME", "RSI", acme_prices(), 75.0, now).await.unwrap();
        assert_eq!(result.status, AddStatus::RejectedCooldown);
    }
}
