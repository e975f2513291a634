//! Cooldown Map: per (ticker, strategy) re-entry lockout after exits.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    StopLoss,
    TakeProfit,
    Rejected,
    Other,
}

impl CooldownReason {
    fn duration_minutes(&self) -> i64 {
        match self {
            CooldownReason::StopLoss => 60,
            CooldownReason::TakeProfit => 30,
            CooldownReason::Rejected => 15,
            CooldownReason::Other => 60,
        }
    }
}

pub async fn set_cooldown(
    pool: &SqlitePool,
    ticker: &str,
    strategy: &str,
    reason: CooldownReason,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let until = now + Duration::minutes(reason.duration_minutes());
    rbt_db::cooldown::set_cooldown(pool, ticker, strategy, until).await?;
    Ok(until)
}

pub async fn is_on_cooldown(pool: &SqlitePool, ticker: &str, strategy: &str, now: DateTime<Utc>) -> Result<bool> {
    let until = rbt_db::cooldown::cooldown_until(pool, ticker, strategy).await?;
    Ok(until.map(|t| t > now).unwrap_or(false))
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

    #[tokio::test]
    async fn stop_loss_cooldown_is_sixty_minutes() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        set_cooldown(&pool, "ACME", "RSI", CooldownReason::StopLoss, now)
            .await
            .unwrap();

        assert!(is_on_cooldown(&pool, "ACME", "RSI", now).await.unwrap());
        assert!(!is_on_cooldown(&pool, "ACME", "RSI", now + Duration::minutes(61))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn no_entry_means_not_on_cooldown() {
        let (pool, _dir) = temp_pool().await;
        assert!(!is_on_cooldown(&pool, "ACME", "RSI", Utc::now()).await.unwrap());
    }
}
