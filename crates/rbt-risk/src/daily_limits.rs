//! Daily Limits: realized + unrealized P&L aggregation with
//! loss-limit / profit-cap gating.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy)]
pub struct DailyLimitsConfig {
    pub daily_loss_limit: f64,
    pub daily_profit_cap: f64,
}

impl Default for DailyLimitsConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: 500.0,
            daily_profit_cap: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PnlSnapshot {
    pub realized: f64,
    pub unrealized: f64,
}

impl PnlSnapshot {
    pub fn total(&self) -> f64 {
        self.realized + self.unrealized
    }
}

pub async fn pnl_today(pool: &SqlitePool, as_of: DateTime<Utc>) -> Result<PnlSnapshot> {
    let realized = rbt_db::trade_history::realized_pnl_since_midnight(pool, as_of).await?;

    let open_positions = rbt_db::positions::all_open_or_closing(pool).await?;
    let unrealized: f64 = open_positions
        .iter()
        .map(|p| (p.current_price - p.entry_price) * p.quantity as f64)
        .sum();

    Ok(PnlSnapshot { realized, unrealized })
}

/// `total_pnl ≤ -daily_loss_limit` or `total_pnl ≥ daily_profit_cap` denies
/// new entries. Exits always remain allowed — this gate is consulted only by
/// the Risk Gate, never by the Exit Monitor.
pub fn can_trade(config: &DailyLimitsConfig, pnl: &PnlSnapshot) -> Result<(), String> {
    let total = pnl.total();
    if total <= -config.daily_loss_limit {
        return Err(format!(
            "DAILY_LOSS_LIMIT_HIT: total_pnl={total:.2} <= -{:.2}",
            config.daily_loss_limit
        ));
    }
    if total >= config.daily_profit_cap {
        return Err(format!(
            "DAILY_PROFIT_CAP_HIT: total_pnl={total:.2} >= {:.2}",
            config.daily_profit_cap
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_at_loss_limit_denies() {
        let config = DailyLimitsConfig { daily_loss_limit: 500.0, daily_profit_cap: 1000.0 };
        let pnl = PnlSnapshot { realized: -500.0, unrealized: 0.0 };
        assert!(can_trade(&config, &pnl).is_err());
    }

    #[test]
    fn one_cent_inside_loss_limit_allows() {
        let config = DailyLimitsConfig { daily_loss_limit: 500.0, daily_profit_cap: 1000.0 };
        let pnl = PnlSnapshot { realized: -499.99, unrealized: 0.0 };
        assert!(can_trade(&config, &pnl).is_ok());
    }

    #[test]
    fn realized_plus_unrealized_denies() {
        let config = DailyLimitsConfig { daily_loss_limit: 500.0, daily_profit_cap: 1000.0 };
        let pnl = PnlSnapshot { realized: -495.0, unrealized: -10.0 };
        assert!(can_trade(&config, &pnl).is_err());
    }
}
