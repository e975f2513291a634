//! Risk Gate: composite admission controller over Ignore, Limits,
//! Cooldown, and the Sizer.

use crate::daily_limits::{self, DailyLimitsConfig};
use crate::sizer::{self, SizerConfig};
use crate::{cooldown, ignore_list};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy)]
pub struct RiskConfig {
    pub daily_limits: DailyLimitsConfig,
    pub sizer: SizerConfig,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_limits: DailyLimitsConfig::default(),
            sizer: SizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum GateDecision {
    Approved { shares: i64 },
    Denied { reason: String },
}

pub struct RiskGate {
    pub config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Approves only if: not ignored (ticker scope or ALL), daily limits
    /// allow, not on cooldown, sizer yields ≥1 share and passes
    /// `validate_risk`, and no existing OPEN/CLOSING position for the ticker.
    pub async fn approve(
        &self,
        pool: &SqlitePool,
        ticker: &str,
        strategy: &str,
        go_in_price: f64,
        stop_loss: f64,
        confidence: f64,
        atr: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<GateDecision> {
        if ignore_list::is_ignored(pool, ticker, now).await? {
            return Ok(GateDecision::Denied { reason: "IGNORED".to_string() });
        }

        let pnl = daily_limits::pnl_today(pool, now).await?;
        if let Err(reason) = daily_limits::can_trade(&self.config.daily_limits, &pnl) {
            return Ok(GateDecision::Denied { reason });
        }

        if cooldown::is_on_cooldown(pool, ticker, strategy, now).await? {
            return Ok(GateDecision::Denied { reason: "COOLDOWN".to_string() });
        }

        if rbt_db::positions::find_open_or_closing(pool, ticker).await?.is_some() {
            return Ok(GateDecision::Denied { reason: "POSITION_ALREADY_OPEN".to_string() });
        }

        let capital = sizer::available_capital(pool, &self.config.sizer).await?;
        let sized = sizer::calculate_shares(&self.config.sizer, go_in_price, confidence, atr, capital);
        if sized.shares < 1 {
            return Ok(GateDecision::Denied { reason: "ZERO_SHARES".to_string() });
        }

        if let Err(reason) = sizer::validate_risk(&self.config.sizer, go_in_price, stop_loss, sized.shares, capital) {
            return Ok(GateDecision::Denied { reason });
        }

        Ok(GateDecision::Approved { shares: sized.shares })
    }
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
    async fn approves_clean_signal() {
        let (pool, _dir) = temp_pool().await;
        let gate = RiskGate::new(RiskConfig::default());
        let decision = gate
            .approve(&pool, "ACME", "RSI", 10.20, 9.80, 75.0, None, Utc::now())
            .await
            .unwrap();
        matches!(decision, GateDecision::Approved { .. });
    }

    #[tokio::test]
    async fn denies_when_ignored() {
        let (pool, _dir) = temp_pool().await;
        ignore_list::add(&pool, "ACME", "X", "ALL", Utc::now()).await.unwrap();
        let gate = RiskGate::new(RiskConfig::default());
        let decision = gate
            .approve(&pool, "ACME", "RSI", 10.20, 9.80, 75.0, None, Utc::now())
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Denied { .. }));
    }

    #[tokio::test]
    async fn denies_when_position_already_open() {
        let (pool, _dir) = temp_pool().await;
        let position = rbt_schemas::Position {
            ticket_id: "TKT-aaaaaaaa".to_string(),
            ticker: "ACME".to_string(),
            strategy: "RSI".to_string(),
            entry_time: Utc::now(),
            entry_price: 10.0,
            quantity: 10,
            current_price: 10.0,
            stop_loss: 9.5,
            status: rbt_schemas::PositionStatus::Open,
            exit_signal: None,
            exit_time: None,
            exit_price: None,
        };
        rbt_db::positions::insert(&pool, &position).await.unwrap();

        let gate = RiskGate::new(RiskConfig::default());
        let decision = gate
            .approve(&pool, "ACME", "RSI", 10.20, 9.80, 75.0, None, Utc::now())
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Denied { .. }));
    }
}
