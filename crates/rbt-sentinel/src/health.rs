//! Composite health roll-up: six checks folded into GREEN/YELLOW/RED
//! with a one-CRITICAL-wins / one-WARNING-wins structure.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rbt_schemas::{HealthState, HealthStatus};
use sqlx::SqlitePool;

use crate::kill_switch::KillSwitch;
use crate::rate_limiter::ApiRateCounter;
use crate::regime::Regime;

#[derive(Debug, Clone, Copy)]
pub struct SentinelConfig {
    pub max_api_calls_per_min: u32,
    pub max_data_errors_per_day: i64,
    pub max_consecutive_failures: u32,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            max_api_calls_per_min: 200,
            max_data_errors_per_day: 20,
            max_consecutive_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckLevel {
    Ok,
    Warning,
    Critical,
}

struct Check {
    name: &'static str,
    level: CheckLevel,
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub reason: String,
}

/// Runs the six checks, appends a `health_state` row, and returns the
/// computed status. `quick_check_ok` comes from the reconciler;
/// `consecutive_failures` is maintained by the caller across ticks.
#[allow(clippy::too_many_arguments)]
pub async fn check_health(
    pool: &SqlitePool,
    config: &SentinelConfig,
    api_calls: &mut ApiRateCounter,
    kill_switch: &KillSwitch,
    regime: Regime,
    quick_check_ok: bool,
    consecutive_failures: u32,
    now: DateTime<Utc>,
) -> Result<HealthReport> {
    let calls_in_window = api_calls.calls_in_window(now);
    let usage_pct = calls_in_window as f64 / config.max_api_calls_per_min as f64 * 100.0;
    let api_check = Check {
        name: "api_usage",
        level: if usage_pct >= 90.0 {
            CheckLevel::Critical
        } else if usage_pct >= 75.0 {
            CheckLevel::Warning
        } else {
            CheckLevel::Ok
        },
    };

    let errors_today = rbt_db::errors::count_errors_today(pool).await?;
    let data_check = Check {
        name: "data_quality",
        level: if errors_today > config.max_data_errors_per_day {
            CheckLevel::Critical
        } else if errors_today as f64 > config.max_data_errors_per_day as f64 * 0.7 {
            CheckLevel::Warning
        } else {
            CheckLevel::Ok
        },
    };

    let reconcile_check = Check {
        name: "reconciliation",
        level: if quick_check_ok { CheckLevel::Ok } else { CheckLevel::Critical },
    };

    let regime_check = Check {
        name: "market_conditions",
        level: match regime {
            Regime::Crash => CheckLevel::Critical,
            Regime::Bear => CheckLevel::Warning,
            Regime::Normal => CheckLevel::Ok,
        },
    };

    let kill_switch_check = Check {
        name: "kill_switch",
        level: if kill_switch.is_engaged() { CheckLevel::Critical } else { CheckLevel::Ok },
    };

    let consecutive_check = Check {
        name: "consecutive_failures",
        level: if consecutive_failures >= config.max_consecutive_failures { CheckLevel::Critical } else { CheckLevel::Ok },
    };

    let checks = [api_check, data_check, reconcile_check, regime_check, kill_switch_check, consecutive_check];

    let critical: Vec<&str> = checks.iter().filter(|c| c.level == CheckLevel::Critical).map(|c| c.name).collect();
    let (status, reason) = if !critical.is_empty() {
        (HealthStatus::Red, format!("critical: {}", critical.join(", ")))
    } else {
        let warning: Vec<&str> = checks.iter().filter(|c| c.level == CheckLevel::Warning).map(|c| c.name).collect();
        if !warning.is_empty() {
            (HealthStatus::Yellow, format!("warnings: {}", warning.join(", ")))
        } else {
            (HealthStatus::Green, "all systems nominal".to_string())
        }
    };

    rbt_db::health::append(pool, &HealthState { timestamp: now, state: status, reason: reason.clone() }).await?;

    Ok(HealthReport { status, reason })
}

/// Never trades with the kill switch engaged; RED halts regardless of the
/// caller's own intent.
pub fn should_trade(kill_switch: &KillSwitch, report: &HealthReport) -> (bool, String) {
    if let KillSwitch::Engaged { reason } = kill_switch {
        return (false, format!("kill switch: {reason}"));
    }
    if report.status == HealthStatus::Red {
        return (false, format!("system RED: {}", report.reason));
    }
    (true, report.reason.clone())
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
    async fn clean_state_is_green_and_tradeable() {
        let (pool, _dir) = temp_pool().await;
        let config = SentinelConfig::default();
        let mut api_calls = ApiRateCounter::new();
        let kill_switch = KillSwitch::default();

        let report = check_health(&pool, &config, &mut api_calls, &kill_switch, Regime::Normal, true, 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.status, HealthStatus::Green);
        assert!(should_trade(&kill_switch, &report).0);
    }

    #[tokio::test]
    async fn quick_check_failure_is_red_and_blocks_trading() {
        let (pool, _dir) = temp_pool().await;
        let config = SentinelConfig::default();
        let mut api_calls = ApiRateCounter::new();
        let kill_switch = KillSwitch::default();

        let report = check_health(&pool, &config, &mut api_calls, &kill_switch, Regime::Normal, false, 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.status, HealthStatus::Red);
        assert!(!should_trade(&kill_switch, &report).0);
    }

    #[tokio::test]
    async fn kill_switch_overrides_green_health() {
        let (pool, _dir) = temp_pool().await;
        let config = SentinelConfig::default();
        let mut api_calls = ApiRateCounter::new();
        let kill_switch = KillSwitch::engage("manual halt");

        let report = check_health(&pool, &config, &mut api_calls, &kill_switch, Regime::Normal, true, 0, Utc::now())
            .await
            .unwrap();
        let (trade, reason) = should_trade(&kill_switch, &report);
        assert!(!trade);
        assert!(reason.contains("manual halt"));
    }

    #[tokio::test]
    async fn crash_regime_is_red() {
        let (pool, _dir) = temp_pool().await;
        let config = SentinelConfig::default();
        let mut api_calls = ApiRateCounter::new();
        let kill_switch = KillSwitch::default();

        let report = check_health(&pool, &config, &mut api_calls, &kill_switch, Regime::Crash, true, 0, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.status, HealthStatus::Red);
    }
}
