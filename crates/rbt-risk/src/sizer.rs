//! Position Sizer: confidence- and volatility-scaled share count,
//! plus the risk-validation check used by the Risk Gate.

use anyhow::Result;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy)]
pub struct SizerConfig {
    pub total_capital: f64,
    pub max_per_trade: f64,
    pub risk_per_trade_pct: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            total_capital: 10_000.0,
            max_per_trade: 2_000.0,
            risk_per_trade_pct: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SizeResult {
    pub shares: i64,
    pub notional_value: f64,
}

/// Total capital minus the notional of every OPEN/CLOSING position, so
/// sizing never double-commits capital that's already in a live trade.
pub async fn available_capital(pool: &SqlitePool, config: &SizerConfig) -> Result<f64> {
    let open_positions = rbt_db::positions::all_open_or_closing(pool).await?;
    let committed: f64 = open_positions
        .iter()
        .map(|p| p.entry_price * p.quantity as f64)
        .sum();
    Ok(config.total_capital - committed)
}

pub fn calculate_shares(config: &SizerConfig, price: f64, confidence: f64, atr: Option<f64>, available_capital: f64) -> SizeResult {
    if price <= 0.0 {
        return SizeResult { shares: 0, notional_value: 0.0 };
    }

    let base_allocation = config.max_per_trade.min(available_capital * 0.2);
    let confidence_multiplier = confidence / 100.0;
    let confidence_allocation = base_allocation * confidence_multiplier;

    let volatility_multiplier = match atr {
        Some(atr) if price > 0.0 => {
            let atr_pct = atr / price;
            if atr_pct > 0.05 {
                0.5
            } else if atr_pct < 0.01 {
                1.2
            } else {
                1.0
            }
        }
        _ => 1.0,
    };

    let final_allocation = (confidence_allocation * volatility_multiplier).min(config.max_per_trade);
    let shares = (final_allocation / price).floor() as i64;
    let notional_value = shares as f64 * price;

    SizeResult { shares, notional_value }
}

/// `risk = |entry - stop| × shares`; rejects when `risk/capital` exceeds
/// twice the per-trade risk budget, or `risk` exceeds 5% of capital.
pub fn validate_risk(config: &SizerConfig, entry_price: f64, stop_loss: f64, shares: i64, capital: f64) -> Result<(), String> {
    if shares <= 0 || capital <= 0.0 {
        return Err("INVALID_INPUT: non-positive shares or capital".to_string());
    }
    let risk_amount = (entry_price - stop_loss).abs() * shares as f64;
    let risk_pct = risk_amount / capital;

    if risk_pct > config.risk_per_trade_pct * 2.0 {
        return Err(format!(
            "RISK_TOO_HIGH: {risk_pct:.4} > {:.4}",
            config.risk_per_trade_pct * 2.0
        ));
    }
    if risk_amount > capital * 0.05 {
        return Err(format!("RISK_AMOUNT_TOO_HIGH: {risk_amount:.2} > {:.2}", capital * 0.05));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_sizing_follows_the_five_step_formula() {
        // ACME/RSI entry at confidence=75 against a $2000 per-trade cap.
        // base = min(2000, 2000*0.2=400) = 400; scaled = 400*0.75 = 300
        // vol_mult = 1.0 (no atr); final = min(300, 2000) = 300
        // shares = floor(300/10.20) = 29
        let config = SizerConfig { total_capital: 10_000.0, max_per_trade: 2_000.0, risk_per_trade_pct: 0.01 };
        let result = calculate_shares(&config, 10.20, 75.0, None, 2_000.0);
        assert_eq!(result.shares, 29);
    }

    #[test]
    fn high_volatility_halves_allocation() {
        let config = SizerConfig::default();
        let low_vol = calculate_shares(&config, 100.0, 100.0, Some(0.5), 10_000.0);
        let high_vol = calculate_shares(&config, 100.0, 100.0, Some(10.0), 10_000.0);
        assert!(high_vol.shares < low_vol.shares);
    }

    #[test]
    fn validate_risk_rejects_above_five_percent_of_capital() {
        let config = SizerConfig::default();
        let result = validate_risk(&config, 100.0, 50.0, 100, 1_000.0);
        assert!(result.is_err());
    }

    #[test]
    fn validate_risk_allows_small_risk() {
        let config = SizerConfig::default();
        let result = validate_risk(&config, 10.20, 9.80, 19, 10_000.0);
        assert!(result.is_ok());
    }
}
