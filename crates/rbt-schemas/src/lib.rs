//! Shared data model and external-collaborator contracts.
//!
//! Every entity the core engines read or write lives here so that no two
//! crates invent their own shadow copy of a `Signal` or a `Position`. The
//! `broker` and `marketdata` modules define the traits the orchestrator
//! depends on without knowing which concrete adapter is wired in.

pub mod broker;
pub mod marketdata;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stage of the signal state machine. Transitions are one-directional;
/// see `rbt-signal` for the guarded transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    Kiv,
    Confirmed,
    Executed,
    Expired,
    Rejected,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Kiv => "KIV",
            SignalStatus::Confirmed => "CONFIRMED",
            SignalStatus::Executed => "EXECUTED",
            SignalStatus::Expired => "EXPIRED",
            SignalStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "KIV" => Some(SignalStatus::Kiv),
            "CONFIRMED" => Some(SignalStatus::Confirmed),
            "EXECUTED" => Some(SignalStatus::Executed),
            "EXPIRED" => Some(SignalStatus::Expired),
            "REJECTED" => Some(SignalStatus::Rejected),
            _ => None,
        }
    }
}

/// A candidate trade, deterministically keyed by `ticker_strategy_YYYYMMDDHH`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    pub ticker: String,
    pub strategy: String,
    pub trigger_time: DateTime<Utc>,
    pub trigger_price: f64,
    pub rebound_bottom: f64,
    pub go_in_price: f64,
    pub profit_target: f64,
    pub stop_loss: f64,
    pub confidence: f64,
    pub status: SignalStatus,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closing => "CLOSING",
            PositionStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(PositionStatus::Open),
            "CLOSING" => Some(PositionStatus::Closing),
            "CLOSED" => Some(PositionStatus::Closed),
            _ => None,
        }
    }
}

/// A held or formerly-held share position. `ticket_id` binds the local row
/// to whatever the broker accepted at submit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket_id: String,
    pub ticker: String,
    pub strategy: String,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: i64,
    pub current_price: f64,
    pub stop_loss: f64,
    pub status: PositionStatus,
    pub exit_signal: Option<String>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinLoss {
    Win,
    Loss,
}

impl WinLoss {
    pub fn as_str(&self) -> &'static str {
        match self {
            WinLoss::Win => "WIN",
            WinLoss::Loss => "LOSS",
        }
    }
}

/// Append-only record of a closed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistoryEntry {
    pub ticket_id: String,
    pub exit_time: DateTime<Utc>,
    pub ticker: String,
    pub strategy: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: i64,
    pub pnl_pct: f64,
    pub win_loss: WinLoss,
    pub exit_reason: String,
}

impl TradeHistoryEntry {
    /// `pnl_pct = (exit_price - entry_price) / entry_price`, computed exactly
    /// once at archive time so no caller can derive a drifting value later.
    pub fn pnl_pct(entry_price: f64, exit_price: f64) -> f64 {
        (exit_price - entry_price) / entry_price
    }
}

/// Per-symbol quarantine with exponential backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreEntry {
    pub ticker: String,
    pub reason_code: String,
    pub scope: String,
    pub ttl_utc: DateTime<Utc>,
    pub retry_count: i64,
    pub backoff_level: u8,
    pub first_seen: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Per (ticker, strategy) re-entry lockout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub ticker: String,
    pub strategy: String,
    pub cooldown_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Green => "GREEN",
            HealthStatus::Yellow => "YELLOW",
            HealthStatus::Red => "RED",
        }
    }
}

/// Append-only health roll-up row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthState {
    pub timestamp: DateTime<Utc>,
    pub state: HealthStatus,
    pub reason: String,
}

/// Cached quote, read-through by `rbt-pricecache`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceCacheEntry {
    pub ticker: String,
    pub price: f64,
    pub volume: i64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

/// Fill-quality telemetry recorded by the Executor on every fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionQuality {
    pub ticket_id: String,
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub expected_price: f64,
    pub actual_price: f64,
    pub slippage_pct: f64,
    pub expected_qty: i64,
    pub actual_qty: i64,
    pub fill_ratio: f64,
    pub partial_fill: bool,
    pub order_type: String,
    pub side: String,
}

impl ExecutionQuality {
    pub fn new(
        ticket_id: impl Into<String>,
        ticker: impl Into<String>,
        timestamp: DateTime<Utc>,
        expected_price: f64,
        actual_price: f64,
        expected_qty: i64,
        actual_qty: i64,
        order_type: impl Into<String>,
        side: impl Into<String>,
    ) -> Self {
        let slippage_pct = if expected_price == 0.0 {
            0.0
        } else {
            (actual_price - expected_price) / expected_price
        };
        let fill_ratio = if expected_qty == 0 {
            0.0
        } else {
            actual_qty as f64 / expected_qty as f64
        };
        Self {
            ticket_id: ticket_id.into(),
            ticker: ticker.into(),
            timestamp,
            expected_price,
            actual_price,
            slippage_pct,
            expected_qty,
            actual_qty,
            fill_ratio,
            partial_fill: actual_qty != expected_qty,
            order_type: order_type.into(),
            side: side.into(),
        }
    }
}
