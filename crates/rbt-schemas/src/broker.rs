//! Broker API contract. Two adapters implement this: `rbt-broker-paper`
//! for deterministic in-memory fills, `rbt-broker-alpaca` for the live wire.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOrderRequest {
    pub symbol: String,
    pub qty: i64,
    pub side: Side,
    pub order_type: OrderType,
    pub limit_price: Option<f64>,
    /// Written into the broker-side client order id when the wire supports it,
    /// so a restarted process can recover pending orders by prefix.
    pub client_order_id: String,
}

#[derive(Debug, Clone)]
pub struct BrokerOrder {
    pub id: String,
    pub client_order_id: String,
    pub filled_at: Option<DateTime<Utc>>,
    pub filled_avg_price: Option<f64>,
    pub filled_qty: i64,
    pub canceled_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
}

impl BrokerOrder {
    pub fn is_filled(&self) -> bool {
        self.filled_at.is_some() && self.filled_avg_price.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.is_filled() || self.canceled_at.is_some() || self.rejected_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: i64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    pub unrealized_pl: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker transport error: {0}")]
    Transport(String),
    #[error("broker rejected order: {0}")]
    Rejected(String),
    #[error("order not found: {0}")]
    NotFound(String),
}

/// Object-safe so callers can hold a `Box<dyn Broker>` without knowing the
/// concrete adapter (paper vs. live) wired in for the run.
pub trait Broker: Send + Sync {
    fn submit_order(&self, req: SubmitOrderRequest) -> Result<BrokerOrder, BrokerError>;
    fn get_order_by_id(&self, id: &str) -> Result<BrokerOrder, BrokerError>;
    fn get_open_position(&self, symbol: &str) -> Result<Option<BrokerPosition>, BrokerError>;
    fn get_all_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;
    fn cancel_order_by_id(&self, id: &str) -> Result<(), BrokerError>;
    /// Open orders whose client order id carries our ticket prefix; used at
    /// startup to rebuild the pending-orders map after a restart.
    fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;
}

/// Lets an `Arc<dyn Broker>` (or `Arc<ConcreteBroker>`) stand in wherever a
/// `Broker` is expected — needed when the same adapter instance is shared
/// between the execution path and some other owner (e.g. paper trading's
/// in-memory price map backing both `Broker` and `MarketData`).
impl<T: Broker + ?Sized> Broker for std::sync::Arc<T> {
    fn submit_order(&self, req: SubmitOrderRequest) -> Result<BrokerOrder, BrokerError> {
        (**self).submit_order(req)
    }
    fn get_order_by_id(&self, id: &str) -> Result<BrokerOrder, BrokerError> {
        (**self).get_order_by_id(id)
    }
    fn get_open_position(&self, symbol: &str) -> Result<Option<BrokerPosition>, BrokerError> {
        (**self).get_open_position(symbol)
    }
    fn get_all_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        (**self).get_all_positions()
    }
    fn cancel_order_by_id(&self, id: &str) -> Result<(), BrokerError> {
        (**self).cancel_order_by_id(id)
    }
    fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        (**self).list_open_orders()
    }
}
