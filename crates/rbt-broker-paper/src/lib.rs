//! Deterministic in-memory paper broker.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - every submitted order fills immediately at `limit_price` if given,
//!   otherwise at whatever price was last set for the symbol via
//!   `set_market_price`; there is no partial-fill or rejection simulation.
//! - `broker_order_id` is a sequential `PAPER-{n}` counter, not derived from
//!   the client order id, so two submits with the same client id still get
//!   distinct broker ids (mirroring how a real venue assigns its own id).
//! - positions track a running qty-weighted average entry price; selling
//!   below the open qty reduces it, selling the rest removes the entry.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use rbt_schemas::broker::{
    Broker, BrokerError, BrokerOrder, BrokerPosition, Side, SubmitOrderRequest,
};
use rbt_schemas::marketdata::{Bar, MarketData, MarketDataError, Quote, Snapshot, Trade};

#[derive(Default)]
struct Inner {
    orders: BTreeMap<String, BrokerOrder>,
    positions: BTreeMap<String, BrokerPosition>,
    market_prices: BTreeMap<String, f64>,
    next_id: u64,
}

#[derive(Default)]
pub struct PaperBroker {
    inner: Mutex<Inner>,
}

impl PaperBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price a market order (or a limit order with no price) fills
    /// at, and the price used for position mark-to-market.
    pub fn set_market_price(&self, symbol: &str, price: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.market_prices.insert(symbol.to_string(), price);
        if let Some(position) = inner.positions.get_mut(symbol) {
            position.current_price = price;
            position.unrealized_pl = (price - position.avg_entry_price) * position.qty as f64;
        }
    }

    fn next_order_id(inner: &mut Inner) -> String {
        inner.next_id += 1;
        format!("PAPER-{:06}", inner.next_id)
    }
}

impl Broker for PaperBroker {
    fn submit_order(&self, req: SubmitOrderRequest) -> Result<BrokerOrder, BrokerError> {
        let mut inner = self.inner.lock().unwrap();
        let fill_price = req
            .limit_price
            .or_else(|| inner.market_prices.get(&req.symbol).copied())
            .ok_or_else(|| BrokerError::Rejected(format!("no market price known for {}", req.symbol)))?;

        let id = Self::next_order_id(&mut inner);
        let now = Utc::now();
        let order = BrokerOrder {
            id: id.clone(),
            client_order_id: req.client_order_id.clone(),
            filled_at: Some(now),
            filled_avg_price: Some(fill_price),
            filled_qty: req.qty,
            canceled_at: None,
            rejected_at: None,
        };
        inner.orders.insert(id.clone(), order.clone());
        apply_fill(&mut inner.positions, &req.symbol, req.side, req.qty, fill_price);

        Ok(order)
    }

    fn get_order_by_id(&self, id: &str) -> Result<BrokerOrder, BrokerError> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::NotFound(id.to_string()))
    }

    fn get_open_position(&self, symbol: &str) -> Result<Option<BrokerPosition>, BrokerError> {
        Ok(self.inner.lock().unwrap().positions.get(symbol).cloned())
    }

    fn get_all_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Ok(self.inner.lock().unwrap().positions.values().cloned().collect())
    }

    fn cancel_order_by_id(&self, id: &str) -> Result<(), BrokerError> {
        // Every order fills synchronously in submit_order, so there is
        // never anything left to cancel; still validate the id is known.
        if self.inner.lock().unwrap().orders.contains_key(id) {
            Ok(())
        } else {
            Err(BrokerError::NotFound(id.to_string()))
        }
    }

    fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        // Nothing is ever left pending by this adapter.
        Ok(Vec::new())
    }
}

/// No bid/ask spread or historical bars to simulate, so quotes collapse to
/// the same set price and `get_bars` always reports empty history.
impl MarketData for PaperBroker {
    fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        let price = self
            .inner
            .lock()
            .unwrap()
            .market_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))?;
        Ok(Snapshot {
            latest_trade: Trade { price, size: 0 },
            latest_bid: Quote { price },
            latest_ask: Quote { price },
        })
    }

    fn get_latest_trade(&self, symbol: &str) -> Result<Trade, MarketDataError> {
        let price = self
            .inner
            .lock()
            .unwrap()
            .market_prices
            .get(symbol)
            .copied()
            .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))?;
        Ok(Trade { price, size: 0 })
    }

    fn get_bars(
        &self,
        _symbol: &str,
        _timeframe: &str,
        _start: chrono::DateTime<Utc>,
        _end: chrono::DateTime<Utc>,
    ) -> Result<Vec<Bar>, MarketDataError> {
        Ok(Vec::new())
    }
}

fn apply_fill(positions: &mut BTreeMap<String, BrokerPosition>, symbol: &str, side: Side, qty: i64, price: f64) {
    let signed = match side {
        Side::Buy => qty,
        Side::Sell => -qty,
    };

    match positions.get_mut(symbol) {
        Some(existing) => {
            let new_qty = existing.qty + signed;
            if new_qty == 0 {
                positions.remove(symbol);
                return;
            }
            if existing.qty.signum() == signed.signum() || existing.qty == 0 {
                let total_cost = existing.avg_entry_price * existing.qty as f64 + price * signed as f64;
                existing.avg_entry_price = total_cost / new_qty as f64;
            }
            existing.qty = new_qty;
            existing.current_price = price;
            existing.unrealized_pl = (price - existing.avg_entry_price) * new_qty as f64;
        }
        None => {
            positions.insert(
                symbol.to_string(),
                BrokerPosition {
                    symbol: symbol.to_string(),
                    qty: signed,
                    avg_entry_price: price,
                    current_price: price,
                    unrealized_pl: 0.0,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbt_schemas::broker::OrderType;

    fn buy(symbol: &str, qty: i64, client_order_id: &str) -> SubmitOrderRequest {
        SubmitOrderRequest {
            symbol: symbol.to_string(),
            qty,
            side: Side::Buy,
            order_type: OrderType::Market,
            limit_price: None,
            client_order_id: client_order_id.to_string(),
        }
    }

    #[test]
    fn market_order_fills_immediately_at_the_set_price() {
        let broker = PaperBroker::new();
        broker.set_market_price("ABC", 10.0);

        let order = broker.submit_order(buy("ABC", 10, "TKT-1")).unwrap();
        assert!(order.is_filled());
        assert_eq!(order.filled_avg_price, Some(10.0));

        let position = broker.get_open_position("ABC").unwrap().unwrap();
        assert_eq!(position.qty, 10);
        assert_eq!(position.avg_entry_price, 10.0);
    }

    #[test]
    fn averaging_into_a_position_weights_by_fill_price() {
        let broker = PaperBroker::new();
        broker.set_market_price("ABC", 10.0);
        broker.submit_order(buy("ABC", 10, "TKT-1")).unwrap();

        broker.set_market_price("ABC", 20.0);
        broker.submit_order(buy("ABC", 10, "TKT-2")).unwrap();

        let position = broker.get_open_position("ABC").unwrap().unwrap();
        assert_eq!(position.qty, 20);
        assert_eq!(position.avg_entry_price, 15.0);
    }

    #[test]
    fn selling_the_whole_position_closes_it() {
        let broker = PaperBroker::new();
        broker.set_market_price("ABC", 10.0);
        broker.submit_order(buy("ABC", 10, "TKT-1")).unwrap();

        let sell = SubmitOrderRequest {
            symbol: "ABC".to_string(),
            qty: 10,
            side: Side::Sell,
            order_type: OrderType::Market,
            limit_price: None,
            client_order_id: "TKT-1".to_string(),
        };
        broker.submit_order(sell).unwrap();

        assert!(broker.get_open_position("ABC").unwrap().is_none());
    }

    #[test]
    fn limit_price_overrides_the_set_market_price() {
        let broker = PaperBroker::new();
        broker.set_market_price("ABC", 10.0);

        let mut req = buy("ABC", 5, "TKT-1");
        req.order_type = OrderType::Limit;
        req.limit_price = Some(9.5);
        let order = broker.submit_order(req).unwrap();
        assert_eq!(order.filled_avg_price, Some(9.5));
    }

    #[test]
    fn unknown_order_id_is_not_found() {
        let broker = PaperBroker::new();
        let err = broker.get_order_by_id("missing").unwrap_err();
        assert!(matches!(err, BrokerError::NotFound(_)));
    }

    #[test]
    fn snapshot_reflects_the_last_set_market_price() {
        let broker = PaperBroker::new();
        broker.set_market_price("ABC", 12.5);
        let snapshot = broker.get_snapshot("ABC").unwrap();
        assert_eq!(snapshot.latest_trade.price, 12.5);
        assert_eq!(snapshot.latest_bid.price, 12.5);
    }

    #[test]
    fn snapshot_for_unset_symbol_is_not_found() {
        let broker = PaperBroker::new();
        assert!(matches!(broker.get_snapshot("NOPE"), Err(MarketDataError::NotFound(_))));
    }
}
