//! Live broker adapter against the Alpaca trading API.
//!
//! The `Broker` trait is synchronous so the rest of the workspace never has
//! to know which adapter it's holding, but this adapter's transport is
//! `reqwest`'s async client — the orchestrator already runs everything
//! inside one `tokio` runtime, so each call bridges in with
//! `block_in_place` + `Handle::current().block_on` rather than pulling in a
//! second blocking HTTP client.

pub mod market_data;

use chrono::{DateTime, Utc};
use rbt_schemas::broker::{
    Broker, BrokerError, BrokerOrder, BrokerPosition, OrderType, Side, SubmitOrderRequest,
};
use serde::Deserialize;
use tokio::runtime::Handle;

pub use market_data::AlpacaMarketData;

pub struct AlpacaBroker {
    base_url: String,
    trading_key: String,
    secret_key: String,
    client: reqwest::Client,
}

impl AlpacaBroker {
    pub fn new(base_url: impl Into<String>, trading_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            trading_key: trading_key.into(),
            secret_key: secret_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.trading_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::task::block_in_place(|| Handle::current().block_on(fut))
    }

    async fn submit_order_async(&self, req: SubmitOrderRequest) -> Result<BrokerOrder, BrokerError> {
        let body = AlpacaSubmitOrder {
            symbol: req.symbol.clone(),
            qty: req.qty.to_string(),
            side: req.side.as_str().to_ascii_lowercase(),
            order_type: match req.order_type {
                OrderType::Market => "market".to_string(),
                OrderType::Limit => "limit".to_string(),
            },
            limit_price: req.limit_price.map(|p| format!("{p:.2}")),
            time_in_force: "day".to_string(),
            client_order_id: req.client_order_id,
        };

        let response = self
            .request(reqwest::Method::POST, "/v2/orders")
            .json(&body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        parse_order_response(response).await
    }

    async fn get_order_by_id_async(&self, id: &str) -> Result<BrokerOrder, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v2/orders/{id}"))
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        parse_order_response(response).await
    }

    async fn get_open_position_async(&self, symbol: &str) -> Result<Option<BrokerPosition>, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/v2/positions/{symbol}"))
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BrokerError::Transport(format!("{status}: {text}")));
        }
        let raw: AlpacaPosition = response.json().await.map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(Some(raw.into()))
    }

    async fn get_all_positions_async(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, "/v2/positions")
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BrokerError::Transport(format!("{status}: {text}")));
        }
        let raw: Vec<AlpacaPosition> = response.json().await.map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(raw.into_iter().map(Into::into).collect())
    }

    async fn cancel_order_by_id_async(&self, id: &str) -> Result<(), BrokerError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/v2/orders/{id}"))
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BrokerError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BrokerError::Transport(format!("{status}: {text}")));
        }
        Ok(())
    }

    /// Open orders whose `client_order_id` carries our `TKT-` ticket prefix,
    /// used at startup to rebuild the pending-orders map after a restart.
    async fn list_open_orders_async(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, "/v2/orders?status=open")
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BrokerError::Transport(format!("{status}: {text}")));
        }
        let raw: Vec<AlpacaOrder> = response.json().await.map_err(|e| BrokerError::Transport(e.to_string()))?;
        Ok(raw
            .into_iter()
            .filter(|o| o.client_order_id.starts_with("TKT-"))
            .map(Into::into)
            .collect())
    }
}

impl Broker for AlpacaBroker {
    fn submit_order(&self, req: SubmitOrderRequest) -> Result<BrokerOrder, BrokerError> {
        Self::block_on(self.submit_order_async(req))
    }

    fn get_order_by_id(&self, id: &str) -> Result<BrokerOrder, BrokerError> {
        Self::block_on(self.get_order_by_id_async(id))
    }

    fn get_open_position(&self, symbol: &str) -> Result<Option<BrokerPosition>, BrokerError> {
        Self::block_on(self.get_open_position_async(symbol))
    }

    fn get_all_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        Self::block_on(self.get_all_positions_async())
    }

    fn cancel_order_by_id(&self, id: &str) -> Result<(), BrokerError> {
        Self::block_on(self.cancel_order_by_id_async(id))
    }

    fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        Self::block_on(self.list_open_orders_async())
    }
}

async fn parse_order_response(response: reqwest::Response) -> Result<BrokerOrder, BrokerError> {
    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(BrokerError::NotFound(response.url().to_string()));
    }
    if status.as_u16() == 422 || status.as_u16() == 403 {
        let text = response.text().await.unwrap_or_default();
        return Err(BrokerError::Rejected(text));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(BrokerError::Transport(format!("{status}: {text}")));
    }
    let raw: AlpacaOrder = response.json().await.map_err(|e| BrokerError::Transport(e.to_string()))?;
    Ok(raw.into())
}

#[derive(Debug, serde::Serialize)]
struct AlpacaSubmitOrder {
    symbol: String,
    qty: String,
    side: String,
    #[serde(rename = "type")]
    order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<String>,
    time_in_force: String,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaOrder {
    id: String,
    client_order_id: String,
    status: String,
    filled_at: Option<DateTime<Utc>>,
    filled_avg_price: Option<String>,
    filled_qty: String,
    canceled_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
}

impl From<AlpacaOrder> for BrokerOrder {
    fn from(raw: AlpacaOrder) -> Self {
        let rejected_at = if raw.status == "rejected" { raw.failed_at.or(Some(Utc::now())) } else { None };
        BrokerOrder {
            id: raw.id,
            client_order_id: raw.client_order_id,
            filled_at: raw.filled_at,
            filled_avg_price: raw.filled_avg_price.and_then(|p| p.parse().ok()),
            filled_qty: raw.filled_qty.parse().unwrap_or(0),
            canceled_at: raw.canceled_at,
            rejected_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlpacaPosition {
    symbol: String,
    qty: String,
    side: String,
    avg_entry_price: String,
    current_price: String,
    unrealized_pl: String,
}

impl From<AlpacaPosition> for BrokerPosition {
    fn from(raw: AlpacaPosition) -> Self {
        let magnitude: i64 = raw.qty.parse().unwrap_or(0);
        let qty = if raw.side == "short" { -magnitude } else { magnitude };
        BrokerPosition {
            symbol: raw.symbol,
            qty,
            avg_entry_price: raw.avg_entry_price.parse().unwrap_or(0.0),
            current_price: raw.current_price.parse().unwrap_or(0.0),
            unrealized_pl: raw.unrealized_pl.parse().unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_payload_serializes_alpaca_shape() {
        let req = SubmitOrderRequest {
            symbol: "ABC".to_string(),
            qty: 5,
            side: Side::Buy,
            order_type: OrderType::Limit,
            limit_price: Some(10.25),
            client_order_id: "TKT-abcd1234".to_string(),
        };
        let body = AlpacaSubmitOrder {
            symbol: req.symbol,
            qty: req.qty.to_string(),
            side: req.side.as_str().to_ascii_lowercase(),
            order_type: "limit".to_string(),
            limit_price: req.limit_price.map(|p| format!("{p:.2}")),
            time_in_force: "day".to_string(),
            client_order_id: req.client_order_id,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "limit");
        assert_eq!(json["limit_price"], "10.25");
        assert_eq!(json["client_order_id"], "TKT-abcd1234");
    }

    #[test]
    fn rejected_status_maps_to_rejected_at() {
        let raw = AlpacaOrder {
            id: "1".into(),
            client_order_id: "TKT-1".into(),
            status: "rejected".into(),
            filled_at: None,
            filled_avg_price: None,
            filled_qty: "0".into(),
            canceled_at: None,
            failed_at: None,
        };
        let order: BrokerOrder = raw.into();
        assert!(order.rejected_at.is_some());
        assert!(!order.is_filled());
    }

    #[test]
    fn short_position_quantity_is_negative() {
        let raw = AlpacaPosition {
            symbol: "ABC".into(),
            qty: "10".into(),
            side: "short".into(),
            avg_entry_price: "10.0".into(),
            current_price: "9.0".into(),
            unrealized_pl: "10.0".into(),
        };
        let position: BrokerPosition = raw.into();
        assert_eq!(position.qty, -10);
    }
}
