//! The in-memory pending-orders map. LIMIT orders that do not
//! fill immediately live here, keyed by broker order id, until
//! [`crate::executor::check_pending_orders`] observes a terminal state.
//!
//! Rebuilt at process start by listing open broker orders and filtering by
//! the `TKT-` client order id prefix.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rbt_schemas::broker::Side;

/// What should happen to local state once a pending order's fill is observed.
#[derive(Debug, Clone)]
pub enum PendingIntent {
    Entry { strategy: String, stop_loss: f64 },
    Exit { exit_reason: String },
}

#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub order_id: String,
    pub ticket_id: String,
    pub ticker: String,
    pub side: Side,
    pub expected_price: f64,
    pub expected_qty: i64,
    pub order_type: &'static str,
    pub submitted_at: DateTime<Utc>,
    pub intent: PendingIntent,
}

/// `Mutex` rather than `RwLock`: every access either inserts, removes, or
/// mutates a single entry — there is no read-mostly workload to optimize for.
#[derive(Debug, Default)]
pub struct PendingMap {
    inner: Mutex<HashMap<String, PendingOrder>>,
}

impl PendingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: PendingOrder) {
        self.inner.lock().unwrap().insert(order.order_id.clone(), order);
    }

    pub fn remove(&self, order_id: &str) -> Option<PendingOrder> {
        self.inner.lock().unwrap().remove(order_id)
    }

    pub fn snapshot(&self) -> Vec<PendingOrder> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn ticket_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 4] = rng.gen();
    format!("TKT-{}", hex_encode(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
