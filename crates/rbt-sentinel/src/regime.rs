//! Market regime classification feeding the Sentinel's health roll-up.
//! Computing the regime itself (breadth, volatility) is out of scope here —
//! the caller supplies the classification each tick.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Normal,
    Bear,
    Crash,
}
