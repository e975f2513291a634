//! Process-wide kill switch.
//!
//! # Invariants
//!
//! - Engaging always wins: once engaged, `should_trade` refuses regardless
//!   of the health roll-up.
//! - Release is the only path back to trading; there is no auto-release.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillSwitch {
    Released,
    Engaged { reason: String },
}

impl Default for KillSwitch {
    fn default() -> Self {
        KillSwitch::Released
    }
}

impl KillSwitch {
    pub fn engage(reason: impl Into<String>) -> Self {
        KillSwitch::Engaged { reason: reason.into() }
    }

    pub fn release() -> Self {
        KillSwitch::Released
    }

    pub fn is_engaged(&self) -> bool {
        matches!(self, KillSwitch::Engaged { .. })
    }
}
