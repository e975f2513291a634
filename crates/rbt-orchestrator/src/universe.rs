//! Universe scan seam.
//!
//! Building the candidate-ticker universe and seeding KIV rows from it is an
//! external, offline concern — the orchestrator only knows *when* to ask for
//! a scan (gated on health) and *that* Tier-2 only runs once Tier-1 has had
//! its say. What actually ranks tickers, computes breadth/volatility, or
//! writes `UNIVERSE`/`WATCH_LIST` rows lives behind this trait.

use anyhow::Result;
use chrono::{DateTime, Utc};

/// Tier-1: cheap, stage-A-validation-only pass over the full candidate list.
/// Tier-2: the more expensive pass, restricted to Tier-1 survivors, and the
/// one that actually calls `rbt_signal::add_to_kiv`.
pub trait UniverseScanner: Send + Sync {
    fn scan_tier1(&self, now: DateTime<Utc>) -> Result<Vec<String>>;
    fn scan_tier2(&self, candidates: &[String], now: DateTime<Utc>) -> Result<()>;
}

/// No-op scanner for wiring contexts (tests, a lock-only CLI invocation)
/// that don't have a real universe source configured.
#[derive(Debug, Default)]
pub struct NullUniverseScanner;

impl UniverseScanner for NullUniverseScanner {
    fn scan_tier1(&self, _now: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn scan_tier2(&self, _candidates: &[String], _now: DateTime<Utc>) -> Result<()> {
        Ok(())
    }
}
