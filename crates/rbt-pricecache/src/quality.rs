//! Data Quality Gate report builder for normalized OHLCV bars, plus the
//! Stage-A/B severity mapping consumed by the Price Cache's write-back path.
//!
//! [`build_quality_report`] accepts a slice of [`NormalizedBar`] and produces
//! a [`QualityReport`] covering:
//! - total bar count
//! - incomplete bar count (`is_complete == false`)
//! - duplicate canonical keys `(symbol, timeframe, end_ts)`
//! - monotonicity violations per `(symbol, timeframe)` series
//! - gap events per `(symbol, timeframe)` series for known timeframes
//! - unknown timeframe count
//! - earliest / latest `end_ts` overall
//!
//! [`classify_bars`] and [`classify_snapshot`] turn that report (and a live
//! snapshot quote) into [`ValidationIssue`] rows tagged CRITICAL/ERROR/WARNING:
//! NaN or non-positive price and insufficient bar counts are CRITICAL, gaps
//! and duplicate timestamps are ERROR, wide bid/ask spread and zero volume
//! are WARNING. Callers persist these through `rbt_db::errors::log_data_quality`.
//!
//! This module does **not**:
//! - fetch data (no providers)
//! - write to the database
//! - perform normalization (see `normalizer.rs`)

use std::collections::BTreeMap;
use std::fmt;

use crate::normalizer::NormalizedBar;

// ---------------------------------------------------------------------------
// Timeframe step inference
// ---------------------------------------------------------------------------

/// Returns the expected bar-to-bar step in seconds for a canonical timeframe
/// string, or `None` if the timeframe is not recognised.
fn expected_step_secs(timeframe: &str) -> Option<i64> {
    match timeframe {
        "1m" => Some(60),
        "5m" => Some(300),
        "1D" => Some(86_400),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Issue types
// ---------------------------------------------------------------------------

/// The canonical key that uniquely identifies a bar.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BarKey {
    pub symbol: String,
    pub timeframe: String,
    pub end_ts: i64,
}

impl fmt::Display for BarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.symbol, self.timeframe, self.end_ts)
    }
}

/// The canonical series key `(symbol, timeframe)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: String,
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.symbol, self.timeframe)
    }
}

/// A duplicate occurrence: the canonical key appeared more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateIssue {
    pub key: BarKey,
    /// How many times the key appears in the input (always >= 2).
    pub count: usize,
}

/// A monotonicity violation: within a series, `end_ts` is not strictly
/// increasing between consecutive bars (when sorted by `end_ts`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonotonicityIssue {
    pub series: SeriesKey,
    /// The offending `end_ts` (the one that is <= its predecessor).
    pub end_ts: i64,
    /// The predecessor `end_ts`.
    pub prev_end_ts: i64,
}

/// A gap event: the delta between consecutive `end_ts` values in a series
/// exceeds the expected step for that timeframe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapIssue {
    pub series: SeriesKey,
    /// `end_ts` of the bar *before* the gap.
    pub prev_end_ts: i64,
    /// `end_ts` of the bar *after* the gap.
    pub next_end_ts: i64,
    /// Observed delta in seconds.
    pub delta_secs: i64,
    /// Expected step in seconds for this timeframe.
    pub expected_step_secs: i64,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Summary statistics and issue lists produced by [`build_quality_report`].
#[derive(Debug, Clone)]
pub struct QualityReport {
    /// Total number of input bars.
    pub total_bars: usize,
    /// Number of bars where `is_complete == false`.
    pub incomplete_bars: usize,
    /// Earliest `end_ts` seen across all bars, or `None` if input was empty.
    pub earliest_end_ts: Option<i64>,
    /// Latest `end_ts` seen across all bars, or `None` if input was empty.
    pub latest_end_ts: Option<i64>,
    /// Number of series whose timeframe string was not recognised.
    /// Gap detection is skipped for these series.
    pub unknown_timeframe_series_count: usize,
    /// Duplicate bar keys, sorted deterministically by key.
    pub duplicates: Vec<DuplicateIssue>,
    /// Monotonicity violations, sorted by `(series, end_ts)`.
    pub monotonicity_violations: Vec<MonotonicityIssue>,
    /// Gap events, sorted by `(series, prev_end_ts)`.
    pub gaps: Vec<GapIssue>,
}

impl QualityReport {
    /// Returns `true` when the report contains no issues of any kind.
    pub fn is_clean(&self) -> bool {
        self.duplicates.is_empty()
            && self.monotonicity_violations.is_empty()
            && self.gaps.is_empty()
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QualityReport {{")?;
        writeln!(f, "  total_bars: {}", self.total_bars)?;
        writeln!(f, "  incomplete_bars: {}", self.incomplete_bars)?;
        writeln!(
            f,
            "  earliest_end_ts: {}",
            self.earliest_end_ts
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string())
        )?;
        writeln!(
            f,
            "  latest_end_ts: {}",
            self.latest_end_ts
                .map(|v| v.to_string())
                .unwrap_or_else(|| "none".to_string())
        )?;
        writeln!(
            f,
            "  unknown_timeframe_series: {}",
            self.unknown_timeframe_series_count
        )?;
        writeln!(f, "  duplicates: {}", self.duplicates.len())?;
        for d in &self.duplicates {
            writeln!(f, "    key={} count={}", d.key, d.count)?;
        }
        writeln!(
            f,
            "  monotonicity_violations: {}",
            self.monotonicity_violations.len()
        )?;
        for m in &self.monotonicity_violations {
            writeln!(
                f,
                "    series={} end_ts={} prev_end_ts={}",
                m.series, m.end_ts, m.prev_end_ts
            )?;
        }
        writeln!(f, "  gaps: {}", self.gaps.len())?;
        for g in &self.gaps {
            writeln!(
                f,
                "    series={} prev={} next={} delta={}s expected={}s",
                g.series, g.prev_end_ts, g.next_end_ts, g.delta_secs, g.expected_step_secs
            )?;
        }
        write!(f, "}}")
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Build a [`QualityReport`] from a slice of normalized bars.
///
/// The function is **deterministic**: it sorts bars internally and produces
/// the same report regardless of the order in which bars appear in `bars`.
/// No mutation of the caller's data occurs.
pub fn build_quality_report(bars: &[NormalizedBar]) -> QualityReport {
    let total_bars = bars.len();
    let incomplete_bars = bars.iter().filter(|b| !b.is_complete).count();

    let earliest_end_ts = bars.iter().map(|b| b.end_ts).min();
    let latest_end_ts = bars.iter().map(|b| b.end_ts).max();

    // --- Duplicate detection ---
    // Count occurrences of each canonical key using a BTreeMap for
    // deterministic iteration order.
    let mut key_counts: BTreeMap<BarKey, usize> = BTreeMap::new();
    for bar in bars {
        let key = BarKey {
            symbol: bar.symbol.clone(),
            timeframe: bar.timeframe.clone(),
            end_ts: bar.end_ts,
        };
        *key_counts.entry(key).or_insert(0) += 1;
    }
    let duplicates: Vec<DuplicateIssue> = key_counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(key, count)| DuplicateIssue { key, count })
        .collect();
    // Already sorted by key because we iterated a BTreeMap.

    // --- Group bars by (symbol, timeframe) ---
    // Use BTreeMap so series iteration order is deterministic.
    let mut series_map: BTreeMap<SeriesKey, Vec<i64>> = BTreeMap::new();
    let mut unknown_tf_series: std::collections::BTreeSet<SeriesKey> =
        std::collections::BTreeSet::new();

    for bar in bars {
        let sk = SeriesKey {
            symbol: bar.symbol.clone(),
            timeframe: bar.timeframe.clone(),
        };
        series_map.entry(sk.clone()).or_default().push(bar.end_ts);

        if expected_step_secs(&bar.timeframe).is_none() {
            unknown_tf_series.insert(sk);
        }
    }

    // Sort timestamps within each series.
    for timestamps in series_map.values_mut() {
        timestamps.sort_unstable();
    }

    let unknown_timeframe_series_count = unknown_tf_series.len();

    // --- Monotonicity and gap detection ---
    let mut monotonicity_violations: Vec<MonotonicityIssue> = Vec::new();
    let mut gaps: Vec<GapIssue> = Vec::new();

    for (series, timestamps) in &series_map {
        let step = expected_step_secs(&series.timeframe);

        for window in timestamps.windows(2) {
            let prev = window[0];
            let next = window[1];

            // Monotonicity: after sorting, equal timestamps are a violation
            // (duplicates were already counted separately; here we flag
            // non-strictly-increasing pairs).
            if next <= prev {
                monotonicity_violations.push(MonotonicityIssue {
                    series: series.clone(),
                    end_ts: next,
                    prev_end_ts: prev,
                });
            }

            // Gap detection (only for known timeframes and strictly
            // increasing pairs so we don't double-count monotonicity issues).
            if let Some(expected) = step {
                if next > prev {
                    let delta = next - prev;
                    if delta > expected {
                        gaps.push(GapIssue {
                            series: series.clone(),
                            prev_end_ts: prev,
                            next_end_ts: next,
                            delta_secs: delta,
                            expected_step_secs: expected,
                        });
                    }
                }
            }
        }
    }

    // Issues are already grouped by series (BTreeMap order), then by
    // ascending end_ts within each series, so no further sort is needed.

    QualityReport {
        total_bars,
        incomplete_bars,
        earliest_end_ts,
        latest_end_ts,
        unknown_timeframe_series_count,
        duplicates,
        monotonicity_violations,
        gaps,
    }
}

// ---------------------------------------------------------------------------
// Stage-A/B severity mapping
// ---------------------------------------------------------------------------

/// Severity tier for a [`ValidationIssue`], persisted verbatim to
/// `data_quality_log.severity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        }
    }
}

/// One data-quality finding ready for `rbt_db::errors::log_data_quality`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub ticker: String,
    pub severity: Severity,
    pub code: String,
    pub detail: String,
}

/// Minimum bar count below which a series is CRITICAL (insufficient bars).
pub const DEFAULT_MIN_BARS: usize = 2;

/// Classify a batch of normalized bars for one ticker into Stage-A/B issues.
///
/// `ticker` is attached to every issue; call once per `(symbol, timeframe)`
/// series since the bar-count floor is series-scoped.
pub fn classify_bars(ticker: &str, bars: &[NormalizedBar], min_bars: usize) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if bars.len() < min_bars {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Critical,
            code: "insufficient_bars".to_string(),
            detail: format!("{} bars, minimum {}", bars.len(), min_bars),
        });
    }

    let report = build_quality_report(bars);
    for dup in &report.duplicates {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Error,
            code: "duplicate_timestamp".to_string(),
            detail: format!("{} appears {} times", dup.key, dup.count),
        });
    }
    for gap in &report.gaps {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Error,
            code: "trading_hours_gap".to_string(),
            detail: format!(
                "{} gap of {}s (expected {}s) between {} and {}",
                gap.series, gap.delta_secs, gap.expected_step_secs, gap.prev_end_ts, gap.next_end_ts
            ),
        });
    }
    for bar in bars.iter().filter(|b| b.volume == 0) {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Warning,
            code: "zero_volume".to_string(),
            detail: format!("bar end_ts={} has zero volume", bar.end_ts),
        });
    }

    issues
}

/// Fraction of the mid price a bid/ask spread may occupy before it is
/// flagged WARNING (5%).
pub const WIDE_SPREAD_FRACTION: f64 = 0.05;

/// Classify a single live snapshot quote for one ticker into Stage-A/B issues.
pub fn classify_snapshot(ticker: &str, price: f64, bid: f64, ask: f64, volume: i64) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if price.is_nan() || price <= 0.0 {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Critical,
            code: "nan_or_non_positive_price".to_string(),
            detail: format!("price={price}"),
        });
        return issues;
    }

    let mid = (bid + ask) / 2.0;
    if mid > 0.0 && (ask - bid) / mid > WIDE_SPREAD_FRACTION {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Warning,
            code: "wide_spread".to_string(),
            detail: format!("bid={bid} ask={ask} spread_pct={:.4}", (ask - bid) / mid),
        });
    }

    if volume == 0 {
        issues.push(ValidationIssue {
            ticker: ticker.to_string(),
            severity: Severity::Warning,
            code: "zero_volume".to_string(),
            detail: "latest trade size is zero".to_string(),
        });
    }

    issues
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
