//! Ties `ingest_csv` → `normalizer` → `quality` together into the one entry
//! point an operator actually calls: load a CSV of historical bars for one
//! `(symbol, timeframe)`, normalize it, classify it, and persist every
//! Stage-A/B finding to `data_quality_log` so Sentinel's daily error count
//! sees it on the next tick.

use std::path::Path;

use sqlx::SqlitePool;

use crate::ingest_csv::{parse_csv_file, CsvIngestError};
use crate::normalizer::{normalize_all, NormalizerError};
use crate::quality::{classify_bars, Severity, ValidationIssue, DEFAULT_MIN_BARS};

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("reading csv: {0}")]
    Csv(String),
    #[error("normalizing bars: {0}")]
    Normalize(String),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<CsvIngestError> for BackfillError {
    fn from(e: CsvIngestError) -> Self {
        BackfillError::Csv(e.to_string())
    }
}

impl From<NormalizerError> for BackfillError {
    fn from(e: NormalizerError) -> Self {
        BackfillError::Normalize(e.to_string())
    }
}

pub struct BackfillReport {
    pub bars_ingested: usize,
    pub issues: Vec<ValidationIssue>,
    pub critical_count: usize,
}

/// Loads `path`, keeps only rows matching `timeframe`, normalizes, classifies
/// against `min_bars`, and writes every finding to `data_quality_log`.
pub async fn backfill_from_csv(
    pool: &SqlitePool,
    path: &Path,
    symbol: &str,
    timeframe: &str,
) -> Result<BackfillReport, BackfillError> {
    let raw = parse_csv_file(path, timeframe)?;
    let raw: Vec<_> = raw.into_iter().filter(|b| b.symbol == symbol).collect();
    let bars = normalize_all(&raw)?;

    let issues = classify_bars(symbol, &bars, DEFAULT_MIN_BARS);
    let critical_count = issues.iter().filter(|i| i.severity == Severity::Critical).count();

    for issue in &issues {
        rbt_db::errors::log_data_quality(pool, &issue.ticker, issue.severity.as_str(), &issue.code, &issue.detail).await?;
    }

    Ok(BackfillReport { bars_ingested: bars.len(), issues, critical_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE data_quality_log (
                timestamp TEXT NOT NULL, ticker TEXT NOT NULL, severity TEXT NOT NULL,
                code TEXT NOT NULL, detail TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn backfill_logs_a_gap_and_returns_bar_count() {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        std::fs::write(
            &path,
            "symbol,timeframe,end_ts,open,high,low,close,volume,is_complete\n\
             AAPL,1m,60,100.00,101.00,99.00,100.50,1000,true\n\
             AAPL,1m,240,101.00,102.00,100.00,101.50,1000,true\n",
        )
        .unwrap();

        let report = backfill_from_csv(&pool, &path, "AAPL", "1m").await.unwrap();
        assert_eq!(report.bars_ingested, 2);
        assert!(report.issues.iter().any(|i| i.code == "trading_hours_gap"));

        let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_quality_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(logged, report.issues.len() as i64);
    }

    #[tokio::test]
    async fn unrelated_symbol_rows_are_filtered_out() {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        std::fs::write(
            &path,
            "symbol,timeframe,end_ts,open,high,low,close,volume,is_complete\n\
             AAPL,1D,86400,100.00,101.00,99.00,100.50,1000,true\n\
             MSFT,1D,86400,200.00,201.00,199.00,200.50,1000,true\n",
        )
        .unwrap();

        let report = backfill_from_csv(&pool, &path, "AAPL", "1D").await.unwrap();
        assert_eq!(report.bars_ingested, 1);
    }
}
