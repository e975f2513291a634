//! Sheet export sink: `UNIVERSE`, `WATCH_LIST`, `KIV` tabs with fixed
//! header rows and full-rewrite semantics (clear then rewrite, not append).
//! Each tab is backed by one CSV file under a root directory; `write_*`
//! always truncates and rewrites the whole file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub struct SheetExporter {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UniverseRow {
    pub ticker: String,
    pub price: f64,
    pub volume_20min_avg: f64,
    pub volume_current: f64,
    pub volatility_20min: f64,
    pub tier: String,
    pub status: String,
    pub added_date: String,
    pub last_active: String,
    pub active_days: i64,
    pub last_updated_utc: DateTime<Utc>,
    pub notes: String,
}

#[derive(Debug, Clone)]
pub struct WatchListRow {
    pub ticker: String,
    pub first_spotted: String,
    pub last_active: String,
    pub spike_count: i64,
    pub avg_score: f64,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct KivRow {
    pub signal_id: String,
    pub ticker: String,
    pub strategy: String,
    pub entry: Option<f64>,
    pub rebound: Option<f64>,
    pub go_in: Option<f64>,
    pub target: Option<f64>,
    pub stop: Option<f64>,
    pub confidence: f64,
    pub added: DateTime<Utc>,
}

impl SheetExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn write_universe(&self, rows: &[UniverseRow]) -> Result<()> {
        let mut writer = self.tab_writer("UNIVERSE")?;
        writer.write_record([
            "Ticker",
            "Price",
            "Volume_20min_avg",
            "Volume_Current",
            "Volatility_20min",
            "Tier",
            "Status",
            "Added_Date",
            "Last_Active",
            "Active_Days",
            "Last_Updated_UTC",
            "Notes",
        ])?;
        for row in rows {
            writer.write_record([
                row.ticker.clone(),
                format!("{:.2}", row.price),
                format!("{:.2}", row.volume_20min_avg),
                format!("{:.2}", row.volume_current),
                format!("{:.2}", row.volatility_20min),
                row.tier.clone(),
                row.status.clone(),
                row.added_date.clone(),
                row.last_active.clone(),
                row.active_days.to_string(),
                row.last_updated_utc.format("%Y-%m-%d %H:%M:%S").to_string(),
                row.notes.clone(),
            ])?;
        }
        writer.flush().context("flushing UNIVERSE tab")?;
        Ok(())
    }

    pub fn write_watch_list(&self, rows: &[WatchListRow]) -> Result<()> {
        let mut writer = self.tab_writer("WATCH_LIST")?;
        writer.write_record(["Ticker", "First_Spotted", "Last_Active", "Spike_Count", "Avg_Score", "Status"])?;
        for row in rows {
            writer.write_record([
                row.ticker.clone(),
                row.first_spotted.clone(),
                row.last_active.clone(),
                row.spike_count.to_string(),
                format!("{:.1}", row.avg_score),
                row.status.clone(),
            ])?;
        }
        writer.flush().context("flushing WATCH_LIST tab")?;
        Ok(())
    }

    pub fn write_kiv(&self, rows: &[KivRow]) -> Result<()> {
        let mut writer = self.tab_writer("KIV")?;
        writer.write_record([
            "Signal_ID", "Ticker", "Strategy", "Entry", "Rebound", "Go_In", "Target", "Stop", "Confidence", "Added",
        ])?;
        for row in rows {
            writer.write_record([
                row.signal_id.clone(),
                row.ticker.clone(),
                row.strategy.clone(),
                money(row.entry),
                money(row.rebound),
                money(row.go_in),
                money(row.target),
                money(row.stop),
                format!("{:.1}", row.confidence),
                row.added.format("%Y-%m-%d %H:%M").to_string(),
            ])?;
        }
        writer.flush().context("flushing KIV tab")?;
        Ok(())
    }

    fn tab_path(&self, tab: &str) -> PathBuf {
        self.root.join(format!("{tab}.csv"))
    }

    fn tab_writer(&self, tab: &str) -> Result<csv::Writer<fs::File>> {
        ensure_dir(&self.root)?;
        let path = self.tab_path(tab);
        let file = fs::File::create(&path).with_context(|| format!("rewriting {tab} tab at {}", path.display()))?;
        Ok(csv::Writer::from_writer(file))
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("creating sheet export root {}", path.display()))
}

fn money(value: Option<f64>) -> String {
    value.map(|v| format!("${v:.2}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_universe_row() -> UniverseRow {
        UniverseRow {
            ticker: "ABC".into(),
            price: 10.5,
            volume_20min_avg: 1000.0,
            volume_current: 1500.0,
            volatility_20min: 0.02,
            tier: "CANDIDATE".into(),
            status: "ACTIVE".into(),
            added_date: "2026-07-01".into(),
            last_active: "2026-08-01".into(),
            active_days: 5,
            last_updated_utc: Utc::now(),
            notes: "Score: 42.0, Spikes: 3".into(),
        }
    }

    #[test]
    fn writing_universe_tab_rewrites_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SheetExporter::new(dir.path());

        exporter.write_universe(&[sample_universe_row(), sample_universe_row()]).unwrap();
        exporter.write_universe(&[sample_universe_row()]).unwrap();

        let contents = fs::read_to_string(dir.path().join("UNIVERSE.csv")).unwrap();
        assert_eq!(contents.lines().count(), 2, "rewrite must not append to the prior run's rows");
        assert!(contents.starts_with("Ticker,Price,"));
    }

    #[test]
    fn kiv_tab_blanks_missing_prices_instead_of_writing_zero() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SheetExporter::new(dir.path());
        let row = KivRow {
            signal_id: "ABC_breakout_2026080110".into(),
            ticker: "ABC".into(),
            strategy: "breakout".into(),
            entry: None,
            rebound: Some(10.0),
            go_in: Some(10.2),
            target: Some(11.0),
            stop: Some(9.8),
            confidence: 75.0,
            added: Utc::now(),
        };
        exporter.write_kiv(&[row]).unwrap();

        let contents = fs::read_to_string(dir.path().join("KIV.csv")).unwrap();
        let data_line = contents.lines().nth(1).unwrap();
        assert!(data_line.contains("ABC_breakout_2026080110"));
        assert!(data_line.contains("$10.20"));
    }

    #[test]
    fn watch_list_empty_rows_still_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SheetExporter::new(dir.path());
        exporter.write_watch_list(&[]).unwrap();

        let contents = fs::read_to_string(dir.path().join("WATCH_LIST.csv")).unwrap();
        assert_eq!(contents.trim(), "Ticker,First_Spotted,Last_Active,Spike_Count,Avg_Score,Status");
    }
}
