//! `rbt run tick` / `rbt run loop`: builds the collaborator set for the
//! configured mode and drives the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Utc;
use rbt_broker_alpaca::{AlpacaBroker, AlpacaMarketData};
use rbt_broker_paper::PaperBroker;
use rbt_calendar::Calendar;
use rbt_config::{RunMode, RuntimeConfig};
use rbt_isolation::RunLock;
use rbt_orchestrator::universe::NullUniverseScanner;
use rbt_orchestrator::{Dependencies, Orchestrator, TickOutcome};
use rbt_risk::{RiskConfig, RiskGate};
use rbt_schemas::broker::Broker;
use rbt_schemas::marketdata::MarketData;
use rbt_sheet::{KivRow, SheetExporter};

/// `run tick` / `run loop` exit with 1 on lock contention, per the CLI's
/// exit-code contract; every other outcome (including a no-op tick) is 0.
const EXIT_LOCK_CONTENTION: i32 = 1;

pub async fn cmd_tick(config: RuntimeConfig) -> Result<i32> {
    match config.mode {
        RunMode::Paper => {
            let paper = Arc::new(PaperBroker::new());
            let built = build_orchestrator(config, paper.clone(), paper).await;
            run_one_tick(built).await
        }
        RunMode::Live => {
            let secrets = config.secrets.clone();
            let broker = AlpacaBroker::new(
                require(&secrets.broker_base_url, "BROKER_BASE_URL")?,
                require(&secrets.broker_trading_key, "BROKER_TRADING_KEY")?,
                require(&secrets.broker_secret_key, "BROKER_SECRET_KEY")?,
            );
            let market = AlpacaMarketData::new(
                require(&secrets.broker_base_url, "BROKER_BASE_URL")?,
                require(&secrets.broker_data_key, "BROKER_DATA_KEY")?,
                require(&secrets.broker_secret_key, "BROKER_SECRET_KEY")?,
                config.data_feed.clone(),
            );
            let built = build_orchestrator(config, broker, market).await;
            run_one_tick(built).await
        }
    }
}

pub async fn cmd_loop(config: RuntimeConfig, interval_secs: u64) -> Result<i32> {
    tracing::info!(interval_secs, mode = ?config.mode, "entering tick loop");
    loop {
        let code = cmd_tick(clone_config(&config)).await?;
        if code != 0 {
            return Ok(code);
        }
        tokio::time::sleep(StdDuration::from_secs(interval_secs)).await;
    }
}

fn clone_config(config: &RuntimeConfig) -> RuntimeConfig {
    RuntimeConfig {
        mode: config.mode,
        secrets: config.secrets.clone(),
        data_feed: config.data_feed.clone(),
        db_path: config.db_path.clone(),
        log_level: config.log_level.clone(),
        sheet_id: config.sheet_id.clone(),
    }
}

fn require<'a>(value: &'a Option<String>, var_name: &str) -> Result<&'a str> {
    value.as_deref().with_context(|| format!("missing required env var {var_name} for LIVE mode"))
}

async fn build_orchestrator<M: MarketData + Clone>(
    config: RuntimeConfig,
    broker: impl Broker + 'static,
    market: M,
) -> Result<(Orchestrator<M>, Option<SheetExporter>)> {
    let pool = rbt_db::connect(&config.db_path).await.context("connecting to DB_PATH")?;
    rbt_db::migrate(&pool).await.context("running migrations")?;

    let deps = Dependencies::new(
        pool,
        Box::new(broker),
        market,
        Calendar::default(),
        RunLock::new(PathBuf::from("data/run.lock")),
        RiskGate::new(RiskConfig::default()),
        Box::new(NullUniverseScanner),
    );

    let mut orchestrator = Orchestrator::new(deps);
    orchestrator.recover_pending_orders().context("recovering pending orders at startup")?;

    let sheet = config.sheet_id.map(SheetExporter::new);
    Ok((orchestrator, sheet))
}

async fn run_one_tick<M: MarketData + Clone>(built: Result<(Orchestrator<M>, Option<SheetExporter>)>) -> Result<i32> {
    let (mut orchestrator, sheet) = built?;
    let now = Utc::now();

    match orchestrator.tick(now).await? {
        TickOutcome::MarketClosed => {
            tracing::info!("market closed, nothing to do");
        }
        TickOutcome::LockTimeout => {
            tracing::warn!("could not acquire run lock, another instance is running");
            return Ok(EXIT_LOCK_CONTENTION);
        }
        TickOutcome::NotTrading { reason } => {
            tracing::warn!(reason, "sentinel halted trading this tick");
        }
        TickOutcome::ReconcileHalted { reason } => {
            tracing::error!(reason, "reconciliation found a quantity mismatch, halting entries");
        }
        TickOutcome::Completed(report) => {
            tracing::info!(
                health = ?report.health.status,
                exits = report.exits.len(),
                admitted = report.admitted.len(),
                denied = report.denied.len(),
                "tick complete"
            );
            if let Some(sheet) = &sheet {
                export_kiv_tab(&orchestrator, sheet).await?;
            }
        }
    }

    Ok(0)
}

async fn export_kiv_tab<M: MarketData + Clone>(orchestrator: &Orchestrator<M>, sheet: &SheetExporter) -> Result<()> {
    let signals = rbt_db::signals::find_all_kiv_and_confirmed(orchestrator.pool()).await?;
    let rows: Vec<KivRow> = signals
        .into_iter()
        .map(|s| KivRow {
            signal_id: s.signal_id,
            ticker: s.ticker,
            strategy: s.strategy,
            entry: Some(s.trigger_price),
            rebound: Some(s.rebound_bottom),
            go_in: Some(s.go_in_price),
            target: Some(s.profit_target),
            stop: Some(s.stop_loss),
            confidence: s.confidence,
            added: s.trigger_time,
        })
        .collect();
    sheet.write_kiv(&rows).context("writing KIV tab")?;
    Ok(())
}

pub async fn cmd_db_status(config: &RuntimeConfig) -> Result<()> {
    let pool = rbt_db::connect(&config.db_path).await?;
    let status = rbt_db::status(&pool).await?;
    println!("connected={} signal_count={}", status.connected, status.signal_count);
    Ok(())
}

pub async fn cmd_db_migrate(config: &RuntimeConfig) -> Result<()> {
    let pool = rbt_db::connect(&config.db_path).await?;
    rbt_db::migrate(&pool).await?;
    println!("migrations_applied=true");
    Ok(())
}

pub async fn cmd_pricecache_backfill(config: &RuntimeConfig, path: PathBuf, symbol: &str, timeframe: &str) -> Result<()> {
    let pool = rbt_db::connect(&config.db_path).await?;
    let report = rbt_pricecache::backfill::backfill_from_csv(&pool, &path, symbol, timeframe).await?;
    println!(
        "bars_ingested={} issues={} critical={}",
        report.bars_ingested,
        report.issues.len(),
        report.critical_count
    );
    for issue in &report.issues {
        println!("  [{}] {} {}", issue.severity.as_str(), issue.code, issue.detail);
    }
    Ok(())
}
