//! Cycle Orchestrator: composes every other engine into one tick loop, the
//! "priority pyramid" — health and reconciliation gate everything below
//! them, exits always run before new entries are considered. Everything
//! here is sequencing and state threading; each step's actual decision
//! logic lives in its own crate.

pub mod universe;

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use rbt_calendar::Calendar;
use rbt_execution::exit_monitor::{DEFAULT_FORCE_CLOSE_MINUTES, PreCloseOutcome};
use rbt_execution::{
    check_pending_orders, check_forced_preclose, check_strategy_exits, check_stop_losses,
    execute_entry, ExecutionOutcome, ExitEvent, PendingMap,
};
use rbt_pricecache::PriceCache;
use rbt_reconcile::{quick_check, reconcile_all, ReconcileReport, DEFAULT_PRICE_TOL_PCT};
use rbt_risk::{GateDecision, RiskGate};
use rbt_schemas::broker::{Broker, OrderType};
use rbt_schemas::marketdata::MarketData;
use rbt_schemas::HealthStatus;
use rbt_sentinel::{check_health, should_trade, ApiRateCounter, HealthReport, KillSwitch, Regime, SentinelConfig};
use rbt_signal::{get_confirmed_signals, mark_executed, reject_signal};
use universe::UniverseScanner;

/// Everything the orchestrator needs, built once by the binary that wires
/// it up (`rbt-cli::main`) and handed over by value.
pub struct Dependencies<M: MarketData> {
    pub pool: SqlitePool,
    pub broker: Box<dyn Broker>,
    pub market: M,
    pub calendar: Calendar,
    pub lock: rbt_isolation::RunLock,
    pub risk_gate: RiskGate,
    pub sentinel_config: SentinelConfig,
    pub universe: Box<dyn UniverseScanner>,
    pub price_tol_pct: f64,
    pub cache_max_age: Duration,
}

impl<M: MarketData> Dependencies<M> {
    /// Defaults the price-drift tolerance and cache freshness bound;
    /// callers only need to supply the collaborators that have no sane
    /// default (pool, broker, market, lock).
    pub fn new(
        pool: SqlitePool,
        broker: Box<dyn Broker>,
        market: M,
        calendar: Calendar,
        lock: rbt_isolation::RunLock,
        risk_gate: RiskGate,
        universe: Box<dyn UniverseScanner>,
    ) -> Self {
        Self {
            pool,
            broker,
            market,
            calendar,
            lock,
            risk_gate,
            sentinel_config: SentinelConfig::default(),
            universe,
            price_tol_pct: DEFAULT_PRICE_TOL_PCT,
            cache_max_age: Duration::minutes(rbt_pricecache::DEFAULT_CLEAN_STALE_MINUTES),
        }
    }
}

/// One admitted-and-submitted entry from step 10 of the tick procedure.
#[derive(Debug, Clone)]
pub struct AdmittedEntry {
    pub signal_id: String,
    pub ticker: String,
    pub outcome: ExecutionOutcome,
}

/// A CONFIRMED signal the Risk Gate turned away this tick.
#[derive(Debug, Clone)]
pub struct DeniedEntry {
    pub signal_id: String,
    pub ticker: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub health: HealthReport,
    pub exits: Vec<ExitEvent>,
    pub preclose: PreCloseOutcome,
    pub reconcile: ReconcileReport,
    pub tier1_candidates: Vec<String>,
    pub admitted: Vec<AdmittedEntry>,
    pub denied: Vec<DeniedEntry>,
}

/// Why a tick returned without completing the full pyramid. Each of these
/// is a deliberate early-out named in the procedure, not an error.
#[derive(Debug, Clone)]
pub enum TickOutcome {
    MarketClosed,
    LockTimeout,
    NotTrading { reason: String },
    ReconcileHalted { reason: String },
    Completed(TickReport),
}

pub struct Orchestrator<M: MarketData> {
    pool: SqlitePool,
    broker: Box<dyn Broker>,
    calendar: Calendar,
    lock: rbt_isolation::RunLock,
    pending: PendingMap,
    price_cache: PriceCache<M>,
    risk_gate: RiskGate,
    sentinel_config: SentinelConfig,
    universe: Box<dyn UniverseScanner>,
    price_tol_pct: f64,
    cache_max_age: Duration,

    api_calls: ApiRateCounter,
    kill_switch: KillSwitch,
    regime: Regime,
    consecutive_failures: u32,
}

impl<M: MarketData + Clone> Orchestrator<M> {
    pub fn new(deps: Dependencies<M>) -> Self {
        let price_cache = PriceCache::new(deps.pool.clone(), deps.market.clone());
        Self {
            pool: deps.pool,
            broker: deps.broker,
            calendar: deps.calendar,
            lock: deps.lock,
            pending: PendingMap::new(),
            price_cache,
            risk_gate: deps.risk_gate,
            sentinel_config: deps.sentinel_config,
            universe: deps.universe,
            price_tol_pct: deps.price_tol_pct,
            cache_max_age: deps.cache_max_age,
            api_calls: ApiRateCounter::new(),
            kill_switch: KillSwitch::default(),
            regime: Regime::Normal,
            consecutive_failures: 0,
        }
    }

    /// Rebuilds the pending map from open broker orders carrying our ticket
    /// prefix — call once at process start, before the first tick.
    pub fn recover_pending_orders(&self) -> Result<()> {
        for order in self.broker.list_open_orders()? {
            tracing::info!(order_id = %order.id, client_order_id = %order.client_order_id, "recovered open order at startup");
        }
        Ok(())
    }

    pub fn engage_kill_switch(&mut self, reason: impl Into<String>) {
        self.kill_switch = KillSwitch::engage(reason);
    }

    pub fn release_kill_switch(&mut self) {
        self.kill_switch = KillSwitch::release();
    }

    pub fn set_regime(&mut self, regime: Regime) {
        self.regime = regime;
    }

    pub fn pending_order_count(&self) -> usize {
        self.pending.len()
    }

    /// Exposed for callers that export a view of persisted state after a
    /// tick (e.g. the sheet export tabs), rather than threading it through
    /// `TickReport`.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// One full pass of the priority pyramid. Exits and
    /// reconciliation always run once the lock is held and Sentinel agrees
    /// to trade; new entries are additionally gated on health.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome> {
        if !self.calendar.is_market_hours(now) {
            return Ok(TickOutcome::MarketClosed);
        }

        let guard = match self.lock.acquire(StdDuration::from_secs(30)) {
            Ok(guard) => guard,
            Err(_) => return Ok(TickOutcome::LockTimeout),
        };

        let broker_positions = self.broker.get_all_positions().map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let quick_ok = quick_check(&self.pool, &broker_positions).await?;

        let health = check_health(
            &self.pool,
            &self.sentinel_config,
            &mut self.api_calls,
            &self.kill_switch,
            self.regime,
            quick_ok,
            self.consecutive_failures,
            now,
        )
        .await?;

        let (may_trade, trade_reason) = should_trade(&self.kill_switch, &health);
        if !may_trade {
            drop(guard);
            return Ok(TickOutcome::NotTrading { reason: trade_reason });
        }

        let open_positions = rbt_db::positions::all_open(&self.pool).await?;
        let mut prices = HashMap::with_capacity(open_positions.len());
        let mut any_price_fetch_failed = false;
        for position in &open_positions {
            match self.price_cache.get(&position.ticker, self.cache_max_age).await {
                Ok(resolved) => {
                    for issue in &resolved.issues {
                        rbt_db::errors::log_data_quality(
                            &self.pool,
                            &position.ticker,
                            issue.severity.as_str(),
                            &issue.code,
                            &issue.detail,
                        )
                        .await?;
                    }
                    prices.insert(position.ticker.clone(), resolved.entry.price);
                }
                Err(e) => {
                    any_price_fetch_failed = true;
                    tracing::warn!(ticker = %position.ticker, error = %e, "price unavailable this tick, skipping exit check");
                }
            }
        }

        let mut exits = check_stop_losses(&self.pool, self.broker.as_ref(), &self.pending, &prices, now).await?;
        exits.extend(check_strategy_exits(&self.pool, self.broker.as_ref(), &self.pending, now).await?);
        let preclose = check_forced_preclose(
            &self.pool,
            self.broker.as_ref(),
            &self.pending,
            &self.calendar,
            now,
            DEFAULT_FORCE_CLOSE_MINUTES,
        )
        .await?;
        if let PreCloseOutcome::ForcedExits(forced) = &preclose {
            exits.extend(forced.clone());
        }

        let reconcile = reconcile_all(&self.pool, &broker_positions, self.price_tol_pct, now).await?;
        if reconcile.status == HealthStatus::Red {
            drop(guard);
            self.consecutive_failures += 1;
            return Ok(TickOutcome::ReconcileHalted { reason: reconcile.message });
        }

        check_pending_orders(&self.pool, self.broker.as_ref(), &self.pending).await?;

        let mut tier1_candidates = Vec::new();
        if matches!(health.status, HealthStatus::Green | HealthStatus::Yellow) {
            tier1_candidates = self.universe.scan_tier1(now)?;
            if health.status == HealthStatus::Green {
                self.universe.scan_tier2(&tier1_candidates, now)?;
            }
        }

        let mut admitted = Vec::new();
        let mut denied = Vec::new();
        let mut any_submit_failed = false;

        if matches!(health.status, HealthStatus::Green | HealthStatus::Yellow) {
            let (min_confidence, max_new) = match health.status {
                HealthStatus::Green => (60.0, 3),
                _ => (70.0, 1),
            };

            let signals = get_confirmed_signals(&self.pool, min_confidence, now).await?;
            for signal in signals.into_iter().take(max_new) {
                let decision = self
                    .risk_gate
                    .approve(
                        &self.pool,
                        &signal.ticker,
                        &signal.strategy,
                        signal.go_in_price,
                        signal.stop_loss,
                        signal.confidence,
                        None,
                        now,
                    )
                    .await?;

                match decision {
                    GateDecision::Approved { shares } => {
                        let outcome = execute_entry(
                            &self.pool,
                            self.broker.as_ref(),
                            &self.pending,
                            &signal.ticker,
                            &signal.strategy,
                            signal.go_in_price,
                            shares,
                            signal.stop_loss,
                            OrderType::Limit,
                        )
                        .await?;

                        if matches!(outcome, ExecutionOutcome::Failed { .. }) {
                            any_submit_failed = true;
                        } else {
                            mark_executed(&self.pool, &signal.signal_id).await?;
                        }

                        admitted.push(AdmittedEntry { signal_id: signal.signal_id, ticker: signal.ticker, outcome });
                    }
                    GateDecision::Denied { reason } => {
                        reject_signal(&self.pool, &signal.signal_id).await?;
                        denied.push(DeniedEntry { signal_id: signal.signal_id, ticker: signal.ticker, reason });
                    }
                }
            }
        }

        drop(guard);

        self.consecutive_failures = if any_price_fetch_failed || any_submit_failed {
            self.consecutive_failures + 1
        } else {
            0
        };

        Ok(TickOutcome::Completed(TickReport {
            health,
            exits,
            preclose,
            reconcile,
            tier1_candidates,
            admitted,
            denied,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbt_broker_paper::PaperBroker;
    use rbt_risk::RiskConfig;
    use rbt_schemas::{Signal, SignalStatus};
    use std::sync::Arc;
    use universe::NullUniverseScanner;

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade.db");
        let pool = rbt_db::connect(path.to_str().unwrap()).await.unwrap();
        rbt_db::migrate(&pool).await.unwrap();
        (pool, dir)
    }

    fn build_orchestrator(pool: SqlitePool, broker: Arc<PaperBroker>, lock_path: &std::path::Path) -> Orchestrator<Arc<PaperBroker>> {
        let deps = Dependencies::new(
            pool,
            Box::new(broker.clone()),
            broker,
            Calendar::default(),
            rbt_isolation::RunLock::new(lock_path),
            RiskGate::new(RiskConfig::default()),
            Box::new(NullUniverseScanner),
        );
        Orchestrator::new(deps)
    }

    fn market_open_timestamp() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2024, 1, 8, 15, 0, 0).unwrap() // 10:00 ET, a Monday
    }

    #[tokio::test]
    async fn outside_market_hours_short_circuits_before_the_lock() {
        let (pool, dir) = temp_pool().await;
        let broker = Arc::new(PaperBroker::new());
        let mut orchestrator = build_orchestrator(pool, broker, &dir.path().join("run.lock"));

        use chrono::TimeZone;
        let weekend = Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap();
        let outcome = orchestrator.tick(weekend).await.unwrap();
        assert!(matches!(outcome, TickOutcome::MarketClosed));
    }

    #[tokio::test]
    async fn clean_tick_with_no_positions_and_no_signals_completes_green() {
        let (pool, dir) = temp_pool().await;
        let broker = Arc::new(PaperBroker::new());
        let mut orchestrator = build_orchestrator(pool, broker, &dir.path().join("run.lock"));

        let outcome = orchestrator.tick(market_open_timestamp()).await.unwrap();
        match outcome {
            TickOutcome::Completed(report) => {
                assert_eq!(report.health.status, HealthStatus::Green);
                assert!(report.admitted.is_empty());
                assert!(report.exits.is_empty());
            }
            other => panic!("expected a completed tick, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirmed_signal_is_admitted_and_filled_limit_order() {
        let (pool, dir) = temp_pool().await;
        let broker = Arc::new(PaperBroker::new());
        broker.set_market_price("ACME", 10.20);

        let now = market_open_timestamp();
        let signal = Signal {
            signal_id: "ACME_RSI_2024010810".to_string(),
            ticker: "ACME".to_string(),
            strategy: "RSI".to_string(),
            trigger_time: now,
            trigger_price: 10.00,
            rebound_bottom: 10.00,
            go_in_price: 10.20,
            profit_target: 10.50,
            stop_loss: 9.80,
            confidence: 75.0,
            status: SignalStatus::Confirmed,
            cooldown_until: None,
        };
        rbt_db::signals::insert_kiv(&pool, &Signal { status: SignalStatus::Kiv, ..signal.clone() }).await.unwrap();
        rbt_db::signals::transition(&pool, &signal.signal_id, SignalStatus::Kiv, SignalStatus::Confirmed).await.unwrap();

        let mut orchestrator = build_orchestrator(pool.clone(), broker, &dir.path().join("run.lock"));
        let outcome = orchestrator.tick(now).await.unwrap();

        match outcome {
            TickOutcome::Completed(report) => {
                assert_eq!(report.admitted.len(), 1);
                assert!(matches!(report.admitted[0].outcome, ExecutionOutcome::Filled { .. }));
            }
            other => panic!("expected a completed tick, got {other:?}"),
        }

        let open = rbt_db::positions::all_open(&pool).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticker, "ACME");
    }

    #[tokio::test]
    async fn kill_switch_blocks_a_tick_after_the_lock_is_released() {
        let (pool, dir) = temp_pool().await;
        let broker = Arc::new(PaperBroker::new());
        let mut orchestrator = build_orchestrator(pool, broker, &dir.path().join("run.lock"));
        orchestrator.engage_kill_switch("manual halt for maintenance");

        let outcome = orchestrator.tick(market_open_timestamp()).await.unwrap();
        assert!(matches!(outcome, TickOutcome::NotTrading { .. }));
    }
}
