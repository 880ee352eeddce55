//! Bot runner: the polling loop that drives every symbol through the
//! pyramid engine.
//!
//! Handles:
//! - Refreshing the symbol shortlist
//! - Reconciling tracked positions with the exchange
//! - Generating signals and planning entries, adds and exits
//! - Placing orders and committing state only after they succeed
//! - Isolating per-symbol failures and timeouts

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{Exchange, DEFAULT_FEE_RATE};
use crate::scanner::{self, ShortlistConfig};
use crate::strategy::{SignalConfig, SignalGenerator};
use crate::models::OrderSide;
use crate::trading::{
    CloseReason, PyramidEngine, Reconciliation, TickAction, TickDecision, TickInputs, TradingConfig,
};

/// Bot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Seconds between ticks
    pub poll_interval_secs: u64,

    /// Simulate fills instead of trading
    pub dry_run: bool,

    /// Starting balance of the simulated account
    pub paper_starting_cash: Decimal,

    /// Taker fee charged on simulated fills
    pub paper_fee_rate: Decimal,

    /// Symbols processed concurrently within a tick
    pub max_concurrent_symbols: usize,

    /// Upper bound on one symbol's work within a tick
    pub symbol_timeout_ms: u64,

    /// Rebuild the shortlist every N ticks
    pub shortlist_refresh_ticks: u64,

    pub trading_config: TradingConfig,
    pub signal_config: SignalConfig,
    pub shortlist_config: ShortlistConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            dry_run: true,
            paper_starting_cash: dec!(1000),
            paper_fee_rate: DEFAULT_FEE_RATE,
            max_concurrent_symbols: 4,
            symbol_timeout_ms: 20_000,
            shortlist_refresh_ticks: 10,
            trading_config: TradingConfig::default(),
            signal_config: SignalConfig::default(),
            shortlist_config: ShortlistConfig::default(),
        }
    }
}

impl BotConfig {
    /// Defaults with trading knobs and the symbol pool read from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            trading_config: TradingConfig::from_env().context("Invalid trading configuration")?,
            shortlist_config: ShortlistConfig::from_env().context("Invalid shortlist configuration")?,
            ..Default::default()
        })
    }
}

/// What happened to one symbol during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolOutcome {
    /// Nothing to do; carries the engine's reason
    Held(String),
    Entered,
    Added,
    Closed(CloseReason),
    /// Order rejected or failed; state left untouched
    OrderFailed(String),
    /// Data fetch failed; symbol skipped this tick
    Failed(String),
    TimedOut,
}

/// Per-symbol outcomes of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub outcomes: Vec<(String, SymbolOutcome)>,
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    exchange: Arc<dyn Exchange>,
    engine: Arc<Mutex<PyramidEngine>>,
    signals: SignalGenerator,

    // Runtime state
    shortlist: Vec<String>,
    tick_count: u64,
    stats: Arc<RwLock<BotStats>>,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    pub fn new(config: BotConfig, exchange: Arc<dyn Exchange>) -> Result<Self> {
        config.trading_config.validate()?;
        if config.max_concurrent_symbols == 0 {
            anyhow::bail!("max_concurrent_symbols must be at least 1");
        }

        let engine = PyramidEngine::new(config.trading_config.clone());
        let signals = SignalGenerator::new(config.signal_config.clone());
        let stats = BotStats {
            dry_run: config.dry_run,
            exchange: exchange.name().to_string(),
            ..Default::default()
        };

        Ok(Self {
            config,
            exchange,
            engine: Arc::new(Mutex::new(engine)),
            signals,
            shortlist: Vec::new(),
            tick_count: 0,
            stats: Arc::new(RwLock::new(stats)),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Main run loop. Returns after Ctrl-C once the current tick finishes.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            exchange = self.exchange.name(),
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            pool = self.config.shortlist_config.symbol_pool.len(),
            "Starting bot run loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in bot tick");
            }
        }

        info!("Bot stopped");
        Ok(())
    }

    /// Single iteration of the main loop.
    pub async fn tick(&mut self) -> Result<TickSummary> {
        self.tick_count += 1;
        debug!(tick = self.tick_count, "Bot tick");

        // 1. Refresh the shortlist when due
        let refresh_every = self.config.shortlist_refresh_ticks.max(1);
        if self.shortlist.is_empty() || self.tick_count % refresh_every == 0 {
            self.shortlist = scanner::shortlist(self.exchange.as_ref(), &self.config.shortlist_config).await;
            info!(symbols = ?self.shortlist, "Shortlist refreshed");
        }

        // 2. Always manage symbols that hold a position
        let mut symbols = self.shortlist.clone();
        for symbol in self.engine.lock().await.positions().symbols() {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        // 3. Process symbols with bounded concurrency
        let summary = self.process_symbols(symbols).await;

        // 4. Fold outcomes into the running statistics
        let open_positions = self.engine.lock().await.positions().len();
        let mut stats = self.stats.write().await;
        stats.ticks += 1;
        stats.open_positions = open_positions;
        for (_, outcome) in &summary.outcomes {
            stats.record(outcome);
        }

        Ok(summary)
    }

    async fn process_symbols(&self, symbols: Vec<String>) -> TickSummary {
        let limit = Duration::from_millis(self.config.symbol_timeout_ms);

        let outcomes = stream::iter(symbols)
            .map(|symbol| async move {
                // Only the fetch-and-plan phase is bounded; a sent order is
                // always awaited so its fill gets committed.
                let outcome = match timeout(limit, self.plan_symbol(&symbol)).await {
                    Ok(Ok(Planned::Done(outcome))) => outcome,
                    Ok(Ok(Planned::Order(order))) => self.execute_order(&symbol, order).await,
                    Ok(Err(e)) => {
                        warn!(symbol = %symbol, error = %e, "Symbol skipped");
                        SymbolOutcome::Failed(e.to_string())
                    }
                    Err(_) => {
                        warn!(symbol = %symbol, timeout_ms = limit.as_millis() as u64, "Symbol timed out");
                        SymbolOutcome::TimedOut
                    }
                };
                (symbol, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_symbols)
            .collect::<Vec<_>>()
            .await;

        TickSummary { outcomes }
    }

    /// Fetch, reconcile and plan for one symbol.
    async fn plan_symbol(&self, symbol: &str) -> Result<Planned> {
        let exchange = self.exchange.as_ref();

        let price = exchange
            .price(symbol)
            .await
            .with_context(|| format!("Failed to fetch price for {}", symbol))?;
        let rules = exchange
            .symbol_rules(symbol)
            .await
            .with_context(|| format!("Failed to fetch rules for {}", symbol))?;
        let position = exchange
            .position(symbol)
            .await
            .with_context(|| format!("Failed to fetch position for {}", symbol))?;

        let tracked = {
            let mut engine = self.engine.lock().await;
            match engine.reconcile(symbol, &position, price, &rules) {
                Reconciliation::InSync => {}
                other => debug!(symbol = %symbol, result = ?other, "Reconciled with exchange"),
            }
            engine.position(symbol).is_some()
        };

        let report = self.signals.generate(exchange, symbol).await?;

        // Equity only matters when sizing a fresh entry
        let equity = if tracked {
            Decimal::ZERO
        } else {
            exchange.equity().await.context("Failed to fetch equity")?
        };

        let decision = self.engine.lock().await.plan(
            symbol,
            TickInputs {
                price,
                equity,
                rules: &rules,
                report: &report,
                held_qty: position.abs_quantity(),
            },
        );

        let Some(side) = decision.order_side() else {
            debug!(symbol = %symbol, price = %price, reason = %decision.reason, "Hold");
            return Ok(Planned::Done(SymbolOutcome::Held(decision.reason)));
        };

        // Remainder below one step cannot be sent; forget it
        if decision.action == TickAction::Close && decision.quantity.is_zero() {
            warn!(symbol = %symbol, held = %position.abs_quantity(), "Dust position, dropping state");
            self.engine.lock().await.commit_close(symbol);
            return Ok(Planned::Done(close_outcome(&decision.close_reason)));
        }

        Ok(Planned::Order(PlannedOrder { decision, side }))
    }

    /// Place the planned order and commit the engine state once it fills.
    async fn execute_order(&self, symbol: &str, planned: PlannedOrder) -> SymbolOutcome {
        let PlannedOrder { decision, side } = planned;
        let price = decision.price;

        info!(
            symbol = %symbol,
            action = ?decision.action,
            side = side.as_str(),
            qty = %decision.quantity,
            price = %price,
            reason = %decision.reason,
            "Placing order"
        );

        let order = self
            .exchange
            .place_market_order(symbol, side, decision.quantity, decision.reduce_only())
            .await;

        let order = match order {
            Ok(order) => order,
            Err(e) => {
                error!(symbol = %symbol, action = ?decision.action, error = %e, "Order failed");
                return SymbolOutcome::OrderFailed(e.to_string());
            }
        };
        debug!(
            symbol = %symbol,
            order_id = %order.order_id,
            client_order_id = %order.client_order_id,
            status = %order.status,
            filled = %order.executed_qty,
            avg_price = %order.avg_price,
            "Order acknowledged"
        );

        let mut engine = self.engine.lock().await;
        match decision.action {
            TickAction::Enter => {
                engine.commit_entry(symbol, &decision);
                SymbolOutcome::Entered
            }
            TickAction::Add => {
                engine.commit_add(symbol, &decision);
                SymbolOutcome::Added
            }
            TickAction::Close => {
                engine.commit_close(symbol);
                close_outcome(&decision.close_reason)
            }
            TickAction::NoOp => SymbolOutcome::Held(decision.reason.clone()),
        }
    }

    /// Get current stats.
    pub async fn get_stats(&self) -> BotStats {
        let mut stats = self.stats.read().await.clone();
        stats.is_running = !self.shutdown.load(Ordering::SeqCst);
        stats
    }

    pub fn engine(&self) -> Arc<Mutex<PyramidEngine>> {
        self.engine.clone()
    }
}

/// Result of the bounded planning phase for one symbol.
enum Planned {
    Done(SymbolOutcome),
    Order(PlannedOrder),
}

struct PlannedOrder {
    decision: TickDecision,
    side: OrderSide,
}

fn close_outcome(reason: &Option<CloseReason>) -> SymbolOutcome {
    SymbolOutcome::Closed(reason.unwrap_or(CloseReason::StopLoss))
}

/// Bot statistics.
#[derive(Debug, Clone, Default)]
pub struct BotStats {
    pub ticks: u64,
    pub entries: u64,
    pub adds: u64,
    pub stop_loss_closes: u64,
    pub trailing_stop_closes: u64,
    pub reversal_closes: u64,
    pub failed_orders: u64,
    pub skipped_symbols: u64,
    pub timeouts: u64,
    pub open_positions: usize,
    pub exchange: String,
    pub is_running: bool,
    pub dry_run: bool,
}

impl BotStats {
    fn record(&mut self, outcome: &SymbolOutcome) {
        match outcome {
            SymbolOutcome::Held(_) => {}
            SymbolOutcome::Entered => self.entries += 1,
            SymbolOutcome::Added => self.adds += 1,
            SymbolOutcome::Closed(CloseReason::StopLoss) => self.stop_loss_closes += 1,
            SymbolOutcome::Closed(CloseReason::TrailingStop) => self.trailing_stop_closes += 1,
            SymbolOutcome::Closed(CloseReason::Reversal) => self.reversal_closes += 1,
            SymbolOutcome::OrderFailed(_) => self.failed_orders += 1,
            SymbolOutcome::Failed(_) => self.skipped_symbols += 1,
            SymbolOutcome::TimedOut => self.timeouts += 1,
        }
    }

    pub fn total_closes(&self) -> u64 {
        self.stop_loss_closes + self.trailing_stop_closes + self.reversal_closes
    }
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Exchange:        {}", self.exchange)?;
        writeln!(f, "Ticks:           {}", self.ticks)?;
        writeln!(f, "Entries:         {}", self.entries)?;
        writeln!(f, "Pyramid Adds:    {}", self.adds)?;
        writeln!(f, "Closes:          {} (Stop: {}, Trail: {}, Reversal: {})",
            self.total_closes(), self.stop_loss_closes, self.trailing_stop_closes, self.reversal_closes)?;
        writeln!(f, "Failed Orders:   {}", self.failed_orders)?;
        writeln!(f, "Skipped:         {} (Timeouts: {})", self.skipped_symbols, self.timeouts)?;
        writeln!(f, "Open Positions:  {}", self.open_positions)?;
        writeln!(f, "Status:          {} {}",
            if self.is_running { "Running" } else { "Stopped" },
            if self.dry_run { "(Dry Run)" } else { "" })?;
        Ok(())
    }
}
