//! Pyramiding futures bot
//!
//! Trades a shortlist of USDT-M perpetuals on trend and mean-reversion
//! signals, sizes every order to the exchange's lot rules, adds to winners
//! and exits on a stop-loss or trailing stop.

mod api;
mod bot;
mod models;
mod scanner;
mod strategy;
mod trading;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{BinanceFutures, Exchange, PaperExchange};
use crate::bot::{Bot, BotConfig, SymbolOutcome};
use crate::strategy::SignalGenerator;
use crate::trading::PositionSizer;

/// Pyramiding futures bot CLI.
#[derive(Parser)]
#[command(name = "pyrabot")]
#[command(about = "Trend-following USDT-M futures bot with pyramiding and trailing exits", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop
    Run {
        /// Polling interval in seconds
        #[arg(short, long, default_value = "60")]
        interval: u64,

        /// Send real orders (default is paper trading)
        #[arg(long)]
        live: bool,

        /// Starting balance of the paper account in USDT
        #[arg(long, default_value = "1000")]
        paper_cash: f64,

        /// Symbols processed concurrently
        #[arg(short, long, default_value = "4")]
        concurrency: usize,

        /// Per-symbol time limit in seconds
        #[arg(long, default_value = "20")]
        symbol_timeout: u64,
    },

    /// Run a single tick and print what happened per symbol
    Scan {
        /// Send real orders (default is paper trading)
        #[arg(long)]
        live: bool,

        /// Starting balance of the paper account in USDT
        #[arg(long, default_value = "1000")]
        paper_cash: f64,
    },

    /// Show the volume/funding screen over the symbol pool
    Shortlist,

    /// Show the current signal for a symbol
    Signal {
        /// Symbol, e.g. BTCUSDT
        symbol: String,
    },

    /// Show entry and add sizes for a symbol
    Size {
        /// Symbol, e.g. BTCUSDT
        symbol: String,

        /// Equity to size against (defaults to the account's equity)
        #[arg(short, long)]
        equity: Option<f64>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = BotConfig::from_env()?;

    match cli.command {
        Commands::Run {
            interval,
            live,
            paper_cash,
            concurrency,
            symbol_timeout,
        } => {
            config.poll_interval_secs = interval;
            config.dry_run = !live;
            config.paper_starting_cash = Decimal::try_from(paper_cash)?;
            config.max_concurrent_symbols = concurrency;
            config.symbol_timeout_ms = symbol_timeout.saturating_mul(1000);

            let (exchange, paper) = build_exchange(&config)?;
            let mut bot = Bot::new(config.clone(), exchange)?;

            println!("\n=== Pyramiding Futures Bot ===");
            println!("Polling interval: {}s", config.poll_interval_secs);
            println!("Mode: {}", if config.dry_run { "PAPER (no real orders)" } else { "LIVE TRADING" });
            println!("Symbol pool: {}", config.shortlist_config.symbol_pool.join(", "));
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            let stats = bot.get_stats().await;
            println!("\n{}", stats);
            print_open_positions(&bot).await;
            print_paper_summary(paper.as_ref()).await;
        }

        Commands::Scan { live, paper_cash } => {
            config.dry_run = !live;
            config.paper_starting_cash = Decimal::try_from(paper_cash)?;

            let (exchange, paper) = build_exchange(&config)?;
            let mut bot = Bot::new(config, exchange)?;
            let mut summary = bot.tick().await?;
            summary.outcomes.sort_by(|a, b| a.0.cmp(&b.0));

            println!("\n{:<14} {:<10} {}", "SYMBOL", "OUTCOME", "DETAIL");
            println!("{}", "-".repeat(70));
            for (symbol, outcome) in &summary.outcomes {
                let (label, detail) = describe(outcome);
                println!("{:<14} {:<10} {}", symbol, label, detail);
            }
            print_open_positions(&bot).await;
            print_paper_summary(paper.as_ref()).await;
        }

        Commands::Shortlist => {
            let exchange = market_data()?;
            let shortlist_config = &config.shortlist_config;

            let metrics = scanner::fetch_metrics(exchange.as_ref(), shortlist_config).await;
            let selected = scanner::select(&metrics, shortlist_config);

            println!(
                "\n{:<14} {:>18} {:>12} {:>6}",
                "SYMBOL", "24H VOLUME", "FUNDING", "PASS"
            );
            println!("{}", "-".repeat(54));
            for m in &metrics {
                println!(
                    "{:<14} {:>18.0} {:>11.4}% {:>6}",
                    m.symbol,
                    m.quote_volume,
                    m.funding_rate * dec!(100),
                    if m.approved { "yes" } else { "no" }
                );
            }
            println!("\nSelected: {}", selected.join(", "));
        }

        Commands::Signal { symbol } => {
            let symbol = symbol.to_uppercase();
            let exchange = market_data()?;
            let generator = SignalGenerator::new(config.signal_config.clone());

            let report = generator.generate(exchange.as_ref(), &symbol).await?;

            println!("\n=== Signal: {} ===", symbol);
            println!("Direction:  {}", report.signal);
            println!("Timeframe:  {}", report.timeframe.as_deref().unwrap_or("-"));
            println!("Breakout:   {}", if report.breakout { "Yes" } else { "No" });
            if !report.detail.is_empty() {
                println!("Detail:     {}", report.detail);
            }
        }

        Commands::Size { symbol, equity } => {
            let symbol = symbol.to_uppercase();
            let exchange = market_data()?;

            let price = exchange.price(&symbol).await?;
            let rules = exchange.symbol_rules(&symbol).await?;
            let equity = match equity {
                Some(e) => Decimal::try_from(e)?,
                None => exchange
                    .equity()
                    .await
                    .context("No --equity given and account equity is unavailable")?,
            };

            let sizer = PositionSizer::new(config.trading_config.clone());
            let entry = sizer.entry_qty(&symbol, equity, price, &rules);
            let add = sizer.add_qty(entry.quantity, price, &rules);

            println!("\n=== Sizing: {} ===", symbol);
            println!("Price:            {}", price);
            println!("Step / Min Qty:   {} / {}", rules.step_size, rules.min_qty);
            println!("Tick Size:        {}", rules.tick_size);
            println!("Min Notional:     ${}", rules.min_notional);
            println!("Equity:           ${:.2}", equity);
            println!("Desired Notional: ${:.2}", sizer.desired_notional(equity));
            println!(
                "Entry:            {} (${:.2}) {}",
                entry.quantity,
                entry.quantity * price,
                if entry.tradable { String::new() } else { format!("[skip: {}]", entry.reason) }
            );
            println!(
                "Each Add:         {} (${:.2}) {}",
                add.quantity,
                add.quantity * price,
                if add.tradable { String::new() } else { format!("[skip: {}]", add.reason) }
            );
        }

        Commands::Config => {
            let trading = &config.trading_config;
            let signal = &config.signal_config;
            let shortlist = &config.shortlist_config;

            println!("\n=== Trading Configuration ===\n");
            println!("Position Sizing:");
            println!("  Equity Ratio:         {}%", trading.equity_ratio * dec!(100));
            println!("  Min Base Notional:    ${}", trading.min_base_notional);

            println!("\nExits:");
            println!("  Max Loss:             {}%", trading.max_loss_pct * dec!(100));
            println!("  Trail Giveback:       {}%", trading.trail_giveback_pct * dec!(100));
            println!("  Reversal Policy:      {}", trading.reversal_policy);

            println!("\nPyramiding:");
            println!("  Enabled:              {}", trading.pyramid_enabled);
            println!("  Max Adds:             {}", trading.pyramid_max_layers);
            println!("  Add Ratio:            {}", trading.pyramid_add_ratio);
            println!("  Trigger Move:         {}%", trading.pyramid_trigger_pct * dec!(100));

            println!("\n=== Signal Configuration ===\n");
            println!("  Timeframes:           {}", signal.timeframes.join(", "));
            println!("  Klines:               {} (min {})", signal.kline_limit, signal.min_candles);
            println!("  EMA / MACD:           {}/{} signal {}", signal.ema_fast, signal.ema_slow, signal.macd_signal);
            println!("  RSI:                  {} ({} / {})", signal.rsi_period, signal.rsi_oversold, signal.rsi_overbought);
            println!("  Bollinger:            {} x {}σ", signal.bb_period, signal.bb_std_dev);
            println!("  Breakout Lookback:    {}", signal.breakout_lookback);

            println!("\n=== Shortlist ===\n");
            println!("  Pool:                 {}", shortlist.symbol_pool.join(", "));
            println!("  Min 24h Volume:       ${}", shortlist.volume_min_usd);
            println!("  Min Funding Rate:     {}", shortlist.funding_rate_min);
            println!("  Max Candidates:       {}", shortlist.max_candidates);
        }
    }

    Ok(())
}

/// Authenticated client when credentials exist, public market data otherwise.
fn market_data() -> Result<Arc<BinanceFutures>> {
    match BinanceFutures::from_env() {
        Ok(client) => Ok(Arc::new(client)),
        Err(e) => {
            warn!("{}; using public market data only", e);
            Ok(Arc::new(BinanceFutures::public()?))
        }
    }
}

/// Paper account over live market data, or the live account itself.
/// The paper handle is returned separately for the closing summary.
fn build_exchange(config: &BotConfig) -> Result<(Arc<dyn Exchange>, Option<Arc<PaperExchange>>)> {
    if config.dry_run {
        let paper = Arc::new(
            PaperExchange::new(market_data()?, config.paper_starting_cash).with_fee_rate(config.paper_fee_rate),
        );
        info!(cash = %config.paper_starting_cash, fee_rate = %config.paper_fee_rate, "Paper trading enabled");
        let exchange: Arc<dyn Exchange> = paper.clone();
        Ok((exchange, Some(paper)))
    } else {
        let client = BinanceFutures::from_env().context("Live trading requires API credentials")?;
        Ok((Arc::new(client), None))
    }
}

async fn print_paper_summary(paper: Option<&Arc<PaperExchange>>) {
    let Some(paper) = paper else {
        return;
    };
    println!("\n{}", paper.summary().await);
}

async fn print_open_positions(bot: &Bot) {
    let engine = bot.engine();
    let engine = engine.lock().await;
    if engine.positions().is_empty() {
        return;
    }

    println!("\n=== Open Positions ({}) ===", engine.positions().len());
    for symbol in engine.positions().symbols() {
        if let Some(pos) = engine.position(&symbol) {
            println!(
                "  {} {} {} @ {} (adds: {}, peak: {}, trough: {})",
                pos.symbol, pos.direction, pos.total_qty, pos.entry_price, pos.add_count, pos.peak_price, pos.trough_price
            );
        }
    }
}

fn describe(outcome: &SymbolOutcome) -> (&'static str, String) {
    match outcome {
        SymbolOutcome::Held(reason) => ("hold", reason.clone()),
        SymbolOutcome::Entered => ("entry", String::new()),
        SymbolOutcome::Added => ("add", String::new()),
        SymbolOutcome::Closed(reason) => ("close", reason.to_string()),
        SymbolOutcome::OrderFailed(e) => ("failed", e.clone()),
        SymbolOutcome::Failed(e) => ("skipped", e.clone()),
        SymbolOutcome::TimedOut => ("timeout", String::new()),
    }
}
