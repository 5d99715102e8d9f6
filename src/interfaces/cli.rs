//! Command-line surface for the embedding binary (spec.md §6). The control
//! loop itself (`CycleScheduler`) is transport-agnostic; this module is the
//! only place that wires it to a concrete exchange/store pair and parses
//! process arguments.

use crate::application::backtest;
use crate::application::scheduler::CycleScheduler;
use crate::config::Config;
use crate::domain::market::Timeframe;
use crate::domain::ports::{ExchangeClient, Store};
use crate::infrastructure::exchange::binance::BinanceFuturesClient;
use crate::infrastructure::exchange::mock::MockExchange;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::repository::SqliteStore;
use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Multi-symbol crypto-futures paper-trading control loop", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file layered under the built-in defaults.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// One-shot dummy pipeline pass: resolves the universe and runs a single cycle.
    Run,
    /// Replays stored candles for one symbol through the decision pipeline.
    Backtest {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, default_value = "15m")]
        timeframe: String,
        #[arg(short, long, default_value = "1000")]
        limit: usize,
        #[arg(long, default_value = "100")]
        min_window: usize,
    },
    /// Drives the live cycle scheduler.
    RunLive {
        /// Comma-separated symbol override; bypasses universe building.
        #[arg(long)]
        symbols: Option<String>,
        #[arg(long)]
        max_symbols: Option<usize>,
        #[arg(long, default_value_t = false)]
        once: bool,
        #[arg(long)]
        loop_seconds: Option<u64>,
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Prints the day's persisted daily metrics roll-up, if any.
    Report,
    /// Prints the day's resolved universe.
    Universe,
    /// Verifies the store and exchange collaborator are reachable.
    Healthcheck,
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let db_url = format!("sqlite://{}", config.db_path.display());
    let database = Database::new(&db_url).await?;
    Ok(Arc::new(SqliteStore::new(database)))
}

fn build_exchange(config: &Config) -> Arc<dyn ExchangeClient> {
    match (&config.binance_api_key, &config.binance_api_secret) {
        (Some(key), Some(secret)) => {
            Arc::new(BinanceFuturesClient::new(Some(key.clone()), Some(secret.clone())))
        }
        _ => {
            info!("no binance credentials configured; using the in-memory mock exchange");
            Arc::new(MockExchange::new())
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref().map(std::path::Path::new))?;

    match cli.command {
        Commands::Run => {
            let store = build_store(&config).await?;
            let exchange = build_exchange(&config);
            let mut scheduler = CycleScheduler::new(exchange, store, config);
            scheduler.run_once(&[]).await?;
            println!("cycle complete");
        }
        Commands::Backtest { symbol, timeframe, limit, min_window } => {
            let store = build_store(&config).await?;
            let tf = Timeframe::from_str(&timeframe)
                .map_err(|_| anyhow::anyhow!("invalid timeframe '{timeframe}'"))?;
            let result = backtest::run_backtest(store.as_ref(), &symbol, tf, &config, limit, min_window).await?;
            println!(
                "{symbol} {timeframe}: trades={} closed={} winrate={:.2} expectancy={:.4} max_drawdown={:.4}",
                result.summary.total_trades,
                result.summary.closed_trades,
                result.summary.winrate,
                result.summary.expectancy,
                result.summary.max_drawdown,
            );
        }
        Commands::RunLive { symbols, max_symbols, once, loop_seconds, timeframe } => {
            let store = build_store(&config).await?;
            let exchange = build_exchange(&config);
            let mut config = config;
            if let Some(max_symbols) = max_symbols {
                config.universe.max_symbols = max_symbols;
            }
            if let Some(loop_seconds) = loop_seconds {
                config.live.loop_seconds = loop_seconds;
            }
            if let Some(timeframe) = timeframe {
                config.live.timeframe = timeframe;
            }
            let symbols_override: Vec<String> = symbols
                .map(|s| s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default();

            let mut scheduler = CycleScheduler::new(exchange, store, config);
            scheduler.run(&symbols_override, once).await?;
        }
        Commands::Report => {
            let store = build_store(&config).await?;
            let today = chrono::Utc::now().date_naive();
            match store.fetch_metrics_daily(today).await? {
                Some(rolled) => println!("day={today} metrics={rolled}"),
                None => println!("no metrics roll-up stored for {today} yet"),
            }
        }
        Commands::Universe => {
            let store = build_store(&config).await?;
            let today = chrono::Utc::now().date_naive();
            match store.fetch_universe(today).await? {
                Some(universe) => println!("{}: {:?}", today, universe.symbols),
                None => println!("no universe resolved for {today} yet"),
            }
        }
        Commands::Healthcheck => {
            let store = build_store(&config).await?;
            let exchange = build_exchange(&config);
            let today = chrono::Utc::now().date_naive();
            store.fetch_universe(today).await?;
            exchange.fetch_tickers().await?;
            println!("ok");
        }
    }
    Ok(())
}
