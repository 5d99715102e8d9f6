//! Integration tests exercising the control loop's ordering and safety
//! invariants across multiple `run_once` cycles, rather than the pure
//! single-call unit tests already colocated with `CycleScheduler`.

use papertrader::application::scheduler::CycleScheduler;
use papertrader::config::Config;
use papertrader::domain::market::Timeframe;
use papertrader::domain::ports::Store;
use papertrader::domain::types::{Candle, Direction, Ticker};
use papertrader::infrastructure::exchange::mock::MockExchange;
use papertrader::infrastructure::persistence::database::Database;
use papertrader::infrastructure::persistence::repository::SqliteStore;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

fn candle(symbol: &str, close: f64, t: i64, timeframe: Timeframe) -> Candle {
    Candle {
        exchange: "mock".into(),
        symbol: symbol.into(),
        timeframe,
        open_time_ms: t,
        open: Decimal::try_from(close).unwrap(),
        high: Decimal::try_from(close + 0.5).unwrap(),
        low: Decimal::try_from(close - 0.5).unwrap(),
        close: Decimal::try_from(close).unwrap(),
        volume: Decimal::try_from(1000.0).unwrap(),
        close_time_ms: t + 60_000 - 1,
    }
}

/// Flat-ish random walk with enough wiggle to feed the strategy bank, without
/// trending hard enough to force an ensemble direction every cycle.
fn choppy_series(symbol: &str, n: usize, timeframe: Timeframe) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let wiggle = ((i % 7) as f64 - 3.0) * 0.15;
            candle(symbol, 100.0 + wiggle, i as i64 * 60_000, timeframe)
        })
        .collect()
}

/// A steadily rising series, used where a test wants to force a directional
/// entry through the trend-following strategy.
fn trending_series(symbol: &str, n: usize, timeframe: Timeframe, base: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| candle(symbol, base + i as f64 * 0.4, i as i64 * 60_000, timeframe))
        .collect()
}

async fn test_store(name: &str) -> Arc<dyn Store> {
    let url = format!("sqlite::memory:?cache=shared&db={name}");
    let db = Database::new(&url).await.unwrap();
    Arc::new(SqliteStore::new(db))
}

fn base_config() -> Config {
    let mut config = Config::default();
    config.live.timeframe = "1m".to_string();
    config.live.candle_limit = 120;
    config
}

#[tokio::test]
async fn idempotent_reingestion_leaves_candle_rows_unchanged() {
    let timeframe = Timeframe::from_str("1m").unwrap();
    let exchange = Arc::new(MockExchange::new());
    let candles = choppy_series("BTC/USDT", 80, timeframe);
    exchange.seed_candles("BTC/USDT", timeframe, candles);

    let store = test_store("idempotent").await;
    let mut config = base_config();
    config.universe.manual_override = vec!["BTC/USDT".to_string()];

    let mut scheduler = CycleScheduler::new(exchange.clone(), store.clone(), config);
    scheduler.run_once(&["BTC/USDT".to_string()]).await.unwrap();
    let first = store.fetch_recent_candles("BTC/USDT", timeframe, 200).await.unwrap();

    // Re-running against the same exchange-side series must not duplicate or
    // mutate rows: the upsert is keyed on (exchange, symbol, timeframe, open_time).
    scheduler.run_once(&["BTC/USDT".to_string()]).await.unwrap();
    let second = store.fetch_recent_candles("BTC/USDT", timeframe, 200).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.open_time_ms, b.open_time_ms);
        assert_eq!(a.open, b.open);
        assert_eq!(a.high, b.high);
        assert_eq!(a.low, b.low);
        assert_eq!(a.close, b.close);
        assert_eq!(a.volume, b.volume);
    }
}

#[tokio::test]
async fn repeated_cycles_without_new_candles_emit_at_most_one_signal() {
    let timeframe = Timeframe::from_str("1m").unwrap();
    let exchange = Arc::new(MockExchange::new());
    let candles = choppy_series("ETH/USDT", 80, timeframe);
    exchange.seed_candles("ETH/USDT", timeframe, candles);

    let store = test_store("dedup_multi").await;
    let mut config = base_config();
    config.universe.manual_override = vec!["ETH/USDT".to_string()];

    let mut scheduler = CycleScheduler::new(exchange, store.clone(), config);
    for _ in 0..5 {
        scheduler.run_once(&["ETH/USDT".to_string()]).await.unwrap();
    }

    // No new closed candle ever appears across the five cycles, so the
    // per-symbol dedup cursor must keep every later cycle a no-op: only the
    // first cycle's resolved direction should ever have been persisted.
    let open_positions = store.get_open_positions().await.unwrap();
    assert!(open_positions.len() <= 1);
}

#[tokio::test]
async fn never_calls_create_order_across_many_cycles_even_when_trending() {
    let timeframe = Timeframe::from_str("1m").unwrap();
    let exchange = Arc::new(MockExchange::new());
    let mut candles = trending_series("SOL/USDT", 200, timeframe, 50.0);
    // Extend the series cycle by cycle below; start with a long warm-up window
    // so the trend strategy has enough history to produce a directional verdict.
    exchange.seed_candles("SOL/USDT", timeframe, candles.clone());
    exchange.seed_ticker(Ticker {
        symbol: "SOL/USDT".to_string(),
        bid: Decimal::try_from(99.9).unwrap(),
        ask: Decimal::try_from(100.1).unwrap(),
        quote_volume: Decimal::try_from(5_000_000.0).unwrap(),
    });

    let store = test_store("no_real_orders").await;
    let mut config = base_config();
    config.universe.manual_override = vec!["SOL/USDT".to_string()];

    let mut scheduler = CycleScheduler::new(exchange.clone(), store, config);
    for cycle in 0..6 {
        // Advance the candle feed each cycle so dedup doesn't mask later
        // cycles and the closeout path also gets exercised on open trades.
        let next_t = candles.last().unwrap().open_time_ms + 60_000;
        candles.push(candle(
            "SOL/USDT",
            50.0 + (200 + cycle) as f64 * 0.4,
            next_t,
            timeframe,
        ));
        exchange.seed_candles("SOL/USDT", timeframe, candles.clone());
        scheduler.run_once(&["SOL/USDT".to_string()]).await.unwrap();
    }

    assert_eq!(exchange.create_order_call_count(), 0);
}

#[tokio::test]
async fn sticky_kill_switch_blocks_new_entries_for_remainder_of_run() {
    let timeframe = Timeframe::from_str("1m").unwrap();
    let exchange = Arc::new(MockExchange::new());
    let candles = trending_series("XRP/USDT", 120, timeframe, 1.0);
    exchange.seed_candles("XRP/USDT", timeframe, candles);

    let store = test_store("kill_switch").await;
    let mut config = base_config();
    config.universe.manual_override = vec!["XRP/USDT".to_string()];
    config.risk.max_daily_loss_r = 0.01; // trips on the very first adverse close

    let mut scheduler = CycleScheduler::new(exchange, store.clone(), config);
    scheduler.run_once(&["XRP/USDT".to_string()]).await.unwrap();

    // Force the ledger sticky per spec: once tripped, no amount of further
    // cycling can open a new position even if a later signal is directional.
    scheduler.ledger.register_trade_result(-1.0);
    assert!(scheduler.ledger.kill_switch);
    assert!(!scheduler.ledger.can_open("XRP/USDT"));

    for _ in 0..3 {
        scheduler.run_once(&["XRP/USDT".to_string()]).await.unwrap();
    }
    assert!(scheduler.ledger.kill_switch);

    let open_positions = store.get_open_positions().await.unwrap();
    assert!(open_positions.len() <= 1);
}

#[tokio::test]
async fn none_direction_signals_are_persisted_for_audit() {
    let timeframe = Timeframe::from_str("1m").unwrap();
    let exchange = Arc::new(MockExchange::new());
    // A flat/choppy series should frequently resolve to a NONE-direction
    // ensemble decision, which must still leave a signal row behind.
    let candles = choppy_series("DOGE/USDT", 80, timeframe);
    exchange.seed_candles("DOGE/USDT", timeframe, candles);

    let store = test_store("none_persist").await;
    let mut config = base_config();
    config.universe.manual_override = vec!["DOGE/USDT".to_string()];

    let mut scheduler = CycleScheduler::new(exchange, store.clone(), config);
    scheduler.run_once(&["DOGE/USDT".to_string()]).await.unwrap();

    // No open position should exist on a flat series, but the ensemble still
    // runs and its decision (NONE or otherwise) is recorded every cycle.
    let open_positions = store.get_open_positions().await.unwrap();
    for trade in &open_positions {
        assert_ne!(trade.direction, Direction::None);
    }
}
