use crate::domain::market::Timeframe;
use crate::domain::ports::ExchangeClient;
use crate::domain::types::{Candle, Ticker};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// A deterministic in-memory exchange for tests and dry runs. Seeds a
/// synthetic random-walk candle series per symbol the first time it is
/// asked for one; never calls out to a network.
pub struct MockExchange {
    candles: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
    tickers: RwLock<HashMap<String, Ticker>>,
    create_order_calls: RwLock<usize>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            candles: RwLock::new(HashMap::new()),
            tickers: RwLock::new(HashMap::new()),
            create_order_calls: RwLock::new(0),
        }
    }

    /// Seeds a deterministic candle series for `symbol`/`timeframe`, replacing
    /// whatever was there before. Intended for test setup, not the live path.
    pub fn seed_candles(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.candles
            .write()
            .unwrap()
            .insert((symbol.to_string(), timeframe), candles);
    }

    pub fn seed_ticker(&self, ticker: Ticker) {
        self.tickers.write().unwrap().insert(ticker.symbol.clone(), ticker);
    }

    pub fn create_order_call_count(&self) -> usize {
        *self.create_order_calls.read().unwrap()
    }

    fn synthesize(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Vec<Candle> {
        let step_ms = timeframe.to_ms();
        let base = 100.0 + (symbol.bytes().map(|b| b as u32).sum::<u32>() % 500) as f64;
        (0..limit)
            .map(|i| {
                let seed = (i as u64).wrapping_mul(2654435761).wrapping_add(symbol.len() as u64);
                let drift = ((seed % 1000) as f64 / 1000.0 - 0.5) * 0.02;
                let close = base * (1.0 + drift * (i as f64 + 1.0).ln().max(0.01));
                let open_time_ms = i as i64 * step_ms;
                Candle {
                    exchange: "mock".to_string(),
                    symbol: symbol.to_string(),
                    timeframe,
                    open_time_ms,
                    open: Decimal::from_f64(close * 0.999).unwrap_or_default(),
                    high: Decimal::from_f64(close * 1.002).unwrap_or_default(),
                    low: Decimal::from_f64(close * 0.998).unwrap_or_default(),
                    close: Decimal::from_f64(close).unwrap_or_default(),
                    volume: Decimal::from(1_000),
                    close_time_ms: open_time_ms + step_ms,
                }
            })
            .collect()
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        if let Some(series) = self
            .candles
            .read()
            .unwrap()
            .get(&(symbol.to_string(), timeframe))
        {
            return Ok(series.iter().rev().take(limit).rev().cloned().collect());
        }
        Ok(self.synthesize(symbol, timeframe, limit))
    }

    async fn fetch_tickers(&self) -> Result<Vec<Ticker>> {
        Ok(self.tickers.read().unwrap().values().cloned().collect())
    }

    async fn fetch_markets(&self) -> Result<Vec<String>> {
        Ok(self.tickers.read().unwrap().keys().cloned().collect())
    }

    async fn create_order(
        &self,
        symbol: &str,
        side: &str,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> Result<()> {
        *self.create_order_calls.write().unwrap() += 1;
        info!(symbol, side, %amount, ?price, "MockExchange: create_order called (this must never happen in paper mode)");
        Ok(())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<()> {
        Ok(())
    }
}
