use crate::domain::errors::InvariantViolation;
use crate::domain::market::Timeframe;
use crate::domain::types::{Candle, Signal, SimulatedTrade, Ticker, TradeStatus, UniverseSnapshot};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

/// A venue capability set. The core only ever reads market data and, in
/// paper mode, never calls `create_order`/`set_leverage`.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn fetch_tickers(&self) -> anyhow::Result<Vec<Ticker>>;

    async fn fetch_markets(&self) -> anyhow::Result<Vec<String>>;

    async fn create_order(
        &self,
        symbol: &str,
        side: &str,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> anyhow::Result<()>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()>;
}

/// The persistence contract (C7): idempotent candle upsert, signal/trade
/// writes, open-position query, daily universe cache, daily metrics roll-up.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_candles(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        rows: &[Candle],
    ) -> anyhow::Result<usize>;

    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>>;

    async fn latest_closed_open_time(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now_ms: i64,
    ) -> anyhow::Result<Option<i64>>;

    async fn store_signal(&self, signal: &Signal) -> anyhow::Result<Uuid>;

    async fn open_trade(
        &self,
        signal_id: Uuid,
        symbol: &str,
        direction: crate::domain::types::Direction,
        entry: Decimal,
        stop: Decimal,
        take: Decimal,
        fees_estimate: Decimal,
        meta: Value,
    ) -> anyhow::Result<Uuid>;

    async fn close_trade(
        &self,
        id: Uuid,
        exit_price: Decimal,
        exit_time_ms: i64,
        pnl_pct: f64,
        status: TradeStatus,
    ) -> Result<(), InvariantViolation>;

    async fn get_open_positions(&self) -> anyhow::Result<Vec<SimulatedTrade>>;

    async fn store_universe(
        &self,
        day: NaiveDate,
        symbols: &[String],
        meta: Value,
    ) -> anyhow::Result<()>;

    async fn fetch_universe(&self, day: NaiveDate) -> anyhow::Result<Option<UniverseSnapshot>>;

    async fn store_metrics_daily(&self, day: NaiveDate, metrics: Value) -> anyhow::Result<()>;

    async fn fetch_metrics_daily(&self, day: NaiveDate) -> anyhow::Result<Option<Value>>;
}
