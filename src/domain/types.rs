use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::market::Timeframe;

/// A directional verdict, shared by signals and simulated trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    None,
}

impl Direction {
    pub fn is_directional(&self) -> bool {
        !matches!(self, Direction::None)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
            Direction::None => write!(f, "NONE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Stop,
    Take,
}

/// One OHLCV bar. Identity is `(exchange, symbol, timeframe, open_time_ms)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time_ms: i64,
}

impl Candle {
    pub fn is_closed(&self, now_ms: i64) -> bool {
        self.close_time_ms <= now_ms
    }
}

/// A per-cycle directional verdict emitted for a closed candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal_time_ms: i64,
    pub direction: Direction,
    pub price: Decimal,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub created_at_ms: i64,
}

/// A paper-trading position, opened and resolved by the C6 executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub take_price: Decimal,
    pub status: TradeStatus,
    pub exit_time_ms: Option<i64>,
    pub exit_price: Option<Decimal>,
    pub pnl_pct: Option<f64>,
    pub fees_estimate: Decimal,
    pub meta: serde_json::Value,
}

impl SimulatedTrade {
    pub fn is_open(&self) -> bool {
        matches!(self.status, TradeStatus::Open)
    }
}

/// A snapshot of best bid/ask and 24h quote volume for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub quote_volume: Decimal,
}

/// The daily tradable symbol set, one row per calendar day (UTC).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub day: NaiveDate,
    pub symbols: Vec<String>,
    pub scores: HashMap<String, f64>,
    pub meta: serde_json::Value,
}
