use crate::domain::errors::InvariantViolation;
use crate::domain::market::Timeframe;
use crate::domain::ports::Store;
use crate::domain::types::{Candle, Direction, Signal, SimulatedTrade, TradeStatus, UniverseSnapshot};
use crate::infrastructure::persistence::database::Database;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteStore {
    database: Database,
}

impl SqliteStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "LONG",
        Direction::Short => "SHORT",
        Direction::None => "NONE",
    }
}

fn direction_from_str(raw: &str) -> Direction {
    match raw {
        "LONG" => Direction::Long,
        "SHORT" => Direction::Short,
        _ => Direction::None,
    }
}

fn status_str(status: TradeStatus) -> &'static str {
    match status {
        TradeStatus::Open => "OPEN",
        TradeStatus::Stop => "STOP",
        TradeStatus::Take => "TAKE",
    }
}

fn status_from_str(raw: &str) -> TradeStatus {
    match raw {
        "STOP" => TradeStatus::Stop,
        "TAKE" => TradeStatus::Take,
        _ => TradeStatus::Open,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_candles(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: Timeframe,
        rows: &[Candle],
    ) -> Result<usize> {
        let mut tx = self.database.pool.begin().await?;
        for candle in rows {
            sqlx::query(
                r#"
                INSERT INTO candles
                    (exchange, symbol, timeframe, open_time_ms, open, high, low, close, volume, close_time_ms)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT(exchange, symbol, timeframe, open_time_ms) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    close_time_ms = excluded.close_time_ms
                "#,
            )
            .bind(exchange)
            .bind(symbol)
            .bind(timeframe.to_string())
            .bind(candle.open_time_ms)
            .bind(candle.open.to_string())
            .bind(candle.high.to_string())
            .bind(candle.low.to_string())
            .bind(candle.close.to_string())
            .bind(candle.volume.to_string())
            .bind(candle.close_time_ms)
            .execute(&mut *tx)
            .await
            .context("failed to upsert candle")?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let rows: Vec<(String, String, i64, String, String, String, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT exchange, symbol, open_time_ms, open, high, low, close, volume, close_time_ms
            FROM candles
            WHERE symbol = $1 AND timeframe = $2
            ORDER BY open_time_ms DESC
            LIMIT $3
            "#,
        )
        .bind(symbol)
        .bind(timeframe.to_string())
        .bind(limit as i64)
        .fetch_all(&self.database.pool)
        .await
        .context("failed to fetch recent candles")?;

        let mut candles: Vec<Candle> = rows
            .into_iter()
            .map(
                |(exchange, symbol, open_time_ms, open, high, low, close, volume, close_time_ms)| Candle {
                    exchange,
                    symbol,
                    timeframe,
                    open_time_ms,
                    open: Decimal::from_str(&open).unwrap_or_default(),
                    high: Decimal::from_str(&high).unwrap_or_default(),
                    low: Decimal::from_str(&low).unwrap_or_default(),
                    close: Decimal::from_str(&close).unwrap_or_default(),
                    volume: Decimal::from_str(&volume).unwrap_or_default(),
                    close_time_ms,
                },
            )
            .collect();
        candles.reverse();
        Ok(candles)
    }

    async fn latest_closed_open_time(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now_ms: i64,
    ) -> Result<Option<i64>> {
        let row: Option<(Option<i64>,)> = sqlx::query_as(
            r#"
            SELECT MAX(open_time_ms) FROM candles
            WHERE symbol = $1 AND timeframe = $2 AND close_time_ms <= $3
            "#,
        )
        .bind(symbol)
        .bind(timeframe.to_string())
        .bind(now_ms)
        .fetch_optional(&self.database.pool)
        .await
        .context("failed to query latest closed open time")?;

        Ok(row.and_then(|(v,)| v))
    }

    async fn store_signal(&self, signal: &Signal) -> Result<Uuid> {
        let reasons_json = serde_json::to_string(&signal.reasons)?;
        sqlx::query(
            r#"
            INSERT INTO signals
                (id, symbol, timeframe, signal_time_ms, direction, price, confidence, reasons_json, created_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT(symbol, timeframe, signal_time_ms) DO NOTHING
            "#,
        )
        .bind(signal.id.to_string())
        .bind(&signal.symbol)
        .bind(signal.timeframe.to_string())
        .bind(signal.signal_time_ms)
        .bind(direction_str(signal.direction))
        .bind(signal.price.to_string())
        .bind(signal.confidence)
        .bind(reasons_json)
        .bind(signal.created_at_ms)
        .execute(&self.database.pool)
        .await
        .context("failed to store signal")?;

        Ok(signal.id)
    }

    async fn open_trade(
        &self,
        signal_id: Uuid,
        symbol: &str,
        direction: Direction,
        entry: Decimal,
        stop: Decimal,
        take: Decimal,
        fees_estimate: Decimal,
        meta: Value,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO trades_simulated
                (id, signal_id, symbol, direction, entry_price, stop_price, take_price, status,
                 exit_time_ms, exit_price, pnl_pct, fees_estimate, meta_json)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'OPEN', NULL, NULL, NULL, $8, $9)
            "#,
        )
        .bind(id.to_string())
        .bind(signal_id.to_string())
        .bind(symbol)
        .bind(direction_str(direction))
        .bind(entry.to_string())
        .bind(stop.to_string())
        .bind(take.to_string())
        .bind(fees_estimate.to_string())
        .bind(meta.to_string())
        .execute(&self.database.pool)
        .await
        .context("failed to open trade")?;

        sqlx::query("INSERT OR REPLACE INTO positions (symbol, trade_id) VALUES ($1, $2)")
            .bind(symbol)
            .bind(id.to_string())
            .execute(&self.database.pool)
            .await
            .context("failed to index open position")?;

        Ok(id)
    }

    async fn close_trade(
        &self,
        id: Uuid,
        exit_price: Decimal,
        exit_time_ms: i64,
        pnl_pct: f64,
        status: TradeStatus,
    ) -> Result<(), InvariantViolation> {
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM trades_simulated WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.database.pool)
            .await
            .map_err(|_| InvariantViolation::CloseNonOpenTrade { id: id.to_string() })?;

        match current {
            Some((raw,)) if raw == "OPEN" => {}
            _ => return Err(InvariantViolation::CloseNonOpenTrade { id: id.to_string() }),
        }

        sqlx::query(
            r#"
            UPDATE trades_simulated
            SET status = $1, exit_price = $2, exit_time_ms = $3, pnl_pct = $4
            WHERE id = $5
            "#,
        )
        .bind(status_str(status))
        .bind(exit_price.to_string())
        .bind(exit_time_ms)
        .bind(pnl_pct)
        .bind(id.to_string())
        .execute(&self.database.pool)
        .await
        .map_err(|_| InvariantViolation::CloseNonOpenTrade { id: id.to_string() })?;

        sqlx::query("DELETE FROM positions WHERE trade_id = $1")
            .bind(id.to_string())
            .execute(&self.database.pool)
            .await
            .map_err(|_| InvariantViolation::CloseNonOpenTrade { id: id.to_string() })?;

        Ok(())
    }

    async fn get_open_positions(&self) -> Result<Vec<SimulatedTrade>> {
        let rows: Vec<(
            String,
            String,
            String,
            String,
            String,
            String,
            String,
            String,
        )> = sqlx::query_as(
            r#"
            SELECT id, signal_id, symbol, direction, entry_price, stop_price, take_price, meta_json
            FROM trades_simulated WHERE status = 'OPEN'
            "#,
        )
        .fetch_all(&self.database.pool)
        .await
        .context("failed to load open positions")?;

        rows.into_iter()
            .map(
                |(id, signal_id, symbol, direction, entry, stop, take, meta_json)| {
                    Ok(SimulatedTrade {
                        id: Uuid::parse_str(&id)?,
                        signal_id: Uuid::parse_str(&signal_id)?,
                        symbol,
                        direction: direction_from_str(&direction),
                        entry_price: Decimal::from_str(&entry).unwrap_or_default(),
                        stop_price: Decimal::from_str(&stop).unwrap_or_default(),
                        take_price: Decimal::from_str(&take).unwrap_or_default(),
                        status: TradeStatus::Open,
                        exit_time_ms: None,
                        exit_price: None,
                        pnl_pct: None,
                        fees_estimate: Decimal::ZERO,
                        meta: serde_json::from_str(&meta_json).unwrap_or(Value::Null),
                    })
                },
            )
            .collect()
    }

    async fn store_universe(&self, day: NaiveDate, symbols: &[String], meta: Value) -> Result<()> {
        let symbols_json = serde_json::to_string(symbols)?;
        sqlx::query(
            r#"
            INSERT INTO universe_daily (day, symbols_json, meta_json)
            VALUES ($1, $2, $3)
            ON CONFLICT(day) DO UPDATE SET symbols_json = excluded.symbols_json, meta_json = excluded.meta_json
            "#,
        )
        .bind(day)
        .bind(symbols_json)
        .bind(meta.to_string())
        .execute(&self.database.pool)
        .await
        .context("failed to store universe")?;
        Ok(())
    }

    async fn fetch_universe(&self, day: NaiveDate) -> Result<Option<UniverseSnapshot>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT symbols_json, meta_json FROM universe_daily WHERE day = $1")
                .bind(day)
                .fetch_optional(&self.database.pool)
                .await
                .context("failed to fetch universe")?;

        Ok(row.map(|(symbols_json, meta_json)| {
            let symbols: Vec<String> = serde_json::from_str(&symbols_json).unwrap_or_default();
            UniverseSnapshot {
                day,
                symbols,
                scores: Default::default(),
                meta: serde_json::from_str(&meta_json).unwrap_or(Value::Null),
            }
        }))
    }

    async fn store_metrics_daily(&self, day: NaiveDate, metrics: Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO metrics_daily (day, metrics_json)
            VALUES ($1, $2)
            ON CONFLICT(day) DO UPDATE SET metrics_json = excluded.metrics_json
            "#,
        )
        .bind(day)
        .bind(metrics.to_string())
        .execute(&self.database.pool)
        .await
        .context("failed to store daily metrics")?;
        Ok(())
    }

    async fn fetch_metrics_daily(&self, day: NaiveDate) -> Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT metrics_json FROM metrics_daily WHERE day = $1")
            .bind(day)
            .fetch_optional(&self.database.pool)
            .await
            .context("failed to fetch daily metrics")?;
        Ok(row.map(|(json,)| serde_json::from_str(&json).unwrap_or(Value::Null)))
    }
}
