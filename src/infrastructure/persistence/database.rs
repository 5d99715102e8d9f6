use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Opens (and if needed creates) the SQLite store and applies the schema.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        info!(db_url, "connected to database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                exchange TEXT NOT NULL,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                open_time_ms INTEGER NOT NULL,
                open TEXT NOT NULL,
                high TEXT NOT NULL,
                low TEXT NOT NULL,
                close TEXT NOT NULL,
                volume TEXT NOT NULL,
                close_time_ms INTEGER NOT NULL,
                PRIMARY KEY (exchange, symbol, timeframe, open_time_ms)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create candles table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_candles_symbol_tf_time ON candles (symbol, timeframe, open_time_ms);",
        )
        .execute(&mut *conn)
        .await
        .context("failed to create candles index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                signal_time_ms INTEGER NOT NULL,
                direction TEXT NOT NULL,
                price TEXT NOT NULL,
                confidence REAL NOT NULL,
                reasons_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                UNIQUE (symbol, timeframe, signal_time_ms)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create signals table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades_simulated (
                id TEXT PRIMARY KEY,
                signal_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                stop_price TEXT NOT NULL,
                take_price TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_time_ms INTEGER,
                exit_price TEXT,
                pnl_pct REAL,
                fees_estimate TEXT NOT NULL,
                meta_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades_simulated table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol_status ON trades_simulated (symbol, status);")
            .execute(&mut *conn)
            .await
            .context("failed to create trades_simulated index")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS universe_daily (
                day TEXT PRIMARY KEY,
                symbols_json TEXT NOT NULL,
                meta_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create universe_daily table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS btc_state (
                at_ms INTEGER PRIMARY KEY,
                state TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create btc_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_quality (
                symbol TEXT NOT NULL,
                at_ms INTEGER NOT NULL,
                score INTEGER NOT NULL,
                PRIMARY KEY (symbol, at_ms)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create market_quality table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_performance (
                strategy TEXT NOT NULL,
                symbol TEXT NOT NULL,
                day TEXT NOT NULL,
                trades_count INTEGER NOT NULL,
                winrate REAL NOT NULL,
                expectancy REAL NOT NULL,
                PRIMARY KEY (strategy, symbol, day)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create strategy_performance table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metrics_daily (
                day TEXT PRIMARY KEY,
                metrics_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create metrics_daily table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                symbol TEXT PRIMARY KEY,
                trade_id TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create positions table")?;

        info!("database schema initialized");
        Ok(())
    }
}
