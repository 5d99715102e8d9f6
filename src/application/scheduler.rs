//! The live cycle scheduler (C9) — "the control heart". Drives one pass of
//! ingest -> universe -> close-out -> decide -> open over every symbol in
//! the day's universe, then advances risk cooldowns exactly once.
//!
//! Ordering invariants (spec.md §5, §8) this module must preserve:
//! closeout always precedes opening a new trade on the same symbol; at most
//! one signal is emitted per closed candle per symbol per process run;
//! `ledger.tick()` runs exactly once, after the full per-symbol decision
//! pass; `create_order` is never called.

use crate::application::decision::{self, strategy_bank};
use crate::application::executor;
use crate::application::strategies::TradingStrategy;
use crate::application::universe::{self, UniverseConfig};
use crate::config::Config;
use crate::domain::market::Timeframe;
use crate::domain::ports::{ExchangeClient, Store};
use crate::domain::risk::clusters;
use crate::domain::risk::{AdaptiveState, RiskLedger};
use crate::domain::types::{Candle, Direction, Signal, SimulatedTrade, Ticker, TradeStatus};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const BTC_SYMBOL: &str = "BTC/USDT";
const SYMBOL_ATR_PERIOD: usize = 14;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Process-wide control loop. Owns the two pieces of cumulative trading
/// state (`AdaptiveState`, `RiskLedger`) and the per-symbol decision
/// cursor; per spec.md §9 these stay injected here rather than as globals.
pub struct CycleScheduler {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    config: Config,
    bank: Vec<Box<dyn TradingStrategy>>,
    pub adaptive: AdaptiveState,
    pub ledger: RiskLedger,
    last_processed: HashMap<String, i64>,
}

impl CycleScheduler {
    pub fn new(exchange: Arc<dyn ExchangeClient>, store: Arc<dyn Store>, config: Config) -> Self {
        let ledger = RiskLedger::new(
            config.risk.max_positions,
            config.risk.max_daily_loss_r,
            config.risk.cooldown_candles,
        );
        let bank = strategy_bank(&config);
        Self {
            exchange,
            store,
            config,
            bank,
            adaptive: AdaptiveState::default(),
            ledger,
            last_processed: HashMap::new(),
        }
    }

    /// Drives the scheduler. `once=true` runs a single cycle and returns;
    /// otherwise loops, sleeping `live.loop_seconds` between cycles, until
    /// cancelled.
    pub async fn run(&mut self, symbols_override: &[String], once: bool) -> anyhow::Result<()> {
        loop {
            self.run_once(symbols_override).await?;
            if once {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_secs(self.config.live.loop_seconds)).await;
        }
    }

    /// Executes exactly one cycle (spec.md §4.9, steps 1-7).
    pub async fn run_once(&mut self, symbols_override: &[String]) -> anyhow::Result<()> {
        let timeframe: Timeframe = self.config.live.timeframe.parse().map_err(|_| {
            anyhow::anyhow!("invalid live timeframe '{}'", self.config.live.timeframe)
        })?;
        let candle_limit = self.config.live.candle_limit;

        // 1. Universe resolution.
        let symbols = self.resolve_universe(symbols_override, timeframe, candle_limit).await?;

        // 2. Ticker + BTC refresh.
        let tickers = self.refresh_tickers().await;
        let btc_candles = self
            .ingest_symbol(BTC_SYMBOL, timeframe, candle_limit)
            .await
            .unwrap_or_default();

        // 3. Open-position snapshot.
        let open_trades = self.store.get_open_positions().await?;
        let mut open_by_symbol: HashMap<String, SimulatedTrade> =
            open_trades.into_iter().map(|t| (t.symbol.clone(), t)).collect();
        self.ledger.positions_open = open_by_symbol.len();

        // 4. Per-symbol ingest and returns.
        let mut candles_by_symbol: HashMap<String, Vec<Candle>> = HashMap::new();
        let mut returns_by_symbol: HashMap<String, Vec<f64>> = HashMap::new();
        for symbol in &symbols {
            match self.ingest_symbol(symbol, timeframe, candle_limit).await {
                Ok(candles) => {
                    let closes: Vec<f64> =
                        candles.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
                    let returns: Vec<f64> = closes
                        .windows(2)
                        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
                        .collect();
                    tracing::info!(symbol, rows = candles.len(), "ingested candles");
                    if returns.len() >= 2 {
                        returns_by_symbol.insert(symbol.clone(), returns);
                    }
                    candles_by_symbol.insert(symbol.clone(), candles);
                }
                Err(error) => {
                    tracing::warn!(symbol, %error, "candle ingestion failed, skipping symbol this cycle");
                }
            }
        }

        // 5. Cluster build.
        let clusters_by_symbol = if returns_by_symbol.len() >= 2 {
            let cluster_symbols: Vec<String> = returns_by_symbol.keys().cloned().collect();
            clusters::build_clusters(
                &cluster_symbols,
                |a, b| correlation(returns_by_symbol.get(a), returns_by_symbol.get(b)),
                self.config.risk.cluster_corr_threshold,
            )
        } else {
            HashMap::new()
        };

        // 6. Per-symbol decision, in universe order.
        for symbol in &symbols {
            let Some(candles) = candles_by_symbol.get(symbol) else {
                continue;
            };
            self.decide_symbol(
                symbol,
                candles,
                &btc_candles,
                &tickers,
                timeframe,
                &mut open_by_symbol,
                &clusters_by_symbol,
            )
            .await?;
        }

        // 7. Tick cooldowns exactly once, after all decisions.
        self.ledger.tick();
        Ok(())
    }

    async fn resolve_universe(
        &self,
        symbols_override: &[String],
        timeframe: Timeframe,
        candle_limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        if !symbols_override.is_empty() {
            let mut symbols = symbols_override.to_vec();
            symbols.truncate(self.config.universe.max_symbols);
            return Ok(symbols);
        }

        let today = chrono::Utc::now().date_naive();
        if let Some(cached) = self.store.fetch_universe(today).await? {
            return Ok(cached.symbols);
        }

        let tickers = self.refresh_tickers().await;
        let candidate_symbols = self.exchange.fetch_markets().await.unwrap_or_default();
        let btc_candles = self
            .ingest_symbol(BTC_SYMBOL, timeframe, candle_limit)
            .await
            .unwrap_or_default();

        let mut per_symbol_candles = HashMap::new();
        for symbol in &candidate_symbols {
            if let Ok(candles) = self.ingest_symbol(symbol, timeframe, candle_limit).await {
                per_symbol_candles.insert(symbol.clone(), candles);
            }
        }

        let universe_config = UniverseConfig {
            max_symbols: self.config.universe.max_symbols,
            volume_percentile: self.config.universe.volume_percentile,
            min_atr_pct: self.config.universe.min_atr_pct,
            min_beta_btc: self.config.universe.min_beta_btc,
            min_corr_btc: self.config.universe.min_corr_btc,
            weight_volume: self.config.universe.weights.volume,
            weight_atr_pct: self.config.universe.weights.atr_pct,
            weight_beta: self.config.universe.weights.beta,
        };
        let ranked = universe::build_universe(
            &[],
            &btc_candles,
            &per_symbol_candles,
            &tickers,
            &universe_config,
        );

        let meta = serde_json::json!({ "scores": ranked.scores });
        self.store.store_universe(today, &ranked.symbols, meta).await?;
        Ok(ranked.symbols)
    }

    async fn refresh_tickers(&self) -> HashMap<String, Ticker> {
        match self.exchange.fetch_tickers().await {
            Ok(tickers) => tickers.into_iter().map(|t| (t.symbol.clone(), t)).collect(),
            Err(error) => {
                tracing::warn!(%error, "ticker refresh failed");
                HashMap::new()
            }
        }
    }

    async fn ingest_symbol(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> anyhow::Result<Vec<Candle>> {
        let fetched = self.exchange.fetch_ohlcv(symbol, timeframe, limit).await?;
        self.store.upsert_candles("binance", symbol, timeframe, &fetched).await?;
        self.store.fetch_recent_candles(symbol, timeframe, limit).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn decide_symbol(
        &mut self,
        symbol: &str,
        candles: &[Candle],
        btc_candles: &[Candle],
        tickers: &HashMap<String, Ticker>,
        timeframe: Timeframe,
        open_by_symbol: &mut HashMap<String, SimulatedTrade>,
        clusters_by_symbol: &HashMap<String, usize>,
    ) -> anyhow::Result<()> {
        // 6a/6b. Dedup on the latest closed candle.
        let now = now_ms();
        let Some(latest_closed) = self
            .store
            .latest_closed_open_time(symbol, timeframe, now)
            .await?
        else {
            return Ok(());
        };
        if self.last_processed.get(symbol) == Some(&latest_closed) {
            return Ok(());
        }
        self.last_processed.insert(symbol.to_string(), latest_closed);

        let window: Vec<Candle> = candles
            .iter()
            .filter(|c| c.open_time_ms <= latest_closed)
            .cloned()
            .collect();
        let Some(latest_candle) = window.last().cloned() else {
            return Ok(());
        };

        // 6c. Closeout first.
        if let Some(trade) = open_by_symbol.get(symbol).cloned() {
            let resolution = executor::resolve(
                trade.direction,
                trade.entry_price,
                trade.stop_price,
                trade.take_price,
                &latest_candle,
                self.config.execution.worst_case_same_candle,
                Decimal::try_from(self.config.risk.fee_rate).unwrap_or_default(),
            );
            if resolution.status != TradeStatus::Open {
                let exit_price = resolution.exit_price.unwrap_or(trade.entry_price);
                let pnl_pct = resolution.pnl_pct.unwrap_or(0.0);
                self.store
                    .close_trade(trade.id, exit_price, latest_candle.close_time_ms, pnl_pct, resolution.status)
                    .await?;
                let pnl_r = crate::domain::risk::state::pnl_to_r(pnl_pct, self.config.risk.risk_per_trade_pct);
                self.adaptive.register_trade_result(pnl_r);
                self.ledger.register_trade_result(pnl_r);
                self.ledger.apply_cooldown(symbol);
                self.ledger.positions_open = self.ledger.positions_open.saturating_sub(1);
                open_by_symbol.remove(symbol);
            }
        }

        // 6d. Context derivation, with ticker-derived spread/liquidity.
        let ticker = tickers.get(symbol);
        let spread = ticker.and_then(|t| {
            if t.bid.is_zero() {
                None
            } else {
                ((t.ask - t.bid) / t.bid).to_f64()
            }
        });
        let liquidity = ticker.and_then(|t| t.quote_volume.to_f64());

        // 6e. Ensemble + signal persistence (written even on NONE, for audit).
        let (_, _, _, ensemble_decision) =
            decision::decide(&self.bank, symbol, &window, btc_candles, spread, liquidity, &self.config);

        let signal = Signal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe,
            signal_time_ms: latest_closed,
            direction: ensemble_decision.direction,
            price: latest_candle.close,
            confidence: ensemble_decision.confidence,
            reasons: ensemble_decision.reasons.clone(),
            created_at_ms: now,
        };
        let signal_id = self.store.store_signal(&signal).await?;

        // 6f. Risk gate.
        if ensemble_decision.direction == Direction::None
            || open_by_symbol.contains_key(symbol)
            || !self.ledger.can_open(symbol)
            || clusters::cluster_cap_blocks(
                symbol,
                clusters_by_symbol,
                &open_by_symbol.keys().cloned().collect::<Vec<_>>(),
                self.config.risk.max_positions_per_cluster,
            )
        {
            return Ok(());
        }

        // 6g. Entry price.
        let entry = match self.config.execution.entry_on.as_str() {
            "next_open" => {
                let Some(next) = candles.iter().find(|c| c.open_time_ms > latest_closed) else {
                    tracing::debug!(symbol, "awaiting next open, no trade opened this cycle");
                    return Ok(());
                };
                next.open
            }
            _ => latest_candle.close,
        };

        // 6h. Stops, sizing, open.
        let atr_series = crate::domain::indicators::atr(&window, SYMBOL_ATR_PERIOD);
        let Some(Some(atr_value)) = atr_series.last().copied() else {
            return Ok(());
        };
        let atr = Decimal::from_f64(atr_value).unwrap_or_default();
        let (stop, take) = crate::domain::risk::sizing::atr_stops(
            entry,
            atr,
            ensemble_decision.direction,
            Decimal::try_from(self.config.risk.stop_atr_mult).unwrap_or_default(),
            Decimal::try_from(self.config.risk.take_atr_mult).unwrap_or_default(),
        );
        let risk_pct = self.adaptive.attenuated_risk_pct(self.config.risk.risk_per_trade_pct);
        let equity = Decimal::from(1); // paper trading tracks risk in fractional-equity units.
        let qty = crate::domain::risk::sizing::position_size(equity, risk_pct, entry, stop);
        let fees = Decimal::try_from(self.config.risk.fee_rate).unwrap_or_default() * Decimal::from(2);
        let meta = serde_json::json!({ "qty": qty.to_string(), "risk_pct": risk_pct });

        let trade_id = self
            .store
            .open_trade(signal_id, symbol, ensemble_decision.direction, entry, stop, take, fees, meta.clone())
            .await?;
        self.ledger.positions_open += 1;
        open_by_symbol.insert(
            symbol.to_string(),
            SimulatedTrade {
                id: trade_id,
                signal_id,
                symbol: symbol.to_string(),
                direction: ensemble_decision.direction,
                entry_price: entry,
                stop_price: stop,
                take_price: take,
                status: TradeStatus::Open,
                exit_time_ms: None,
                exit_price: None,
                pnl_pct: None,
                fees_estimate: fees,
                meta,
            },
        );
        Ok(())
    }
}

fn correlation(a: Option<&Vec<f64>>, b: Option<&Vec<f64>>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else { return 0.0 };
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let cov = a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / n as f64;
    let var_a = a[..n].iter().map(|x| (x - mean_a).powi(2)).sum::<f64>() / n as f64;
    let var_b = b[..n].iter().map(|x| (x - mean_b).powi(2)).sum::<f64>() / n as f64;
    if var_a == 0.0 || var_b == 0.0 {
        0.0
    } else {
        cov / (var_a.sqrt() * var_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::exchange::mock::MockExchange;
    use crate::infrastructure::persistence::database::Database;
    use crate::infrastructure::persistence::repository::SqliteStore;
    use rust_decimal::Decimal;
    use std::str::FromStr;

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

    /// Each call gets its own named shared-cache memory database. An unnamed
    /// `:memory:` connection with `cache=shared` is scoped to the whole
    /// process, so two tests sharing the literal DSN would silently see each
    /// other's rows when `cargo test` runs them on parallel threads.
    async fn test_store(name: &str) -> Arc<dyn Store> {
        let db = Database::new(&format!("sqlite:file:{name}?mode=memory&cache=shared")).await.unwrap();
        Arc::new(SqliteStore::new(db))
    }

    #[tokio::test]
    async fn scenario_s6_run_live_once_persists_candles_and_signal_without_real_orders() {
        let timeframe = Timeframe::from_str("1m").unwrap();
        let exchange = Arc::new(MockExchange::new());
        let candles: Vec<Candle> = (0..60).map(|i| candle("BTC/USDT", 100.0 + i as f64 * 0.1, i * 60_000, timeframe)).collect();
        exchange.seed_candles("BTC/USDT", timeframe, candles.clone());
        exchange.seed_ticker(Ticker {
            symbol: "BTC/USDT".to_string(),
            bid: Decimal::try_from(99.9).unwrap(),
            ask: Decimal::try_from(100.1).unwrap(),
            quote_volume: Decimal::try_from(5_000_000.0).unwrap(),
        });

        let store = test_store("scenario_s6").await;
        let mut config = Config::default();
        config.live.timeframe = "1m".to_string();
        config.live.candle_limit = 60;
        config.universe.manual_override = vec!["BTC/USDT".to_string()];

        let mut scheduler = CycleScheduler::new(exchange.clone(), store.clone(), config);
        scheduler.run_once(&["BTC/USDT".to_string()]).await.unwrap();

        let stored_candles = store
            .fetch_recent_candles("BTC/USDT", timeframe, 100)
            .await
            .unwrap();
        assert!(!stored_candles.is_empty());
        assert_eq!(exchange.create_order_call_count(), 0);
    }

    #[tokio::test]
    async fn no_new_closed_candle_skips_decision_on_second_call() {
        let timeframe = Timeframe::from_str("1m").unwrap();
        let exchange = Arc::new(MockExchange::new());
        let candles: Vec<Candle> = (0..60).map(|i| candle("BTC/USDT", 100.0, i * 60_000, timeframe)).collect();
        exchange.seed_candles("BTC/USDT", timeframe, candles);

        let store = test_store("no_new_closed_candle").await;
        let mut config = Config::default();
        config.live.timeframe = "1m".to_string();
        config.live.candle_limit = 60;
        config.universe.manual_override = vec!["BTC/USDT".to_string()];

        let mut scheduler = CycleScheduler::new(exchange, store.clone(), config);
        scheduler.run_once(&["BTC/USDT".to_string()]).await.unwrap();
        let first_count = store.fetch_recent_candles("BTC/USDT", timeframe, 200).await.unwrap().len();
        scheduler.run_once(&["BTC/USDT".to_string()]).await.unwrap();
        let second_count = store.fetch_recent_candles("BTC/USDT", timeframe, 200).await.unwrap().len();
        assert_eq!(first_count, second_count);
    }
}
