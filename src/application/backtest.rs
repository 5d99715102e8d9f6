//! Backtest driver (C10): replays stored candles through the same
//! context/ensemble/executor pipeline the live scheduler uses, one new bar
//! at a time, and aggregates the resulting trade series into a summary.

use crate::application::decision::{self, strategy_bank};
use crate::application::executor;
use crate::config::Config;
use crate::domain::indicators;
use crate::domain::ports::Store;
use crate::domain::types::{Candle, Direction, TradeStatus};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

const ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_time_ms: i64,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub take_price: Decimal,
    pub status: TradeStatus,
    pub exit_price: Option<Decimal>,
    pub pnl_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BacktestSummary {
    pub total_trades: usize,
    pub closed_trades: usize,
    pub winrate: f64,
    pub expectancy: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BacktestResult {
    pub trades: Vec<BacktestTrade>,
    pub summary: BacktestSummary,
}

/// Cumulative-peak drawdown over closed trades' `pnl_pct`, in the order they
/// closed. Mirrors the running-sum/running-peak convention the original
/// aggregation uses: `max_dd = |min(cumulative - peak)|`, `0.0` if empty.
fn calculate_drawdown(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    let mut cumulative = 0.0;
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for pnl in pnls {
        cumulative += pnl;
        peak = peak.max(cumulative);
        max_dd = max_dd.min(cumulative - peak);
    }
    max_dd.abs()
}

/// Replays `symbol`'s stored candle history against the strategy bank,
/// opening at most one simulated trade per bar once one resolves. Returns an
/// empty result (with a warning) if fewer than `min_window` candles exist.
pub async fn run_backtest(
    store: &dyn Store,
    symbol: &str,
    timeframe: crate::domain::market::Timeframe,
    config: &Config,
    limit: usize,
    min_window: usize,
) -> anyhow::Result<BacktestResult> {
    let candles = store.fetch_recent_candles(symbol, timeframe, limit).await?;
    if candles.len() < min_window {
        tracing::warn!(symbol, rows = candles.len(), min_window, "insufficient candles for backtest");
        return Ok(BacktestResult::default());
    }

    let btc_candles = if symbol == "BTC/USDT" {
        candles.clone()
    } else {
        let fetched = store.fetch_recent_candles("BTC/USDT", timeframe, limit).await?;
        if fetched.is_empty() { candles.clone() } else { fetched }
    };

    let bank = strategy_bank(config);
    let mut trades: Vec<BacktestTrade> = Vec::new();

    for idx in min_window..candles.len() {
        let window = &candles[..=idx];
        let last_time = window.last().map(|c| c.open_time_ms).unwrap_or(0);
        let btc_window: Vec<Candle> = btc_candles
            .iter()
            .filter(|c| c.open_time_ms <= last_time)
            .cloned()
            .collect();
        let btc_window = if btc_window.is_empty() { window.to_vec() } else { btc_window };

        let (_, _, _, decision) = decision::decide(&bank, symbol, window, &btc_window, None, None, config);
        if decision.direction == Direction::None {
            continue;
        }

        let entry = window.last().unwrap().close;
        let atr_series = indicators::atr(window, ATR_PERIOD);
        let Some(Some(atr_value)) = atr_series.last().copied() else {
            continue;
        };
        let atr = Decimal::from_f64(atr_value).unwrap_or_default();
        let (stop, take) = crate::domain::risk::sizing::atr_stops(
            entry,
            atr,
            decision.direction,
            Decimal::try_from(config.risk.stop_atr_mult).unwrap_or_default(),
            Decimal::try_from(config.risk.take_atr_mult).unwrap_or_default(),
        );
        // Sizing is computed for parity with the live path even though the
        // backtest driver does not track running equity.
        let _qty = crate::domain::risk::sizing::position_size(Decimal::from(1), config.risk.risk_per_trade_pct, entry, stop);

        let resolution = executor::resolve(
            decision.direction,
            entry,
            stop,
            take,
            window.last().unwrap(),
            config.execution.worst_case_same_candle,
            Decimal::try_from(config.risk.fee_rate).unwrap_or_default(),
        );

        trades.push(BacktestTrade {
            entry_time_ms: last_time,
            direction: decision.direction,
            entry_price: entry,
            stop_price: stop,
            take_price: take,
            status: resolution.status,
            exit_price: resolution.exit_price,
            pnl_pct: resolution.pnl_pct,
        });
    }

    let closed_pnls: Vec<f64> = trades.iter().filter_map(|t| t.pnl_pct).collect();
    let wins = closed_pnls.iter().filter(|p| **p > 0.0).count();
    let summary = BacktestSummary {
        total_trades: trades.len(),
        closed_trades: closed_pnls.len(),
        winrate: if closed_pnls.is_empty() { 0.0 } else { wins as f64 / closed_pnls.len() as f64 },
        expectancy: if closed_pnls.is_empty() {
            0.0
        } else {
            closed_pnls.iter().sum::<f64>() / closed_pnls.len() as f64
        },
        max_drawdown: calculate_drawdown(&closed_pnls),
    };

    Ok(BacktestResult { trades, summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_is_zero_with_no_trades() {
        assert_eq!(calculate_drawdown(&[]), 0.0);
    }

    #[test]
    fn drawdown_tracks_peak_to_trough() {
        // cumulative: 0.1, 0.0, -0.2, -0.1 ; peak stays 0.1 from the first step on
        let dd = calculate_drawdown(&[0.1, -0.1, -0.2, 0.1]);
        assert!((dd - 0.3).abs() < 1e-9);
    }

    #[test]
    fn summary_winrate_and_expectancy_match_closed_trades() {
        let pnls = [0.05, -0.02, 0.03];
        let wins = pnls.iter().filter(|p| **p > 0.0).count();
        let winrate = wins as f64 / pnls.len() as f64;
        let expectancy = pnls.iter().sum::<f64>() / pnls.len() as f64;
        assert!((winrate - 2.0 / 3.0).abs() < 1e-9);
        assert!((expectancy - 0.02).abs() < 1e-9);
    }
}
