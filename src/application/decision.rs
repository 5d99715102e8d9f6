//! Shared per-symbol context derivation (C3) and strategy fan-out (C1, C2)
//! feeding the ensemble (C4). Used by both the live cycle scheduler and the
//! backtest driver so the two modes see identical regime/quality math.

use crate::application::ensemble::{self, EnsembleDecision};
use crate::application::strategies::{BreakoutDonchian, MeanReversionBb, StrategyVerdict, TradingStrategy, TrendEma};
use crate::config::Config;
use crate::domain::indicators;
use crate::domain::market::btc_state::{self, BtcState, BtcStateInputs, BtcStateThresholds};
use crate::domain::market::quality::{self, Quality, QualityInputs, QualityThresholds};
use crate::domain::market::regime::{self, Regime, RegimeInputs, RegimeThresholds};
use crate::domain::types::Candle;
use rust_decimal::prelude::ToPrimitive;

fn ema_slope(closes: &[f64], period: usize, lookback: usize) -> Option<f64> {
    let ema = indicators::ema(closes, period);
    let n = ema.len();
    if n < lookback + 1 {
        return None;
    }
    let last = ema[n - 1]?;
    let prior = ema[n - 1 - lookback]?;
    if prior == 0.0 {
        return None;
    }
    Some((last - prior) / prior)
}

fn atr_pct_last(candles: &[Candle], closes: &[f64], period: usize) -> Option<f64> {
    let atr = indicators::atr(candles, period);
    let last_atr = *atr.last()?;
    let last_close = *closes.last()?;
    last_atr.map(|a| if last_close != 0.0 { a / last_close } else { 0.0 })
}

fn bb_width_last(closes: &[f64]) -> Option<f64> {
    let bands = indicators::bbands(closes, 20, 2.0);
    *indicators::bb_width(&bands).last()?
}

fn atr_zscore_last(candles: &[Candle], period: usize) -> Option<f64> {
    let atr_series: Vec<f64> = indicators::atr(candles, period).into_iter().flatten().collect();
    indicators::zscore_last(&atr_series)
}

/// Classifies a symbol's regime from its own candle window (spec.md §4.3).
/// Thresholds are the fixed constants the regime contract names directly,
/// not configurable per-deployment.
pub fn classify_regime(candles: &[Candle]) -> Regime {
    let closes: Vec<f64> = candles.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
    let adx14 = indicators::adx(candles, 14).last().copied().flatten();
    let ema50_slope = ema_slope(&closes, 50, 5);
    let bb_width = bb_width_last(&closes);
    let atr_zscore = atr_zscore_last(candles, 14);

    let thresholds = RegimeThresholds {
        trend_adx_min: 25.0,
        trend_slope_min: 0.002,
        range_bb_width_max: 0.05,
        range_slope_max: 0.002,
        chaotic_atr_zscore_abs: 2.5,
    };
    regime::classify(
        &RegimeInputs {
            adx14,
            ema50_slope,
            bb_width,
            atr_zscore,
        },
        &thresholds,
    )
}

/// Classifies BTC's macro state from BTC's own candle window (spec.md §4.3).
pub fn classify_btc_state(btc_candles: &[Candle], config: &Config) -> BtcState {
    let closes: Vec<f64> = btc_candles.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
    let atr_pct = atr_pct_last(btc_candles, &closes, 14).unwrap_or(0.0);
    let bb_width = bb_width_last(&closes).unwrap_or(0.0);
    let ema50_slope = ema_slope(&closes, 50, 5).unwrap_or(0.0);

    let thresholds = BtcStateThresholds {
        squeeze_atr_pct: config.btc_state.squeeze_atr_pct,
        squeeze_bb_width: config.btc_state.squeeze_bb_width,
        expanding_atr_pct: config.btc_state.expanding_atr_pct,
        trend_slope: config.btc_state.trend_slope,
    };
    btc_state::classify(
        &BtcStateInputs {
            atr_pct,
            bb_width,
            ema50_slope,
        },
        &thresholds,
    )
}

/// Scores market quality for a symbol's latest closed candle (spec.md §4.3).
/// `spread` falls back to `0.001`, `liquidity` to `1e8`, matching the
/// cycle scheduler's ticker-unavailable defaults.
pub fn score_quality(candles: &[Candle], spread: Option<f64>, liquidity: Option<f64>, config: &Config) -> Quality {
    let closes: Vec<f64> = candles.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
    let adx = indicators::adx(candles, 14).last().copied().flatten().unwrap_or(0.0);
    let atr_pct = atr_pct_last(candles, &closes, 14).unwrap_or(0.0);

    let window: Vec<(f64, f64, f64, f64)> = candles
        .iter()
        .rev()
        .take(20)
        .map(|c| {
            (
                c.open.to_f64().unwrap_or(0.0),
                c.high.to_f64().unwrap_or(0.0),
                c.low.to_f64().unwrap_or(0.0),
                c.close.to_f64().unwrap_or(0.0),
            )
        })
        .collect();
    let wick_ratio = quality::wick_ratio(&window);

    let thresholds = QualityThresholds {
        spread_max: config.market_quality.spread_max,
        spread_penalty: config.market_quality.spread_penalty,
        atr_pct_min: config.market_quality.atr_pct_min,
        atr_low_penalty: config.market_quality.atr_low_penalty,
        adx_min: config.market_quality.adx_min,
        adx_low_penalty: config.market_quality.adx_low_penalty,
        wick_ratio_max: config.market_quality.wick_ratio_max,
        wick_penalty: config.market_quality.wick_penalty,
        liquidity_min: config.market_quality.liquidity_min,
        liquidity_bonus: config.market_quality.liquidity_bonus,
        adx_direction_min: config.market_quality.adx_direction_min,
        direction_bonus: config.market_quality.direction_bonus,
    };
    quality::score(
        &QualityInputs {
            spread: spread.unwrap_or(0.001),
            atr_pct,
            adx,
            wick_ratio,
            liquidity: liquidity.unwrap_or(1e8),
        },
        &thresholds,
    )
}

/// The fixed three-strategy bank (spec.md §4.2), built fresh per call: each
/// strategy is a cheap value type, not worth caching across cycles.
pub fn strategy_bank(config: &Config) -> Vec<Box<dyn TradingStrategy>> {
    vec![
        Box::new(TrendEma {
            min_atr_pct: config.strategy.trend.min_atr_pct,
        }),
        Box::new(BreakoutDonchian {
            period: config.strategy.breakout.donchian_period,
            atr_zscore_spike: config.strategy.breakout.atr_zscore_spike,
        }),
        Box::new(MeanReversionBb {
            period: config.strategy.mean_reversion.bb_period,
            std_mult: config.strategy.mean_reversion.bb_std,
        }),
    ]
}

fn run_strategies(bank: &[Box<dyn TradingStrategy>], symbol: &str, candles: &[Candle]) -> Vec<(String, StrategyVerdict)> {
    bank.iter()
        .map(|s| (s.name().to_string(), s.generate(symbol, candles)))
        .collect()
}

/// Runs the full context-derivation -> strategy -> ensemble pipeline for one
/// symbol's candle window. `spread`/`liquidity` come from the latest ticker
/// (or the scheduler's defaults for a backtest pass).
pub fn decide(
    bank: &[Box<dyn TradingStrategy>],
    symbol: &str,
    candles: &[Candle],
    btc_candles: &[Candle],
    spread: Option<f64>,
    liquidity: Option<f64>,
    config: &Config,
) -> (Regime, BtcState, Quality, EnsembleDecision) {
    let regime = classify_regime(candles);
    let btc = classify_btc_state(btc_candles, config);
    let mqs = score_quality(candles, spread, liquidity, config);
    let verdicts = run_strategies(bank, symbol, candles);
    let decision = ensemble::decide(&verdicts, regime, btc, mqs, config.market_quality.min_trade_score);
    (regime, btc, mqs, decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn candle(close: f64, t: i64) -> Candle {
        Candle {
            exchange: "mock".into(),
            symbol: "BTC/USDT".into(),
            timeframe: Timeframe::from_str("1m").unwrap(),
            open_time_ms: t,
            open: Decimal::try_from(close).unwrap(),
            high: Decimal::try_from(close + 0.5).unwrap(),
            low: Decimal::try_from(close - 0.5).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: Decimal::ONE,
            close_time_ms: t + 60_000,
        }
    }

    #[test]
    fn decide_on_flat_series_is_transition_or_range_and_none_direction() {
        let config = Config::default();
        let candles: Vec<Candle> = (0..80).map(|i| candle(100.0, i * 60_000)).collect();
        let bank = strategy_bank(&config);
        let (_, _, _, decision) = decide(&bank, "BTC/USDT", &candles, &candles, None, None, &config);
        assert_eq!(decision.direction, crate::domain::types::Direction::None);
    }
}
