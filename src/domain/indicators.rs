//! Pure technical-indicator functions over whole candle/close-price series.
//!
//! Every function returns a same-length `Vec<Option<f64>>` (or a struct of
//! such vectors): the leading `period-1` entries are `None`, the rest are
//! `Some`. Hand-rolled rather than routed through a streaming indicator
//! crate, because the contract here is "whole lazy sequence, same length"
//! rather than an incremental `Next`-style update.

use crate::domain::types::Candle;
use rust_decimal::prelude::ToPrimitive;

fn decimal_to_f64(value: rust_decimal::Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn population_stddev(xs: &[f64]) -> f64 {
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// Exponential moving average, smoothing `2/(period+1)`, SMA-seeded, no warm-up adjustment.
pub fn ema(series: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = series.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = mean(&series[0..period]);
    out[period - 1] = Some(prev);
    for (i, value) in series.iter().enumerate().skip(period) {
        prev = alpha * value + (1.0 - alpha) * prev;
        out[i] = Some(prev);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Wilder's RSI on closes.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut out = vec![None; n];
    if period < 2 || n < period {
        return out;
    }
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let change = closes[i] - closes[i - 1];
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }
    let seed_end = period - 1;
    let seed_len = (period - 1) as f64;
    let mut avg_gain = gains[1..=seed_end].iter().sum::<f64>() / seed_len;
    let mut avg_loss = losses[1..=seed_end].iter().sum::<f64>() / seed_len;
    out[period - 1] = Some(rsi_value(avg_gain, avg_loss));
    for i in period..n {
        avg_gain = (avg_gain * seed_len + gains[i]) / period as f64;
        avg_loss = (avg_loss * seed_len + losses[i]) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn true_range(high: f64, low: f64, prev_close: Option<f64>) -> f64 {
    match prev_close {
        None => high - low,
        Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
    }
}

/// Wilder's average true range on `(high, low, close)`.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let tr: Vec<f64> = (0..n)
        .map(|i| {
            let prev_close = if i == 0 {
                None
            } else {
                Some(decimal_to_f64(candles[i - 1].close))
            };
            let high = decimal_to_f64(candles[i].high);
            let low = decimal_to_f64(candles[i].low);
            true_range(high, low, prev_close)
        })
        .collect();
    let mut prev_atr = mean(&tr[0..period]);
    out[period - 1] = Some(prev_atr);
    for (i, t) in tr.iter().enumerate().skip(period) {
        prev_atr = (prev_atr * (period - 1) as f64 + t) / period as f64;
        out[i] = Some(prev_atr);
    }
    out
}

/// Wilder's ADX (average directional index).
pub fn adx(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n < period + 1 {
        return out;
    }

    let highs: Vec<f64> = candles
        .iter()
        .map(|c| decimal_to_f64(c.high))
        .collect();
    let lows: Vec<f64> = candles
        .iter()
        .map(|c| decimal_to_f64(c.low))
        .collect();
    let closes: Vec<f64> = candles
        .iter()
        .map(|c| decimal_to_f64(c.close))
        .collect();

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let up_move = highs[i] - highs[i - 1];
        let down_move = lows[i - 1] - lows[i];
        plus_dm[i] = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        minus_dm[i] = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };
        tr[i] = true_range(highs[i], lows[i], Some(closes[i - 1]));
    }

    // Wilder-smooth +DM/-DM/TR, seeded from the first `period` values (indices 1..=period).
    let seed_range = 1..=period;
    let mut smoothed_plus_dm: f64 = seed_range.clone().map(|i| plus_dm[i]).sum();
    let mut smoothed_minus_dm: f64 = seed_range.clone().map(|i| minus_dm[i]).sum();
    let mut smoothed_tr: f64 = seed_range.map(|i| tr[i]).sum();

    let mut dx = vec![None; n];
    let di_for = |plus: f64, minus: f64, tr: f64| -> (f64, f64) {
        if tr == 0.0 {
            (0.0, 0.0)
        } else {
            (100.0 * plus / tr, 100.0 * minus / tr)
        }
    };
    let (plus_di, minus_di) = di_for(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
    dx[period] = Some(dx_value(plus_di, minus_di));

    for i in (period + 1)..n {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / period as f64 + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + tr[i];
        let (plus_di, minus_di) = di_for(smoothed_plus_dm, smoothed_minus_dm, smoothed_tr);
        dx[i] = Some(dx_value(plus_di, minus_di));
    }

    // ADX is the Wilder-smoothed average of DX over `period` further values.
    let first_dx = period;
    let adx_seed_end = first_dx + period - 1;
    if adx_seed_end >= n {
        return out;
    }
    let seed_vals: Vec<f64> = (first_dx..=adx_seed_end)
        .filter_map(|i| dx[i])
        .collect();
    let mut prev_adx = mean(&seed_vals);
    out[adx_seed_end] = Some(prev_adx);
    for (i, item) in dx.iter().enumerate().skip(adx_seed_end + 1) {
        if let Some(d) = item {
            prev_adx = (prev_adx * (period - 1) as f64 + d) / period as f64;
            out[i] = Some(prev_adx);
        }
    }
    out
}

fn dx_value(plus_di: f64, minus_di: f64) -> f64 {
    let denom = plus_di + minus_di;
    if denom == 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / denom
    }
}

/// Bollinger bands: `{lower, middle, upper}` from simple MA ± `std*sigma`.
#[derive(Debug, Clone)]
pub struct BBands {
    pub lower: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
}

pub fn bbands(closes: &[f64], period: usize, std_mult: f64) -> BBands {
    let n = closes.len();
    let mut lower = vec![None; n];
    let mut middle = vec![None; n];
    let mut upper = vec![None; n];
    if period == 0 || n < period {
        return BBands {
            lower,
            middle,
            upper,
        };
    }
    for i in (period - 1)..n {
        let window = &closes[(i + 1 - period)..=i];
        let m = mean(window);
        let sd = population_stddev(window);
        middle[i] = Some(m);
        lower[i] = Some(m - std_mult * sd);
        upper[i] = Some(m + std_mult * sd);
    }
    BBands {
        lower,
        middle,
        upper,
    }
}

/// `(upper - lower) / middle`.
pub fn bb_width(bands: &BBands) -> Vec<Option<f64>> {
    bands
        .lower
        .iter()
        .zip(bands.middle.iter())
        .zip(bands.upper.iter())
        .map(|((l, m), u)| match (l, m, u) {
            (Some(l), Some(m), Some(u)) if *m != 0.0 => Some((u - l) / m),
            _ => None,
        })
        .collect()
}

/// Rolling max of high and rolling min of low.
#[derive(Debug, Clone)]
pub struct Donchian {
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
}

pub fn donchian(candles: &[Candle], period: usize) -> Donchian {
    let n = candles.len();
    let mut high = vec![None; n];
    let mut low = vec![None; n];
    if period == 0 || n < period {
        return Donchian { high, low };
    }
    let highs: Vec<f64> = candles
        .iter()
        .map(|c| decimal_to_f64(c.high))
        .collect();
    let lows: Vec<f64> = candles
        .iter()
        .map(|c| decimal_to_f64(c.low))
        .collect();
    for i in (period - 1)..n {
        let window_high = &highs[(i + 1 - period)..=i];
        let window_low = &lows[(i + 1 - period)..=i];
        high[i] = Some(window_high.iter().cloned().fold(f64::MIN, f64::max));
        low[i] = Some(window_low.iter().cloned().fold(f64::MAX, f64::min));
    }
    Donchian { high, low }
}

/// Z-score of the last element of a series against the series' own mean/stddev (ddof=0).
/// Undefined (`None`) if the series is empty or has zero variance.
pub fn zscore_last(series: &[f64]) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    let sd = population_stddev(series);
    if sd == 0.0 {
        return None;
    }
    let m = mean(series);
    Some((series[series.len() - 1] - m) / sd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            exchange: "mock".into(),
            symbol: "BTC/USDT".into(),
            timeframe: Timeframe::from_str("1m").unwrap(),
            open_time_ms: 0,
            open: Decimal::try_from(close).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: Decimal::ONE,
            close_time_ms: 60_000,
        }
    }

    #[test]
    fn ema_leading_none_then_seeded() {
        let series = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&series, 3);
        assert!(out[0].is_none());
        assert!(out[1].is_none());
        assert!(out[2].is_some());
        assert_eq!(out[2], Some(2.0));
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let series: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let out = rsi(&series, 14);
        assert_eq!(out[13], Some(100.0));
    }

    #[test]
    fn atr_flat_range_is_high_minus_low() {
        let candles: Vec<Candle> = (0..10).map(|_| candle(10.0, 9.0, 9.5)).collect();
        let out = atr(&candles, 5);
        assert_eq!(out[4], Some(1.0));
    }

    #[test]
    fn donchian_tracks_window_extremes() {
        let candles = vec![
            candle(10.0, 8.0, 9.0),
            candle(12.0, 7.0, 9.0),
            candle(11.0, 6.0, 9.0),
        ];
        let d = donchian(&candles, 3);
        assert_eq!(d.high[2], Some(12.0));
        assert_eq!(d.low[2], Some(6.0));
    }

    #[test]
    fn bb_width_divides_by_middle() {
        let closes = vec![1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0, 2.0, 1.0, 2.0];
        let bands = bbands(&closes, 5, 2.0);
        let widths = bb_width(&bands);
        assert!(widths[4].is_some());
    }

    #[test]
    fn zscore_undefined_on_zero_variance() {
        let series = vec![1.0, 1.0, 1.0];
        assert_eq!(zscore_last(&series), None);
    }
}
