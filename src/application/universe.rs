use crate::domain::indicators;
use crate::domain::types::{Candle, Ticker};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

pub struct UniverseConfig {
    pub max_symbols: usize,
    pub volume_percentile: f64,
    pub min_atr_pct: f64,
    pub min_beta_btc: f64,
    pub min_corr_btc: f64,
    pub weight_volume: f64,
    pub weight_atr_pct: f64,
    pub weight_beta: f64,
}

pub struct RankedUniverse {
    pub symbols: Vec<String>,
    pub scores: HashMap<String, f64>,
}

struct Features {
    symbol: String,
    volume: Option<f64>,
    atr_pct: f64,
    beta: f64,
    corr: f64,
}

fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] / w[0]).ln() } else { 0.0 })
        .collect()
}

fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / n as f64
}

fn variance(a: &[f64]) -> f64 {
    covariance(a, a)
}

fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let var_a = variance(&a[..n]);
    let var_b = variance(&b[..n]);
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    covariance(&a[..n], &b[..n]) / (var_a.sqrt() * var_b.sqrt())
}

fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn norm(values: &HashMap<String, f64>) -> HashMap<String, f64> {
    let min = values.values().cloned().fold(f64::INFINITY, f64::min);
    let max = values.values().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return values.keys().map(|k| (k.clone(), 1.0)).collect();
    }
    values
        .iter()
        .map(|(k, v)| (k.clone(), (v - min) / (max - min)))
        .collect()
}

/// Filters and ranks the tradable symbol set for one calendar day. Honours a
/// manual override verbatim (truncated to `max_symbols`) per the cycle
/// scheduler's resolution order.
pub fn build_universe(
    manual_override: &[String],
    btc_candles: &[Candle],
    per_symbol_candles: &HashMap<String, Vec<Candle>>,
    tickers: &HashMap<String, Ticker>,
    config: &UniverseConfig,
) -> RankedUniverse {
    if !manual_override.is_empty() {
        let mut symbols = manual_override.to_vec();
        symbols.truncate(config.max_symbols);
        return RankedUniverse {
            symbols,
            scores: HashMap::new(),
        };
    }

    let btc_closes: Vec<f64> = btc_candles
        .iter()
        .map(|c| c.close.to_f64().unwrap_or(0.0))
        .collect();
    let btc_returns = log_returns(&btc_closes);

    let features: Vec<Features> = per_symbol_candles
        .iter()
        .map(|(symbol, candles)| {
            let closes: Vec<f64> = candles.iter().map(|c| c.close.to_f64().unwrap_or(0.0)).collect();
            let returns = log_returns(&closes);
            let atr_series = indicators::atr(candles, 14);
            let atr_pct = match (atr_series.last(), closes.last()) {
                (Some(Some(atr)), Some(close)) if *close != 0.0 => atr / close,
                _ => 0.0,
            };
            let var_btc = variance(&btc_returns);
            let beta = if var_btc == 0.0 {
                0.0
            } else {
                covariance(&returns, &btc_returns) / var_btc
            };
            let corr = correlation(&returns, &btc_returns);
            let volume = tickers.get(symbol).map(|t| t.quote_volume.to_f64().unwrap_or(0.0));
            Features {
                symbol: symbol.clone(),
                volume,
                atr_pct,
                beta,
                corr,
            }
        })
        .collect();

    let total_volume: f64 = features.iter().filter_map(|f| f.volume).sum();
    let volume_threshold = if total_volume > 0.0 {
        let volumes: Vec<f64> = features.iter().filter_map(|f| f.volume).collect();
        Some(quantile(&volumes, 1.0 - config.volume_percentile))
    } else {
        None
    };

    let filtered: Vec<&Features> = features
        .iter()
        .filter(|f| {
            let volume_ok = match volume_threshold {
                Some(threshold) => f.volume.map(|v| v >= threshold).unwrap_or(false),
                None => true,
            };
            volume_ok
                && f.atr_pct >= config.min_atr_pct
                && f.beta >= config.min_beta_btc
                && f.corr >= config.min_corr_btc
        })
        .collect();

    let volume_map: HashMap<String, f64> = filtered
        .iter()
        .filter_map(|f| f.volume.map(|v| (f.symbol.clone(), v)))
        .collect();
    let atr_map: HashMap<String, f64> = filtered.iter().map(|f| (f.symbol.clone(), f.atr_pct)).collect();
    let beta_map: HashMap<String, f64> = filtered.iter().map(|f| (f.symbol.clone(), f.beta)).collect();

    let volume_norm = norm(&volume_map);
    let atr_norm = norm(&atr_map);
    let beta_norm = norm(&beta_map);

    let mut scored: Vec<(String, f64)> = filtered
        .iter()
        .map(|f| {
            let volume_term = volume_norm.get(&f.symbol).copied().unwrap_or(0.0) * config.weight_volume;
            let atr_term = atr_norm.get(&f.symbol).copied().unwrap_or(0.0) * config.weight_atr_pct;
            let beta_term = beta_norm.get(&f.symbol).copied().unwrap_or(0.0) * config.weight_beta;
            (f.symbol.clone(), volume_term + atr_term + beta_term)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.truncate(config.max_symbols);

    let symbols = scored.iter().map(|(s, _)| s.clone()).collect();
    let scores = scored.into_iter().collect();

    RankedUniverse { symbols, scores }
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
            symbol: "X".into(),
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
    fn manual_override_short_circuits_and_truncates() {
        let config = UniverseConfig {
            max_symbols: 1,
            volume_percentile: 0.5,
            min_atr_pct: 0.0,
            min_beta_btc: 0.0,
            min_corr_btc: 0.0,
            weight_volume: 1.0,
            weight_atr_pct: 1.0,
            weight_beta: 1.0,
        };
        let ranked = build_universe(
            &["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            &[],
            &HashMap::new(),
            &HashMap::new(),
            &config,
        );
        assert_eq!(ranked.symbols, vec!["BTC/USDT".to_string()]);
    }

    #[test]
    fn empty_candidates_yield_empty_universe() {
        let config = UniverseConfig {
            max_symbols: 5,
            volume_percentile: 0.5,
            min_atr_pct: 0.0,
            min_beta_btc: -1.0,
            min_corr_btc: -1.0,
            weight_volume: 1.0,
            weight_atr_pct: 1.0,
            weight_beta: 1.0,
        };
        let btc: Vec<Candle> = (0..30).map(|i| candle(100.0 + i as f64, i * 60_000)).collect();
        let ranked = build_universe(&[], &btc, &HashMap::new(), &HashMap::new(), &config);
        assert!(ranked.symbols.is_empty());
    }
}
