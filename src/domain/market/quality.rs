use serde::{Deserialize, Serialize};

/// Market-quality score in `[0,100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quality(i32);

impl Quality {
    pub fn new(raw: i32) -> Self {
        Quality(raw.clamp(0, 100))
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

pub struct QualityInputs {
    pub spread: f64,
    pub atr_pct: f64,
    pub adx: f64,
    pub wick_ratio: f64,
    pub liquidity: f64,
}

pub struct QualityThresholds {
    pub spread_max: f64,
    pub spread_penalty: i32,
    pub atr_pct_min: f64,
    pub atr_low_penalty: i32,
    pub adx_min: f64,
    pub adx_low_penalty: i32,
    pub wick_ratio_max: f64,
    pub wick_penalty: i32,
    pub liquidity_min: f64,
    pub liquidity_bonus: i32,
    pub adx_direction_min: f64,
    pub direction_bonus: i32,
}

/// Starts at 100, applies penalties and bonuses, clips to `[0,100]`.
pub fn score(inputs: &QualityInputs, t: &QualityThresholds) -> Quality {
    let mut mqs: i32 = 100;

    if inputs.spread > t.spread_max {
        mqs -= t.spread_penalty;
    }
    if inputs.atr_pct < t.atr_pct_min {
        mqs -= t.atr_low_penalty;
    }
    if inputs.adx < t.adx_min {
        mqs -= t.adx_low_penalty;
    }
    if inputs.wick_ratio > t.wick_ratio_max {
        mqs -= t.wick_penalty;
    }

    if inputs.liquidity > t.liquidity_min {
        mqs += t.liquidity_bonus;
    }
    if inputs.adx > t.adx_direction_min {
        mqs += t.direction_bonus;
    }

    Quality::new(mqs)
}

/// Mean over a window of candles of `((high - max(open,close)) + (min(open,close) - low)) / max(|close-open|, 1)`.
pub fn wick_ratio(candles: &[(f64, f64, f64, f64)]) -> f64 {
    if candles.is_empty() {
        return 0.0;
    }
    let ratios: Vec<f64> = candles
        .iter()
        .map(|(open, high, low, close)| {
            let body_top = open.max(*close);
            let body_bottom = open.min(*close);
            let wick = (high - body_top) + (body_bottom - low);
            let body = (close - open).abs().max(1.0);
            wick / body
        })
        .collect();
    ratios.iter().sum::<f64>() / ratios.len() as f64
}
