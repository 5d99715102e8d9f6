use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BtcState {
    Squeeze,
    ExpandingUp,
    ExpandingDown,
    Chop,
}

pub struct BtcStateInputs {
    pub atr_pct: f64,
    pub bb_width: f64,
    pub ema50_slope: f64,
}

pub struct BtcStateThresholds {
    pub squeeze_atr_pct: f64,
    pub squeeze_bb_width: f64,
    pub expanding_atr_pct: f64,
    pub trend_slope: f64,
}

/// First match wins, in the listed order: SQUEEZE, EXPANDING_UP, EXPANDING_DOWN, else CHOP.
pub fn classify(inputs: &BtcStateInputs, thresholds: &BtcStateThresholds) -> BtcState {
    if inputs.atr_pct <= thresholds.squeeze_atr_pct && inputs.bb_width <= thresholds.squeeze_bb_width {
        return BtcState::Squeeze;
    }
    if inputs.atr_pct >= thresholds.expanding_atr_pct && inputs.ema50_slope >= thresholds.trend_slope {
        return BtcState::ExpandingUp;
    }
    if inputs.atr_pct >= thresholds.expanding_atr_pct && inputs.ema50_slope <= -thresholds.trend_slope {
        return BtcState::ExpandingDown;
    }
    BtcState::Chop
}
