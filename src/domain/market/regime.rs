use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    TrendClean,
    Range,
    Chaotic,
    Transition,
}

/// Inputs required to classify a symbol's regime for one cycle.
pub struct RegimeInputs {
    pub adx14: Option<f64>,
    pub ema50_slope: Option<f64>,
    pub bb_width: Option<f64>,
    pub atr_zscore: Option<f64>,
}

pub struct RegimeThresholds {
    pub trend_adx_min: f64,
    pub trend_slope_min: f64,
    pub range_bb_width_max: f64,
    pub range_slope_max: f64,
    pub chaotic_atr_zscore_abs: f64,
}

/// Classifies market character. Tie-breaks apply in the listed order:
/// TREND_CLEAN, then RANGE, then CHAOTIC, else TRANSITION.
pub fn classify(inputs: &RegimeInputs, thresholds: &RegimeThresholds) -> Regime {
    if let (Some(adx), Some(slope)) = (inputs.adx14, inputs.ema50_slope)
        && adx >= thresholds.trend_adx_min
        && slope.abs() > thresholds.trend_slope_min
    {
        return Regime::TrendClean;
    }

    if let (Some(width), Some(slope)) = (inputs.bb_width, inputs.ema50_slope)
        && width < thresholds.range_bb_width_max
        && slope.abs() <= thresholds.range_slope_max
    {
        return Regime::Range;
    }

    match inputs.atr_zscore {
        None => return Regime::Chaotic,
        Some(z) if z.abs() > thresholds.chaotic_atr_zscore_abs => return Regime::Chaotic,
        _ => {}
    }

    Regime::Transition
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> RegimeThresholds {
        RegimeThresholds {
            trend_adx_min: 25.0,
            trend_slope_min: 0.002,
            range_bb_width_max: 0.05,
            range_slope_max: 0.002,
            chaotic_atr_zscore_abs: 2.5,
        }
    }

    #[test]
    fn trend_clean_wins_first() {
        let inputs = RegimeInputs {
            adx14: Some(30.0),
            ema50_slope: Some(0.01),
            bb_width: Some(0.2),
            atr_zscore: Some(0.0),
        };
        assert_eq!(classify(&inputs, &thresholds()), Regime::TrendClean);
    }

    #[test]
    fn undefined_atr_zscore_is_chaotic() {
        let inputs = RegimeInputs {
            adx14: Some(10.0),
            ema50_slope: Some(0.0005),
            bb_width: Some(0.1),
            atr_zscore: None,
        };
        assert_eq!(classify(&inputs, &thresholds()), Regime::Chaotic);
    }

    #[test]
    fn falls_through_to_transition() {
        let inputs = RegimeInputs {
            adx14: Some(10.0),
            ema50_slope: Some(0.01),
            bb_width: Some(0.2),
            atr_zscore: Some(0.5),
        };
        assert_eq!(classify(&inputs, &thresholds()), Regime::Transition);
    }
}
