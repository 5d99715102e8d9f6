mod breakout_donchian;
mod mean_reversion_bb;
mod trend_ema;

pub use breakout_donchian::BreakoutDonchian;
pub use mean_reversion_bb::MeanReversionBb;
pub use trend_ema::TrendEma;

use crate::domain::types::{Candle, Direction};

/// A strategy's directional verdict for one symbol on its most recent closed candle.
#[derive(Debug, Clone)]
pub struct StrategyVerdict {
    pub direction: Direction,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl StrategyVerdict {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            direction: Direction::None,
            confidence: 0.0,
            reasons: vec![reason.into()],
        }
    }

    pub fn directional(direction: Direction, reasons: Vec<String>) -> Self {
        Self {
            direction,
            confidence: 1.0,
            reasons,
        }
    }
}

/// Common contract across the strategy bank. Every strategy returns a `NONE`
/// verdict if inputs are insufficient; otherwise `reasons` carries the
/// computed inputs behind the verdict.
pub trait TradingStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, symbol: &str, candles: &[Candle]) -> StrategyVerdict;
}
