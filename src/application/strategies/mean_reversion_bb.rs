use super::{StrategyVerdict, TradingStrategy};
use crate::domain::indicators;
use crate::domain::types::{Candle, Direction};
use rust_decimal::prelude::ToPrimitive;

pub struct MeanReversionBb {
    pub period: usize,
    pub std_mult: f64,
}

impl TradingStrategy for MeanReversionBb {
    fn name(&self) -> &str {
        "mean_reversion_bb"
    }

    fn generate(&self, _symbol: &str, candles: &[Candle]) -> StrategyVerdict {
        if candles.len() < self.period + 1 {
            return StrategyVerdict::none("insufficient candles for mean_reversion_bb");
        }

        let closes: Vec<f64> = candles
            .iter()
            .map(|c| c.close.to_f64().unwrap_or(0.0))
            .collect();
        let bands = indicators::bbands(&closes, self.period, self.std_mult);

        let last = closes.len() - 1;
        let prev = last - 1;

        let (Some(lower), Some(upper)) = (bands.lower[last], bands.upper[last]) else {
            return StrategyVerdict::none("indicators not warmed up for mean_reversion_bb");
        };

        let prev_close = closes[prev];
        let last_close = closes[last];

        if prev_close < lower && last_close > lower {
            return StrategyVerdict::directional(
                Direction::Long,
                vec![format!(
                    "prev.close={:.4} < lower={:.4}, last.close={:.4} > lower={:.4}",
                    prev_close, lower, last_close, lower
                )],
            );
        }

        if prev_close > upper && last_close < upper {
            return StrategyVerdict::directional(
                Direction::Short,
                vec![format!(
                    "prev.close={:.4} > upper={:.4}, last.close={:.4} < upper={:.4}",
                    prev_close, upper, last_close, upper
                )],
            );
        }

        StrategyVerdict::none("no mean_reversion_bb edge")
    }
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
    fn reentry_above_lower_band_yields_long() {
        let strat = MeanReversionBb {
            period: 20,
            std_mult: 2.0,
        };
        let mut closes: Vec<f64> = vec![100.0; 20];
        closes.push(90.0); // prev: dips below lower band
        closes.push(99.0); // last: back above lower band
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| candle(*c, i as i64 * 60_000))
            .collect();
        let verdict = strat.generate("BTC/USDT", &candles);
        assert_eq!(verdict.direction, Direction::Long);
    }
}
