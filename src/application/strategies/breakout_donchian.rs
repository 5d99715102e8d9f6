use super::{StrategyVerdict, TradingStrategy};
use crate::domain::indicators;
use crate::domain::types::{Candle, Direction};
use rust_decimal::prelude::ToPrimitive;

pub struct BreakoutDonchian {
    pub period: usize,
    pub atr_zscore_spike: f64,
}

impl TradingStrategy for BreakoutDonchian {
    fn name(&self) -> &str {
        "breakout_donchian"
    }

    fn generate(&self, _symbol: &str, candles: &[Candle]) -> StrategyVerdict {
        if candles.len() < self.period + 15 {
            return StrategyVerdict::none("insufficient candles for breakout_donchian");
        }

        let closes: Vec<f64> = candles
            .iter()
            .map(|c| c.close.to_f64().unwrap_or(0.0))
            .collect();
        let donchian = indicators::donchian(candles, self.period);
        let rsi14 = indicators::rsi(&closes, 14);
        let atr14 = indicators::atr(candles, 14);

        let last = closes.len() - 1;
        let atr_series: Vec<f64> = atr14.iter().filter_map(|v| *v).collect();
        let atr_z = indicators::zscore_last(&atr_series);

        let (Some(d_high), Some(d_low), Some(rsi_last)) =
            (donchian.high[last], donchian.low[last], rsi14[last])
        else {
            return StrategyVerdict::none("indicators not warmed up for breakout_donchian");
        };

        if let Some(z) = atr_z
            && z >= self.atr_zscore_spike
        {
            return StrategyVerdict::none(format!("volatility spike veto: atr_z={:.2}", z));
        }

        let close = closes[last];

        if close > d_high && rsi_last >= 50.0 {
            return StrategyVerdict::directional(
                Direction::Long,
                vec![format!(
                    "close={:.4} > donchian.high={:.4}, rsi14={:.2}",
                    close, d_high, rsi_last
                )],
            );
        }

        if close < d_low && rsi_last <= 50.0 {
            return StrategyVerdict::directional(
                Direction::Short,
                vec![format!(
                    "close={:.4} < donchian.low={:.4}, rsi14={:.2}",
                    close, d_low, rsi_last
                )],
            );
        }

        StrategyVerdict::none("no breakout_donchian edge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn candle(close: f64, high: f64, low: f64, t: i64) -> Candle {
        Candle {
            exchange: "mock".into(),
            symbol: "BTC/USDT".into(),
            timeframe: Timeframe::from_str("1m").unwrap(),
            open_time_ms: t,
            open: Decimal::try_from(close).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: Decimal::ONE,
            close_time_ms: t + 60_000,
        }
    }

    #[test]
    fn close_never_exceeds_its_own_bar_donchian_high() {
        // donchian.high[last] always includes the last bar's own high, so
        // `close > donchian.high` is structurally unsatisfiable: the LONG arm
        // can never fire this way (matches the original's own
        // `channel["high"].iloc[-1] >= df["high"].iloc[-1]` test).
        let strat = BreakoutDonchian {
            period: 20,
            atr_zscore_spike: 2.5,
        };
        let mut candles: Vec<Candle> = (0..40)
            .map(|i| candle(100.0, 100.5, 99.5, i * 60_000))
            .collect();
        let n = candles.len() as i64;
        candles.push(candle(110.0, 111.0, 109.0, n * 60_000));
        let verdict = strat.generate("BTC/USDT", &candles);
        assert_eq!(verdict.direction, Direction::None);
    }
}
