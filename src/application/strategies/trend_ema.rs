use super::{StrategyVerdict, TradingStrategy};
use crate::domain::indicators;
use crate::domain::types::{Candle, Direction};
use rust_decimal::prelude::ToPrimitive;

pub struct TrendEma {
    pub min_atr_pct: f64,
}

impl TradingStrategy for TrendEma {
    fn name(&self) -> &str {
        "trend_ema"
    }

    fn generate(&self, _symbol: &str, candles: &[Candle]) -> StrategyVerdict {
        if candles.len() < 22 {
            return StrategyVerdict::none("insufficient candles for trend_ema");
        }

        let closes: Vec<f64> = candles
            .iter()
            .map(|c| c.close.to_f64().unwrap_or(0.0))
            .collect();
        let ema9 = indicators::ema(&closes, 9);
        let ema21 = indicators::ema(&closes, 21);
        let rsi14 = indicators::rsi(&closes, 14);
        let atr14 = indicators::atr(candles, 14);

        let last = closes.len() - 1;
        let (Some(ema9_last), Some(ema21_last), Some(rsi_last), Some(atr_last)) =
            (ema9[last], ema21[last], rsi14[last], atr14[last])
        else {
            return StrategyVerdict::none("indicators not warmed up for trend_ema");
        };

        let close = closes[last];
        let prev_close = closes[last - 1];
        let atr_pct = if close != 0.0 { atr_last / close } else { 0.0 };

        if ema9_last > ema21_last
            && rsi_last >= 52.0
            && close > prev_close
            && close > ema9_last
            && atr_pct >= self.min_atr_pct
        {
            return StrategyVerdict::directional(
                Direction::Long,
                vec![format!(
                    "ema9={:.4} > ema21={:.4}, rsi14={:.2}, close>{:.4}prev, atr_pct={:.4}",
                    ema9_last, ema21_last, rsi_last, prev_close, atr_pct
                )],
            );
        }

        if ema9_last < ema21_last
            && rsi_last <= 48.0
            && close < prev_close
            && close < ema9_last
            && atr_pct >= self.min_atr_pct
        {
            return StrategyVerdict::directional(
                Direction::Short,
                vec![format!(
                    "ema9={:.4} < ema21={:.4}, rsi14={:.2}, close<{:.4}prev, atr_pct={:.4}",
                    ema9_last, ema21_last, rsi_last, prev_close, atr_pct
                )],
            );
        }

        StrategyVerdict::none("no trend_ema edge")
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
    fn none_on_insufficient_data() {
        let strat = TrendEma { min_atr_pct: 0.0 };
        let candles: Vec<Candle> = (0..5).map(|i| candle(100.0 + i as f64, 101.0, 99.0, i * 60_000)).collect();
        let verdict = strat.generate("BTC/USDT", &candles);
        assert_eq!(verdict.direction, Direction::None);
    }

    #[test]
    fn uptrend_yields_long() {
        let strat = TrendEma { min_atr_pct: 0.0 };
        let candles: Vec<Candle> = (0..30)
            .map(|i| {
                let close = 100.0 + i as f64 * 1.5;
                candle(close, close + 0.5, close - 0.5, i * 60_000)
            })
            .collect();
        let verdict = strat.generate("BTC/USDT", &candles);
        assert_eq!(verdict.direction, Direction::Long);
        assert_eq!(verdict.confidence, 1.0);
    }
}
