use crate::domain::types::{Candle, Direction, TradeStatus};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Resolved outcome of a single-candle pass against an open position.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: TradeStatus,
    pub exit_price: Option<Decimal>,
    pub pnl_pct: Option<f64>,
    pub fees: Decimal,
}

/// Pure single-candle resolver. Given same-candle stop-and-take collision,
/// `worst_case_same_candle=true` resolves as STOP, matching a conservative
/// backtest convention; `false` resolves as TAKE.
pub fn resolve(
    direction: Direction,
    entry: Decimal,
    stop: Decimal,
    take: Decimal,
    candle: &Candle,
    worst_case_same_candle: bool,
    fee_rate: Decimal,
) -> Resolution {
    let (hit_stop, hit_take) = match direction {
        Direction::Long => (candle.low <= stop, candle.high >= take),
        Direction::Short => (candle.high >= stop, candle.low <= take),
        Direction::None => (false, false),
    };

    let exit = if hit_stop && hit_take {
        if worst_case_same_candle {
            Some((TradeStatus::Stop, stop))
        } else {
            Some((TradeStatus::Take, take))
        }
    } else if hit_stop {
        Some((TradeStatus::Stop, stop))
    } else if hit_take {
        Some((TradeStatus::Take, take))
    } else {
        None
    };

    match exit {
        None => Resolution {
            status: TradeStatus::Open,
            exit_price: None,
            pnl_pct: None,
            fees: Decimal::ZERO,
        },
        Some((status, exit_price)) => {
            let pnl_pct = pnl_pct(direction, entry, exit_price);
            Resolution {
                status,
                exit_price: Some(exit_price),
                pnl_pct: Some(pnl_pct),
                fees: fee_rate * Decimal::from(2),
            }
        }
    }
}

fn pnl_pct(direction: Direction, entry: Decimal, exit: Decimal) -> f64 {
    if entry.is_zero() {
        return 0.0;
    }
    let raw = ((exit - entry) / entry).to_f64().unwrap_or(0.0);
    match direction {
        Direction::Short => -raw,
        _ => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Timeframe;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn candle(high: f64, low: f64) -> Candle {
        Candle {
            exchange: "mock".into(),
            symbol: "BTC/USDT".into(),
            timeframe: Timeframe::from_str("1m").unwrap(),
            open_time_ms: 0,
            open: Decimal::try_from(100.0).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(100.0).unwrap(),
            volume: Decimal::ONE,
            close_time_ms: 60_000,
        }
    }

    #[test]
    fn scenario_s1_worst_case_same_candle_resolves_stop() {
        let c = candle(106.0, 94.0);
        let res = resolve(
            Direction::Long,
            dec!(100),
            dec!(95),
            dec!(105),
            &c,
            true,
            Decimal::ZERO,
        );
        assert_eq!(res.status, TradeStatus::Stop);
        assert_eq!(res.exit_price, Some(dec!(95)));
        assert!((res.pnl_pct.unwrap() - (-0.05)).abs() < 1e-9);
    }

    #[test]
    fn same_candle_collision_resolves_take_when_not_worst_case() {
        let c = candle(106.0, 94.0);
        let res = resolve(
            Direction::Long,
            dec!(100),
            dec!(95),
            dec!(105),
            &c,
            false,
            Decimal::ZERO,
        );
        assert_eq!(res.status, TradeStatus::Take);
        assert_eq!(res.exit_price, Some(dec!(105)));
    }

    #[test]
    fn neither_hit_stays_open() {
        let c = candle(102.0, 98.0);
        let res = resolve(Direction::Long, dec!(100), dec!(95), dec!(105), &c, true, Decimal::ZERO);
        assert_eq!(res.status, TradeStatus::Open);
        assert!(res.exit_price.is_none());
    }

    #[test]
    fn short_take_hit_yields_positive_pnl() {
        let c = candle(101.0, 94.0);
        let res = resolve(
            Direction::Short,
            dec!(100),
            dec!(105),
            dec!(95),
            &c,
            true,
            Decimal::ZERO,
        );
        assert_eq!(res.status, TradeStatus::Take);
        assert!((res.pnl_pct.unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn fees_are_flat_round_trip() {
        let c = candle(106.0, 94.0);
        let res = resolve(
            Direction::Long,
            dec!(100),
            dec!(95),
            dec!(105),
            &c,
            true,
            dec!(0.001),
        );
        assert_eq!(res.fees, dec!(0.002));
    }
}
