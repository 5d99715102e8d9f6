use crate::domain::types::Direction;
use rust_decimal::Decimal;

/// LONG: `stop = entry - ATR*stop_mult`, `take = entry + ATR*take_mult`; SHORT reversed.
pub fn atr_stops(
    entry: Decimal,
    atr: Decimal,
    direction: Direction,
    stop_mult: Decimal,
    take_mult: Decimal,
) -> (Decimal, Decimal) {
    match direction {
        Direction::Long => (entry - atr * stop_mult, entry + atr * take_mult),
        Direction::Short => (entry + atr * stop_mult, entry - atr * take_mult),
        Direction::None => (entry, entry),
    }
}

/// `risk_amount = equity * risk_pct`; `qty = risk_amount / |entry - stop|` (0 if that's 0).
pub fn position_size(equity: Decimal, risk_pct: f64, entry: Decimal, stop: Decimal) -> Decimal {
    let risk_pct = Decimal::try_from(risk_pct).unwrap_or(Decimal::ZERO);
    let risk_amount = equity * risk_pct;
    let risk_per_unit = (entry - stop).abs();
    if risk_per_unit.is_zero() {
        Decimal::ZERO
    } else {
        risk_amount / risk_per_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn long_stops_bracket_entry() {
        let (stop, take) = atr_stops(dec!(100), dec!(2), Direction::Long, dec!(2), dec!(3));
        assert_eq!(stop, dec!(96));
        assert_eq!(take, dec!(106));
        assert!(stop < dec!(100) && dec!(100) < take);
    }

    #[test]
    fn short_stops_bracket_entry_reversed() {
        let (stop, take) = atr_stops(dec!(100), dec!(2), Direction::Short, dec!(2), dec!(3));
        assert_eq!(stop, dec!(104));
        assert_eq!(take, dec!(94));
        assert!(take < dec!(100) && dec!(100) < stop);
    }

    #[test]
    fn sizing_falls_back_to_zero_on_zero_risk_per_unit() {
        let qty = position_size(dec!(10000), 0.01, dec!(100), dec!(100));
        assert_eq!(qty, Decimal::ZERO);
    }

    #[test]
    fn sizing_divides_risk_amount_by_risk_per_unit() {
        let qty = position_size(dec!(10000), 0.01, dec!(100), dec!(95));
        assert_eq!(qty, dec!(20));
    }
}
