use crate::application::strategies::StrategyVerdict;
use crate::domain::market::btc_state::BtcState;
use crate::domain::market::quality::Quality;
use crate::domain::market::regime::Regime;
use crate::domain::types::Direction;

#[derive(Debug, Clone)]
pub struct EnsembleDecision {
    pub direction: Direction,
    pub confidence: f64,
    pub votes: Vec<(String, Direction)>,
    pub reasons: Vec<String>,
}

/// Filters the strategy bank by market context, tallies votes, and combines
/// them into a single directional decision.
pub fn decide(
    verdicts: &[(String, StrategyVerdict)],
    regime: Regime,
    btc_state: BtcState,
    mqs: Quality,
    min_trade_score: i32,
) -> EnsembleDecision {
    if mqs.value() < 50 || regime == Regime::Chaotic {
        return EnsembleDecision {
            direction: Direction::None,
            confidence: 0.0,
            votes: vec![],
            reasons: vec![format!(
                "admission filter: mqs={} regime={:?}",
                mqs.value(),
                regime
            )],
        };
    }

    let admitted: Vec<&(String, StrategyVerdict)> = verdicts
        .iter()
        .filter(|(name, _)| {
            if name == "mean_reversion_bb" && regime != Regime::Range {
                return false;
            }
            if (name == "trend_ema" || name == "breakout_donchian")
                && matches!(btc_state, BtcState::Squeeze | BtcState::Chop)
            {
                return false;
            }
            true
        })
        .collect();

    let total = admitted.len();
    let longs = admitted
        .iter()
        .filter(|(_, v)| v.direction == Direction::Long)
        .count();
    let shorts = admitted
        .iter()
        .filter(|(_, v)| v.direction == Direction::Short)
        .count();

    let required = if mqs.value() >= 50 && (mqs.value() as i32) < min_trade_score {
        total
    } else {
        total.min(2)
    };

    let direction = if longs >= required && longs > shorts {
        Direction::Long
    } else if shorts >= required && shorts > longs {
        Direction::Short
    } else {
        Direction::None
    };

    let confidence = if total > 0 {
        longs.max(shorts) as f64 / total as f64
    } else {
        0.0
    };

    let votes = admitted
        .iter()
        .map(|(name, v)| (name.clone(), v.direction))
        .collect();
    let reasons = admitted
        .iter()
        .flat_map(|(name, v)| v.reasons.iter().map(move |r| format!("{name}: {r}")))
        .collect();

    EnsembleDecision {
        direction,
        confidence,
        votes,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(direction: Direction) -> StrategyVerdict {
        StrategyVerdict {
            direction,
            confidence: if direction == Direction::None { 0.0 } else { 1.0 },
            reasons: vec![],
        }
    }

    #[test]
    fn low_mqs_admits_nothing() {
        let verdicts = vec![("trend_ema".to_string(), verdict(Direction::Long))];
        let decision = decide(&verdicts, Regime::TrendClean, BtcState::ExpandingUp, Quality::new(40), 70);
        assert_eq!(decision.direction, Direction::None);
    }

    #[test]
    fn chaotic_regime_admits_nothing() {
        let verdicts = vec![("trend_ema".to_string(), verdict(Direction::Long))];
        let decision = decide(&verdicts, Regime::Chaotic, BtcState::ExpandingUp, Quality::new(90), 70);
        assert_eq!(decision.direction, Direction::None);
    }

    #[test]
    fn unanimity_required_when_mqs_below_min_trade_score() {
        let verdicts = vec![
            ("trend_ema".to_string(), verdict(Direction::Long)),
            ("breakout_donchian".to_string(), verdict(Direction::Long)),
            ("mean_reversion_bb".to_string(), verdict(Direction::Short)),
        ];
        // mean_reversion_bb only admitted in RANGE regime; use RANGE so all 3 are admitted.
        let decision = decide(&verdicts, Regime::Range, BtcState::Chop, Quality::new(60), 70);
        // btc_state=Chop drops trend_ema/breakout_donchian -> only mean_reversion_bb admitted (T=1)
        assert_eq!(decision.votes.len(), 1);
    }

    #[test]
    fn scenario_s3_ensemble_unanimity_when_mqs_low() {
        let verdicts = vec![
            ("a".to_string(), verdict(Direction::Long)),
            ("b".to_string(), verdict(Direction::Long)),
            ("c".to_string(), verdict(Direction::Short)),
        ];
        // Use names that survive every admission filter.
        let decision = decide(&verdicts, Regime::TrendClean, BtcState::ExpandingUp, Quality::new(60), 70);
        assert_eq!(decision.direction, Direction::None);
    }

    #[test]
    fn majority_of_two_is_enough_when_mqs_high() {
        let verdicts = vec![
            ("a".to_string(), verdict(Direction::Long)),
            ("b".to_string(), verdict(Direction::Long)),
            ("c".to_string(), verdict(Direction::Short)),
        ];
        let decision = decide(&verdicts, Regime::TrendClean, BtcState::ExpandingUp, Quality::new(90), 70);
        assert_eq!(decision.direction, Direction::Long);
        assert!((decision.confidence - 2.0 / 3.0).abs() < 1e-9);
    }
}
