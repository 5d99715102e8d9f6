//! Daily performance roll-up. Not exercised by the original source's test
//! suite, but flagged there as an implied gap (spec.md §9): something must
//! turn a day's closed trades into the `metrics_daily` row the persistence
//! contract names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub winrate: f64,
    pub expectancy: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            winrate: 0.0,
            expectancy: 0.0,
            max_drawdown: 0.0,
            sharpe: 0.0,
        }
    }
}

/// Rolls a day's closed-trade `pnl_pct` series into winrate/expectancy/
/// drawdown/Sharpe. Mirrors the cumulative-peak drawdown convention used by
/// the backtest summary.
pub fn compute_metrics(pnls: &[f64]) -> PerformanceMetrics {
    if pnls.is_empty() {
        return PerformanceMetrics::default();
    }

    let n = pnls.len() as f64;
    let wins = pnls.iter().filter(|p| **p > 0.0).count();
    let winrate = wins as f64 / n;
    let expectancy = pnls.iter().sum::<f64>() / n;

    let mut cumulative = 0.0;
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for pnl in pnls {
        cumulative += pnl;
        peak = peak.max(cumulative);
        max_dd = max_dd.min(cumulative - peak);
    }

    let variance = pnls.iter().map(|p| (p - expectancy).powi(2)).sum::<f64>() / n;
    let sharpe = expectancy / (variance.sqrt() + 1e-9);

    PerformanceMetrics {
        winrate,
        expectancy,
        max_drawdown: max_dd.abs(),
        sharpe,
    }
}

/// Serializes metrics for the `metrics_daily` persistence row.
pub fn to_json(metrics: &PerformanceMetrics) -> serde_json::Value {
    serde_json::to_value(metrics).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_yields_zeroed_metrics() {
        let metrics = compute_metrics(&[]);
        assert_eq!(metrics, PerformanceMetrics::default());
    }

    #[test]
    fn winrate_and_expectancy_match_mean_of_pnls() {
        let metrics = compute_metrics(&[0.05, -0.02, 0.03]);
        assert!((metrics.winrate - 2.0 / 3.0).abs() < 1e-9);
        assert!((metrics.expectancy - 0.02).abs() < 1e-9);
    }

    #[test]
    fn sharpe_is_finite_for_constant_series() {
        let metrics = compute_metrics(&[0.01, 0.01, 0.01]);
        assert!(metrics.sharpe.is_finite());
        assert!(metrics.sharpe > 0.0);
    }
}
