use std::collections::HashMap;

/// Per-process adaptive risk state. Mutated only by the scheduler's closeout step.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveState {
    pub losing_streak: u32,
    pub weekly_drawdown: f64,
    pub monthly_drawdown: f64,
    pub defensive_mode: bool,
}

impl AdaptiveState {
    /// Updates the losing streak from a closed trade's realised R. Called once
    /// per resolved trade, alongside `RiskLedger::register_trade_result`.
    pub fn register_trade_result(&mut self, pnl_r: f64) {
        if pnl_r < 0.0 {
            self.losing_streak += 1;
        } else {
            self.losing_streak = 0;
        }
    }

    pub fn update_drawdowns(&mut self, weekly_drawdown: f64, monthly_drawdown: f64) {
        self.weekly_drawdown = weekly_drawdown;
        self.monthly_drawdown = monthly_drawdown;
    }

    /// `risk_pct = base_risk_pct`, attenuated by losing-streak and drawdown
    /// multipliers; both compose if both conditions hold. Sets `defensive_mode`
    /// as a side effect of the drawdown check.
    pub fn attenuated_risk_pct(&mut self, base_risk_pct: f64) -> f64 {
        let mut risk_pct = base_risk_pct;

        if self.losing_streak >= 3 {
            risk_pct *= 0.5;
        }

        if self.weekly_drawdown >= 0.10 || self.monthly_drawdown >= 0.20 {
            self.defensive_mode = true;
            risk_pct *= 0.3;
        }

        risk_pct
    }
}

/// Per-process hard-rule ledger: kill-switch, position cap, per-symbol cooldowns.
#[derive(Debug, Clone)]
pub struct RiskLedger {
    pub daily_loss_r: f64,
    pub positions_open: usize,
    pub cooldowns: HashMap<String, u32>,
    pub kill_switch: bool,
    max_positions: usize,
    max_daily_loss_r: f64,
    cooldown_candles: u32,
}

impl RiskLedger {
    pub fn new(max_positions: usize, max_daily_loss_r: f64, cooldown_candles: u32) -> Self {
        Self {
            daily_loss_r: 0.0,
            positions_open: 0,
            cooldowns: HashMap::new(),
            kill_switch: false,
            max_positions,
            max_daily_loss_r,
            cooldown_candles,
        }
    }

    pub fn can_open(&self, symbol: &str) -> bool {
        !self.kill_switch
            && self.positions_open < self.max_positions
            && self.cooldowns.get(symbol).copied().unwrap_or(0) == 0
    }

    /// `daily_loss_r += min(0, pnl_r)`; sticky kill-switch once the cap is breached.
    pub fn register_trade_result(&mut self, pnl_r: f64) {
        self.daily_loss_r += pnl_r.min(0.0);
        if self.daily_loss_r.abs() >= self.max_daily_loss_r {
            self.kill_switch = true;
        }
    }

    pub fn apply_cooldown(&mut self, symbol: &str) {
        self.cooldowns
            .insert(symbol.to_string(), self.cooldown_candles);
    }

    /// Decrements all cooldowns by 1 (floor 0). Must run exactly once per cycle,
    /// after the decision phase.
    pub fn tick(&mut self) {
        for remaining in self.cooldowns.values_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    /// Day-boundary reset of daily aggregates. Left as an explicit hook: the
    /// policy of *when* to call it (UTC midnight) belongs to the embedder.
    pub fn reset_day(&mut self) {
        self.daily_loss_r = 0.0;
        self.kill_switch = false;
    }
}

/// `pnl_r = pnl_pct / base_risk_pct`. Guards the zero-division the source
/// implementation does not.
pub fn pnl_to_r(pnl_pct: f64, base_risk_pct: f64) -> f64 {
    if base_risk_pct == 0.0 {
        0.0
    } else {
        pnl_pct / base_risk_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_switch_is_sticky() {
        let mut ledger = RiskLedger::new(5, 0.05, 3);
        ledger.register_trade_result(-0.06);
        assert!(ledger.kill_switch);
        ledger.register_trade_result(1.0);
        assert!(ledger.kill_switch);
        assert!(!ledger.can_open("BTC/USDT"));
    }

    #[test]
    fn cooldown_blocks_then_clears_after_tick() {
        let mut ledger = RiskLedger::new(5, 1.0, 2);
        ledger.apply_cooldown("ETH/USDT");
        assert!(!ledger.can_open("ETH/USDT"));
        ledger.tick();
        assert!(!ledger.can_open("ETH/USDT"));
        ledger.tick();
        assert!(ledger.can_open("ETH/USDT"));
    }

    #[test]
    fn adaptive_attenuation_composes() {
        let mut state = AdaptiveState::default();
        for _ in 0..3 {
            state.register_trade_result(-1.0);
        }
        assert_eq!(state.attenuated_risk_pct(0.01), 0.005);

        state.update_drawdowns(0.2, 0.0);
        assert!((state.attenuated_risk_pct(0.01) - 0.0015).abs() < 1e-12);
        assert!(state.defensive_mode);
    }

    #[test]
    fn pnl_to_r_guards_zero_base() {
        assert_eq!(pnl_to_r(0.05, 0.0), 0.0);
        assert_eq!(pnl_to_r(0.05, 0.01), 5.0);
    }
}
