//! Runtime configuration: a TOML-file layer of defaults, overridden by
//! `PTRADE_`-prefixed environment variables — the same two-layer shape as
//! the teacher's env-only `RiskEnvConfig`/`StrategyEnvConfig` (this crate
//! adds the file layer the original Python `Settings.load()` reads from a
//! YAML defaults file ahead of env/pydantic overrides).

use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    pub risk_per_trade_pct: f64,
    pub max_daily_loss_r: f64,
    pub max_positions: usize,
    pub cooldown_candles: u32,
    pub fee_rate: f64,
    pub stop_atr_mult: f64,
    pub take_atr_mult: f64,
    pub cluster_corr_threshold: f64,
    pub max_positions_per_cluster: usize,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: 0.005,
            max_daily_loss_r: 3.0,
            max_positions: 2,
            cooldown_candles: 2,
            fee_rate: 0.0004,
            stop_atr_mult: 1.2,
            take_atr_mult: 1.8,
            cluster_corr_threshold: 0.75,
            max_positions_per_cluster: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseWeights {
    pub volume: f64,
    pub atr_pct: f64,
    pub beta: f64,
}

impl Default for UniverseWeights {
    fn default() -> Self {
        Self {
            volume: 0.45,
            atr_pct: 0.35,
            beta: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseSettings {
    pub volume_percentile: f64,
    pub min_atr_pct: f64,
    pub min_beta_btc: f64,
    pub min_corr_btc: f64,
    pub max_symbols: usize,
    pub weights: UniverseWeights,
    pub manual_override: Vec<String>,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            volume_percentile: 0.30,
            min_atr_pct: 0.004,
            min_beta_btc: 1.2,
            min_corr_btc: 0.5,
            max_symbols: 15,
            weights: UniverseWeights::default(),
            manual_override: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketQualitySettings {
    pub min_trade_score: i32,
    pub reduced_risk_score: i32,
    pub spread_penalty: i32,
    pub atr_low_penalty: i32,
    pub adx_low_penalty: i32,
    pub wick_penalty: i32,
    pub liquidity_bonus: i32,
    pub direction_bonus: i32,
    pub spread_max: f64,
    pub atr_pct_min: f64,
    pub adx_min: f64,
    pub wick_ratio_max: f64,
    pub liquidity_min: f64,
    pub adx_direction_min: f64,
}

impl Default for MarketQualitySettings {
    fn default() -> Self {
        Self {
            min_trade_score: 70,
            reduced_risk_score: 50,
            spread_penalty: 20,
            atr_low_penalty: 15,
            adx_low_penalty: 10,
            wick_penalty: 10,
            liquidity_bonus: 15,
            direction_bonus: 10,
            spread_max: 0.002,
            atr_pct_min: 0.003,
            adx_min: 18.0,
            wick_ratio_max: 2.5,
            liquidity_min: 1e7,
            adx_direction_min: 25.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    pub min_atr_pct: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self { min_atr_pct: 0.004 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutSettings {
    pub donchian_period: usize,
    pub atr_zscore_spike: f64,
}

impl Default for BreakoutSettings {
    fn default() -> Self {
        Self {
            donchian_period: 20,
            atr_zscore_spike: 2.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanReversionSettings {
    pub bb_period: usize,
    pub bb_std: f64,
}

impl Default for MeanReversionSettings {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_std: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub trend: TrendSettings,
    pub breakout: BreakoutSettings,
    pub mean_reversion: MeanReversionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub min_trades: usize,
    pub disable_candles: usize,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            min_trades: 30,
            disable_candles: 96,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BtcStateSettings {
    pub squeeze_bb_width: f64,
    pub squeeze_atr_pct: f64,
    pub expanding_atr_pct: f64,
    pub trend_slope: f64,
}

impl Default for BtcStateSettings {
    fn default() -> Self {
        Self {
            squeeze_bb_width: 0.04,
            squeeze_atr_pct: 0.003,
            expanding_atr_pct: 0.006,
            trend_slope: 0.0005,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub timeframe: String,
    pub loop_seconds: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeframe: "15m".to_string(),
            loop_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub execute_real_trades: bool,
    pub entry_on: String,
    pub worst_case_same_candle: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            execute_real_trades: false,
            entry_on: "close".to_string(),
            worst_case_same_candle: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    pub timeframe: String,
    pub loop_seconds: u64,
    pub candle_limit: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            timeframe: "15m".to_string(),
            loop_seconds: 30,
            candle_limit: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_json: bool,
    pub binance_api_key: Option<String>,
    pub binance_api_secret: Option<String>,
    pub execute_real_trades: bool,

    pub risk: RiskSettings,
    pub universe: UniverseSettings,
    pub market_quality: MarketQualitySettings,
    pub strategy: StrategySettings,
    pub scoring: ScoringSettings,
    pub btc_state: BtcStateSettings,
    pub runner: RunnerSettings,
    pub execution: ExecutionSettings,
    pub live: LiveSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("data/papertrader.sqlite"),
            log_json: false,
            binance_api_key: None,
            binance_api_secret: None,
            execute_real_trades: false,
            risk: RiskSettings::default(),
            universe: UniverseSettings::default(),
            market_quality: MarketQualitySettings::default(),
            strategy: StrategySettings::default(),
            scoring: ScoringSettings::default(),
            btc_state: BtcStateSettings::default(),
            runner: RunnerSettings::default(),
            execution: ExecutionSettings::default(),
            live: LiveSettings::default(),
        }
    }
}

const ENV_PREFIX: &str = "PTRADE_";

impl Config {
    /// Layers a TOML defaults file (if present) under `PTRADE_`-prefixed
    /// environment variable overrides, `.env`-first as the teacher's
    /// `main.rs` does via `dotenvy`.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match config_path.or(Some(Path::new("config/default.toml"))) {
            Some(path) if path.exists() => Self::from_toml_file(path)?,
            _ => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidValue {
            field: "config_path".to_string(),
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::InvalidValue {
            field: "config_path".to_string(),
            reason: format!("failed to parse {}: {e}", path.display()),
        })
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_string("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        self.log_json = env_bool("LOG_JSON", self.log_json);
        self.binance_api_key = env_string("BINANCE_API_KEY").or_else(|| self.binance_api_key.clone());
        self.binance_api_secret =
            env_string("BINANCE_API_SECRET").or_else(|| self.binance_api_secret.clone());
        self.execute_real_trades = env_bool("EXECUTE_REAL_TRADES", self.execute_real_trades);

        self.risk.risk_per_trade_pct = env_f64("RISK_RISK_PER_TRADE_PCT", self.risk.risk_per_trade_pct);
        self.risk.max_daily_loss_r = env_f64("RISK_MAX_DAILY_LOSS_R", self.risk.max_daily_loss_r);
        self.risk.max_positions = env_usize("RISK_MAX_POSITIONS", self.risk.max_positions);
        self.risk.cooldown_candles = env_u32("RISK_COOLDOWN_CANDLES", self.risk.cooldown_candles);
        self.risk.fee_rate = env_f64("RISK_FEE_RATE", self.risk.fee_rate);
        self.risk.stop_atr_mult = env_f64("RISK_STOP_ATR_MULT", self.risk.stop_atr_mult);
        self.risk.take_atr_mult = env_f64("RISK_TAKE_ATR_MULT", self.risk.take_atr_mult);
        self.risk.cluster_corr_threshold =
            env_f64("RISK_CLUSTER_CORR_THRESHOLD", self.risk.cluster_corr_threshold);
        self.risk.max_positions_per_cluster =
            env_usize("RISK_MAX_POSITIONS_PER_CLUSTER", self.risk.max_positions_per_cluster);

        self.universe.max_symbols = env_usize("UNIVERSE_MAX_SYMBOLS", self.universe.max_symbols);
        self.universe.min_atr_pct = env_f64("UNIVERSE_MIN_ATR_PCT", self.universe.min_atr_pct);
        self.universe.min_beta_btc = env_f64("UNIVERSE_MIN_BETA_BTC", self.universe.min_beta_btc);
        self.universe.min_corr_btc = env_f64("UNIVERSE_MIN_CORR_BTC", self.universe.min_corr_btc);
        if let Some(v) = env_string("UNIVERSE_MANUAL_OVERRIDE") {
            self.universe.manual_override = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }

        self.market_quality.min_trade_score =
            env_i32("MARKET_QUALITY_MIN_TRADE_SCORE", self.market_quality.min_trade_score);

        self.runner.timeframe = env_string("RUNNER_TIMEFRAME").unwrap_or(self.runner.timeframe.clone());
        self.runner.loop_seconds = env_u64("RUNNER_LOOP_SECONDS", self.runner.loop_seconds);

        self.execution.entry_on = env_string("EXECUTION_ENTRY_ON").unwrap_or(self.execution.entry_on.clone());
        self.execution.worst_case_same_candle =
            env_bool("EXECUTION_WORST_CASE_SAME_CANDLE", self.execution.worst_case_same_candle);
        self.execution.execute_real_trades =
            env_bool("EXECUTION_EXECUTE_REAL_TRADES", self.execution.execute_real_trades);

        self.live.timeframe = env_string("LIVE_TIMEFRAME").unwrap_or(self.live.timeframe.clone());
        self.live.loop_seconds = env_u64("LIVE_LOOP_SECONDS", self.live.loop_seconds);
        self.live.candle_limit = env_usize("LIVE_CANDLE_LIMIT", self.live.candle_limit);
    }

    /// Config errors fail fast at startup (spec.md §7).
    fn validate(&self) -> Result<(), ConfigError> {
        use std::str::FromStr;
        crate::domain::market::Timeframe::from_str(&self.runner.timeframe)
            .map_err(|_| ConfigError::InvalidTimeframe(self.runner.timeframe.clone()))?;
        crate::domain::market::Timeframe::from_str(&self.live.timeframe)
            .map_err(|_| ConfigError::InvalidTimeframe(self.live.timeframe.clone()))?;

        if self.risk.stop_atr_mult <= 0.0 || self.risk.take_atr_mult <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.stop_atr_mult/take_atr_mult".to_string(),
                reason: "ATR multipliers must be positive".to_string(),
            });
        }
        if self.risk.max_positions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "risk.max_positions".to_string(),
                reason: "must allow at least one open position".to_string(),
            });
        }
        if !matches!(self.execution.entry_on.as_str(), "close" | "next_open") {
            return Err(ConfigError::InvalidValue {
                field: "execution.entry_on".to_string(),
                reason: "must be 'close' or 'next_open'".to_string(),
            });
        }
        Ok(())
    }
}

fn env_string(suffix: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn env_bool(suffix: &str, default: bool) -> bool {
    env_string(suffix).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(suffix: &str, default: f64) -> f64 {
    env_string(suffix).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(suffix: &str, default: usize) -> usize {
    env_string(suffix).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(suffix: &str, default: u32) -> u32 {
    env_string(suffix).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(suffix: &str, default: u64) -> u64 {
    env_string(suffix).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(suffix: &str, default: i32) -> i32 {
    env_string(suffix).and_then(|v| v.parse().ok()).unwrap_or(default)
}
