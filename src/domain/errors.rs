use thiserror::Error;

/// Configuration-time failures. Always fail fast at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid timeframe '{0}': expected Nm / Nh / Nd")]
    InvalidTimeframe(String),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("missing required section '{0}'")]
    MissingSection(String),
}

/// Core invariant violations. These indicate a bug in the control loop itself,
/// never a bad market condition, and should fail fast and log.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error("LONG trade stop {stop} is not below entry {entry}")]
    LongStopAboveEntry { entry: String, stop: String },

    #[error("SHORT trade stop {stop} is not above entry {entry}")]
    ShortStopBelowEntry { entry: String, stop: String },

    #[error("attempted to close trade {id} which is not OPEN")]
    CloseNonOpenTrade { id: String },

    #[error("duplicate signal for symbol={symbol} timeframe={timeframe} signal_time_ms={signal_time_ms}")]
    DuplicateSignal {
        symbol: String,
        timeframe: String,
        signal_time_ms: i64,
    },
}
