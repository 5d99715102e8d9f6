use crate::domain::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A candle interval parsed from a string of the form `Nm` / `Nh` / `Nd`.
///
/// Unlike a fixed enum of named intervals, this keeps the multiplier so
/// arbitrary values (`3m`, `2h`, `90m`) round-trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timeframe {
    count: u32,
    unit: Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum Unit {
    Minute,
    Hour,
    Day,
}

impl Unit {
    fn ms(self) -> i64 {
        match self {
            Unit::Minute => 60_000,
            Unit::Hour => 3_600_000,
            Unit::Day => 86_400_000,
        }
    }

    fn suffix(self) -> char {
        match self {
            Unit::Minute => 'm',
            Unit::Hour => 'h',
            Unit::Day => 'd',
        }
    }
}

impl Timeframe {
    pub fn to_ms(&self) -> i64 {
        self.count as i64 * self.unit.ms()
    }
}

impl FromStr for Timeframe {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() < 2 {
            return Err(ConfigError::InvalidTimeframe(s.to_string()));
        }
        let (digits, suffix) = s.split_at(s.len() - 1);
        let count: u32 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidTimeframe(s.to_string()))?;
        if count == 0 {
            return Err(ConfigError::InvalidTimeframe(s.to_string()));
        }
        let unit = match suffix.to_lowercase().as_str() {
            "m" => Unit::Minute,
            "h" => Unit::Hour,
            "d" => Unit::Day,
            _ => return Err(ConfigError::InvalidTimeframe(s.to_string())),
        };
        Ok(Timeframe { count, unit })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}
