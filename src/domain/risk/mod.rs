pub mod clusters;
pub mod sizing;
pub mod state;

pub use state::{AdaptiveState, RiskLedger};
