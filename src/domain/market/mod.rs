pub mod btc_state;
pub mod quality;
pub mod regime;
pub mod timeframe;

pub use btc_state::BtcState;
pub use quality::Quality;
pub use regime::Regime;
pub use timeframe::Timeframe;
