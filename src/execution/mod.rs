// Order execution and data collection module
pub mod correlation;
pub mod digit_buffer;
pub mod lifecycle;
pub mod market_feed;
pub mod runner;

pub use correlation::CorrelationMap;
pub use digit_buffer::{derive_digit, DigitStats, DigitStore};
pub use lifecycle::{
    ContractLifecycle, LegSettlement, LifecycleEvent, LifecycleSettings, SessionState, Step,
};
pub use market_feed::{tradable_symbols, FeedUpdate, MarketFeed};
pub use runner::{RunReport, StrategyRunner, Transport};
