// Risk management module
pub mod limits;

pub use limits::{LimitBreach, LockChange, MarketLocks, ProfitLimits, RiskPolicy};
