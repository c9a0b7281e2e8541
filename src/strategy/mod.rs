// Trading strategy module
pub mod continuous;
pub mod market_scan;
pub mod rank_match;
pub mod streak_break;

pub use continuous::{ContinuousMode, ContinuousStrategy};
pub use market_scan::{MarketScanStrategy, ScanResult};
pub use rank_match::{RankMatchStrategy, RankStats, RankTracker};
pub use streak_break::{StreakBreakStrategy, StreakSide};

use crate::config::AnalysisConfig;
use crate::execution::lifecycle::LegSettlement;
use crate::execution::DigitStore;
use crate::models::{BatchOutcome, Digit, Entry};
use crate::risk::{ProfitLimits, RiskPolicy};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use std::fmt;

/// What a strategy wants after observing an event
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold,
    Enter(Entry),
    Stop(String),
}

/// Read-only view handed to strategy hooks
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a DigitStore,
    /// A batch is in flight or queued
    pub busy: bool,
    pub locked: &'a [String],
    pub now: DateTime<Utc>,
}

/// Base trait for all digit strategies
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// Symbols this strategy needs tick streams for
    fn symbols(&self) -> Vec<String>;

    /// Defaults to stopping on session-wide take profit or stop loss
    fn risk_policy(&self, limits: ProfitLimits) -> RiskPolicy {
        RiskPolicy::Global(limits)
    }

    fn on_start(&mut self, _ctx: &Context<'_>) -> Decision {
        Decision::Hold
    }

    fn on_tick(&mut self, symbol: &str, digit: Digit, ctx: &Context<'_>) -> Decision;

    fn on_leg_settled(&mut self, _settlement: &LegSettlement) {}

    fn on_batch_settled(&mut self, _outcome: &BatchOutcome, _ctx: &Context<'_>) -> Decision {
        Decision::Hold
    }
}

/// Strategies selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    Over1,
    Under8,
    Combo,
    RankMatch,
    StreakOver1,
    StreakUnder8,
    MarketScan,
}

impl StrategyKind {
    pub fn build(
        self,
        selected: &str,
        universe: &[String],
        analysis: &AnalysisConfig,
    ) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Over1 => Box::new(ContinuousStrategy::new(ContinuousMode::Over1, selected)),
            StrategyKind::Under8 => Box::new(ContinuousStrategy::new(ContinuousMode::Under8, selected)),
            StrategyKind::Combo => Box::new(ContinuousStrategy::new(ContinuousMode::Combo, selected)),
            StrategyKind::RankMatch => {
                Box::new(RankMatchStrategy::new(selected, analysis.rank_window))
            }
            StrategyKind::StreakOver1 => {
                Box::new(StreakBreakStrategy::new(StreakSide::Below2, selected))
            }
            StrategyKind::StreakUnder8 => {
                Box::new(StreakBreakStrategy::new(StreakSide::Above7, selected))
            }
            StrategyKind::MarketScan => Box::new(MarketScanStrategy::new(
                universe.to_vec(),
                analysis.scan_window,
                analysis.scan_min_digits,
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Over1 => "over1",
            StrategyKind::Under8 => "under8",
            StrategyKind::Combo => "combo",
            StrategyKind::RankMatch => "rank-match",
            StrategyKind::StreakOver1 => "streak-over1",
            StrategyKind::StreakUnder8 => "streak-under8",
            StrategyKind::MarketScan => "market-scan",
        };
        f.write_str(name)
    }
}
