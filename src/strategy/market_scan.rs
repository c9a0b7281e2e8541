use super::{Context, Decision, Strategy};
use crate::indicators::{group_share, rank_digits, ranks_by_digit};
use crate::models::{BatchOutcome, ContractType, Digit, Entry};
use crate::risk::{MarketLocks, ProfitLimits, RiskPolicy};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;

/// Minimum gap between two checks of the same qualifying symbol
pub const CHECK_COOLDOWN_MS: i64 = 2000;
/// Minimum gap between two full scans
pub const SCAN_INTERVAL_MS: i64 = 3000;

const LOW_DIGITS: [Digit; 2] = [0, 1];
const HIGH_DIGITS: [Digit; 8] = [2, 3, 4, 5, 6, 7, 8, 9];
const MAX_LOW_SHARE: f64 = 20.0;
const MIN_HIGH_SHARE: f64 = 80.0;

/// A market that passed every condition
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub symbol: String,
    pub share01: f64,
    pub share29: f64,
    pub rank0: usize,
    pub rank1: usize,
    /// The rare low digit that qualified the market
    pub entry_digit: Digit,
    /// `share29 - share01`, higher is better
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanMiss {
    Insufficient { have: usize, need: usize },
    LowDigitsTooCommon(f64),
    HighDigitsTooRare(f64),
    RankOutOfBand { rank0: usize, rank1: usize },
}

impl fmt::Display for ScanMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMiss::Insufficient { have, need } => write!(f, "insufficient data ({}/{})", have, need),
            ScanMiss::LowDigitsTooCommon(share) => {
                write!(f, "0+1 share {:.2}% (need < {}%)", share, MAX_LOW_SHARE)
            }
            ScanMiss::HighDigitsTooRare(share) => {
                write!(f, "2-9 share {:.2}% (need > {}%)", share, MIN_HIGH_SHARE)
            }
            ScanMiss::RankOutOfBand { rank0, rank1 } => {
                write!(f, "digit 0 rank {}, digit 1 rank {} (need 6-9)", rank0, rank1)
            }
        }
    }
}

/// Check one market's digits against the scan conditions
pub fn evaluate_market(
    symbol: &str,
    digits: &[Digit],
    window: usize,
    min_digits: usize,
) -> Result<ScanResult, ScanMiss> {
    if digits.len() < min_digits || digits.is_empty() {
        return Err(ScanMiss::Insufficient {
            have: digits.len(),
            need: min_digits,
        });
    }
    let insufficient = || ScanMiss::Insufficient {
        have: digits.len(),
        need: min_digits,
    };

    let share01 = group_share(digits, &LOW_DIGITS, window).ok_or_else(insufficient)?;
    let share29 = group_share(digits, &HIGH_DIGITS, window).ok_or_else(insufficient)?;
    if share01 >= MAX_LOW_SHARE {
        return Err(ScanMiss::LowDigitsTooCommon(share01));
    }
    if share29 <= MIN_HIGH_SHARE {
        return Err(ScanMiss::HighDigitsTooRare(share29));
    }

    let ranking = rank_digits(digits, window).ok_or_else(insufficient)?;
    let ranks = ranks_by_digit(&ranking);
    let (rank0, rank1) = (ranks[0], ranks[1]);
    let in_band = |rank: usize| (6..=9).contains(&rank);
    let entry_digit = if in_band(rank0) {
        0
    } else if in_band(rank1) {
        1
    } else {
        return Err(ScanMiss::RankOutOfBand { rank0, rank1 });
    };

    Ok(ScanResult {
        symbol: symbol.to_string(),
        share01,
        share29,
        rank0,
        rank1,
        entry_digit,
        score: share29 - share01,
    })
}

/// Trades Over 1 on whichever market currently shows the rarest low digits
///
/// Runs under per-market locks: a market stops being traded once its own
/// P/L turns positive, and the strategy stops when every market is locked.
#[derive(Debug, Clone)]
pub struct MarketScanStrategy {
    universe: Vec<String>,
    window: usize,
    min_digits: usize,
    last_scan: Option<DateTime<Utc>>,
    last_check: HashMap<String, DateTime<Utc>>,
}

impl MarketScanStrategy {
    pub fn new(universe: Vec<String>, window: usize, min_digits: usize) -> Self {
        Self {
            universe,
            window,
            min_digits,
            last_scan: None,
            last_check: HashMap::new(),
        }
    }

    fn markets(&self, ctx: &Context<'_>) -> Vec<String> {
        if self.universe.is_empty() {
            ctx.store.symbols()
        } else {
            self.universe.clone()
        }
    }

    fn cooling_down(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        self.last_check
            .get(symbol)
            .is_some_and(|&at| now - at < Duration::milliseconds(CHECK_COOLDOWN_MS))
    }

    /// Rank every eligible market; best first
    pub fn scan(&mut self, ctx: &Context<'_>) -> Vec<ScanResult> {
        let mut qualifying = Vec::new();
        let mut rejected = 0;

        for symbol in self.markets(ctx) {
            if ctx.locked.contains(&symbol) || self.cooling_down(&symbol, ctx.now) {
                continue;
            }
            let digits = ctx.store.snapshot(&symbol);
            if digits.len() < self.min_digits {
                continue;
            }

            match evaluate_market(&symbol, &digits, self.window, self.min_digits) {
                Ok(result) => {
                    self.last_check.insert(symbol, ctx.now);
                    qualifying.push(result);
                }
                Err(miss) => {
                    rejected += 1;
                    tracing::debug!(symbol = %symbol, "✗ {}", miss);
                }
            }
        }

        qualifying.sort_by(|a, b| b.score.total_cmp(&a.score));
        tracing::debug!(qualifying = qualifying.len(), rejected, "Market scan complete");
        qualifying
    }

    fn all_locked(&self, ctx: &Context<'_>) -> bool {
        let markets = self.markets(ctx);
        !markets.is_empty() && markets.iter().all(|m| ctx.locked.contains(m))
    }
}

impl Strategy for MarketScanStrategy {
    fn name(&self) -> &str {
        "market-scan"
    }

    fn symbols(&self) -> Vec<String> {
        self.universe.clone()
    }

    fn risk_policy(&self, _limits: ProfitLimits) -> RiskPolicy {
        RiskPolicy::PerMarket(MarketLocks::new())
    }

    fn on_start(&mut self, _ctx: &Context<'_>) -> Decision {
        self.last_scan = None;
        self.last_check.clear();
        Decision::Hold
    }

    fn on_tick(&mut self, _symbol: &str, _digit: Digit, ctx: &Context<'_>) -> Decision {
        if ctx.busy {
            return Decision::Hold;
        }
        if self.all_locked(ctx) {
            return Decision::Stop("all markets locked in profit".to_string());
        }
        if self
            .last_scan
            .is_some_and(|at| ctx.now - at < Duration::milliseconds(SCAN_INTERVAL_MS))
        {
            return Decision::Hold;
        }
        self.last_scan = Some(ctx.now);

        let Some(best) = self.scan(ctx).into_iter().next() else {
            return Decision::Hold;
        };
        tracing::info!(
            symbol = %best.symbol,
            share01 = format!("{:.2}", best.share01),
            share29 = format!("{:.2}", best.share29),
            entry_digit = best.entry_digit,
            rank0 = best.rank0,
            rank1 = best.rank1,
            "🔍 Trading best market"
        );
        Decision::Enter(Entry::single(best.symbol, ContractType::DigitOver, 1))
    }

    fn on_batch_settled(&mut self, _outcome: &BatchOutcome, ctx: &Context<'_>) -> Decision {
        if self.all_locked(ctx) {
            return Decision::Stop("all markets locked in profit".to_string());
        }
        Decision::Hold
    }
}
