use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Session-wide take-profit ceiling and stop-loss floor
///
/// A zero value disables that side. The stop loss is compared by absolute
/// value, so `10` and `-10` both mean "stop at -10".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitLimits {
    pub target_profit: Decimal,
    pub stop_loss: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitBreach {
    TargetProfit { pnl: Decimal, target: Decimal },
    StopLoss { pnl: Decimal, floor: Decimal },
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBreach::TargetProfit { pnl, target } => {
                write!(f, "target profit reached: {} >= {}", pnl, target)
            }
            LimitBreach::StopLoss { pnl, floor } => {
                write!(f, "stop loss hit: {} <= {}", pnl, floor)
            }
        }
    }
}

impl ProfitLimits {
    pub fn new(target_profit: Decimal, stop_loss: Decimal) -> Self {
        Self {
            target_profit,
            stop_loss,
        }
    }

    pub fn check(&self, pnl: Decimal) -> Result<(), LimitBreach> {
        if self.target_profit > Decimal::ZERO && pnl >= self.target_profit {
            return Err(LimitBreach::TargetProfit {
                pnl,
                target: self.target_profit,
            });
        }

        let floor = -self.stop_loss.abs();
        if !self.stop_loss.is_zero() && pnl <= floor {
            return Err(LimitBreach::StopLoss { pnl, floor });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockChange {
    Locked,
    Unlocked,
    Unchanged,
}

/// Independent per-market P/L; a market locks once it turns net positive
#[derive(Debug, Clone, Default)]
pub struct MarketLocks {
    pnl: HashMap<String, Decimal>,
    locked: BTreeSet<String>,
}

impl MarketLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book a settled result against `symbol`
    pub fn record(&mut self, symbol: &str, profit: Decimal) -> LockChange {
        let pnl = self.pnl.entry(symbol.to_string()).or_default();
        *pnl += profit;
        let pnl = *pnl;

        if pnl > Decimal::ZERO {
            if self.locked.insert(symbol.to_string()) {
                tracing::info!(symbol, pnl = %pnl, "🔒 Market locked in profit");
                return LockChange::Locked;
            }
            LockChange::Unchanged
        } else if self.locked.remove(symbol) {
            // a locked market can only be non-positive if it was booked out of order
            tracing::warn!(symbol, pnl = %pnl, "Market unlocked, P/L no longer positive");
            LockChange::Unlocked
        } else {
            LockChange::Unchanged
        }
    }

    pub fn is_locked(&self, symbol: &str) -> bool {
        self.locked.contains(symbol)
    }

    pub fn locked(&self) -> Vec<String> {
        self.locked.iter().cloned().collect()
    }

    pub fn pnl(&self, symbol: &str) -> Decimal {
        self.pnl.get(symbol).copied().unwrap_or_default()
    }

    /// True when every symbol in `universe` is locked (and the universe is non-empty)
    pub fn all_locked(&self, universe: &[String]) -> bool {
        !universe.is_empty() && universe.iter().all(|s| self.locked.contains(s))
    }
}

/// How a lifecycle decides whether to keep trading
#[derive(Debug, Clone)]
pub enum RiskPolicy {
    /// Stop the whole strategy once cumulative P/L crosses either limit
    Global(ProfitLimits),
    /// Lock each market separately once its own P/L is positive
    PerMarket(MarketLocks),
}

impl RiskPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            RiskPolicy::Global(_) => "global",
            RiskPolicy::PerMarket(_) => "per-market",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_disabled_limits_never_trip() {
        let limits = ProfitLimits::default();
        assert!(limits.check(dec!(1000000)).is_ok());
        assert!(limits.check(dec!(-1000000)).is_ok());
    }

    #[test]
    fn test_target_profit() {
        let limits = ProfitLimits::new(dec!(5), dec!(0));
        assert!(limits.check(dec!(4.99)).is_ok());
        assert_eq!(
            limits.check(dec!(5)),
            Err(LimitBreach::TargetProfit {
                pnl: dec!(5),
                target: dec!(5)
            })
        );
    }

    #[test]
    fn test_stop_loss_uses_absolute_value() {
        for sl in [dec!(10), dec!(-10)] {
            let limits = ProfitLimits::new(dec!(0), sl);
            assert!(limits.check(dec!(-9)).is_ok());
            assert_eq!(
                limits.check(dec!(-12)),
                Err(LimitBreach::StopLoss {
                    pnl: dec!(-12),
                    floor: dec!(-10)
                })
            );
        }
    }

    #[test]
    fn test_breach_is_monotonic_past_floor() {
        let limits = ProfitLimits::new(dec!(0), dec!(10));
        let mut pnl = dec!(-10);
        while pnl > dec!(-20) {
            assert!(limits.check(pnl).is_err());
            pnl -= dec!(0.5);
        }
    }

    #[test]
    fn test_market_locks_on_positive() {
        let mut locks = MarketLocks::new();
        assert_eq!(locks.record("R_10", dec!(-1)), LockChange::Unchanged);
        assert!(!locks.is_locked("R_10"));

        assert_eq!(locks.record("R_10", dec!(0.5)), LockChange::Unchanged);
        assert_eq!(locks.pnl("R_10"), dec!(-0.5));

        assert_eq!(locks.record("R_10", dec!(0.95)), LockChange::Locked);
        assert!(locks.is_locked("R_10"));
        assert_eq!(locks.pnl("R_10"), dec!(0.45));
        assert!(!locks.is_locked("R_25"));
    }

    #[test]
    fn test_market_unlock_when_booked_negative() {
        let mut locks = MarketLocks::new();
        locks.record("R_10", dec!(1));
        assert_eq!(locks.record("R_10", dec!(-2)), LockChange::Unlocked);
        assert!(!locks.is_locked("R_10"));
    }

    #[test]
    fn test_all_locked() {
        let mut locks = MarketLocks::new();
        let universe = vec!["R_10".to_string(), "R_25".to_string()];
        assert!(!locks.all_locked(&universe));
        assert!(!locks.all_locked(&[]));

        locks.record("R_10", dec!(1));
        assert!(!locks.all_locked(&universe));
        locks.record("R_25", dec!(1));
        assert!(locks.all_locked(&universe));
    }
}
