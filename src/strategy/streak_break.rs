use super::{Context, Decision, Strategy};
use crate::models::{BatchOutcome, ContractType, Digit, Entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakSide {
    /// Run of digits 0 and 1, answered with Over 1
    Below2,
    /// Run of digits 8 and 9, answered with Under 8
    Above7,
}

impl StreakSide {
    fn extends(&self, digit: Digit) -> bool {
        match self {
            StreakSide::Below2 => digit < 2,
            StreakSide::Above7 => digit > 7,
        }
    }

    fn contract(&self) -> (ContractType, Digit) {
        match self {
            StreakSide::Below2 => (ContractType::DigitOver, 1),
            StreakSide::Above7 => (ContractType::DigitUnder, 8),
        }
    }
}

/// Waits for an extreme-digit run to break, then trades against it
///
/// A run longer than one that ends on an opposite digit starts the active
/// phase. While active the strategy re-enters after every settlement until
/// the session limits stop it; runs seen during that phase are ignored.
#[derive(Debug, Clone)]
pub struct StreakBreakStrategy {
    side: StreakSide,
    symbol: String,
    run: usize,
    active: bool,
}

impl StreakBreakStrategy {
    pub fn new(side: StreakSide, symbol: impl Into<String>) -> Self {
        Self {
            side,
            symbol: symbol.into(),
            run: 0,
            active: false,
        }
    }

    pub fn run(&self) -> usize {
        self.run
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn entry(&self) -> Entry {
        let (contract_type, barrier) = self.side.contract();
        Entry::single(self.symbol.clone(), contract_type, barrier)
    }
}

impl Strategy for StreakBreakStrategy {
    fn name(&self) -> &str {
        match self.side {
            StreakSide::Below2 => "streak-over1",
            StreakSide::Above7 => "streak-under8",
        }
    }

    fn symbols(&self) -> Vec<String> {
        vec![self.symbol.clone()]
    }

    fn on_start(&mut self, _ctx: &Context<'_>) -> Decision {
        self.run = 0;
        self.active = false;
        Decision::Hold
    }

    fn on_tick(&mut self, symbol: &str, digit: Digit, _ctx: &Context<'_>) -> Decision {
        if symbol != self.symbol || self.active {
            return Decision::Hold;
        }

        if self.side.extends(digit) {
            self.run += 1;
            return Decision::Hold;
        }

        let broken = self.run;
        self.run = 0;
        if broken > 1 {
            tracing::info!(symbol, run = broken, digit, "Streak broken, entering");
            self.active = true;
            return Decision::Enter(self.entry());
        }
        Decision::Hold
    }

    fn on_batch_settled(&mut self, _outcome: &BatchOutcome, ctx: &Context<'_>) -> Decision {
        if !self.active || ctx.busy {
            return Decision::Hold;
        }
        Decision::Enter(self.entry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::DigitStore;
    use chrono::Utc;

    fn feed(strategy: &mut StreakBreakStrategy, digits: &[Digit]) -> Vec<Decision> {
        let store = DigitStore::default();
        let ctx = Context {
            store: &store,
            busy: false,
            locked: &[],
            now: Utc::now(),
        };
        digits
            .iter()
            .map(|&d| strategy.on_tick("R_100", d, &ctx))
            .collect()
    }

    #[test]
    fn test_single_low_digit_does_not_trigger() {
        let mut strategy = StreakBreakStrategy::new(StreakSide::Below2, "R_100");
        let decisions = feed(&mut strategy, &[5, 1, 6, 0, 7]);
        assert!(decisions.iter().all(|d| *d == Decision::Hold));
        assert!(!strategy.is_active());
    }

    #[test]
    fn test_broken_run_enters_over1() {
        let mut strategy = StreakBreakStrategy::new(StreakSide::Below2, "R_100");
        let decisions = feed(&mut strategy, &[0, 1, 1, 4]);
        assert_eq!(
            decisions[3],
            Decision::Enter(Entry::single("R_100", ContractType::DigitOver, 1))
        );
        assert!(strategy.is_active());
        assert_eq!(strategy.run(), 0);

        // further runs are ignored while active
        let later = feed(&mut strategy, &[0, 0, 5]);
        assert!(later.iter().all(|d| *d == Decision::Hold));
    }

    #[test]
    fn test_under8_side() {
        let mut strategy = StreakBreakStrategy::new(StreakSide::Above7, "R_100");
        let decisions = feed(&mut strategy, &[9, 8, 7]);
        assert_eq!(
            decisions[2],
            Decision::Enter(Entry::single("R_100", ContractType::DigitUnder, 8))
        );
    }

    #[test]
    fn test_reenters_after_settlement_only_when_active() {
        let store = DigitStore::default();
        let ctx = Context {
            store: &store,
            busy: false,
            locked: &[],
            now: Utc::now(),
        };
        let outcome = BatchOutcome {
            batch_id: uuid::Uuid::new_v4(),
            symbol: "R_100".to_string(),
            net: rust_decimal::Decimal::ZERO,
            cumulative: rust_decimal::Decimal::ZERO,
            legs: Vec::new(),
            settled_at: Utc::now(),
        };

        let mut strategy = StreakBreakStrategy::new(StreakSide::Below2, "R_100");
        assert_eq!(strategy.on_batch_settled(&outcome, &ctx), Decision::Hold);

        feed(&mut strategy, &[1, 1, 3]);
        assert!(matches!(
            strategy.on_batch_settled(&outcome, &ctx),
            Decision::Enter(_)
        ));
    }
}
