use super::{Context, Decision, Strategy};
use crate::models::{BatchOutcome, ContractType, Digit, Entry, LegSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuousMode {
    /// DIGITOVER 1
    Over1,
    /// DIGITUNDER 8
    Under8,
    /// DIGITOVER 5 and DIGITUNDER 4 in one batch
    Combo,
}

/// Always in the market: enter at start and again after every settlement
#[derive(Debug, Clone)]
pub struct ContinuousStrategy {
    mode: ContinuousMode,
    symbol: String,
}

impl ContinuousStrategy {
    pub fn new(mode: ContinuousMode, symbol: impl Into<String>) -> Self {
        Self {
            mode,
            symbol: symbol.into(),
        }
    }

    pub fn entry(&self) -> Entry {
        let legs = match self.mode {
            ContinuousMode::Over1 => vec![LegSpec::new(ContractType::DigitOver, 1)],
            ContinuousMode::Under8 => vec![LegSpec::new(ContractType::DigitUnder, 8)],
            ContinuousMode::Combo => vec![
                LegSpec::new(ContractType::DigitOver, 5),
                LegSpec::new(ContractType::DigitUnder, 4),
            ],
        };
        Entry::new(self.symbol.clone(), legs)
    }
}

impl Strategy for ContinuousStrategy {
    fn name(&self) -> &str {
        match self.mode {
            ContinuousMode::Over1 => "over1",
            ContinuousMode::Under8 => "under8",
            ContinuousMode::Combo => "combo",
        }
    }

    fn symbols(&self) -> Vec<String> {
        vec![self.symbol.clone()]
    }

    fn on_start(&mut self, _ctx: &Context<'_>) -> Decision {
        Decision::Enter(self.entry())
    }

    fn on_tick(&mut self, _symbol: &str, _digit: Digit, _ctx: &Context<'_>) -> Decision {
        Decision::Hold
    }

    fn on_batch_settled(&mut self, _outcome: &BatchOutcome, ctx: &Context<'_>) -> Decision {
        if ctx.busy {
            return Decision::Hold;
        }
        Decision::Enter(self.entry())
    }
}
