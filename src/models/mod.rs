use crate::error::LifecycleError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Last significant decimal of a quote, always in `0..=9`
pub type Digit = u8;

/// Number of distinct digits tracked by the frequency model
pub const DIGIT_COUNT: usize = 10;

/// One timestamped price observation for an instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub quote: Decimal,
    pub epoch: i64,
}

impl Tick {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.epoch, 0)
    }
}

/// Digit contract kinds placed by the strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractType {
    #[serde(rename = "DIGITMATCH")]
    DigitMatch,
    #[serde(rename = "DIGITOVER")]
    DigitOver,
    #[serde(rename = "DIGITUNDER")]
    DigitUnder,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::DigitMatch => "DIGITMATCH",
            ContractType::DigitOver => "DIGITOVER",
            ContractType::DigitUnder => "DIGITUNDER",
        }
    }

    /// Whether a settled exit digit wins against `barrier`
    pub fn wins(&self, barrier: Digit, exit_digit: Digit) -> bool {
        match self {
            ContractType::DigitMatch => exit_digit == barrier,
            ContractType::DigitOver => exit_digit > barrier,
            ContractType::DigitUnder => exit_digit < barrier,
        }
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContractType::DigitMatch => "Match",
            ContractType::DigitOver => "Over",
            ContractType::DigitUnder => "Under",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegStatus {
    Pending,
    Open,
    Done,
}

/// One elementary contract request taken to settlement
///
/// Transitions only move forward: `Pending -> Open -> Done`. A leg the
/// venue rejected before purchase goes straight from `Pending` to `Done`
/// with zero profit and the rejection reason recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub symbol: String,
    pub contract_type: ContractType,
    pub barrier: Digit,
    pub rank: Option<usize>,
    pub status: LegStatus,
    pub proposal_id: Option<String>,
    pub contract_id: Option<u64>,
    pub buy_price: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub rejection: Option<String>,
}

impl Leg {
    pub fn new(
        symbol: impl Into<String>,
        contract_type: ContractType,
        barrier: Digit,
        rank: Option<usize>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            contract_type,
            barrier,
            rank,
            status: LegStatus::Pending,
            proposal_id: None,
            contract_id: None,
            buy_price: None,
            profit: None,
            rejection: None,
        }
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.contract_type, self.barrier)
    }

    pub fn is_done(&self) -> bool {
        self.status == LegStatus::Done
    }

    /// Bind the purchased contract (buy acknowledgment)
    pub fn open(&mut self, contract_id: u64, buy_price: Option<Decimal>) -> Result<(), LifecycleError> {
        self.transition(LegStatus::Open)?;
        self.contract_id = Some(contract_id);
        self.buy_price = buy_price;
        Ok(())
    }

    /// Record realized profit; terminal
    pub fn settle(&mut self, profit: Decimal) -> Result<(), LifecycleError> {
        self.transition(LegStatus::Done)?;
        self.profit = Some(profit);
        Ok(())
    }

    /// Close a leg the venue refused before any contract existed
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), LifecycleError> {
        if self.status != LegStatus::Pending {
            return Err(LifecycleError::IllegalTransition {
                from: self.status,
                to: LegStatus::Done,
            });
        }
        self.status = LegStatus::Done;
        self.profit = Some(Decimal::ZERO);
        self.rejection = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, to: LegStatus) -> Result<(), LifecycleError> {
        let allowed = matches!(
            (self.status, to),
            (LegStatus::Pending, LegStatus::Open) | (LegStatus::Open, LegStatus::Done)
        );
        if !allowed {
            return Err(LifecycleError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// A set of legs that settle as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub symbol: String,
    pub legs: Vec<Leg>,
    pub created_at: DateTime<Utc>,
    settled: bool,
}

impl Batch {
    pub fn new(symbol: impl Into<String>, legs: Vec<Leg>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            legs,
            created_at: Utc::now(),
            settled: false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn all_done(&self) -> bool {
        self.legs.iter().all(Leg::is_done)
    }

    pub fn net_profit(&self) -> Decimal {
        self.legs.iter().filter_map(|leg| leg.profit).sum()
    }

    /// Flip `settled` once every leg is done; returns the net only on that flip
    pub fn try_settle(&mut self) -> Option<Decimal> {
        if self.settled || !self.all_done() {
            return None;
        }
        self.settled = true;
        Some(self.net_profit())
    }

    /// Contracts bought but not yet settled
    pub fn open_contracts(&self) -> impl Iterator<Item = u64> + '_ {
        self.legs
            .iter()
            .filter(|leg| leg.status == LegStatus::Open)
            .filter_map(|leg| leg.contract_id)
    }
}

/// Shape of one leg a strategy asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegSpec {
    pub contract_type: ContractType,
    pub barrier: Digit,
    pub rank: Option<usize>,
}

impl LegSpec {
    pub fn new(contract_type: ContractType, barrier: Digit) -> Self {
        Self {
            contract_type,
            barrier,
            rank: None,
        }
    }

    pub fn ranked(contract_type: ContractType, barrier: Digit, rank: usize) -> Self {
        Self {
            contract_type,
            barrier,
            rank: Some(rank),
        }
    }
}

/// A trading signal: legs to place together on one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub symbol: String,
    pub legs: Vec<LegSpec>,
}

impl Entry {
    pub fn new(symbol: impl Into<String>, legs: Vec<LegSpec>) -> Self {
        Self {
            symbol: symbol.into(),
            legs,
        }
    }

    pub fn single(symbol: impl Into<String>, contract_type: ContractType, barrier: Digit) -> Self {
        Self::new(symbol, vec![LegSpec::new(contract_type, barrier)])
    }

    pub fn into_batch(self) -> Batch {
        let legs = self
            .legs
            .iter()
            .map(|spec| Leg::new(self.symbol.clone(), spec.contract_type, spec.barrier, spec.rank))
            .collect();
        Batch::new(self.symbol, legs)
    }
}

/// Opaque metadata echoed back by the venue on every response to a leg request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegToken {
    pub owner: String,
    pub batch: Uuid,
    pub leg: usize,
}

/// Summary kept after a batch settles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub symbol: String,
    pub net: Decimal,
    pub cumulative: Decimal,
    pub legs: Vec<LegOutcome>,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegOutcome {
    pub label: String,
    pub rank: Option<usize>,
    pub contract_id: Option<u64>,
    pub profit: Decimal,
    pub rejected: bool,
}

impl BatchOutcome {
    pub fn from_batch(batch: &Batch, net: Decimal, cumulative: Decimal) -> Self {
        Self {
            batch_id: batch.id,
            symbol: batch.symbol.clone(),
            net,
            cumulative,
            legs: batch
                .legs
                .iter()
                .map(|leg| LegOutcome {
                    label: leg.label(),
                    rank: leg.rank,
                    contract_id: leg.contract_id,
                    profit: leg.profit.unwrap_or_default(),
                    rejected: leg.rejection.is_some(),
                })
                .collect(),
            settled_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn create_test_leg(barrier: Digit) -> Leg {
        Leg::new("R_100", ContractType::DigitOver, barrier, None)
    }

    #[test]
    fn test_leg_forward_transitions() {
        let mut leg = create_test_leg(1);
        assert_eq!(leg.status, LegStatus::Pending);

        leg.open(42, Some(dec!(10))).unwrap();
        assert_eq!(leg.status, LegStatus::Open);
        assert_eq!(leg.contract_id, Some(42));

        leg.settle(dec!(0.95)).unwrap();
        assert!(leg.is_done());
        assert_eq!(leg.profit, Some(dec!(0.95)));
    }

    #[test]
    fn test_leg_done_is_immutable() {
        let mut leg = create_test_leg(1);
        leg.open(7, None).unwrap();
        leg.settle(dec!(-1)).unwrap();

        assert!(leg.settle(dec!(5)).is_err());
        assert!(leg.open(8, None).is_err());
        assert!(leg.reject("late").is_err());
        assert_eq!(leg.profit, Some(dec!(-1)));
        assert_eq!(leg.contract_id, Some(7));
    }

    #[test]
    fn test_leg_cannot_settle_before_open() {
        let mut leg = create_test_leg(1);
        assert!(leg.settle(dec!(1)).is_err());
        assert_eq!(leg.status, LegStatus::Pending);
    }

    #[test]
    fn test_batch_settles_exactly_once() {
        let mut batch = Batch::new("R_100", vec![create_test_leg(5), create_test_leg(4)]);
        assert_eq!(batch.try_settle(), None);

        batch.legs[0].open(1, None).unwrap();
        batch.legs[0].settle(dec!(5.00)).unwrap();
        assert_eq!(batch.try_settle(), None);
        assert!(!batch.is_settled());

        batch.legs[1].open(2, None).unwrap();
        batch.legs[1].settle(dec!(-3.20)).unwrap();
        assert_eq!(batch.try_settle(), Some(dec!(1.80)));
        assert!(batch.is_settled());
        assert_eq!(batch.try_settle(), None);
    }

    #[test]
    fn test_rejected_leg_counts_as_zero() {
        let mut batch = Batch::new("R_100", vec![create_test_leg(5), create_test_leg(4)]);
        batch.legs[0].reject("ContractBuyValidationError").unwrap();
        batch.legs[1].open(2, None).unwrap();
        batch.legs[1].settle(dec!(0.5)).unwrap();

        assert_eq!(batch.try_settle(), Some(dec!(0.5)));
    }

    #[test]
    fn test_contract_type_wins() {
        assert!(ContractType::DigitOver.wins(1, 2));
        assert!(!ContractType::DigitOver.wins(1, 1));
        assert!(ContractType::DigitUnder.wins(8, 7));
        assert!(!ContractType::DigitUnder.wins(8, 8));
        assert!(ContractType::DigitMatch.wins(3, 3));
        assert!(!ContractType::DigitMatch.wins(3, 4));
    }

    #[test]
    fn test_leg_label() {
        let leg = Leg::new("R_50", ContractType::DigitUnder, 8, None);
        assert_eq!(leg.label(), "Under 8");
    }
}
