use super::{Context, Decision, Strategy};
use crate::execution::lifecycle::LegSettlement;
use crate::indicators::{rank_digits, RankRecord};
use crate::models::{ContractType, Digit, Entry, LegSpec, DIGIT_COUNT};
use rust_decimal::Decimal;

/// Number of top-ranked digits covered by one batch
pub const MATCH_LEGS: usize = 8;

/// Live results for one frequency rank
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RankStats {
    pub record: RankRecord,
    /// Digit currently holding this rank
    pub current_digit: Option<Digit>,
    /// Digit of the last settled contract at this rank
    pub last_digit: Option<Digit>,
}

/// Wins and losses per frequency rank (1 = most frequent)
#[derive(Debug, Clone, Default)]
pub struct RankTracker {
    stats: [RankStats; DIGIT_COUNT],
}

impl RankTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Align the `current_digit` of each rank with a fresh ordering
    pub fn sync_digits(&mut self, ordered: &[Digit]) {
        for (stats, &digit) in self.stats.iter_mut().zip(ordered) {
            stats.current_digit = Some(digit);
        }
    }

    pub fn record(&mut self, rank: usize, digit: Digit, profit: Decimal) {
        let Some(stats) = rank.checked_sub(1).and_then(|i| self.stats.get_mut(i)) else {
            return;
        };
        if profit > Decimal::ZERO {
            stats.record.wins += 1;
        } else {
            stats.record.losses += 1;
        }
        stats.last_digit = Some(digit);
    }

    pub fn get(&self, rank: usize) -> Option<&RankStats> {
        rank.checked_sub(1).and_then(|i| self.stats.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &RankStats)> {
        self.stats.iter().enumerate().map(|(i, stats)| (i + 1, stats))
    }
}

/// Cover the top eight digits when the leader repeats
///
/// Triggers on a tick whose digit equals the current top-ranked digit. The
/// same (digit, top-8 composition) pair never fires twice in a row.
#[derive(Debug, Clone)]
pub struct RankMatchStrategy {
    symbol: String,
    window: usize,
    last_trigger: Option<(Digit, Vec<Digit>)>,
    tracker: RankTracker,
}

impl RankMatchStrategy {
    pub fn new(symbol: impl Into<String>, window: usize) -> Self {
        Self {
            symbol: symbol.into(),
            window,
            last_trigger: None,
            tracker: RankTracker::new(),
        }
    }

    fn signal(&mut self, digit: Digit, digits: &[Digit]) -> Option<Entry> {
        let ranking = rank_digits(digits, self.window)?;
        let ordered: Vec<Digit> = ranking.iter().map(|r| r.digit).collect();
        let top: Vec<Digit> = ordered.iter().take(MATCH_LEGS).copied().collect();

        let trigger = (digit, top.clone());
        if self.last_trigger.as_ref() == Some(&trigger) {
            return None;
        }
        if ordered.first() != Some(&digit) {
            return None;
        }

        self.last_trigger = Some(trigger);
        self.tracker.sync_digits(&ordered);

        let legs = top
            .iter()
            .enumerate()
            .map(|(i, &d)| LegSpec::ranked(ContractType::DigitMatch, d, i + 1))
            .collect();
        Some(Entry::new(self.symbol.clone(), legs))
    }
}

impl Strategy for RankMatchStrategy {
    fn name(&self) -> &str {
        "rank-match"
    }

    fn symbols(&self) -> Vec<String> {
        vec![self.symbol.clone()]
    }

    fn on_start(&mut self, ctx: &Context<'_>) -> Decision {
        self.last_trigger = None;
        if let Some(ranking) = rank_digits(&ctx.store.snapshot(&self.symbol), self.window) {
            let ordered: Vec<Digit> = ranking.iter().map(|r| r.digit).collect();
            self.tracker.sync_digits(&ordered);
            tracing::info!(symbol = %self.symbol, top = ?&ordered[..MATCH_LEGS], "Rank match armed");
        }
        Decision::Hold
    }

    fn on_tick(&mut self, symbol: &str, digit: Digit, ctx: &Context<'_>) -> Decision {
        if symbol != self.symbol {
            return Decision::Hold;
        }
        let digits = ctx.store.snapshot(symbol);
        match self.signal(digit, &digits) {
            Some(entry) => {
                tracing::info!(symbol, digit, "🎯 Leader repeated, covering top {}", MATCH_LEGS);
                Decision::Enter(entry)
            }
            None => Decision::Hold,
        }
    }

    fn on_leg_settled(&mut self, settlement: &LegSettlement) {
        if settlement.rejected {
            return;
        }
        if let Some(rank) = settlement.rank {
            self.tracker.record(rank, settlement.barrier, settlement.profit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::DigitStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn create_test_store(symbol: &str, digits: &[Digit]) -> DigitStore {
        let store = DigitStore::default();
        for &d in digits {
            store.push(symbol, d);
        }
        store
    }

    fn ctx(store: &DigitStore) -> Context<'_> {
        Context {
            store,
            busy: false,
            locked: &[],
            now: Utc::now(),
        }
    }

    #[test]
    fn test_triggers_on_top_digit_with_eight_ranked_legs() {
        // 3 leads with three hits, then 7 with two, the rest once or never
        let digits = [3, 3, 7, 3, 7, 0, 1, 2, 4, 5, 6];
        let store = create_test_store("R_100", &digits);
        let mut strategy = RankMatchStrategy::new("R_100", 1000);

        match strategy.on_tick("R_100", 3, &ctx(&store)) {
            Decision::Enter(entry) => {
                assert_eq!(entry.legs.len(), MATCH_LEGS);
                assert_eq!(entry.legs[0], LegSpec::ranked(ContractType::DigitMatch, 3, 1));
                assert_eq!(entry.legs[1], LegSpec::ranked(ContractType::DigitMatch, 7, 2));
                assert_eq!(entry.legs[2], LegSpec::ranked(ContractType::DigitMatch, 0, 3));
            }
            other => panic!("expected entry, got {:?}", other),
        }
        assert_eq!(strategy.tracker.get(1).unwrap().current_digit, Some(3));
    }

    #[test]
    fn test_non_leader_digit_holds() {
        let store = create_test_store("R_100", &[3, 3, 7, 1, 2]);
        let mut strategy = RankMatchStrategy::new("R_100", 1000);
        assert_eq!(strategy.on_tick("R_100", 7, &ctx(&store)), Decision::Hold);
        assert_eq!(strategy.on_tick("R_50", 3, &ctx(&store)), Decision::Hold);
    }

    #[test]
    fn test_same_digit_and_composition_debounced() {
        let store = create_test_store("R_100", &[5, 5, 5, 1, 2, 3]);
        let mut strategy = RankMatchStrategy::new("R_100", 1000);

        assert!(matches!(strategy.on_tick("R_100", 5, &ctx(&store)), Decision::Enter(_)));
        assert_eq!(strategy.on_tick("R_100", 5, &ctx(&store)), Decision::Hold);

        // 9 enters the top eight
        store.push("R_100", 9);
        assert!(matches!(strategy.on_tick("R_100", 5, &ctx(&store)), Decision::Enter(_)));
    }

    #[test]
    fn test_empty_buffer_holds() {
        let store = DigitStore::default();
        let mut strategy = RankMatchStrategy::new("R_100", 1000);
        assert_eq!(strategy.on_tick("R_100", 0, &ctx(&store)), Decision::Hold);
    }

    #[test]
    fn test_tracker_records_by_rank() {
        let mut tracker = RankTracker::new();
        tracker.record(1, 3, dec!(8.5));
        tracker.record(1, 3, dec!(-1));
        tracker.record(8, 6, dec!(-1));
        tracker.record(0, 6, dec!(5));
        tracker.record(11, 6, dec!(5));

        let top = tracker.get(1).unwrap();
        assert_eq!(top.record.wins, 1);
        assert_eq!(top.record.losses, 1);
        assert_eq!(top.last_digit, Some(3));
        assert_eq!(tracker.get(8).unwrap().record.losses, 1);
        assert_eq!(tracker.iter().map(|(_, s)| s.record.total()).sum::<usize>(), 3);
    }
}
