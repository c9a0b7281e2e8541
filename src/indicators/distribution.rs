use super::ranking::{digit_counts, rank_counts};
use crate::models::{Digit, DIGIT_COUNT};
use serde::Serialize;

/// Windows reported by the rank back-analysis
pub const RANK_WINDOWS: [usize; 4] = [50, 200, 600, 1000];

/// Percentage of the newest `window` digits that fall in `group`
pub fn group_share(digits: &[Digit], group: &[Digit], window: usize) -> Option<f64> {
    let start = digits.len().saturating_sub(window);
    let slice = &digits[start..];
    if slice.is_empty() {
        return None;
    }
    let hits = slice.iter().filter(|&&d| group.contains(&d)).count();
    Some(hits as f64 / slice.len() as f64 * 100.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RankRecord {
    pub wins: usize,
    pub losses: usize,
}

impl RankRecord {
    pub fn total(&self) -> usize {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.wins as f64 / total as f64 * 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankBacktest {
    /// Index 0 is rank 1
    pub ranks: Vec<RankRecord>,
    /// Top-`ranks.len()` digits over the whole window
    pub current: Vec<Digit>,
    pub observations: usize,
}

/// Replay the newest `window` digits, scoring each top-ranked digit against the next tick
///
/// Counts grow tick by tick from the window start; after each tick the
/// ranking is recomputed and rank `r` scores a win when the following digit
/// equals the digit holding that rank. Ranks still at zero count are skipped.
pub fn rank_win_rates(digits: &[Digit], window: usize, top: usize) -> Option<RankBacktest> {
    let start = digits.len().saturating_sub(window);
    let slice = &digits[start..];
    if slice.len() < 2 {
        return None;
    }

    let top = top.min(DIGIT_COUNT);
    let mut counts = [0usize; DIGIT_COUNT];
    let mut ranks = vec![RankRecord::default(); top];

    for pair in slice.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        let Some(slot) = counts.get_mut(current as usize) else {
            continue;
        };
        *slot += 1;

        for (record, entry) in ranks.iter_mut().zip(rank_counts(&counts)) {
            if entry.count == 0 {
                continue;
            }
            if entry.digit == next {
                record.wins += 1;
            } else {
                record.losses += 1;
            }
        }
    }

    let current = rank_counts(&digit_counts(slice))
        .into_iter()
        .take(top)
        .map(|entry| entry.digit)
        .collect();

    Some(RankBacktest {
        ranks,
        current,
        observations: slice.len(),
    })
}
