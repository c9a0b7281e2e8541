use crate::models::{Digit, DIGIT_COUNT};
use serde::Serialize;

/// One entry of a frequency ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RankedDigit {
    pub digit: Digit,
    pub count: usize,
    /// 1-based position in the ranking
    pub rank: usize,
}

/// Histogram of digits, ignoring values outside `0..=9`
pub fn digit_counts(digits: &[Digit]) -> [usize; DIGIT_COUNT] {
    let mut counts = [0; DIGIT_COUNT];
    for &digit in digits {
        if let Some(slot) = counts.get_mut(digit as usize) {
            *slot += 1;
        }
    }
    counts
}

/// Order all ten digits by count, higher first, ties broken toward the lower digit
pub fn rank_counts(counts: &[usize; DIGIT_COUNT]) -> Vec<RankedDigit> {
    let mut ordered: Vec<(Digit, usize)> = counts
        .iter()
        .enumerate()
        .map(|(digit, &count)| (digit as Digit, count))
        .collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (digit, count))| RankedDigit {
            digit,
            count,
            rank: i + 1,
        })
        .collect()
}

/// Rank the newest `window` digits of a snapshot
///
/// Returns `None` on an empty snapshot or a zero window.
pub fn rank_digits(digits: &[Digit], window: usize) -> Option<Vec<RankedDigit>> {
    if digits.is_empty() || window == 0 {
        return None;
    }
    let start = digits.len().saturating_sub(window);
    Some(rank_counts(&digit_counts(&digits[start..])))
}

/// The first `n` digits of the ranking
pub fn top_digits(digits: &[Digit], window: usize, n: usize) -> Option<Vec<Digit>> {
    rank_digits(digits, window).map(|ranking| ranking.iter().take(n).map(|r| r.digit).collect())
}

/// Rank position (1-based) of every digit, indexed by digit
pub fn ranks_by_digit(ranking: &[RankedDigit]) -> [usize; DIGIT_COUNT] {
    let mut ranks = [0; DIGIT_COUNT];
    for entry in ranking {
        if let Some(slot) = ranks.get_mut(entry.digit as usize) {
            *slot = entry.rank;
        }
    }
    ranks
}
