use crate::models::{Digit, DIGIT_COUNT};
use serde::Serialize;

pub const MIN_STREAK_LOOKBACK: usize = 20;
pub const DEFAULT_STREAK_LOOKBACK: usize = 50;

/// Consecutive most-recent occurrences of `digit`
pub fn current_streak(digits: &[Digit], digit: Digit) -> usize {
    trailing_run(digits, |d| d == digit)
}

/// Length of the run at the end of `digits` whose members satisfy `pred`
pub fn trailing_run<F>(digits: &[Digit], pred: F) -> usize
where
    F: Fn(Digit) -> bool,
{
    digits.iter().rev().take_while(|&&d| pred(d)).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreakStatus {
    Hot,
    Warm,
    Normal,
    Cold,
    Missing,
}

impl StreakStatus {
    /// Classify an appearance count against the binomial expectation for `window` draws
    pub fn classify(appearances: usize, window: usize) -> Self {
        if window == 0 {
            return StreakStatus::Normal;
        }
        if appearances == 0 {
            return StreakStatus::Missing;
        }

        let n = window as f64;
        let expected = 0.1 * n;
        let std_dev = (n * 0.1 * 0.9).sqrt();
        let z = (appearances as f64 - expected) / std_dev;

        if z >= 2.8 {
            StreakStatus::Hot
        } else if z >= 1.8 {
            StreakStatus::Warm
        } else if z <= -2.0 {
            StreakStatus::Cold
        } else {
            StreakStatus::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DigitStreak {
    pub digit: Digit,
    pub appearances: usize,
    pub current_streak: usize,
    /// Ticks since last seen; 0 means the newest tick, `window` means never
    pub last_seen_ago: usize,
    pub status: StreakStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreakReport {
    pub digits: Vec<DigitStreak>,
    pub window: usize,
}

/// Per-digit streak statistics over the newest `lookback` digits
pub fn digit_streaks(digits: &[Digit], lookback: usize) -> Option<StreakReport> {
    if digits.len() < MIN_STREAK_LOOKBACK || lookback == 0 {
        return None;
    }

    let window = lookback.min(digits.len());
    let slice = &digits[digits.len() - window..];

    let report = (0..DIGIT_COUNT as Digit)
        .map(|digit| {
            let appearances = slice.iter().filter(|&&d| d == digit).count();
            let last_seen_ago = slice
                .iter()
                .rev()
                .position(|&d| d == digit)
                .unwrap_or(window);
            DigitStreak {
                digit,
                appearances,
                current_streak: current_streak(slice, digit),
                last_seen_ago,
                status: StreakStatus::classify(appearances, window),
            }
        })
        .collect();

    Some(StreakReport {
        digits: report,
        window,
    })
}
