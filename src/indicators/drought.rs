use crate::models::Digit;
use serde::Serialize;

pub const DEFAULT_DROUGHT_THRESHOLD: usize = 10;

/// A run of consecutive ticks containing none of the target digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Drought {
    /// Index of the first tick of the run within the analysed slice
    pub start: usize,
    pub len: usize,
    /// Digit just before the run, if any
    pub before: Option<Digit>,
    /// Digit that broke the run; `None` while it is still going
    pub after: Option<Digit>,
}

impl Drought {
    pub fn is_ongoing(&self) -> bool {
        self.after.is_none()
    }
}

/// All droughts of at least `threshold` ticks in the newest `window` digits
pub fn find_droughts(digits: &[Digit], targets: &[Digit], window: usize, threshold: usize) -> Vec<Drought> {
    let start = digits.len().saturating_sub(window);
    let slice = &digits[start..];
    let threshold = threshold.max(1);

    let mut droughts = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, digit) in slice.iter().enumerate() {
        if targets.contains(digit) {
            if let Some(begin) = run_start.take() {
                let len = i - begin;
                if len >= threshold {
                    droughts.push(Drought {
                        start: begin,
                        len,
                        before: begin.checked_sub(1).map(|j| slice[j]),
                        after: Some(*digit),
                    });
                }
            }
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }

    if let Some(begin) = run_start {
        let len = slice.len() - begin;
        if len >= threshold {
            droughts.push(Drought {
                start: begin,
                len,
                before: begin.checked_sub(1).map(|j| slice[j]),
                after: None,
            });
        }
    }

    droughts
}

/// The drought still running at the newest tick, if it already meets the threshold
pub fn current_drought(digits: &[Digit], targets: &[Digit], window: usize, threshold: usize) -> Option<Drought> {
    find_droughts(digits, targets, window, threshold)
        .pop()
        .filter(Drought::is_ongoing)
}
