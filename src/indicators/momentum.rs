use super::ranking::digit_counts;
use crate::models::{Digit, DIGIT_COUNT};
use serde::Serialize;

/// Combined lookback split between the recent and prior windows
pub const MOMENTUM_LOOKBACK: usize = 1000;
pub const DEFAULT_SPLIT: usize = 500;

const MIN_TICKS: usize = 20;
const MIN_WINDOW: usize = 10;
const STABLE_BAND: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Heating,
    Cooling,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DigitMomentum {
    pub digit: Digit,
    /// Percentage of the recent window
    pub recent_freq: f64,
    /// Percentage of the prior window
    pub prior_freq: f64,
    pub delta: f64,
    pub strength: f64,
}

impl DigitMomentum {
    pub fn trend(&self) -> Trend {
        if self.delta > STABLE_BAND {
            Trend::Heating
        } else if self.delta < -STABLE_BAND {
            Trend::Cooling
        } else {
            Trend::Stable
        }
    }

    pub fn strength_label(&self) -> &'static str {
        match self.strength {
            s if s >= 50.0 => "Very High",
            s if s >= 20.0 => "High",
            s if s >= 10.0 => "Medium",
            s if s >= 5.0 => "Low",
            _ => "Very Low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomentumReport {
    pub digits: Vec<DigitMomentum>,
    pub recent_size: usize,
    pub prior_size: usize,
}

/// Momentum delta for every digit
///
/// The recent window is the newest `split` digits; the prior window is the
/// `lookback - split` digits immediately before it, both capped by what the
/// snapshot holds.
pub fn momentum_delta(digits: &[Digit], lookback: usize, split: usize) -> Option<MomentumReport> {
    if digits.len() < MIN_TICKS {
        return None;
    }

    let recent_size = split.min(digits.len());
    let prior_size = lookback
        .saturating_sub(split)
        .min(digits.len() - recent_size);

    if recent_size < MIN_WINDOW || prior_size < MIN_WINDOW {
        return None;
    }

    let end = digits.len();
    let recent = digit_counts(&digits[end - recent_size..]);
    let prior = digit_counts(&digits[end - recent_size - prior_size..end - recent_size]);

    let digits = (0..DIGIT_COUNT)
        .map(|d| {
            let recent_freq = recent[d] as f64 / recent_size as f64 * 100.0;
            let prior_freq = prior[d] as f64 / prior_size as f64 * 100.0;
            let delta = recent_freq - prior_freq;
            DigitMomentum {
                digit: d as Digit,
                recent_freq,
                prior_freq,
                delta,
                strength: delta.abs() * (recent_freq + prior_freq) / 2.0,
            }
        })
        .collect();

    Some(MomentumReport {
        digits,
        recent_size,
        prior_size,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MomentumSwitch {
    Hot,
    Cold,
    Neutral,
}

/// Short-horizon switch for one digit: last 20 against the 20 before
///
/// Hot when the digit is in the last 3 ticks and its share rose by more than
/// five points; cold when it is absent from the last 5 and fell by more than
/// five. Without 40 ticks the prior share is taken as the uniform 10%.
pub fn momentum_switch(digits: &[Digit], digit: Digit) -> MomentumSwitch {
    const SHORT: usize = 20;
    if digits.len() < SHORT {
        return MomentumSwitch::Neutral;
    }

    let end = digits.len();
    let share = |slice: &[Digit]| {
        slice.iter().filter(|&&d| d == digit).count() as f64 / SHORT as f64 * 100.0
    };

    let recent = share(&digits[end - SHORT..]);
    let prior = if end >= SHORT * 2 {
        share(&digits[end - SHORT * 2..end - SHORT])
    } else {
        10.0
    };
    let change = recent - prior;

    let in_last_3 = digits[end - 3..].contains(&digit);
    let in_last_5 = digits[end - 5..].contains(&digit);

    if in_last_3 && change > 5.0 {
        MomentumSwitch::Hot
    } else if !in_last_5 && change < -5.0 {
        MomentumSwitch::Cold
    } else {
        MomentumSwitch::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data() {
        assert!(momentum_delta(&[1; 19], MOMENTUM_LOOKBACK, DEFAULT_SPLIT).is_none());
        // 25 ticks with split 20 leaves only 5 for the prior window
        assert!(momentum_delta(&[1; 25], MOMENTUM_LOOKBACK, 20).is_none());
    }

    #[test]
    fn test_windows_are_adjacent() {
        // prior: 30 x digit 3, recent: 30 x digit 7
        let mut digits = vec![3; 30];
        digits.extend(vec![7; 30]);

        let report = momentum_delta(&digits, MOMENTUM_LOOKBACK, 30).unwrap();
        assert_eq!(report.recent_size, 30);
        assert_eq!(report.prior_size, 30);

        let seven = report.digits[7];
        assert_eq!(seven.recent_freq, 100.0);
        assert_eq!(seven.prior_freq, 0.0);
        assert_eq!(seven.delta, 100.0);
        assert_eq!(seven.trend(), Trend::Heating);
        assert_eq!(seven.strength_label(), "Very High");

        let three = report.digits[3];
        assert_eq!(three.delta, -100.0);
        assert_eq!(three.trend(), Trend::Cooling);

        assert_eq!(report.digits[0].trend(), Trend::Stable);
    }

    #[test]
    fn test_prior_capped_by_lookback() {
        let digits: Vec<Digit> = (0..1000).map(|i| (i % 10) as Digit).collect();
        let report = momentum_delta(&digits, MOMENTUM_LOOKBACK, 200).unwrap();
        assert_eq!(report.recent_size, 200);
        assert_eq!(report.prior_size, 800);
        assert!(report.digits.iter().all(|m| m.delta.abs() < 1e-9));
    }

    #[test]
    fn test_lookback_bounds_prior_window() {
        // oldest 700 are all 9s; a 300 lookback never reaches them
        let mut digits = vec![9; 700];
        digits.extend((0..300).map(|i| (i % 10) as Digit));

        let report = momentum_delta(&digits, 300, 100).unwrap();
        assert_eq!(report.recent_size, 100);
        assert_eq!(report.prior_size, 200);
        assert!(report.digits.iter().all(|m| m.delta.abs() < 1e-9));

        // split equal to the lookback leaves no prior window
        assert!(momentum_delta(&digits, 100, 100).is_none());
    }

    #[test]
    fn test_switch_hot_and_cold() {
        let mut digits = vec![5; 20];
        digits.extend([0, 0, 0, 0, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 0, 0, 0, 0]);
        assert_eq!(momentum_switch(&digits, 0), MomentumSwitch::Hot);

        let mut digits = vec![1; 20];
        digits.extend(vec![4; 20]);
        assert_eq!(momentum_switch(&digits, 1), MomentumSwitch::Cold);
    }

    #[test]
    fn test_switch_neutral_when_short() {
        assert_eq!(momentum_switch(&[0; 10], 0), MomentumSwitch::Neutral);
    }
}
