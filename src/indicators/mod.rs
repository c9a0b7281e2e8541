// Digit analysis module
// Pure functions over a digit snapshot: ranking, momentum, streaks, droughts

pub mod distribution;
pub mod drought;
pub mod momentum;
pub mod ranking;
pub mod streak;

pub use distribution::{group_share, rank_win_rates, RankBacktest, RankRecord, RANK_WINDOWS};
pub use drought::{current_drought, find_droughts, Drought, DEFAULT_DROUGHT_THRESHOLD};
pub use momentum::{
    momentum_delta, momentum_switch, DigitMomentum, MomentumReport, MomentumSwitch, Trend,
    DEFAULT_SPLIT, MOMENTUM_LOOKBACK,
};
pub use ranking::{digit_counts, rank_counts, rank_digits, ranks_by_digit, top_digits, RankedDigit};
pub use streak::{
    current_streak, digit_streaks, trailing_run, DigitStreak, StreakReport, StreakStatus,
    DEFAULT_STREAK_LOOKBACK, MIN_STREAK_LOOKBACK,
};
