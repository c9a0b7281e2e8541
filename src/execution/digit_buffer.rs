use crate::models::{Digit, DIGIT_COUNT};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Rolling window kept per instrument
pub const DIGIT_CAPACITY: usize = 1000;

/// Pip assumed when the venue has not told us one
pub const DEFAULT_DECIMALS: u32 = 2;

/// Last-N digits of one instrument plus their histogram
///
/// `counts[d]` always equals the number of `d` in `queue`.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitStats {
    queue: VecDeque<Digit>,
    counts: [usize; DIGIT_COUNT],
    capacity: usize,
}

impl Default for DigitStats {
    fn default() -> Self {
        Self::with_capacity(DIGIT_CAPACITY)
    }
}

impl DigitStats {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            counts: [0; DIGIT_COUNT],
            capacity,
        }
    }

    /// Append a digit, evicting the oldest past capacity
    ///
    /// Digits outside `0..=9` are ignored and `false` is returned.
    pub fn push(&mut self, digit: Digit) -> bool {
        if digit as usize >= DIGIT_COUNT || self.capacity == 0 {
            return false;
        }

        self.queue.push_back(digit);
        self.counts[digit as usize] += 1;

        while self.queue.len() > self.capacity {
            if let Some(old) = self.queue.pop_front() {
                self.counts[old as usize] = self.counts[old as usize].saturating_sub(1);
            }
        }

        true
    }

    /// Clear and reseed from a historical batch, keeping its newest `capacity` digits
    pub fn reset<I>(&mut self, digits: I)
    where
        I: IntoIterator<Item = Digit>,
    {
        self.queue.clear();
        self.counts = [0; DIGIT_COUNT];
        for digit in digits {
            self.push(digit);
        }
    }

    pub fn snapshot(&self) -> Vec<Digit> {
        self.queue.iter().copied().collect()
    }

    /// The newest `n` digits, oldest first
    pub fn recent(&self, n: usize) -> Vec<Digit> {
        let skip = self.queue.len().saturating_sub(n);
        self.queue.iter().skip(skip).copied().collect()
    }

    pub fn counts(&self) -> [usize; DIGIT_COUNT] {
        self.counts
    }

    pub fn total(&self) -> usize {
        self.queue.len()
    }

    pub fn last(&self) -> Option<Digit> {
        self.queue.back().copied()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Process-wide digit statistics, one `DigitStats` per instrument
///
/// Cloning shares the same storage. Only the market feed writes to it;
/// strategies read copies through `snapshot`/`recent`.
#[derive(Debug, Clone)]
pub struct DigitStore {
    data: Arc<RwLock<HashMap<String, DigitStats>>>,
    capacity: usize,
}

impl Default for DigitStore {
    fn default() -> Self {
        Self::new(DIGIT_CAPACITY)
    }
}

impl DigitStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, symbol: &str, digit: Digit) -> bool {
        let mut data = self.write();
        data.entry(symbol.to_string())
            .or_insert_with(|| DigitStats::with_capacity(self.capacity))
            .push(digit)
    }

    /// Replace a symbol's history; returns the number of digits kept
    pub fn reset<I>(&self, symbol: &str, digits: I) -> usize
    where
        I: IntoIterator<Item = Digit>,
    {
        let mut data = self.write();
        let stats = data
            .entry(symbol.to_string())
            .or_insert_with(|| DigitStats::with_capacity(self.capacity));
        stats.reset(digits);
        stats.total()
    }

    pub fn snapshot(&self, symbol: &str) -> Vec<Digit> {
        self.read()
            .get(symbol)
            .map(DigitStats::snapshot)
            .unwrap_or_default()
    }

    pub fn recent(&self, symbol: &str, n: usize) -> Vec<Digit> {
        self.read()
            .get(symbol)
            .map(|stats| stats.recent(n))
            .unwrap_or_default()
    }

    pub fn counts(&self, symbol: &str) -> [usize; DIGIT_COUNT] {
        self.read()
            .get(symbol)
            .map(DigitStats::counts)
            .unwrap_or([0; DIGIT_COUNT])
    }

    pub fn total(&self, symbol: &str) -> usize {
        self.read().get(symbol).map(DigitStats::total).unwrap_or(0)
    }

    pub fn last(&self, symbol: &str) -> Option<Digit> {
        self.read().get(symbol).and_then(DigitStats::last)
    }

    /// Tracked symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn clear(&self, symbol: &str) {
        self.write().remove(symbol);
    }

    pub fn clear_all(&self) {
        self.write().clear();
    }

    // A panicking writer can only leave a fully applied or untouched entry behind
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DigitStats>> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DigitStats>> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Number of fractional digits in a pip size (`0.001` -> 3, `1` -> 0)
pub fn decimals_from_pip(pip: Decimal) -> u32 {
    pip.normalize().scale()
}

/// Last significant digit of `quote` at `decimals` places
///
/// The quote is rounded to the pip precision and rendered in fixed point;
/// the digit is the final fractional character, or the last integer digit
/// when the instrument has no decimals.
pub fn derive_digit(quote: Decimal, decimals: u32) -> Digit {
    let normalized = quote.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    let text = if decimals == 0 {
        normalized.trunc().abs().to_string()
    } else {
        format!("{:.*}", decimals as usize, normalized)
    };

    text.chars()
        .last()
        .and_then(|c| c.to_digit(10))
        .map(|d| d as Digit)
        .unwrap_or(0)
}
