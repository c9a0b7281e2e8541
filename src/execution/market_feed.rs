use super::digit_buffer::{decimals_from_pip, derive_digit, DigitStore, DEFAULT_DECIMALS};
use crate::api::{HistoryBatch, InboundMessage, SymbolInfo, TickUpdate};
use crate::models::Digit;
use std::collections::HashMap;

/// What a venue message changed in the digit store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Tick { symbol: String, digit: Digit },
    Backfill { symbol: String, digits: usize },
    Symbols { count: usize },
}

/// Turns ticks and history into digits
///
/// Owns the pip table learned from the symbol listing. Only the market feed
/// writes to the store; strategies read snapshots from the shared handle.
#[derive(Debug)]
pub struct MarketFeed {
    store: DigitStore,
    decimals: HashMap<String, u32>,
}

impl MarketFeed {
    pub fn new(store: DigitStore) -> Self {
        Self {
            store,
            decimals: HashMap::new(),
        }
    }

    pub fn store(&self) -> &DigitStore {
        &self.store
    }

    /// Decimal places used for `symbol`, 2 until the listing says otherwise
    pub fn decimals(&self, symbol: &str) -> u32 {
        self.decimals.get(symbol).copied().unwrap_or(DEFAULT_DECIMALS)
    }

    pub fn record_symbols(&mut self, symbols: &[SymbolInfo]) -> usize {
        for info in symbols {
            self.decimals
                .insert(info.symbol.clone(), decimals_from_pip(info.pip_size()));
        }
        tracing::debug!(count = symbols.len(), "Pip table updated");
        symbols.len()
    }

    /// Apply a decoded message; `None` for messages that carry no prices
    ///
    /// Ticks get their derived digit stamped on the message so every
    /// listener sees the digit of that exact tick.
    pub fn ingest(&mut self, message: &mut InboundMessage) -> Option<FeedUpdate> {
        match message {
            InboundMessage::Tick(update) => Some(self.on_tick(update)),
            InboundMessage::History(batch) => Some(self.on_history(batch)),
            InboundMessage::ActiveSymbols(symbols) => Some(FeedUpdate::Symbols {
                count: self.record_symbols(symbols),
            }),
            InboundMessage::ContractUpdate(update) => {
                if let (Some(quote), Some(symbol)) = (update.exit_tick, update.underlying.as_deref()) {
                    update.exit_digit = Some(derive_digit(quote, self.decimals(symbol)));
                }
                None
            }
            _ => None,
        }
    }

    fn resolve_decimals(&mut self, symbol: &str, hinted: Option<u32>) -> u32 {
        if let Some(&known) = self.decimals.get(symbol) {
            return known;
        }
        match hinted {
            Some(decimals) => {
                self.decimals.insert(symbol.to_string(), decimals);
                decimals
            }
            None => DEFAULT_DECIMALS,
        }
    }

    fn on_tick(&mut self, update: &mut TickUpdate) -> FeedUpdate {
        let decimals = self.resolve_decimals(&update.tick.symbol, update.pip_size);
        let digit = derive_digit(update.tick.quote, decimals);
        update.digit = Some(digit);
        let symbol = &update.tick.symbol;
        self.store.push(symbol, digit);

        tracing::trace!(symbol = %symbol, quote = %update.tick.quote, digit, "Tick");
        FeedUpdate::Tick {
            symbol: symbol.clone(),
            digit,
        }
    }

    fn on_history(&mut self, batch: &HistoryBatch) -> FeedUpdate {
        let decimals = self.resolve_decimals(&batch.symbol, batch.pip_size);
        let skip = batch.prices.len().saturating_sub(self.store.capacity());
        let digits = batch.prices[skip..]
            .iter()
            .map(|&quote| derive_digit(quote, decimals));
        let count = self.store.reset(&batch.symbol, digits);

        tracing::info!(
            symbol = %batch.symbol,
            digits = count,
            decimals,
            "📥 History backfilled"
        );
        FeedUpdate::Backfill {
            symbol: batch.symbol.clone(),
            digits: count,
        }
    }
}

/// Symbols digit contracts can trade on: continuous synthetic indices
pub fn tradable_symbols(symbols: &[SymbolInfo]) -> Vec<String> {
    let mut tradable: Vec<String> = symbols
        .iter()
        .filter(|info| info.is_continuous_synthetic())
        .map(|info| info.symbol.clone())
        .collect();
    tradable.sort();
    tradable.dedup();
    tradable
}
