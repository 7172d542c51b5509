//! Market data containers for daily A-share bars.
//!
//! Price history is supplied by an external loader and preloaded in full
//! before a simulation starts; nothing here performs I/O.
//!
//! # Missing bars
//!
//! When a requested execution date has no bar (weekend, holiday, suspension),
//! [`PriceHistory::index_on_or_after`] forward-fills to the nearest later
//! trading date.

mod cache;

pub use cache::AnalysisCache;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Core Data Types
// ============================================================================

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Trading date
    pub date: NaiveDate,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume (shares)
    pub volume: f64,
    /// Amount (turnover in currency)
    #[serde(default)]
    pub amount: f64,
}

impl Candle {
    /// Create a bar without turnover information
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            amount: 0.0,
        }
    }

    /// Check if this is a bullish candle
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// High-low range as a fraction of close
    pub fn range_ratio(&self) -> f64 {
        if self.close > 0.0 {
            (self.high - self.low) / self.close
        } else {
            0.0
        }
    }

    /// Prices are finite and positive, and high/low bracket open/close
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.volume.is_finite()
            && self.volume >= 0.0
            && self.high >= self.low
    }
}

/// Errors raised while assembling price data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("price history for {symbol} is empty")]
    Empty { symbol: String },

    #[error("price history for {symbol} is not date-ascending at {date}")]
    Unordered { symbol: String, date: NaiveDate },

    #[error("price history for {symbol} has a duplicate bar on {date}")]
    Duplicate { symbol: String, date: NaiveDate },
}

// ============================================================================
// Price History
// ============================================================================

/// Date-ascending daily bars for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    symbol: String,
    bars: Vec<Candle>,
}

impl PriceHistory {
    /// Build a history, rejecting unordered or duplicate dates.
    pub fn new(symbol: impl Into<String>, bars: Vec<Candle>) -> Result<Self, DataError> {
        let symbol = symbol.into();
        if bars.is_empty() {
            return Err(DataError::Empty { symbol });
        }

        for pair in bars.windows(2) {
            if pair[1].date == pair[0].date {
                return Err(DataError::Duplicate {
                    symbol,
                    date: pair[1].date,
                });
            }
            if pair[1].date < pair[0].date {
                return Err(DataError::Unordered {
                    symbol,
                    date: pair[1].date,
                });
            }
        }

        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Candle] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|c| c.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|c| c.date)
    }

    /// All bars dated on or before `as_of`
    pub fn window_until(&self, as_of: NaiveDate) -> &[Candle] {
        let end = self.bars.partition_point(|c| c.date <= as_of);
        &self.bars[..end]
    }

    /// Index of the bar dated exactly `date`
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |c| c.date).ok()
    }

    /// Bar dated exactly `date`
    pub fn bar_on(&self, date: NaiveDate) -> Option<&Candle> {
        self.index_of(date).map(|i| &self.bars[i])
    }

    /// Index of the first bar dated on or after `date` (forward fill)
    pub fn index_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.bars.partition_point(|c| c.date < date);
        (idx < self.bars.len()).then_some(idx)
    }

    /// Most recent bar dated on or before `date`
    pub fn latest_on_or_before(&self, date: NaiveDate) -> Option<&Candle> {
        self.window_until(date).last()
    }

    /// Average volume over up to `lookback` bars ending at `idx` (inclusive)
    pub fn trailing_average_volume(&self, idx: usize, lookback: usize) -> f64 {
        if idx >= self.bars.len() || lookback == 0 {
            return 0.0;
        }
        let start = (idx + 1).saturating_sub(lookback);
        let window = &self.bars[start..=idx];
        window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// Preloaded price histories keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    histories: BTreeMap<String, PriceHistory>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a symbol's history
    pub fn insert(&mut self, history: PriceHistory) {
        self.histories.insert(history.symbol().to_string(), history);
    }

    pub fn get(&self, symbol: &str) -> Option<&PriceHistory> {
        self.histories.get(symbol)
    }

    /// Symbols in ascending order
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.histories.keys().map(String::as_str)
    }

    pub fn histories(&self) -> impl Iterator<Item = &PriceHistory> {
        self.histories.values()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Union of all trading dates within `[start, end]`, ascending
    pub fn trading_dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .histories
            .values()
            .flat_map(|h| h.bars().iter().map(|c| c.date))
            .filter(|d| *d >= start && *d <= end)
            .collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }

    /// Latest close on or before `date` for every symbol that has one
    pub fn closes_as_of(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        self.histories
            .iter()
            .filter_map(|(symbol, h)| {
                h.latest_on_or_before(date)
                    .map(|c| (symbol.clone(), c.close))
            })
            .collect()
    }
}

impl FromIterator<PriceHistory> for MarketData {
    fn from_iter<T: IntoIterator<Item = PriceHistory>>(iter: T) -> Self {
        let mut data = Self::new();
        for history in iter {
            data.insert(history);
        }
        data
    }
}

// ============================================================================
// Tests
// ============================================================================
