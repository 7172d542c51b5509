//! Market analysis for a single symbol.
//!
//! Turns a price-history window into a technical/momentum/risk assessment.
//! A symbol with fewer than `min_history` bars is not scored; the caller gets
//! [`AnalysisError::InsufficientHistory`] and must treat the symbol as
//! observe-only for that day.

pub mod indicators;
pub mod scoring;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AnalyzerConfig, ScoringConfig};
use crate::data::{AnalysisCache, Candle, MarketData, PriceHistory};

// ============================================================================
// Types
// ============================================================================

/// Five-level trend classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    StrongUp,
    WeakUp,
    Sideways,
    WeakDown,
    StrongDown,
}

impl TrendDirection {
    /// Vote weight on a -2..=2 scale
    pub fn weight(self) -> f64 {
        match self {
            Self::StrongUp => 2.0,
            Self::WeakUp => 1.0,
            Self::Sideways => 0.0,
            Self::WeakDown => -1.0,
            Self::StrongDown => -2.0,
        }
    }

    pub fn is_up(self) -> bool {
        matches!(self, Self::StrongUp | Self::WeakUp)
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongUp => write!(f, "强势上涨"),
            Self::WeakUp => write!(f, "弱势上涨"),
            Self::Sideways => write!(f, "横盘震荡"),
            Self::WeakDown => write!(f, "弱势下跌"),
            Self::StrongDown => write!(f, "强势下跌"),
        }
    }
}

/// Volume relative to its recent average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    Expanding,
    Normal,
    Contracting,
}

impl VolumeTrend {
    pub fn from_ratio(ratio: f64, cfg: &ScoringConfig) -> Self {
        if ratio > cfg.volume_expanding_ratio {
            Self::Expanding
        } else if ratio < cfg.volume_contracting_ratio {
            Self::Contracting
        } else {
            Self::Normal
        }
    }
}

/// Technical, momentum and risk assessment of one symbol on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub current_price: f64,

    pub ma_short: f64,
    pub ma_medium: f64,
    pub ma_long: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub macd_histogram_prev: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    /// Close position within the bands, in [0, 1]
    pub bollinger_position: f64,

    /// Fractional price changes over the trend lookbacks
    pub change_short: f64,
    pub change_medium: f64,
    pub change_long: f64,
    pub short_trend: TrendDirection,
    pub medium_trend: TrendDirection,
    pub long_trend: TrendDirection,
    /// Weighted vote of the three horizons
    pub trend_expectation: TrendDirection,

    pub support: f64,
    pub resistance: f64,
    pub volume_ratio: f64,
    pub volume_trend: VolumeTrend,
    /// Sample stdev of daily returns
    pub volatility: f64,

    pub technical_score: f64,
    pub momentum_score: f64,
    pub risk_score: f64,
}

/// Why a symbol could not be scored
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("{symbol}: {available} bars available as of {as_of}, {required} required")]
    InsufficientHistory {
        symbol: String,
        as_of: NaiveDate,
        available: usize,
        required: usize,
    },

    #[error("{symbol}: malformed bar on {date}")]
    InvalidBar { symbol: String, date: NaiveDate },
}

pub type AnalysisResult = Result<MarketAnalysis, AnalysisError>;

// ============================================================================
// Analyzer
// ============================================================================

/// Pure function of a price window, optionally memoized through an
/// injected [`AnalysisCache`].
#[derive(Debug, Clone)]
pub struct MarketAnalyzer {
    config: AnalyzerConfig,
    fingerprint: u64,
    cache: Option<Arc<AnalysisCache>>,
}

impl MarketAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(&config)
            .unwrap_or_default()
            .hash(&mut hasher);

        Self {
            config,
            fingerprint: hasher.finish(),
            cache: None,
        }
    }

    /// Memoize analyses in a shared cache
    pub fn with_cache(mut self, cache: Arc<AnalysisCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze `history` using bars dated on or before `as_of`
    pub fn analyze(&self, history: &PriceHistory, as_of: NaiveDate) -> AnalysisResult {
        self.analyze_bars(history.symbol(), history.window_until(as_of), as_of)
    }

    /// Analyze an already-cut window (oldest first, last bar is "today")
    pub fn analyze_bars(&self, symbol: &str, bars: &[Candle], as_of: NaiveDate) -> AnalysisResult {
        if bars.len() < self.config.min_history {
            return Err(AnalysisError::InsufficientHistory {
                symbol: symbol.to_string(),
                as_of,
                available: bars.len(),
                required: self.config.min_history,
            });
        }

        let digest = self.cache.as_ref().map(|_| window_digest(bars));
        if let (Some(cache), Some(digest)) = (&self.cache, digest) {
            if let Some(hit) = cache.get(symbol, as_of, digest, self.fingerprint) {
                return Ok(hit);
            }
        }

        let analysis = self.compute(symbol, bars, as_of)?;

        if let (Some(cache), Some(digest)) = (&self.cache, digest) {
            cache.insert(digest, self.fingerprint, analysis.clone());
        }

        tracing::trace!(
            symbol,
            date = %as_of,
            technical = analysis.technical_score,
            momentum = analysis.momentum_score,
            risk = analysis.risk_score,
            "Analyzed symbol"
        );

        Ok(analysis)
    }

    /// Analyze every symbol independently on the rayon pool.
    ///
    /// Results are ordered by symbol regardless of completion order.
    pub fn analyze_universe(
        &self,
        market: &MarketData,
        as_of: NaiveDate,
    ) -> Vec<(String, AnalysisResult)> {
        let histories: Vec<&PriceHistory> = market.histories().collect();
        histories
            .par_iter()
            .map(|h| (h.symbol().to_string(), self.analyze(h, as_of)))
            .collect()
    }

    fn compute(&self, symbol: &str, bars: &[Candle], as_of: NaiveDate) -> AnalysisResult {
        let cfg = &self.config;
        let Some(last) = bars.last() else {
            return Err(AnalysisError::InsufficientHistory {
                symbol: symbol.to_string(),
                as_of,
                available: 0,
                required: cfg.min_history.max(1),
            });
        };
        if !last.is_well_formed() {
            return Err(AnalysisError::InvalidBar {
                symbol: symbol.to_string(),
                date: last.date,
            });
        }

        let closes: Vec<f64> = bars.iter().map(|c| c.close).collect();
        let current_price = last.close;

        let ma = |period: usize| indicators::sma(&closes, period).unwrap_or(current_price);
        let rsi = indicators::rsi(&closes, cfg.rsi_period).unwrap_or(50.0);
        let macd = indicators::macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)
            .unwrap_or(indicators::Macd {
                macd: 0.0,
                signal: 0.0,
                histogram: 0.0,
                prev_histogram: 0.0,
            });
        let bands = indicators::bollinger(&closes, cfg.bollinger_period, cfg.bollinger_k)
            .unwrap_or(indicators::BollingerBands {
                upper: current_price,
                middle: current_price,
                lower: current_price,
            });

        let change_short = indicators::pct_change(&closes, cfg.trend_short);
        let change_medium = indicators::pct_change(&closes, cfg.trend_medium);
        let change_long = indicators::pct_change(&closes, cfg.trend_long);
        let classify =
            |c: f64| indicators::classify_trend(c, cfg.weak_trend_pct, cfg.strong_trend_pct);
        let short_trend = classify(change_short);
        let medium_trend = classify(change_medium);
        let long_trend = classify(change_long);

        let level_start = bars.len().saturating_sub(cfg.level_lookback.max(1));
        let level_bars = &bars[level_start..];
        let support = level_bars.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let resistance = level_bars.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);

        let volume_ratio = volume_ratio(bars, cfg.volume_lookback);

        let mut analysis = MarketAnalysis {
            symbol: symbol.to_string(),
            as_of,
            current_price,
            ma_short: ma(cfg.ma_short),
            ma_medium: ma(cfg.ma_medium),
            ma_long: ma(cfg.ma_long),
            rsi,
            macd: macd.macd,
            macd_signal: macd.signal,
            macd_histogram: macd.histogram,
            macd_histogram_prev: macd.prev_histogram,
            bollinger_upper: bands.upper,
            bollinger_middle: bands.middle,
            bollinger_lower: bands.lower,
            bollinger_position: bands.position(current_price),
            change_short,
            change_medium,
            change_long,
            short_trend,
            medium_trend,
            long_trend,
            trend_expectation: expected_trend(short_trend, medium_trend, long_trend),
            support,
            resistance,
            volume_ratio,
            volume_trend: VolumeTrend::from_ratio(volume_ratio, &cfg.scoring),
            volatility: indicators::return_volatility(&closes, cfg.bollinger_period),
            technical_score: 0.0,
            momentum_score: 0.0,
            risk_score: 0.0,
        };

        analysis.technical_score = scoring::technical_score(&analysis, &cfg.scoring);
        analysis.momentum_score = scoring::momentum_score(&analysis, &cfg.scoring);
        analysis.risk_score = scoring::risk_score(&analysis, &cfg.scoring);

        Ok(analysis)
    }
}

impl Default for MarketAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

/// Content hash of a price window: every bar's date and OHLCV bits.
///
/// Two windows with the same symbol, date and length but different prices
/// never share a cache entry.
pub fn window_digest(bars: &[Candle]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bars.len().hash(&mut hasher);
    for bar in bars {
        bar.date.hash(&mut hasher);
        for value in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            value.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}

/// Last volume over the mean of the preceding `lookback` volumes.
/// Reads 1.0 when there is no usable baseline.
fn volume_ratio(bars: &[Candle], lookback: usize) -> f64 {
    let n = bars.len();
    if n < 2 || lookback == 0 {
        return 1.0;
    }
    let start = (n - 1).saturating_sub(lookback);
    let prior = &bars[start..n - 1];
    let avg = prior.iter().map(|c| c.volume).sum::<f64>() / prior.len() as f64;
    if avg > 0.0 {
        bars[n - 1].volume / avg
    } else {
        1.0
    }
}

/// Weighted vote of short/medium/long trends (0.5/0.3/0.2)
pub fn expected_trend(
    short: TrendDirection,
    medium: TrendDirection,
    long: TrendDirection,
) -> TrendDirection {
    let vote = 0.5 * short.weight() + 0.3 * medium.weight() + 0.2 * long.weight();
    if vote >= 1.5 {
        TrendDirection::StrongUp
    } else if vote >= 0.5 {
        TrendDirection::WeakUp
    } else if vote > -0.5 {
        TrendDirection::Sideways
    } else if vote > -1.5 {
        TrendDirection::WeakDown
    } else {
        TrendDirection::StrongDown
    }
}

// ============================================================================
// Tests
// ============================================================================
