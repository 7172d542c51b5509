//! Technical indicator arithmetic over close/volume series.
//!
//! All functions take the full series (oldest first) and return the value
//! at the last element.

use statrs::statistics::Statistics;

use super::TrendDirection;

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().mean())
}

/// Exponential moving average series with `alpha = 2 / (period + 1)`,
/// seeded with the first value.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;

    for &v in values {
        let next = match prev {
            Some(p) => alpha * v + (1.0 - alpha) * p,
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

/// Relative strength index with Wilder smoothing.
///
/// The first average gain/loss is the simple mean of the first `period`
/// changes. A flat series reads 50, a series with no losses reads 100.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let p = period as f64;

    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / p;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / p;

    for change in &changes[period..] {
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
    }

    if avg_loss <= f64::EPSILON {
        return Some(if avg_gain <= f64::EPSILON { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// MACD line, signal line and histogram at the last bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    /// Histogram one bar earlier
    pub prev_histogram: f64,
}

/// MACD as EMA(fast) - EMA(slow) with an EMA(signal) signal line
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if values.len() < 2 {
        return None;
    }

    let fast_ema = ema_series(values, fast);
    let slow_ema = ema_series(values, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema_series(&line, signal);

    let n = line.len();
    let histogram = line[n - 1] - signal_line[n - 1];
    let prev_histogram = line[n - 2] - signal_line[n - 2];

    Some(Macd {
        macd: line[n - 1],
        signal: signal_line[n - 1],
        histogram,
        prev_histogram,
    })
}

/// Bollinger bands around an SMA
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Position of `price` within the bands, clamped to [0, 1].
    /// A zero-width band reads 0.5.
    pub fn position(&self, price: f64) -> f64 {
        let width = self.upper - self.lower;
        if width <= f64::EPSILON {
            return 0.5;
        }
        ((price - self.lower) / width).clamp(0.0, 1.0)
    }
}

/// SMA(period) plus/minus `k` sample standard deviations
pub fn bollinger(values: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if period < 2 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    let middle = window.iter().mean();
    let std_dev = window.iter().std_dev();
    let std_dev = if std_dev.is_finite() { std_dev } else { 0.0 };

    Some(BollingerBands {
        upper: middle + k * std_dev,
        middle,
        lower: middle - k * std_dev,
    })
}

/// Fractional change from `lookback` bars ago to the last value.
/// Falls back to the first value when the series is shorter.
pub fn pct_change(values: &[f64], lookback: usize) -> f64 {
    let Some(&last) = values.last() else {
        return 0.0;
    };
    let base_idx = values.len().saturating_sub(lookback + 1);
    let base = values[base_idx];
    if base > 0.0 {
        last / base - 1.0
    } else {
        0.0
    }
}

/// Bucket a fractional change into a trend direction
pub fn classify_trend(change: f64, weak: f64, strong: f64) -> TrendDirection {
    if change > strong {
        TrendDirection::StrongUp
    } else if change > weak {
        TrendDirection::WeakUp
    } else if change > -weak {
        TrendDirection::Sideways
    } else if change > -strong {
        TrendDirection::WeakDown
    } else {
        TrendDirection::StrongDown
    }
}

/// Sample standard deviation of daily returns over the last `period` bars
pub fn return_volatility(values: &[f64], period: usize) -> f64 {
    let start = values.len().saturating_sub(period + 1);
    let returns: Vec<f64> = values[start..]
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();

    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.iter().std_dev();
    if std_dev.is_finite() {
        std_dev
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================
