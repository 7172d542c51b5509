//! Execution cost model.
//!
//! Maps a daily bar and a trade size to a fill price, slippage, commission
//! and liquidity score. Slippage is a fraction of price:
//!
//! ```text
//! s = spread/2 + linear·vr + sqrt·√vr + fixed + min(w·(H−L)/C, cap)
//! ```
//!
//! clipped to `[0, max_slippage]`, where `vr` is the traded share of the
//! bar's volume.

use serde::{Deserialize, Serialize};

use crate::config::{MarketImpactConfig, PortfolioConfig};
use crate::data::Candle;

/// Which price of the bar a fill is benchmarked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowKind {
    Open,
    Close,
    /// Midpoint of high and low
    Intraday,
    /// Approximate VWAP, (H + L + 2C) / 4
    Vwap,
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "开盘"),
            Self::Close => write!(f, "收盘"),
            Self::Intraday => write!(f, "盘中"),
            Self::Vwap => write!(f, "均价"),
        }
    }
}

/// Trade direction; slippage always works against the trader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// Pure cost functions parameterized by market-impact and fee settings
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionCostModel {
    impact: MarketImpactConfig,
    commission_rate: f64,
    min_commission: f64,
}

impl ExecutionCostModel {
    pub fn new(impact: MarketImpactConfig, commission_rate: f64, min_commission: f64) -> Self {
        Self {
            impact,
            commission_rate,
            min_commission,
        }
    }

    pub fn from_config(impact: &MarketImpactConfig, portfolio: &PortfolioConfig) -> Self {
        Self::new(impact.clone(), portfolio.commission_rate, portfolio.min_commission)
    }

    pub fn impact(&self) -> &MarketImpactConfig {
        &self.impact
    }

    /// Benchmark price of `bar` for the given window
    pub fn execution_price(&self, bar: &Candle, kind: WindowKind) -> f64 {
        match kind {
            WindowKind::Open => bar.open,
            WindowKind::Close => bar.close,
            WindowKind::Intraday => (bar.high + bar.low) / 2.0,
            WindowKind::Vwap => (bar.high + bar.low + 2.0 * bar.close) / 4.0,
        }
    }

    /// Fraction of the bar's volume consumed by one batch of `shares`,
    /// capped at `max_volume_ratio`. A zero-volume bar reads as the cap.
    pub fn volume_ratio(&self, bar: &Candle, shares: f64, batch_size: f64, max_volume_ratio: f64) -> f64 {
        if bar.volume <= 0.0 {
            return max_volume_ratio;
        }
        (batch_size * shares / bar.volume).clamp(0.0, max_volume_ratio)
    }

    /// Slippage fraction for trading `volume_ratio` of the bar
    pub fn slippage(&self, bar: &Candle, volume_ratio: f64) -> f64 {
        let c = &self.impact;
        let vr = volume_ratio.max(0.0);
        let volatility_adjustment = (c.volatility_weight * bar.range_ratio()).min(c.volatility_cap);

        let total = c.bid_ask_spread / 2.0
            + c.linear_cost * vr
            + c.sqrt_cost * vr.sqrt()
            + c.fixed_cost
            + volatility_adjustment;

        total.clamp(0.0, c.max_slippage)
    }

    /// Apply slippage against the trader
    pub fn fill_price(&self, base_price: f64, slippage: f64, side: Side) -> f64 {
        match side {
            Side::Buy => base_price * (1.0 + slippage),
            Side::Sell => base_price * (1.0 - slippage),
        }
    }

    /// Commission on one fill
    pub fn commission(&self, trade_value: f64) -> f64 {
        commission(trade_value, self.commission_rate, self.min_commission)
    }

    /// Liquidity in [0, 1], blending relative volume (0.4), range stability
    /// (0.3) and a volume-impact penalty (0.3).
    pub fn liquidity_score(&self, bar: &Candle, trailing_avg_volume: f64, volume_ratio: f64) -> f64 {
        let relative_volume = if trailing_avg_volume > 0.0 {
            (bar.volume / trailing_avg_volume).min(2.0) / 2.0
        } else {
            0.0
        };
        let stability = (1.0 - bar.range_ratio() * 10.0).max(0.0);
        let impact_penalty = (1.0 - volume_ratio * 5.0).max(0.0);

        (0.4 * relative_volume + 0.3 * stability + 0.3 * impact_penalty).clamp(0.0, 1.0)
    }
}

/// `max(trade_value · rate, minimum)`
pub fn commission(trade_value: f64, rate: f64, minimum: f64) -> f64 {
    (trade_value * rate).max(minimum)
}

impl Default for ExecutionCostModel {
    fn default() -> Self {
        Self::from_config(&MarketImpactConfig::default(), &PortfolioConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
