//! Trading signal types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::TrendDirection;

/// Discrete daily decision for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    Observe,
}

impl SignalAction {
    /// Whether the portfolio has anything to execute
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Buy | Self::Sell)
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
            Self::Observe => write!(f, "OBSERVE"),
        }
    }
}

/// Decision emitted by [`super::DecisionPolicy`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub date: NaiveDate,
    pub action: SignalAction,
    /// Reference price (the analysis close)
    pub price: f64,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    pub trend_expectation: TrendDirection,
    pub reason: String,
    /// Risk score scaled to 0.0 - 1.0
    pub risk_level: f64,
    /// Fraction of total assets to allocate; zero unless BUY
    pub suggested_position_size: f64,
}

impl TradingSignal {
    pub fn is_buy(&self) -> bool {
        self.action == SignalAction::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.action == SignalAction::Sell
    }
}

impl std::fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} @ {:.2} ({:.0}%): {}",
            self.date,
            self.action,
            self.symbol,
            self.price,
            self.confidence * 100.0,
            self.reason
        )
    }
}
