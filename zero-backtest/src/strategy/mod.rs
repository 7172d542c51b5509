//! Daily decision policy.
//!
//! A state machine over the caller's holding of a symbol:
//!
//! | State           | Meaning                                   |
//! |-----------------|-------------------------------------------|
//! | `Flat`          | no open position                          |
//! | `HeldLocked`    | bought on the current day, T+1 lock holds |
//! | `HeldUnlocked`  | sellable position                         |
//!
//! The lock dominates every exit rule. Decisions are pure functions of
//! `(MarketAnalysis, Option<&Position>)`; nothing here touches the portfolio.

mod signal;

pub use signal::{SignalAction, TradingSignal};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analysis::{MarketAnalysis, TrendDirection};
use crate::config::DecisionConfig;
use crate::execution::Position;

/// Reason prefix for lock-forced holds
pub const T1_LOCK_REASON: &str = "T+1 lock";

/// Tolerance for return-threshold comparisons
const RATE_EPSILON: f64 = 1e-9;

/// Holding state of one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Flat,
    HeldLocked,
    HeldUnlocked,
}

impl PositionState {
    pub fn of(position: Option<&Position>) -> Self {
        match position {
            None => Self::Flat,
            Some(p) if p.can_sell => Self::HeldUnlocked,
            Some(_) => Self::HeldLocked,
        }
    }
}

/// Threshold-driven decision table
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    config: DecisionConfig,
    max_position_size: f64,
}

impl DecisionPolicy {
    /// `max_position_size` caps `suggested_position_size` on BUY signals.
    pub fn new(config: DecisionConfig, max_position_size: f64) -> Self {
        Self {
            config,
            max_position_size,
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Decide today's action for `analysis.symbol`
    pub fn decide(&self, analysis: &MarketAnalysis, position: Option<&Position>) -> TradingSignal {
        let (action, confidence, reason) = match (PositionState::of(position), position) {
            (PositionState::Flat, _) | (_, None) => self.decide_flat(analysis),
            (PositionState::HeldLocked, Some(p)) => (
                SignalAction::Hold,
                self.config.lock_confidence,
                format!("{}: bought {}, sellable next trading day", T1_LOCK_REASON, p.buy_date),
            ),
            (PositionState::HeldUnlocked, Some(p)) => self.decide_held(analysis, p),
        };

        let suggested_position_size = if action == SignalAction::Buy {
            (self.max_position_size * confidence).clamp(0.0, self.max_position_size)
        } else {
            0.0
        };

        TradingSignal {
            symbol: analysis.symbol.clone(),
            date: analysis.as_of,
            action,
            price: analysis.current_price,
            confidence,
            trend_expectation: analysis.trend_expectation,
            reason,
            risk_level: (analysis.risk_score / 100.0).clamp(0.0, 1.0),
            suggested_position_size,
        }
    }

    /// Signal for a symbol that could not be analyzed today.
    ///
    /// Always OBSERVE with zero confidence; held positions are left alone.
    pub fn decide_without_analysis(
        &self,
        symbol: &str,
        date: NaiveDate,
        price: f64,
        reason: impl Into<String>,
    ) -> TradingSignal {
        TradingSignal {
            symbol: symbol.to_string(),
            date,
            action: SignalAction::Observe,
            price,
            confidence: 0.0,
            trend_expectation: TrendDirection::Sideways,
            reason: reason.into(),
            risk_level: 0.0,
            suggested_position_size: 0.0,
        }
    }

    /// Downgrade a SELL on a locked position to HOLD.
    ///
    /// Signals from any source pass through here before reaching the
    /// portfolio, so a lock-day SELL never becomes an order.
    pub fn enforce_settlement(&self, signal: TradingSignal, position: Option<&Position>) -> TradingSignal {
        match position {
            Some(p) if signal.is_sell() && !p.can_sell => {
                tracing::debug!(
                    symbol = %signal.symbol,
                    date = %signal.date,
                    buy_date = %p.buy_date,
                    "SELL downgraded to HOLD under T+1 lock"
                );
                TradingSignal {
                    action: SignalAction::Hold,
                    confidence: self.config.lock_confidence,
                    reason: format!("{}: {} (sell deferred)", T1_LOCK_REASON, signal.reason),
                    suggested_position_size: 0.0,
                    ..signal
                }
            }
            _ => signal,
        }
    }

    fn decide_flat(&self, a: &MarketAnalysis) -> (SignalAction, f64, String) {
        let c = &self.config;

        if a.technical_score > c.buy_min_technical
            && a.momentum_score > c.buy_min_momentum
            && a.risk_score < c.buy_max_risk
            && a.trend_expectation.is_up()
        {
            return (
                SignalAction::Buy,
                c.buy_confidence,
                format!(
                    "entry: technical {:.0}, momentum {:.0}, risk {:.0}, trend {}",
                    a.technical_score, a.momentum_score, a.risk_score, a.trend_expectation
                ),
            );
        }

        if a.technical_score > c.watch_min_technical
            && a.momentum_score > c.watch_min_momentum
            && a.risk_score < c.watch_max_risk
        {
            return (
                SignalAction::Observe,
                c.watch_confidence,
                "watch: setup forming".to_string(),
            );
        }

        (
            SignalAction::Observe,
            c.observe_confidence,
            "no setup".to_string(),
        )
    }

    fn decide_held(&self, a: &MarketAnalysis, p: &Position) -> (SignalAction, f64, String) {
        let c = &self.config;
        let rate = p.unrealized_pnl_rate;

        if rate >= c.take_profit_rate - RATE_EPSILON {
            return (
                SignalAction::Sell,
                c.take_profit_confidence,
                format!("take profit at {:+.2}%", rate * 100.0),
            );
        }

        if rate <= c.stop_loss_rate + RATE_EPSILON {
            return (
                SignalAction::Sell,
                c.stop_loss_confidence,
                format!("stop loss at {:+.2}%", rate * 100.0),
            );
        }

        if a.risk_score > c.exit_max_risk || a.trend_expectation == TrendDirection::StrongDown {
            return (
                SignalAction::Sell,
                c.risk_exit_confidence,
                format!("risk reduction: risk {:.0}, trend {}", a.risk_score, a.trend_expectation),
            );
        }

        if a.technical_score < c.weak_max_technical && a.momentum_score < c.weak_max_momentum {
            return (
                SignalAction::Sell,
                c.weak_exit_confidence,
                format!(
                    "weakening: technical {:.0}, momentum {:.0}",
                    a.technical_score, a.momentum_score
                ),
            );
        }

        (SignalAction::Hold, c.hold_confidence, "hold".to_string())
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new(DecisionConfig::default(), 0.2)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sample_analysis;
    use test_case::test_case;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn analysis(technical: f64, momentum: f64, risk: f64, trend: TrendDirection) -> MarketAnalysis {
        let mut a = sample_analysis("600000.SH", d(4));
        a.technical_score = technical;
        a.momentum_score = momentum;
        a.risk_score = risk;
        a.trend_expectation = trend;
        a
    }

    fn unlocked_at(price: f64) -> Position {
        let mut p = Position::open("600000.SH", 1000, 10.0, d(3), 5.0);
        p.mark(d(4), Some(price));
        p
    }

    #[test_case(75.0, 65.0, 50.0, TrendDirection::StrongUp => (SignalAction::Buy, 0.8) ; "strong setup buys")]
    #[test_case(75.0, 65.0, 50.0, TrendDirection::WeakUp => (SignalAction::Buy, 0.8) ; "weak uptrend buys")]
    #[test_case(75.0, 65.0, 50.0, TrendDirection::Sideways => (SignalAction::Observe, 0.6) ; "sideways only watches")]
    #[test_case(70.0, 65.0, 50.0, TrendDirection::StrongUp => (SignalAction::Observe, 0.6) ; "technical threshold is strict")]
    #[test_case(75.0, 65.0, 60.0, TrendDirection::StrongUp => (SignalAction::Observe, 0.6) ; "risk threshold is strict")]
    #[test_case(65.0, 58.0, 65.0, TrendDirection::WeakDown => (SignalAction::Observe, 0.6) ; "watch band")]
    #[test_case(60.0, 58.0, 65.0, TrendDirection::StrongUp => (SignalAction::Observe, 0.4) ; "below watch band")]
    #[test_case(90.0, 90.0, 75.0, TrendDirection::StrongUp => (SignalAction::Observe, 0.4) ; "too risky to watch")]
    fn test_flat_decisions(technical: f64, momentum: f64, risk: f64, trend: TrendDirection) -> (SignalAction, f64) {
        let signal = DecisionPolicy::default().decide(&analysis(technical, momentum, risk, trend), None);
        (signal.action, signal.confidence)
    }

    #[test_case(11.6, 50.0, 50.0, 30.0, TrendDirection::Sideways => (SignalAction::Sell, 0.9) ; "take profit")]
    #[test_case(9.1, 50.0, 50.0, 30.0, TrendDirection::Sideways => (SignalAction::Sell, 0.8) ; "stop loss")]
    #[test_case(9.2, 50.0, 50.0, 30.0, TrendDirection::Sideways => (SignalAction::Sell, 0.8) ; "stop loss boundary")]
    #[test_case(10.5, 50.0, 50.0, 85.0, TrendDirection::Sideways => (SignalAction::Sell, 0.7) ; "high risk exits")]
    #[test_case(10.5, 50.0, 50.0, 30.0, TrendDirection::StrongDown => (SignalAction::Sell, 0.7) ; "strong downtrend exits")]
    #[test_case(10.5, 35.0, 35.0, 30.0, TrendDirection::Sideways => (SignalAction::Sell, 0.6) ; "weakening exits")]
    #[test_case(10.5, 35.0, 45.0, 30.0, TrendDirection::Sideways => (SignalAction::Hold, 0.5) ; "one weak score holds")]
    #[test_case(11.6, 10.0, 10.0, 95.0, TrendDirection::StrongDown => (SignalAction::Sell, 0.9) ; "take profit has priority")]
    fn test_held_decisions(
        price: f64,
        technical: f64,
        momentum: f64,
        risk: f64,
        trend: TrendDirection,
    ) -> (SignalAction, f64) {
        let position = unlocked_at(price);
        let signal = DecisionPolicy::default()
            .decide(&analysis(technical, momentum, risk, trend), Some(&position));
        (signal.action, signal.confidence)
    }

    #[test]
    fn test_take_profit_at_exact_threshold() {
        let position = unlocked_at(11.5);
        let signal = DecisionPolicy::default()
            .decide(&analysis(50.0, 50.0, 30.0, TrendDirection::Sideways), Some(&position));

        assert_eq!(signal.action, SignalAction::Sell);
        assert!(signal.reason.contains("take profit"));
    }

    #[test]
    fn test_lock_dominates_every_exit() {
        let mut position = Position::open("600000.SH", 1000, 10.0, d(4), 5.0);
        position.update_price(5.0);
        let signal = DecisionPolicy::default()
            .decide(&analysis(0.0, 0.0, 100.0, TrendDirection::StrongDown), Some(&position));

        assert_eq!(signal.action, SignalAction::Hold);
        assert_eq!(signal.confidence, 0.9);
        assert!(signal.reason.contains("T+1"));
    }

    #[test]
    fn test_buy_size_scales_with_confidence() {
        let policy = DecisionPolicy::new(DecisionConfig::default(), 0.25);
        let signal = policy.decide(&analysis(75.0, 65.0, 50.0, TrendDirection::StrongUp), None);

        assert!((signal.suggested_position_size - 0.2).abs() < 1e-12);
        assert!((signal.risk_level - 0.5).abs() < 1e-12);

        let observe = policy.decide(&analysis(50.0, 50.0, 50.0, TrendDirection::StrongUp), None);
        assert_eq!(observe.suggested_position_size, 0.0);
    }

    #[test]
    fn test_enforce_settlement_downgrades_locked_sell() {
        let policy = DecisionPolicy::default();
        let position = Position::open("600000.SH", 1000, 10.0, d(4), 5.0);
        let mut sell = policy.decide_without_analysis("600000.SH", d(4), 10.0, "manual exit");
        sell.action = SignalAction::Sell;

        let enforced = policy.enforce_settlement(sell.clone(), Some(&position));
        assert_eq!(enforced.action, SignalAction::Hold);
        assert!(enforced.reason.contains("T+1"));

        let unlocked = unlocked_at(10.0);
        assert_eq!(policy.enforce_settlement(sell, Some(&unlocked)).action, SignalAction::Sell);
    }

    #[test]
    fn test_without_analysis_observes() {
        let signal = DecisionPolicy::default().decide_without_analysis("X", d(4), 3.0, "insufficient history");
        assert_eq!(signal.action, SignalAction::Observe);
        assert_eq!(signal.confidence, 0.0);
        assert!(!signal.action.is_actionable());
    }

    #[test]
    fn test_position_state() {
        assert_eq!(PositionState::of(None), PositionState::Flat);
        let locked = Position::open("X", 100, 1.0, d(4), 5.0);
        assert_eq!(PositionState::of(Some(&locked)), PositionState::HeldLocked);
        assert_eq!(PositionState::of(Some(&unlocked_at(1.0))), PositionState::HeldUnlocked);
    }
}
