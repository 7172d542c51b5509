//! Execution capability analysis.
//!
//! Replays a known entry/exit signal pair across a catalogue of execution
//! windows and reports what each timing would have realized after slippage,
//! market impact and commission.
//!
//! # Look-ahead
//!
//! [`MultiWindowExecutionSimulator::select_optimal`] ranks variants with full
//! knowledge of the exit. It answers "what was achievable" for a finished
//! trade and must never feed a live decision; nothing in
//! [`crate::strategy`] or the daily loop of [`crate::backtest`] calls into
//! this module.

mod sweep;

pub use sweep::{CancellationToken, ParameterSweep, SignalPair, SweepOutcome, SweepResults};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zero_common::{Validate, ValidationResult, Validator};

use crate::config::{ExecutionConfig, MarketImpactConfig, PortfolioConfig};
use crate::data::{Candle, PriceHistory};
use crate::execution::{ExecutionCostModel, Side, WindowKind};

// ============================================================================
// Window catalogue
// ============================================================================

/// One execution-timing variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionWindow {
    pub name: String,
    pub entry_window: WindowKind,
    pub exit_window: WindowKind,
    /// Trading days after the entry signal bar
    pub entry_delay_days: usize,
    /// Trading days after the exit signal bar
    pub exit_delay_days: usize,
    /// Fraction of the order sent per batch, in (0, 1]
    pub batch_size: f64,
    /// Cap on the fraction of bar volume one batch may take
    pub max_volume_ratio: f64,
}

impl ExecutionWindow {
    pub fn new(
        name: impl Into<String>,
        entry_window: WindowKind,
        exit_window: WindowKind,
        entry_delay_days: usize,
        exit_delay_days: usize,
    ) -> Self {
        Self {
            name: name.into(),
            entry_window,
            exit_window,
            entry_delay_days,
            exit_delay_days,
            batch_size: 1.0,
            max_volume_ratio: 0.1,
        }
    }

    pub fn with_batching(mut self, batch_size: f64, max_volume_ratio: f64) -> Self {
        self.batch_size = batch_size;
        self.max_volume_ratio = max_volume_ratio;
        self
    }

    /// Standard variants, in tie-break order
    pub fn default_catalogue() -> Vec<Self> {
        vec![
            Self::new("next_open", WindowKind::Open, WindowKind::Open, 1, 1),
            Self::new("same_close", WindowKind::Close, WindowKind::Close, 0, 0),
            Self::new("next_vwap", WindowKind::Vwap, WindowKind::Vwap, 1, 1),
            Self::new("next_intraday", WindowKind::Intraday, WindowKind::Intraday, 1, 1),
            Self::new("close_then_open", WindowKind::Close, WindowKind::Open, 0, 1),
            Self::new("batched_vwap", WindowKind::Vwap, WindowKind::Vwap, 1, 1).with_batching(0.5, 0.05),
        ]
    }
}

impl Validate for ExecutionWindow {
    fn validate(&self) -> ValidationResult<()> {
        Validator::new()
            .check(!self.name.is_empty(), "execution.windows.name", "must not be empty")
            .in_range(
                &format!("execution.windows[{}].batch_size", self.name),
                self.batch_size,
                f64::MIN_POSITIVE,
                1.0,
            )
            .in_range(
                &format!("execution.windows[{}].max_volume_ratio", self.name),
                self.max_volume_ratio,
                f64::MIN_POSITIVE,
                1.0,
            )
            .finish()
    }
}

// ============================================================================
// Realized trade
// ============================================================================

/// A signal pair as it would have filled under one window variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealisticTrade {
    pub symbol: String,
    pub window: String,
    pub signal_date: NaiveDate,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub target_entry_price: f64,
    pub entry_slippage: f64,
    pub exit_signal_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub target_exit_price: f64,
    pub exit_slippage: f64,
    pub shares: u64,
    /// `shares × target_entry_price`
    pub trade_value: f64,
    pub commission_cost: f64,
    /// Currency cost of slippage on both legs
    pub market_impact_cost: f64,
    /// Return between target prices
    pub gross_return_rate: f64,
    pub net_return_rate: f64,
    /// Calendar days between fills
    pub hold_days: i64,
    pub execution_quality: f64,
    pub liquidity_score: f64,
}

impl RealisticTrade {
    pub fn total_cost(&self) -> f64 {
        self.commission_cost + self.market_impact_cost
    }
}

/// Why a window variant produced no trade
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WindowSkip {
    #[error("{window}: no {leg} bar on or after {date}")]
    NoBar {
        window: String,
        leg: &'static str,
        date: NaiveDate,
    },

    #[error("{window}: entry {entry_date} is not before exit {exit_date}")]
    EntryNotBeforeExit {
        window: String,
        entry_date: NaiveDate,
        exit_date: NaiveDate,
    },

    #[error("{window}: notional buys less than one lot at {price:.2}")]
    NotionalTooSmall { window: String, price: f64 },
}

/// All variants of one signal pair
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub trades: Vec<RealisticTrade>,
    #[serde(skip)]
    pub skipped: Vec<WindowSkip>,
}

/// Capability report for one finished trade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityReport {
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub exit_signal_date: NaiveDate,
    pub trades: Vec<RealisticTrade>,
    pub skipped: Vec<String>,
    /// Best variant in hindsight
    pub optimal: Option<RealisticTrade>,
}

// ============================================================================
// Simulator
// ============================================================================

/// Fills a signal pair under each window variant
#[derive(Debug, Clone)]
pub struct MultiWindowExecutionSimulator {
    cost: ExecutionCostModel,
    notional: f64,
    lot_size: u64,
    liquidity_lookback: usize,
}

impl MultiWindowExecutionSimulator {
    pub fn new(cost: ExecutionCostModel, notional: f64, lot_size: u64, liquidity_lookback: usize) -> Self {
        Self {
            cost,
            notional,
            lot_size: lot_size.max(1),
            liquidity_lookback,
        }
    }

    pub fn from_config(
        impact: &MarketImpactConfig,
        portfolio: &PortfolioConfig,
        execution: &ExecutionConfig,
    ) -> Self {
        Self::new(
            ExecutionCostModel::from_config(impact, portfolio),
            execution.analysis_notional,
            u64::from(portfolio.lot_size),
            execution.liquidity_lookback,
        )
    }

    pub fn cost_model(&self) -> &ExecutionCostModel {
        &self.cost
    }

    /// Realize the pair under every window. A variant that cannot be filled
    /// is skipped on its own; the rest are still evaluated.
    pub fn simulate(
        &self,
        history: &PriceHistory,
        signal_date: NaiveDate,
        exit_signal_date: NaiveDate,
        windows: &[ExecutionWindow],
    ) -> SimulationOutcome {
        let mut outcome = SimulationOutcome::default();

        for window in windows {
            match self.simulate_window(history, signal_date, exit_signal_date, window) {
                Ok(trade) => outcome.trades.push(trade),
                Err(skip) => {
                    tracing::warn!(
                        symbol = %history.symbol(),
                        signal_date = %signal_date,
                        reason = %skip,
                        "Skipped execution window"
                    );
                    outcome.skipped.push(skip);
                }
            }
        }

        outcome
    }

    /// Simulate and pick the hindsight-best variant
    pub fn analyze_capability(
        &self,
        history: &PriceHistory,
        signal_date: NaiveDate,
        exit_signal_date: NaiveDate,
        windows: &[ExecutionWindow],
    ) -> CapabilityReport {
        let outcome = self.simulate(history, signal_date, exit_signal_date, windows);
        let optimal = Self::select_optimal(&outcome.trades).cloned();

        CapabilityReport {
            symbol: history.symbol().to_string(),
            signal_date,
            exit_signal_date,
            skipped: outcome.skipped.iter().map(ToString::to_string).collect(),
            trades: outcome.trades,
            optimal,
        }
    }

    /// Highest composite score; the first-enumerated variant wins ties.
    pub fn select_optimal(trades: &[RealisticTrade]) -> Option<&RealisticTrade> {
        let mut best: Option<(&RealisticTrade, f64)> = None;
        for trade in trades {
            let score = composite_score(trade);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((trade, score)),
            }
        }
        best.map(|(trade, _)| trade)
    }

    fn simulate_window(
        &self,
        history: &PriceHistory,
        signal_date: NaiveDate,
        exit_signal_date: NaiveDate,
        window: &ExecutionWindow,
    ) -> Result<RealisticTrade, WindowSkip> {
        let bars = history.bars();
        let no_bar = |leg: &'static str, date: NaiveDate| WindowSkip::NoBar {
            window: window.name.clone(),
            leg,
            date,
        };

        let exit_idx = history
            .index_on_or_after(exit_signal_date)
            .map(|i| i + window.exit_delay_days)
            .filter(|&i| i < bars.len())
            .ok_or_else(|| no_bar("exit", exit_signal_date))?;
        let entry_idx = history
            .index_on_or_after(signal_date)
            .map(|i| i + window.entry_delay_days)
            .ok_or_else(|| no_bar("entry", signal_date))?;

        if entry_idx >= exit_idx {
            let entry_date = bars.get(entry_idx).map_or(signal_date, |c| c.date);
            return Err(WindowSkip::EntryNotBeforeExit {
                window: window.name.clone(),
                entry_date,
                exit_date: bars[exit_idx].date,
            });
        }

        let entry_bar = &bars[entry_idx];
        let exit_bar = &bars[exit_idx];

        let target_entry_price = self.cost.execution_price(entry_bar, window.entry_window);
        let target_exit_price = self.cost.execution_price(exit_bar, window.exit_window);

        let lots = (self.notional / target_entry_price / self.lot_size as f64).floor();
        if !(lots.is_finite() && lots >= 1.0) {
            return Err(WindowSkip::NotionalTooSmall {
                window: window.name.clone(),
                price: target_entry_price,
            });
        }
        let shares = lots as u64 * self.lot_size;
        let qty = shares as f64;

        let (entry_slippage, entry_vr) = self.leg_slippage(entry_bar, qty, window);
        let (exit_slippage, exit_vr) = self.leg_slippage(exit_bar, qty, window);
        let entry_price = self.cost.fill_price(target_entry_price, entry_slippage, Side::Buy);
        let exit_price = self.cost.fill_price(target_exit_price, exit_slippage, Side::Sell);

        let trade_value = qty * target_entry_price;
        let commission_cost =
            self.cost.commission(qty * entry_price) + self.cost.commission(qty * exit_price);
        let market_impact_cost =
            qty * (entry_price - target_entry_price) + qty * (target_exit_price - exit_price);

        let gross_return_rate = (target_exit_price - target_entry_price) / target_entry_price;
        let net_return_rate = gross_return_rate - (commission_cost + market_impact_cost) / trade_value;

        let hold_days = (exit_bar.date - entry_bar.date).num_days();
        let execution_quality = 0.6
            * (1.0 - (entry_slippage.abs() + exit_slippage.abs()) * 50.0).max(0.0)
            + 0.4 * holding_freshness(hold_days);

        let entry_liquidity = self.cost.liquidity_score(
            entry_bar,
            history.trailing_average_volume(entry_idx, self.liquidity_lookback),
            entry_vr,
        );
        let exit_liquidity = self.cost.liquidity_score(
            exit_bar,
            history.trailing_average_volume(exit_idx, self.liquidity_lookback),
            exit_vr,
        );

        Ok(RealisticTrade {
            symbol: history.symbol().to_string(),
            window: window.name.clone(),
            signal_date,
            entry_date: entry_bar.date,
            entry_price,
            target_entry_price,
            entry_slippage,
            exit_signal_date,
            exit_date: exit_bar.date,
            exit_price,
            target_exit_price,
            exit_slippage,
            shares,
            trade_value,
            commission_cost,
            market_impact_cost,
            gross_return_rate,
            net_return_rate,
            hold_days,
            execution_quality,
            liquidity_score: (entry_liquidity + exit_liquidity) / 2.0,
        })
    }

    fn leg_slippage(&self, bar: &Candle, shares: f64, window: &ExecutionWindow) -> (f64, f64) {
        let vr = self
            .cost
            .volume_ratio(bar, shares, window.batch_size, window.max_volume_ratio);
        (self.cost.slippage(bar, vr), vr)
    }
}

fn holding_freshness(hold_days: i64) -> f64 {
    (1.0 - hold_days as f64 / 30.0).max(0.0)
}

/// `0.4·net + 0.3·quality + 0.2·liquidity + 0.1·freshness`
pub fn composite_score(trade: &RealisticTrade) -> f64 {
    0.4 * trade.net_return_rate
        + 0.3 * trade.execution_quality
        + 0.2 * trade.liquidity_score
        + 0.1 * holding_freshness(trade.hold_days)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    /// Rising bars with open below close
    fn history(n: usize) -> PriceHistory {
        let bars = (0..n)
            .map(|i| {
                let close = 10.0 + 0.1 * i as f64;
                Candle::new(day(i), close - 0.05, close + 0.05, close - 0.1, close, 1_000_000.0)
            })
            .collect();
        PriceHistory::new("600000.SH", bars).unwrap()
    }

    fn simulator() -> MultiWindowExecutionSimulator {
        MultiWindowExecutionSimulator::new(ExecutionCostModel::default(), 100_000.0, 100, 10)
    }

    #[test]
    fn test_default_catalogue_is_valid() {
        let catalogue = ExecutionWindow::default_catalogue();
        assert_eq!(catalogue.len(), 6);
        assert!(catalogue.iter().all(|w| w.validate().is_ok()));
        assert_eq!(catalogue[0].name, "next_open");
    }

    #[test]
    fn test_batch_size_validation() {
        let window = ExecutionWindow::new("x", WindowKind::Open, WindowKind::Open, 1, 1).with_batching(0.0, 0.1);
        assert!(window.validate().is_err());
    }

    #[test]
    fn test_simulate_all_windows() {
        let outcome = simulator().simulate(&history(30), day(5), day(15), &ExecutionWindow::default_catalogue());

        assert_eq!(outcome.trades.len(), 6);
        assert!(outcome.skipped.is_empty());

        let next_open = &outcome.trades[0];
        assert_eq!(next_open.entry_date, day(6));
        assert_eq!(next_open.exit_date, day(16));
        assert_eq!(next_open.hold_days, 10);
        assert!(next_open.entry_price > next_open.target_entry_price);
        assert!(next_open.exit_price < next_open.target_exit_price);
        assert!(next_open.gross_return_rate > next_open.net_return_rate);
    }

    #[test]
    fn test_net_return_identity() {
        let outcome = simulator().simulate(&history(30), day(2), day(20), &ExecutionWindow::default_catalogue());
        for t in &outcome.trades {
            let expected = t.gross_return_rate - (t.commission_cost + t.market_impact_cost) / t.trade_value;
            assert!((t.net_return_rate - expected).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&t.execution_quality));
            assert!((0.0..=1.0).contains(&t.liquidity_score));
        }
    }

    #[test]
    fn test_exit_past_history_is_skipped() {
        // exit signal on the last bar: delay-1 variants run off the end
        let outcome = simulator().simulate(&history(20), day(5), day(19), &ExecutionWindow::default_catalogue());

        let names: Vec<&str> = outcome.trades.iter().map(|t| t.window.as_str()).collect();
        assert_eq!(names, vec!["same_close"]);
        assert_eq!(outcome.skipped.len(), 5);
        assert!(outcome
            .skipped
            .iter()
            .all(|s| matches!(s, WindowSkip::NoBar { leg: "exit", .. })));
    }

    #[test]
    fn test_same_day_pair_skips_only_invalid_windows() {
        let outcome = simulator().simulate(&history(30), day(5), day(5), &ExecutionWindow::default_catalogue());

        // only close-then-open enters before it exits
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].window, "close_then_open");
        assert!(outcome
            .skipped
            .iter()
            .all(|s| matches!(s, WindowSkip::EntryNotBeforeExit { .. })));
    }

    #[test]
    fn test_signal_on_holiday_forward_fills() {
        let bars: Vec<Candle> = history(30)
            .bars()
            .iter()
            .filter(|c| c.date != day(5))
            .cloned()
            .collect();
        let gappy = PriceHistory::new("600000.SH", bars).unwrap();

        let outcome = simulator().simulate(&gappy, day(5), day(15), &ExecutionWindow::default_catalogue()[1..2]);
        assert_eq!(outcome.trades[0].entry_date, day(6));
    }

    #[test]
    fn test_select_optimal_prefers_first_on_tie() {
        let outcome = simulator().simulate(&history(30), day(5), day(15), &ExecutionWindow::default_catalogue());
        let mut trades = vec![outcome.trades[0].clone(), outcome.trades[0].clone()];
        trades[1].window = "duplicate".to_string();

        let best = MultiWindowExecutionSimulator::select_optimal(&trades).unwrap();
        assert_eq!(best.window, "next_open");
        assert!(MultiWindowExecutionSimulator::select_optimal(&[]).is_none());
    }

    #[test]
    fn test_select_optimal_is_argmax() {
        let outcome = simulator().simulate(&history(30), day(5), day(15), &ExecutionWindow::default_catalogue());
        let best = MultiWindowExecutionSimulator::select_optimal(&outcome.trades).unwrap();
        let best_score = composite_score(best);

        assert!(outcome.trades.iter().all(|t| composite_score(t) <= best_score));
    }

    #[test]
    fn test_capability_report() {
        let report = simulator().analyze_capability(&history(20), day(5), day(19), &ExecutionWindow::default_catalogue());

        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.skipped.len(), 5);
        assert_eq!(report.optimal.as_ref().map(|t| t.window.as_str()), Some("same_close"));
    }
}
