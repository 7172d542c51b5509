//! Parallel sweeps over signal pairs and market-impact settings.
//!
//! Each work unit is a pure function of an immutable price history, one
//! signal pair and one [`MarketImpactConfig`]; units run on the rayon pool
//! and share nothing mutable except the cancellation flag.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{ExecutionWindow, MultiWindowExecutionSimulator, RealisticTrade};
use crate::config::{ExecutionConfig, MarketImpactConfig, PortfolioConfig};
use crate::data::MarketData;
use crate::execution::ExecutionCostModel;

/// Best-effort cancellation shared between a sweep and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Known entry/exit signal dates for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalPair {
    pub symbol: String,
    pub signal_date: NaiveDate,
    pub exit_signal_date: NaiveDate,
}

impl SignalPair {
    pub fn new(symbol: impl Into<String>, signal_date: NaiveDate, exit_signal_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            signal_date,
            exit_signal_date,
        }
    }
}

/// Result of one (pair, impact setting) unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepOutcome {
    pub pair: SignalPair,
    /// Index into the impact settings passed to [`ParameterSweep::run`]
    pub impact_index: usize,
    pub trades: usize,
    pub skipped: usize,
    pub optimal: Option<RealisticTrade>,
}

/// Completed units, in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepResults {
    pub outcomes: Vec<SweepOutcome>,
    pub total_units: usize,
    /// Set when the token fired before every unit ran
    pub cancelled: bool,
}

impl SweepResults {
    pub fn completed(&self) -> usize {
        self.outcomes.len()
    }

    /// Mean hindsight-optimal net return per impact setting
    pub fn mean_net_return_by_impact(&self, settings: usize) -> Vec<Option<f64>> {
        (0..settings)
            .map(|idx| {
                let returns: Vec<f64> = self
                    .outcomes
                    .iter()
                    .filter(|o| o.impact_index == idx)
                    .filter_map(|o| o.optimal.as_ref().map(|t| t.net_return_rate))
                    .collect();
                (!returns.is_empty()).then(|| returns.iter().sum::<f64>() / returns.len() as f64)
            })
            .collect()
    }
}

/// Fan-out of capability analysis over a parameter grid
#[derive(Debug, Clone)]
pub struct ParameterSweep {
    windows: Vec<ExecutionWindow>,
    portfolio: PortfolioConfig,
    execution: ExecutionConfig,
    parallel: bool,
}

impl ParameterSweep {
    pub fn new(portfolio: PortfolioConfig, execution: ExecutionConfig) -> Self {
        Self {
            windows: execution.windows.clone(),
            portfolio,
            execution,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every `(pair, impact)` combination.
    ///
    /// Units that start after `token` fires are skipped; finished units are
    /// kept. Pairs whose symbol has no history produce an outcome with no
    /// trades.
    pub fn run(
        &self,
        market: &MarketData,
        pairs: &[SignalPair],
        impacts: &[MarketImpactConfig],
        token: &CancellationToken,
    ) -> SweepResults {
        self.run_with_progress(market, pairs, impacts, token, |_, _, _| {})
    }

    /// Like [`run`](Self::run), invoking `progress` after each unit with
    /// the number of completed units, the total, and the finished outcome.
    pub fn run_with_progress<F>(
        &self,
        market: &MarketData,
        pairs: &[SignalPair],
        impacts: &[MarketImpactConfig],
        token: &CancellationToken,
        progress: F,
    ) -> SweepResults
    where
        F: Fn(usize, usize, &SweepOutcome) + Send + Sync,
    {
        let units: Vec<(&SignalPair, usize)> = pairs
            .iter()
            .flat_map(|pair| (0..impacts.len()).map(move |idx| (pair, idx)))
            .collect();
        let total_units = units.len();
        let completed = AtomicUsize::new(0);

        tracing::info!(
            pairs = pairs.len(),
            impact_settings = impacts.len(),
            total_units,
            parallel = self.parallel,
            "Starting parameter sweep"
        );

        let run_unit = |&(pair, idx): &(&SignalPair, usize)| -> Option<SweepOutcome> {
            if token.is_cancelled() {
                return None;
            }
            let outcome = self.run_unit(market, pair, idx, &impacts[idx]);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress(done, total_units, &outcome);
            Some(outcome)
        };

        let outcomes: Vec<SweepOutcome> = if self.parallel {
            units.par_iter().filter_map(run_unit).collect()
        } else {
            units.iter().filter_map(run_unit).collect()
        };

        let cancelled = outcomes.len() < total_units;
        tracing::info!(
            completed = completed.load(Ordering::Relaxed),
            total_units,
            cancelled,
            "Parameter sweep finished"
        );

        SweepResults {
            outcomes,
            total_units,
            cancelled,
        }
    }

    fn run_unit(
        &self,
        market: &MarketData,
        pair: &SignalPair,
        impact_index: usize,
        impact: &MarketImpactConfig,
    ) -> SweepOutcome {
        let Some(history) = market.get(&pair.symbol) else {
            return SweepOutcome {
                pair: pair.clone(),
                impact_index,
                trades: 0,
                skipped: self.windows.len(),
                optimal: None,
            };
        };

        let simulator = MultiWindowExecutionSimulator::new(
            ExecutionCostModel::from_config(impact, &self.portfolio),
            self.execution.analysis_notional,
            u64::from(self.portfolio.lot_size),
            self.execution.liquidity_lookback,
        );
        let outcome = simulator.simulate(history, pair.signal_date, pair.exit_signal_date, &self.windows);

        SweepOutcome {
            pair: pair.clone(),
            impact_index,
            trades: outcome.trades.len(),
            skipped: outcome.skipped.len(),
            optimal: MultiWindowExecutionSimulator::select_optimal(&outcome.trades).cloned(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Candle, PriceHistory};

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn market() -> MarketData {
        ["600000.SH", "000001.SZ"]
            .iter()
            .map(|symbol| {
                let bars = (0..40)
                    .map(|i| {
                        let close = 10.0 + 0.05 * i as f64;
                        Candle::new(day(i), close, close + 0.1, close - 0.1, close, 500_000.0)
                    })
                    .collect();
                PriceHistory::new(*symbol, bars).unwrap()
            })
            .collect()
    }

    fn pairs() -> Vec<SignalPair> {
        vec![
            SignalPair::new("600000.SH", day(5), day(15)),
            SignalPair::new("000001.SZ", day(10), day(30)),
            SignalPair::new("MISSING", day(10), day(30)),
        ]
    }

    fn impacts() -> Vec<MarketImpactConfig> {
        let base = MarketImpactConfig::default();
        vec![
            base.clone(),
            MarketImpactConfig {
                linear_cost: 0.5,
                fixed_cost: 0.001,
                ..base
            },
        ]
    }

    #[test]
    fn test_sweep_covers_grid_in_order() {
        let sweep = ParameterSweep::new(PortfolioConfig::default(), ExecutionConfig::default());
        let results = sweep.run(&market(), &pairs(), &impacts(), &CancellationToken::new());

        assert_eq!(results.total_units, 6);
        assert_eq!(results.completed(), 6);
        assert!(!results.cancelled);
        assert_eq!(results.outcomes[0].pair.symbol, "600000.SH");
        assert_eq!(results.outcomes[1].impact_index, 1);
        assert!(results.outcomes[4].optimal.is_none());
    }

    #[test]
    fn test_higher_impact_costs_more() {
        let sweep = ParameterSweep::new(PortfolioConfig::default(), ExecutionConfig::default());
        let results = sweep.run(&market(), &pairs()[..1], &impacts(), &CancellationToken::new());

        let means = results.mean_net_return_by_impact(2);
        let cheap = means[0].unwrap();
        let expensive = means[1].unwrap();
        assert!(cheap > expensive);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sweep = ParameterSweep::new(PortfolioConfig::default(), ExecutionConfig::default());
        let token = CancellationToken::new();
        let parallel = sweep.run(&market(), &pairs(), &impacts(), &token);
        let sequential = sweep
            .clone()
            .with_parallelism(false)
            .run(&market(), &pairs(), &impacts(), &token);

        assert_eq!(parallel.outcomes, sequential.outcomes);
    }

    #[test]
    fn test_cancelled_before_start_returns_nothing() {
        let sweep = ParameterSweep::new(PortfolioConfig::default(), ExecutionConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let results = sweep.run(&market(), &pairs(), &impacts(), &token);
        assert!(results.cancelled);
        assert_eq!(results.completed(), 0);
        assert_eq!(results.total_units, 6);
    }

    #[test]
    fn test_cancel_mid_sweep_keeps_finished_units() {
        let sweep = ParameterSweep::new(PortfolioConfig::default(), ExecutionConfig::default())
            .with_parallelism(false);
        let token = CancellationToken::new();
        let full = sweep.run(&market(), &pairs(), &impacts(), &CancellationToken::new());

        let partial = sweep.run_with_progress(&market(), &pairs(), &impacts(), &token, |done, _, _| {
            if done == 2 {
                token.cancel();
            }
        });

        assert!(partial.cancelled);
        assert_eq!(partial.total_units, 6);
        assert_eq!(partial.completed(), 2);
        assert_eq!(partial.outcomes[..], full.outcomes[..2]);
    }

    #[test]
    fn test_token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
