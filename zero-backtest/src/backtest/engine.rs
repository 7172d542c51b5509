//! Day-by-day simulation loop.
//!
//! Per trading date:
//! 1. mark every open position to the latest close (releases T+1 locks)
//! 2. analyze each symbol that traded that day and decide
//! 3. execute SELLs, then BUYs, each by descending confidence
//! 4. record NAV
//!
//! The loop is single-threaded and deterministic. Only step 2's analysis may
//! fan out across the rayon pool; its results are merged in symbol order
//! before the portfolio is touched.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use super::metrics::{PerformanceSummary, TradeRecord};
use crate::analysis::{AnalysisResult, MarketAnalyzer};
use crate::capability::{CapabilityReport, MultiWindowExecutionSimulator};
use crate::config::SimulationConfig;
use crate::data::{AnalysisCache, MarketData, PriceHistory};
use crate::error::{BacktestError, Result};
use crate::execution::{Fill, PortfolioState, Position};
use crate::strategy::{DecisionPolicy, TradingSignal};
use zero_common::Validate;

// ============================================================================
// Run records
// ============================================================================

/// What happened to a logged signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SignalStatus {
    Executed,
    Rejected(String),
    /// HOLD or OBSERVE
    NotActionable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalLogEntry {
    pub signal: TradingSignal,
    pub status: SignalStatus,
}

/// End-of-day valuation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
    pub cash: f64,
}

/// Mutable state of one run
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub portfolio: PortfolioState,
    /// Every signal, in generation order
    pub signals: Vec<SignalLogEntry>,
    pub nav: Vec<NavPoint>,
}

impl SimulationState {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            portfolio: PortfolioState::new(config.portfolio.clone()),
            signals: Vec::new(),
            nav: Vec::new(),
        }
    }

    /// NAV series prefixed with the initial capital
    pub fn nav_series(&self) -> Vec<f64> {
        std::iter::once(self.portfolio.config().initial_capital)
            .chain(self.nav.iter().map(|p| p.nav))
            .collect()
    }
}

/// Outcome of a full run
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub summary: PerformanceSummary,
    pub signals: Vec<SignalLogEntry>,
    pub fills: Vec<Fill>,
    pub trades: Vec<TradeRecord>,
    pub nav: Vec<NavPoint>,
    pub final_cash: f64,
    /// Still open at the end, valued at the last close
    pub open_positions: Vec<Position>,
    /// Hindsight window analysis of closed trades, when enabled
    pub capability: Vec<CapabilityReport>,
}

impl BacktestResult {
    pub fn unrealized_pnl(&self) -> f64 {
        self.open_positions.iter().map(|p| p.unrealized_pnl).sum()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives analyzer, policy and portfolio across a date range
#[derive(Debug, Clone)]
pub struct BacktestOrchestrator {
    config: SimulationConfig,
    analyzer: MarketAnalyzer,
    policy: DecisionPolicy,
}

impl BacktestOrchestrator {
    pub fn new(config: SimulationConfig) -> Self {
        let mut analyzer = MarketAnalyzer::new(config.analyzer.clone());
        if config.cache.enabled {
            analyzer = analyzer.with_cache(Arc::new(AnalysisCache::new(config.cache.max_age_minutes)));
        }
        let policy = DecisionPolicy::new(config.decision.clone(), config.portfolio.max_position_size);

        Self {
            config,
            analyzer,
            policy,
        }
    }

    /// Validate `config` before building the orchestrator.
    ///
    /// [`new`](Self::new) trusts its input; use this for configs assembled
    /// in code rather than through [`SimulationConfig::load`].
    pub fn try_new(config: SimulationConfig) -> Result<Self> {
        config.validate().map_err(zero_common::Error::from)?;
        Ok(Self::new(config))
    }

    /// Replace the analyzer, e.g. to share a cache between runs. Cache
    /// entries are keyed by window content, so runs over different prices
    /// never see each other's analyses.
    pub fn with_analyzer(mut self, analyzer: MarketAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run over every trading date in `[start, end]`
    pub fn run(&self, market: &MarketData, start: NaiveDate, end: NaiveDate) -> Result<BacktestResult> {
        if market.is_empty() {
            return Err(BacktestError::NoData);
        }
        if start > end {
            return Err(BacktestError::InvalidRange { start, end });
        }
        let dates = market.trading_dates(start, end);
        if dates.is_empty() {
            return Err(BacktestError::NoTradingDates { start, end });
        }

        tracing::info!(
            symbols = market.len(),
            start = %start,
            end = %end,
            trading_days = dates.len(),
            initial_capital = self.config.portfolio.initial_capital,
            "Starting backtest"
        );

        let mut state = SimulationState::new(&self.config);
        for date in dates {
            self.tick(&mut state, market, date);
        }

        let trades = state.portfolio.trades().to_vec();
        let fills = state.portfolio.fills().to_vec();
        let total_commission: f64 = fills.iter().map(|f| f.commission).sum();
        let summary = PerformanceSummary::calculate(&state.nav_series(), &trades, fills.len(), total_commission);

        let capability = if self.config.run.analyze_execution_capability {
            self.capability_cross_check(market, &trades)
        } else {
            Vec::new()
        };

        tracing::info!(
            total_return = summary.total_return,
            max_drawdown = summary.max_drawdown,
            sharpe = summary.sharpe_ratio,
            trades = summary.trade_count,
            open_positions = state.portfolio.position_count(),
            "Backtest finished"
        );

        Ok(BacktestResult {
            start_date: start,
            end_date: end,
            summary,
            final_cash: state.portfolio.cash(),
            open_positions: state.portfolio.positions().cloned().collect(),
            signals: state.signals,
            fills,
            trades,
            nav: state.nav,
            capability,
        })
    }

    /// Advance the simulation by one trading date
    pub fn tick(&self, state: &mut SimulationState, market: &MarketData, date: NaiveDate) {
        state.portfolio.mark_to_market(date, &market.closes_as_of(date));

        let active: Vec<&PriceHistory> = market
            .histories()
            .filter(|h| h.bar_on(date).is_some())
            .collect();

        let analyses: Vec<AnalysisResult> = if self.config.run.parallel_analysis {
            active.par_iter().map(|h| self.analyzer.analyze(h, date)).collect()
        } else {
            active.iter().map(|h| self.analyzer.analyze(h, date)).collect()
        };

        let signals: Vec<TradingSignal> = active
            .iter()
            .zip(analyses)
            .map(|(history, analysis)| {
                let position = state.portfolio.position(history.symbol());
                let signal = match analysis {
                    Ok(analysis) => self.policy.decide(&analysis, position),
                    Err(e) => {
                        let close = history.bar_on(date).map_or(0.0, |c| c.close);
                        self.policy.decide_without_analysis(history.symbol(), date, close, e.to_string())
                    }
                };
                self.policy.enforce_settlement(signal, position)
            })
            .collect();

        self.execute_batch(state, signals);

        let nav = state.portfolio.total_assets();
        state.nav.push(NavPoint {
            date,
            nav,
            cash: state.portfolio.cash(),
        });
        tracing::debug!(date = %date, nav, positions = state.portfolio.position_count(), "Day closed");
    }

    /// Log a day's signals and execute the actionable ones: SELLs before
    /// BUYs, each by descending confidence, ties in symbol order.
    pub fn execute_batch(&self, state: &mut SimulationState, signals: Vec<TradingSignal>) {
        let base = state.signals.len();
        let mut sells = Vec::new();
        let mut buys = Vec::new();

        for (offset, signal) in signals.into_iter().enumerate() {
            if signal.is_sell() {
                sells.push(base + offset);
            } else if signal.is_buy() {
                buys.push(base + offset);
            }
            state.signals.push(SignalLogEntry {
                signal,
                status: SignalStatus::NotActionable,
            });
        }

        let by_confidence = |a: &usize, b: &usize| {
            let ca = state.signals[*a].signal.confidence;
            let cb = state.signals[*b].signal.confidence;
            cb.partial_cmp(&ca).unwrap_or(Ordering::Equal)
        };
        sells.sort_by(by_confidence);
        buys.sort_by(by_confidence);

        for idx in sells.into_iter().chain(buys) {
            let entry = &mut state.signals[idx];
            entry.status = match state.portfolio.submit(&entry.signal) {
                Ok(_) => SignalStatus::Executed,
                Err(rejection) => {
                    tracing::warn!(
                        symbol = %entry.signal.symbol,
                        date = %entry.signal.date,
                        action = %entry.signal.action,
                        error = %rejection,
                        "Order rejected"
                    );
                    SignalStatus::Rejected(rejection.to_string())
                }
            };
        }
    }

    fn capability_cross_check(&self, market: &MarketData, trades: &[TradeRecord]) -> Vec<CapabilityReport> {
        let simulator = MultiWindowExecutionSimulator::from_config(
            &self.config.market_impact,
            &self.config.portfolio,
            &self.config.execution,
        );

        trades
            .iter()
            .filter_map(|trade| {
                let history = market.get(&trade.symbol)?;
                Some(simulator.analyze_capability(
                    history,
                    trade.entry_date,
                    trade.exit_date,
                    &self.config.execution.windows,
                ))
            })
            .collect()
    }
}

impl Default for BacktestOrchestrator {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
