//! Day-by-day simulation over a date range.
//!
//! Drives analysis, decisions and T+1 execution for every trading date and
//! summarizes the resulting NAV series and round trips.

mod engine;
mod metrics;
mod report;

pub use engine::{BacktestOrchestrator, NavPoint, SignalLogEntry, SignalStatus, SimulationState};
pub use metrics::{daily_returns, max_drawdown, sharpe_ratio, PerformanceSummary, TradeRecord, TRADING_DAYS_PER_YEAR};
pub use report::{nav_curve, realistic_trades_to_json, trades_to_json, BacktestReport, SignalStats};

// Re-export for convenience
pub use engine::BacktestResult;
