//! Backtest performance metrics.
//!
//! All rates are fractions (0.15 = 15%).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Trading days per year used to annualize the Sharpe ratio
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Closed round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_date: NaiveDate,
    /// Average entry price
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub shares: u64,
    /// P&L before commission
    pub gross_pnl: f64,
    /// P&L after buy and sell commission
    pub net_pnl: f64,
    /// Buy plus sell commission
    pub commission: f64,
    /// Reason carried by the exit signal
    pub exit_reason: String,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    /// Net P&L over capital committed at entry
    pub fn return_rate(&self) -> f64 {
        let basis = self.entry_price * self.shares as f64;
        if basis > 0.0 {
            self.net_pnl / basis
        } else {
            0.0
        }
    }

    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}

/// Portfolio summary record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_capital: f64,
    pub final_nav: f64,
    /// `NAV_end / NAV_start − 1`
    pub total_return: f64,
    /// Largest peak-to-trough decline of the NAV series
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    /// Profitable closed trades over closed trades
    pub win_rate: f64,
    /// Closed round trips
    pub trade_count: usize,
    /// Executed orders, buys and sells
    pub fill_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub net_profit: f64,
    /// Gross winning P&L over gross losing P&L
    pub profit_factor: f64,
    pub avg_holding_days: f64,
    pub total_commission: f64,
}

impl PerformanceSummary {
    /// Summarize a NAV series (first value is the initial capital) and the
    /// closed trades.
    pub fn calculate(nav: &[f64], trades: &[TradeRecord], fill_count: usize, total_commission: f64) -> Self {
        let initial_capital = nav.first().copied().unwrap_or(0.0);
        let final_nav = nav.last().copied().unwrap_or(initial_capital);
        let total_return = if initial_capital > 0.0 {
            final_nav / initial_capital - 1.0
        } else {
            0.0
        };

        let trade_count = trades.len();
        let winning_trades = trades.iter().filter(|t| t.is_winner()).count();
        let gross_profit: f64 = trades.iter().filter(|t| t.is_winner()).map(|t| t.net_pnl).sum();
        let gross_loss: f64 = trades
            .iter()
            .filter(|t| !t.is_winner())
            .map(|t| t.net_pnl.abs())
            .sum();

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (win_rate, avg_holding_days) = if trade_count > 0 {
            (
                winning_trades as f64 / trade_count as f64,
                trades.iter().map(|t| t.holding_days() as f64).sum::<f64>() / trade_count as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            initial_capital,
            final_nav,
            total_return,
            max_drawdown: max_drawdown(nav),
            sharpe_ratio: sharpe_ratio(&daily_returns(nav)),
            win_rate,
            trade_count,
            fill_count,
            winning_trades,
            losing_trades: trade_count - winning_trades,
            net_profit: trades.iter().map(|t| t.net_pnl).sum(),
            profit_factor,
            avg_holding_days,
            total_commission,
        }
    }
}

/// Simple returns between consecutive NAV points
pub fn daily_returns(nav: &[f64]) -> Vec<f64> {
    nav.windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Maximum drawdown by the running-peak method, as a fraction of the peak
pub fn max_drawdown(nav: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for &value in nav {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }

    worst
}

/// Annualized Sharpe ratio with a zero risk-free rate.
///
/// Uses the sample standard deviation; zero with fewer than two returns or
/// no variance.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().mean();
    let std_dev = returns.iter().std_dev();

    if std_dev.is_finite() && std_dev > f64::EPSILON {
        mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================
