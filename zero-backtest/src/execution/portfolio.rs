//! Settlement ledger.
//!
//! [`PortfolioState`] exclusively owns cash and open positions. Every
//! rejected order leaves it untouched; the serialized state before and after
//! a rejection is identical.
//!
//! Invariants after every successful execution:
//! - `cash >= 0`
//! - at most one [`Position`] per symbol
//! - after a BUY, `Σ market_value <= max_total_position × total_assets`

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::cost::{commission, Side};
use super::Position;
use crate::backtest::TradeRecord;
use crate::config::PortfolioConfig;
use crate::strategy::{SignalAction, TradingSignal};

/// Slack for lot rounding of `target_value / price`
const LOT_EPSILON: f64 = 1e-9;

/// Why an order was not executed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionRejection {
    #[error("{symbol}: position already open")]
    PositionExists { symbol: String },

    #[error("{symbol}: insufficient funds, need {required:.2}, have {available:.2}")]
    InsufficientFunds {
        symbol: String,
        required: f64,
        available: f64,
    },

    #[error("{symbol}: target size rounds to zero lots")]
    ZeroShares { symbol: String },

    #[error("{symbol}: trade value {value:.2} below minimum {minimum:.2}")]
    BelowMinimumTrade {
        symbol: String,
        value: f64,
        minimum: f64,
    },

    #[error("{symbol}: total position limit leaves no room")]
    ExceedsTotalPosition { symbol: String },

    #[error("{symbol}: no open position")]
    NoPosition { symbol: String },

    #[error("{symbol}: T+1 lock, bought {buy_date}")]
    T1LockViolation { symbol: String, buy_date: NaiveDate },

    #[error("{symbol}: invalid price {price}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("{symbol}: {action} is not an order")]
    NotActionable { symbol: String, action: SignalAction },
}

/// One executed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub date: NaiveDate,
    pub side: Side,
    pub shares: u64,
    pub price: f64,
    pub commission: f64,
    pub cash_after: f64,
    pub reason: String,
}

/// Cash, positions and the append-only execution history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    config: PortfolioConfig,
    cash: f64,
    positions: BTreeMap<String, Position>,
    fills: Vec<Fill>,
    trades: Vec<TradeRecord>,
}

impl PortfolioState {
    pub fn new(config: PortfolioConfig) -> Self {
        Self {
            cash: config.initial_capital,
            config,
            positions: BTreeMap::new(),
            fills: Vec::new(),
            trades: Vec::new(),
        }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Every executed order, oldest first
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Closed round trips, oldest first
    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Σ market value of open positions
    pub fn market_value(&self) -> f64 {
        self.positions.values().map(|p| p.market_value).sum()
    }

    /// Cash plus market value (NAV)
    pub fn total_assets(&self) -> f64 {
        self.cash + self.market_value()
    }

    /// Revalue positions and release T+1 locks for `date`.
    ///
    /// Symbols missing from `prices` keep their last price but still unlock.
    pub fn mark_to_market(&mut self, date: NaiveDate, prices: &BTreeMap<String, f64>) {
        for (symbol, position) in self.positions.iter_mut() {
            let was_locked = !position.can_sell;
            position.mark(date, prices.get(symbol).copied());
            if was_locked && position.can_sell {
                tracing::trace!(symbol = %symbol, date = %date, "T+1 lock released");
            }
        }
    }

    /// Execute a signal, logging and swallowing any rejection.
    pub fn execute(&mut self, signal: &TradingSignal) -> bool {
        match self.submit(signal) {
            Ok(_) => true,
            Err(rejection) => {
                tracing::warn!(
                    symbol = %signal.symbol,
                    date = %signal.date,
                    action = %signal.action,
                    error = %rejection,
                    "Order rejected"
                );
                false
            }
        }
    }

    /// Execute a signal at `signal.price`, returning the fill or the reason
    /// it was rejected. HOLD and OBSERVE are rejected as not actionable.
    pub fn submit(&mut self, signal: &TradingSignal) -> Result<Fill, ExecutionRejection> {
        match signal.action {
            SignalAction::Buy => self.buy(signal),
            SignalAction::Sell => self.sell(signal),
            action => Err(ExecutionRejection::NotActionable {
                symbol: signal.symbol.clone(),
                action,
            }),
        }
    }

    /// Shares a BUY for `signal` would receive, or why it cannot be filled.
    /// Does not mutate state.
    pub fn size_buy(&self, signal: &TradingSignal) -> Result<u64, ExecutionRejection> {
        let symbol = &signal.symbol;
        let price = signal.price;
        let cfg = &self.config;

        if !(price.is_finite() && price > 0.0) {
            return Err(ExecutionRejection::InvalidPrice {
                symbol: symbol.clone(),
                price,
            });
        }

        let existing = self.positions.get(symbol);
        if existing.is_some() && !cfg.allow_position_scaling {
            return Err(ExecutionRejection::PositionExists {
                symbol: symbol.clone(),
            });
        }

        let lot = u64::from(cfg.lot_size.max(1));
        let total_assets = self.total_assets();
        let size = signal
            .suggested_position_size
            .min(cfg.max_position_size)
            .max(0.0);
        let target_value = size * total_assets;
        let lots = (target_value / price / lot as f64 + LOT_EPSILON).floor();
        let mut shares = if lots.is_finite() && lots > 0.0 {
            // A share count past u64 means the price itself is degenerate
            if lots >= (u64::MAX / lot) as f64 {
                return Err(ExecutionRejection::InvalidPrice {
                    symbol: symbol.clone(),
                    price,
                });
            }
            lots as u64 * lot
        } else {
            0
        };

        if shares == 0 {
            return Err(ExecutionRejection::ZeroShares {
                symbol: symbol.clone(),
            });
        }

        // No partial fills: an unaffordable target is rejected, not shrunk
        let value = shares as f64 * price;
        let required = (value * (1.0 + cfg.commission_rate)).max(value + self.commission(value));
        if required > self.cash {
            return Err(ExecutionRejection::InsufficientFunds {
                symbol: symbol.clone(),
                required,
                available: self.cash,
            });
        }

        // Held value after the fill, with this symbol revalued at the fill price
        let other_value: f64 = self
            .positions
            .values()
            .filter(|p| &p.symbol != symbol)
            .map(|p| p.market_value)
            .sum();
        let existing_shares = existing.map_or(0, |p| p.shares);
        let fits = |shares: u64| {
            let value = shares as f64 * price;
            let held_after = other_value + (existing_shares + shares) as f64 * price;
            let assets_after = total_assets - self.commission(value);
            held_after <= cfg.max_total_position * assets_after
        };

        while shares > 0 && !fits(shares) {
            shares -= lot;
        }
        if shares == 0 {
            return Err(ExecutionRejection::ExceedsTotalPosition {
                symbol: symbol.clone(),
            });
        }

        let value = shares as f64 * price;
        if value < cfg.min_trade_amount {
            return Err(ExecutionRejection::BelowMinimumTrade {
                symbol: symbol.clone(),
                value,
                minimum: cfg.min_trade_amount,
            });
        }

        Ok(shares)
    }

    fn buy(&mut self, signal: &TradingSignal) -> Result<Fill, ExecutionRejection> {
        let shares = self.size_buy(signal)?;
        let price = signal.price;
        let value = shares as f64 * price;
        let fee = self.commission(value);

        self.cash -= value + fee;
        match self.positions.get_mut(&signal.symbol) {
            Some(position) => position.add_shares(shares, price, signal.date, fee),
            None => {
                self.positions.insert(
                    signal.symbol.clone(),
                    Position::open(signal.symbol.clone(), shares, price, signal.date, fee),
                );
            }
        }

        let fill = Fill {
            symbol: signal.symbol.clone(),
            date: signal.date,
            side: Side::Buy,
            shares,
            price,
            commission: fee,
            cash_after: self.cash,
            reason: signal.reason.clone(),
        };

        tracing::debug!(
            symbol = %fill.symbol,
            date = %fill.date,
            shares,
            price,
            commission = fee,
            cash = self.cash,
            "BUY filled"
        );

        self.fills.push(fill.clone());
        Ok(fill)
    }

    fn sell(&mut self, signal: &TradingSignal) -> Result<Fill, ExecutionRejection> {
        let symbol = &signal.symbol;
        let price = signal.price;

        let Some(position) = self.positions.get(symbol) else {
            return Err(ExecutionRejection::NoPosition {
                symbol: symbol.clone(),
            });
        };
        if !position.can_sell {
            return Err(ExecutionRejection::T1LockViolation {
                symbol: symbol.clone(),
                buy_date: position.buy_date,
            });
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(ExecutionRejection::InvalidPrice {
                symbol: symbol.clone(),
                price,
            });
        }

        let Some(position) = self.positions.remove(symbol) else {
            return Err(ExecutionRejection::NoPosition {
                symbol: symbol.clone(),
            });
        };

        let proceeds = position.shares as f64 * price;
        let fee = self.commission(proceeds);
        self.cash += proceeds - fee;

        let gross_pnl = (price - position.avg_cost) * position.shares as f64;
        let total_commission = position.entry_commission + fee;
        self.trades.push(TradeRecord {
            symbol: symbol.clone(),
            entry_date: position.buy_date,
            entry_price: position.avg_cost,
            exit_date: signal.date,
            exit_price: price,
            shares: position.shares,
            gross_pnl,
            net_pnl: gross_pnl - total_commission,
            commission: total_commission,
            exit_reason: signal.reason.clone(),
        });

        let fill = Fill {
            symbol: symbol.clone(),
            date: signal.date,
            side: Side::Sell,
            shares: position.shares,
            price,
            commission: fee,
            cash_after: self.cash,
            reason: signal.reason.clone(),
        };

        tracing::debug!(
            symbol = %fill.symbol,
            date = %fill.date,
            shares = fill.shares,
            price,
            commission = fee,
            pnl = gross_pnl - total_commission,
            cash = self.cash,
            "SELL filled"
        );

        self.fills.push(fill.clone());
        Ok(fill)
    }

    fn commission(&self, value: f64) -> f64 {
        commission(value, self.config.commission_rate, self.config.min_commission)
    }
}

// ============================================================================
// Tests
// ============================================================================
