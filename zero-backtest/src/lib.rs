//! Zero Backtest Library
//!
//! A daily-bar trade simulator for markets with T+1 settlement: shares
//! bought on a trading day cannot be sold until a later trading day.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     BacktestOrchestrator (per day)                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │ MarketAnalyzer  │→ │ DecisionPolicy  │→ │ PortfolioState  │     │
//! │  │ (indicators)    │  │ (BUY/SELL/HOLD) │  │ (cash, T+1)     │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  MultiWindowExecutionSimulator + ExecutionCostModel (hindsight)     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## T+1 Settlement
//! - A position bought on day D is locked until the first trading day after D
//! - A SELL against a locked position becomes a HOLD, never an order
//!
//! ## Look-ahead Separation
//! - The daily loop only sees bars dated on or before the simulated day
//! - Execution capability analysis is explicitly hindsight and never feeds
//!   back into decisions

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analysis;
pub mod backtest;
pub mod capability;
pub mod config;
pub mod data;
pub mod error;
pub mod execution;
pub mod strategy;

pub use analysis::{MarketAnalysis, MarketAnalyzer, TrendDirection};
pub use backtest::{BacktestOrchestrator, BacktestReport, BacktestResult, PerformanceSummary, TradeRecord};
pub use capability::{ExecutionWindow, MultiWindowExecutionSimulator, RealisticTrade};
pub use config::SimulationConfig;
pub use data::{Candle, MarketData, PriceHistory};
pub use error::{BacktestError, Result};
pub use execution::{ExecutionCostModel, PortfolioState, Position};
pub use strategy::{DecisionPolicy, SignalAction, TradingSignal};
