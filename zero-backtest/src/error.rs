//! Root error type for simulation runs.
//!
//! Per-symbol failures (analysis gaps, rejected orders, skipped execution
//! windows) are values inside a run and never surface here; this type only
//! covers failures that stop a run from starting.

use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BacktestError>;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("no price history loaded")]
    NoData,

    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("no trading dates between {start} and {end}")]
    NoTradingDates { start: NaiveDate, end: NaiveDate },

    /// Configuration failed validation
    #[error(transparent)]
    Config(#[from] zero_common::Error),
}
