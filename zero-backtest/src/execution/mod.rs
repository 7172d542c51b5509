//! Order execution with T+1 compliance.
//!
//! Key T+1 rules:
//! - Shares bought on day D cannot be sold on day D
//! - The lock is released by the first mark-to-market after D
//! - A rejected order never mutates the portfolio

mod cost;
mod portfolio;
mod position;

pub use cost::{commission, ExecutionCostModel, Side, WindowKind};
pub use portfolio::{ExecutionRejection, Fill, PortfolioState};
pub use position::Position;
