//! Vectorized backtester.
//!
//! This module turns a target-position series into realized P&L:
//! - One-bar execution lag (no lookahead)
//! - Proportional commission and slippage on turnover
//! - Equity compounding from a configurable initial capital

pub mod cost;
pub mod engine;

pub use cost::CostModel;
pub use engine::{equity_curve, BacktestConfig, BacktestResult, Backtester, NanPolicy};
