//! Performance metrics module.
//!
//! Provides performance calculations over net return series:
//! - CAGR, total return
//! - Sharpe ratio, Sortino ratio, Calmar ratio
//! - Maximum drawdown and its duration
//! - Win rate, average win/loss

pub mod calculator;

pub use calculator::{equity_from_returns, Metric, MetricsCalculator, PerformanceMetrics, TRADING_DAYS};
