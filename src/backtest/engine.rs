//! Vectorized position-to-return backtester.
//!
//! For each bar t:
//! 1. The realized exposure is the target decided at the previous close
//!    (`realized[t] = position[t-1]`, flat before the first bar)
//! 2. Turnover is the change in realized exposure
//! 3. Cost = turnover × (commission + slippage) bps
//! 4. Net return = realized exposure × raw return − cost
//! 5. Equity compounds the net return from the initial capital

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{BarTable, PositionSeries};
use crate::error::{DeepTestError, Result};
use crate::metrics::{MetricsCalculator, PerformanceMetrics};

use super::cost::CostModel;

/// How non-finite raw returns are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Fail with `InvalidData`.
    #[default]
    Reject,
    /// Carry the last finite return forward (leading gaps become 0).
    ForwardFill,
    /// Remove the affected bars from both the table and the positions.
    Drop,
}

/// Configuration for backtest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting equity.
    pub initial_equity: f64,

    /// Handling of NaN/infinite raw returns.
    pub nan_policy: NanPolicy,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: 1.0,
            nan_policy: NanPolicy::Reject,
        }
    }
}

/// Result of a completed backtest. All series share the same index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Dates of the bars that took part in the run.
    pub dates: Vec<NaiveDate>,

    /// Raw returns used (after NaN handling).
    pub raw_returns: Vec<f64>,

    /// Target positions as supplied by the strategy.
    pub positions: Vec<f64>,

    /// Exposure actually held over each bar (positions shifted by one).
    pub realized_positions: Vec<f64>,

    /// Absolute change in realized exposure.
    pub turnover: Vec<f64>,

    /// Transaction cost charged per bar.
    pub costs: Vec<f64>,

    /// Net return per bar.
    pub net_returns: Vec<f64>,

    /// Equity curve; `equity[0]` equals the initial equity.
    pub equity: Vec<f64>,

    /// Starting equity.
    pub initial_equity: f64,

    /// Final equity.
    pub final_equity: f64,

    /// Sum of all transaction costs (as return fractions).
    pub total_cost: f64,
}

impl BacktestResult {
    /// Total return as a fraction.
    pub fn total_return(&self) -> f64 {
        if self.initial_equity == 0.0 {
            return 0.0;
        }
        self.final_equity / self.initial_equity - 1.0
    }

    /// Total turnover over the run.
    pub fn total_turnover(&self) -> f64 {
        self.turnover.iter().sum()
    }

    /// Number of bars with a change in realized exposure.
    pub fn rebalances(&self) -> usize {
        self.turnover.iter().filter(|t| **t > 0.0).count()
    }

    /// Performance metrics of the net return series.
    pub fn metrics(&self, annualization_factor: f64, risk_free_rate: f64) -> PerformanceMetrics {
        MetricsCalculator::new(annualization_factor, risk_free_rate).calculate(&self.net_returns)
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let (start, end) = match (self.dates.first(), self.dates.last()) {
            (Some(s), Some(e)) => (s.to_string(), e.to_string()),
            _ => ("-".to_string(), "-".to_string()),
        };
        format!(
            "Backtest Results ({} to {})\n\
             ----------------------------------------\n\
             Bars: {}\n\
             Total Return: {:.2}%\n\
             Final Equity: {:.4}\n\
             Rebalances: {}\n\
             Total Turnover: {:.2}\n\
             Total Cost: {:.4}%",
            start,
            end,
            self.dates.len(),
            self.total_return() * 100.0,
            self.final_equity,
            self.rebalances(),
            self.total_turnover(),
            self.total_cost * 100.0,
        )
    }
}

/// Intermediate series of one simulation.
struct Simulation {
    realized: Vec<f64>,
    turnover: Vec<f64>,
    costs: Vec<f64>,
    net: Vec<f64>,
}

fn simulate(raw_returns: &[f64], positions: &[f64], cost: &CostModel) -> Simulation {
    let n = raw_returns.len().min(positions.len());
    let mut realized = Vec::with_capacity(n);
    let mut turnover = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    let mut net = Vec::with_capacity(n);

    let mut prev_realized = 0.0;
    for t in 0..n {
        let held = if t == 0 { 0.0 } else { positions[t - 1] };
        let traded = (held - prev_realized).abs();
        let charge = cost.apply(traded);

        realized.push(held);
        turnover.push(traded);
        costs.push(charge);
        net.push(held * raw_returns[t] - charge);

        prev_realized = held;
    }

    Simulation {
        realized,
        turnover,
        costs,
        net,
    }
}

/// Compound net returns into an equity curve starting from `initial`.
pub fn equity_curve(net_returns: &[f64], initial: f64) -> Vec<f64> {
    net_returns
        .iter()
        .scan(initial, |equity, r| {
            *equity *= 1.0 + r;
            Some(*equity)
        })
        .collect()
}

/// The backtester.
#[derive(Debug, Clone, Default)]
pub struct Backtester {
    config: BacktestConfig,
}

impl Backtester {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Net return series for raw slices, without validation.
    ///
    /// Used by the resampling loops, which validate their inputs once and
    /// then rerun the same positions over many synthetic return columns.
    pub fn net_returns(raw_returns: &[f64], positions: &[f64], cost: &CostModel) -> Vec<f64> {
        simulate(raw_returns, positions, cost).net
    }

    /// Run a backtest of `positions` over `table`.
    pub fn run(
        &self,
        table: &BarTable,
        positions: &PositionSeries,
        cost: &CostModel,
    ) -> Result<BacktestResult> {
        positions.validate_against(table)?;
        cost.validate()?;
        if !self.config.initial_equity.is_finite() || self.config.initial_equity <= 0.0 {
            return Err(DeepTestError::configuration(format!(
                "initial equity must be positive, got {}",
                self.config.initial_equity
            )));
        }

        let (dates, raw_returns, target) = self.prepare(table, positions)?;
        let sim = simulate(&raw_returns, &target, cost);
        let equity = equity_curve(&sim.net, self.config.initial_equity);
        let final_equity = equity.last().copied().unwrap_or(self.config.initial_equity);
        let total_cost: f64 = sim.costs.iter().sum();

        debug!(
            "Backtest over {} bars: final equity {:.4}, total cost {:.6}",
            dates.len(),
            final_equity,
            total_cost
        );

        Ok(BacktestResult {
            dates,
            raw_returns,
            positions: target,
            realized_positions: sim.realized,
            turnover: sim.turnover,
            costs: sim.costs,
            net_returns: sim.net,
            equity,
            initial_equity: self.config.initial_equity,
            final_equity,
            total_cost,
        })
    }

    /// Apply the NaN policy to the raw return column.
    fn prepare(
        &self,
        table: &BarTable,
        positions: &PositionSeries,
    ) -> Result<(Vec<NaiveDate>, Vec<f64>, Vec<f64>)> {
        let bars = table.bars();

        match self.config.nan_policy {
            NanPolicy::Reject => {
                if let Some(bar) = bars.iter().find(|b| !b.ret.is_finite()) {
                    return Err(DeepTestError::invalid_data(format!(
                        "non-finite return {} on {}",
                        bar.ret, bar.date
                    )));
                }
                Ok((table.dates(), table.returns(), positions.values.clone()))
            }
            NanPolicy::ForwardFill => {
                let mut last = 0.0;
                let returns = bars
                    .iter()
                    .map(|b| {
                        if b.ret.is_finite() {
                            last = b.ret;
                        }
                        last
                    })
                    .collect();
                Ok((table.dates(), returns, positions.values.clone()))
            }
            NanPolicy::Drop => {
                let mut dates = Vec::with_capacity(bars.len());
                let mut returns = Vec::with_capacity(bars.len());
                let mut target = Vec::with_capacity(bars.len());
                for (bar, &pos) in bars.iter().zip(&positions.values) {
                    if bar.ret.is_finite() {
                        dates.push(bar.date);
                        returns.push(bar.ret);
                        target.push(pos);
                    }
                }
                Ok((dates, returns, target))
            }
        }
    }
}
