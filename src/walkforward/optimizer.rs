//! Walk-forward parameter optimization.
//!
//! For each window the grid is searched on the training segment, the best
//! parameter set by the selection metric is evaluated out of sample on the
//! test segment, and the out-of-sample results are aggregated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};
use tracing::{debug, info, warn};

use crate::backtest::equity_curve;
use crate::data::{BarTable, PositionSeries};
use crate::error::{DeepTestError, Result};
use crate::evaluator::Evaluator;
use crate::metrics::{Metric, PerformanceMetrics};
use crate::strategy::{ParameterSet, Strategy};

use super::grid::{grid_search, ParameterGrid};
use super::periods::{WalkForwardConfig, WalkForwardPeriods, WalkForwardWindow};

/// Result of a single walk-forward window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowResult {
    /// Window information.
    pub window: WalkForwardWindow,
    /// Best parameters found during training.
    pub best_params: ParameterSet,
    /// Training performance of the best parameters.
    pub train_metrics: PerformanceMetrics,
    /// Out-of-sample performance.
    pub test_metrics: PerformanceMetrics,
    /// Out-of-sample net returns.
    pub test_returns: Vec<f64>,
}

/// A window that was not evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedWindow {
    pub window: WalkForwardWindow,
    pub reason: String,
}

/// Mean and median of one metric across windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub metric: Metric,
    pub mean: f64,
    pub median: f64,
}

/// Complete walk-forward optimization result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    /// Metric used to pick each window's parameters.
    pub selection_metric: Metric,
    /// Results for each evaluated window.
    pub windows: Vec<WindowResult>,
    /// Windows skipped for size or failed optimization.
    pub skipped: Vec<SkippedWindow>,
    /// Mean and median of each out-of-sample metric.
    pub oos_aggregates: Vec<MetricAggregate>,
    /// Concatenated out-of-sample net returns.
    pub oos_returns: Vec<f64>,
    /// Chained out-of-sample equity, starting from 1.0.
    pub oos_equity: Vec<f64>,
    /// Metrics of the concatenated out-of-sample returns.
    pub oos_metrics: PerformanceMetrics,
    /// Most frequently selected parameters.
    pub consensus_params: Option<ParameterSet>,
}

impl WalkForwardResult {
    /// Aggregate of one out-of-sample metric.
    pub fn aggregate(&self, metric: Metric) -> Option<&MetricAggregate> {
        self.oos_aggregates.iter().find(|a| a.metric == metric)
    }

    /// Get summary string.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Walk-Forward Results: {} windows evaluated, {} skipped (selection by {})\n",
            self.windows.len(),
            self.skipped.len(),
            self.selection_metric
        );
        out.push_str("| # | Test Period | Best Params | Train | Test CAGR | Test Sharpe | Test MaxDD |\n");
        out.push_str("|---|-------------|-------------|-------|-----------|-------------|------------|\n");
        for w in &self.windows {
            out.push_str(&format!(
                "| {} | {} to {}{} | {} | {:.3} | {:.2}% | {:.2} | {:.2}% |\n",
                w.window.window_num,
                w.window.test_start,
                w.window.test_end,
                if w.window.partial { " (partial)" } else { "" },
                w.best_params,
                w.train_metrics.get(self.selection_metric),
                w.test_metrics.cagr * 100.0,
                w.test_metrics.sharpe,
                w.test_metrics.max_drawdown * 100.0
            ));
        }
        for s in &self.skipped {
            out.push_str(&format!("skipped window {}: {}\n", s.window.window_num, s.reason));
        }

        out.push_str("\nOut-of-sample per-window metrics (mean / median):\n");
        for agg in &self.oos_aggregates {
            out.push_str(&format!("  {:<12} {:>10.4} / {:>10.4}\n", agg.metric.name(), agg.mean, agg.median));
        }
        out.push_str(&format!(
            "\nConcatenated OOS: CAGR {:.2}%, Sharpe {:.2}, MaxDD {:.2}%, {} bars\n",
            self.oos_metrics.cagr * 100.0,
            self.oos_metrics.sharpe,
            self.oos_metrics.max_drawdown * 100.0,
            self.oos_returns.len()
        ));
        if let Some(params) = &self.consensus_params {
            out.push_str(&format!("Consensus params: {}\n", params));
        }
        out
    }
}

/// Walk-forward optimizer.
pub struct WalkForwardOptimizer {
    periods_config: WalkForwardConfig,
    param_grid: ParameterGrid,
    selection_metric: Metric,
    evaluator: Evaluator,
}

impl WalkForwardOptimizer {
    /// Create a new optimizer over `grid`, selecting by CAGR.
    pub fn new(grid: ParameterGrid) -> Self {
        Self {
            periods_config: WalkForwardConfig::default(),
            param_grid: grid,
            selection_metric: Metric::Cagr,
            evaluator: Evaluator::default(),
        }
    }

    /// Set periods configuration.
    pub fn with_periods_config(mut self, config: WalkForwardConfig) -> Self {
        self.periods_config = config;
        self
    }

    /// Set parameter grid.
    pub fn with_param_grid(mut self, grid: ParameterGrid) -> Self {
        self.param_grid = grid;
        self
    }

    /// Set the metric used to pick each window's parameters.
    pub fn with_selection_metric(mut self, metric: Metric) -> Self {
        self.selection_metric = metric;
        self
    }

    /// Set the backtest/cost/metrics pipeline.
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Run walk-forward optimization of `strategy` over `table`.
    pub fn optimize<S: Strategy + ?Sized>(
        &self,
        table: &BarTable,
        strategy: &S,
    ) -> Result<WalkForwardResult> {
        self.param_grid.validate()?;
        let window_list = WalkForwardPeriods::new(self.periods_config.clone()).generate(table)?;
        if window_list.is_empty() {
            return Err(DeepTestError::configuration(format!(
                "no walk-forward windows fit in {} bars",
                table.len()
            )));
        }

        info!(
            "Generated {} walk-forward windows, {} parameter combinations each",
            window_list.len(),
            self.param_grid.total_combinations()
        );

        let mut windows = Vec::new();
        let mut skipped = Vec::new();

        for window in &window_list {
            debug!(
                "Window {}/{}: train {} to {}, test {} to {}",
                window.window_num,
                window_list.len(),
                window.train_start,
                window.train_end,
                window.test_start,
                window.test_end
            );

            if window.train_bars() < self.periods_config.min_train_bars
                || window.test_bars() < self.periods_config.min_test_bars
            {
                let reason = format!(
                    "{} train / {} test bars below minimum {} / {}",
                    window.train_bars(),
                    window.test_bars(),
                    self.periods_config.min_train_bars,
                    self.periods_config.min_test_bars
                );
                warn!("Skipping window {}: {}", window.window_num, reason);
                skipped.push(SkippedWindow {
                    window: window.clone(),
                    reason,
                });
                continue;
            }

            match self.evaluate_window(table, strategy, window) {
                Ok(result) => {
                    info!(
                        "  Window {}/{} complete: best params = {}, test {} = {:.4}",
                        window.window_num,
                        window_list.len(),
                        result.best_params,
                        self.selection_metric,
                        result.test_metrics.get(self.selection_metric)
                    );
                    windows.push(result);
                }
                Err(e) => {
                    warn!("Skipping window {}: {}", window.window_num, e);
                    skipped.push(SkippedWindow {
                        window: window.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let oos_returns: Vec<f64> = windows
            .iter()
            .flat_map(|w| w.test_returns.iter().copied())
            .collect();
        let oos_equity = equity_curve(&oos_returns, 1.0);
        let oos_metrics = self.evaluator.calculator.calculate(&oos_returns);
        let oos_aggregates = aggregate_metrics(&windows);
        let consensus_params = find_consensus_params(&windows);

        Ok(WalkForwardResult {
            selection_metric: self.selection_metric,
            windows,
            skipped,
            oos_aggregates,
            oos_returns,
            oos_equity,
            oos_metrics,
            consensus_params,
        })
    }

    fn evaluate_window<S: Strategy + ?Sized>(
        &self,
        table: &BarTable,
        strategy: &S,
        window: &WalkForwardWindow,
    ) -> Result<WindowResult> {
        let train_table = table.slice(window.train.clone());
        let search = grid_search(&train_table, strategy, &self.param_grid, &self.evaluator)?;
        let best = search.best_by(self.selection_metric).ok_or_else(|| {
            DeepTestError::configuration("every parameter combination failed on the training segment")
        })?;

        let test_table = table.slice(window.test.clone());
        let positions = if self.periods_config.warm_start {
            let history = table.slice(window.train.start..window.test.end);
            let full = strategy.positions(&history, &best.params)?;
            full.validate_against(&history)?;
            let offset = window.train.len();
            PositionSeries::for_table(&test_table, full.values[offset..].to_vec())?
        } else {
            strategy.positions(&test_table, &best.params)?
        };
        let test = self
            .evaluator
            .backtester
            .run(&test_table, &positions, &self.evaluator.cost)?;
        let test_metrics = self.evaluator.calculator.calculate(&test.net_returns);

        Ok(WindowResult {
            window: window.clone(),
            best_params: best.params.clone(),
            train_metrics: best.metrics.clone(),
            test_metrics,
            test_returns: test.net_returns,
        })
    }
}

/// Mean and median of each metric over the evaluated windows.
fn aggregate_metrics(windows: &[WindowResult]) -> Vec<MetricAggregate> {
    if windows.is_empty() {
        return Vec::new();
    }
    Metric::ALL
        .iter()
        .map(|&metric| {
            let values: Vec<f64> = windows.iter().map(|w| w.test_metrics.get(metric)).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let mut data = Data::new(values);
            let median = data.median();
            MetricAggregate {
                metric,
                mean,
                median,
            }
        })
        .collect()
}

/// Most frequently selected parameter set; the earliest wins ties.
fn find_consensus_params(windows: &[WindowResult]) -> Option<ParameterSet> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for w in windows {
        *counts.entry(w.best_params.key()).or_insert(0) += 1;
    }

    let mut best: Option<(&ParameterSet, usize)> = None;
    for w in windows {
        let count = counts.get(&w.best_params.key()).copied().unwrap_or(0);
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((&w.best_params, count));
        }
    }
    best.map(|(params, _)| params.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic, SyntheticConfig};
    use crate::strategy::{always_long, ma_cross};
    use crate::walkforward::TrailingWindow;

    fn sample(bars: usize) -> BarTable {
        synthetic(&SyntheticConfig {
            bars,
            seed: 11,
            ..Default::default()
        })
        .unwrap()
    }

    fn grid() -> ParameterGrid {
        ParameterGrid::new()
            .with("fast", vec![5.0, 10.0])
            .with("slow", vec![20.0, 40.0])
    }

    #[test]
    fn test_walk_forward_window_count() {
        let table = sample(1000);
        let result = WalkForwardOptimizer::new(grid())
            .with_periods_config(WalkForwardConfig::bars(252, 63))
            .optimize(&table, &ma_cross)
            .unwrap();

        assert_eq!(result.windows.len(), 11);
        assert!(result.skipped.is_empty());
        assert_eq!(result.oos_returns.len(), 11 * 63);
        assert_eq!(result.oos_equity.len(), result.oos_returns.len());
        assert!(result.consensus_params.is_some());
        assert_eq!(result.oos_aggregates.len(), Metric::ALL.len());
    }

    #[test]
    fn test_partial_trailing_window_is_evaluated() {
        let table = sample(1000);
        let result = WalkForwardOptimizer::new(grid())
            .with_periods_config(WalkForwardConfig::bars(252, 63).with_trailing(TrailingWindow::Partial))
            .optimize(&table, &ma_cross)
            .unwrap();

        assert_eq!(result.windows.len(), 12);
        assert_eq!(result.windows[11].test_returns.len(), 55);
        assert_eq!(result.oos_returns.len(), 11 * 63 + 55);
    }

    #[test]
    fn test_undersized_windows_are_skipped() {
        let table = sample(1000);
        let config = WalkForwardConfig {
            min_test_bars: 60,
            ..WalkForwardConfig::bars(252, 63).with_trailing(TrailingWindow::Partial)
        };
        let result = WalkForwardOptimizer::new(grid())
            .with_periods_config(config)
            .optimize(&table, &ma_cross)
            .unwrap();

        assert_eq!(result.windows.len(), 11);
        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].window.partial);
    }

    #[test]
    fn test_oos_equity_chains_window_returns() {
        let table = sample(600);
        let result = WalkForwardOptimizer::new(ParameterGrid::new().with("x", vec![1.0]))
            .with_periods_config(WalkForwardConfig::bars(200, 100))
            .optimize(&table, &always_long)
            .unwrap();

        let product: f64 = result
            .windows
            .iter()
            .map(|w| w.test_returns.iter().map(|r| 1.0 + r).product::<f64>())
            .product();
        let last = *result.oos_equity.last().unwrap();
        assert!((last - product).abs() < 1e-9);
        assert!((result.oos_metrics.total_return - (product - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_median_and_mean_aggregates() {
        let table = sample(1000);
        let result = WalkForwardOptimizer::new(grid())
            .with_periods_config(WalkForwardConfig::bars(252, 63))
            .with_selection_metric(Metric::Sharpe)
            .optimize(&table, &ma_cross)
            .unwrap();

        let cagr = result.aggregate(Metric::Cagr).unwrap();
        let values: Vec<f64> = result.windows.iter().map(|w| w.test_metrics.cagr).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!((cagr.mean - mean).abs() < 1e-12);

        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((cagr.median - sorted[sorted.len() / 2]).abs() < 1e-12);
    }

    #[test]
    fn test_warm_start_positions_cover_test_segment() {
        let table = sample(600);
        let config = WalkForwardConfig {
            warm_start: true,
            ..WalkForwardConfig::bars(200, 100)
        };
        let result = WalkForwardOptimizer::new(grid())
            .with_periods_config(config)
            .optimize(&table, &ma_cross)
            .unwrap();
        assert_eq!(result.windows.len(), 4);
        assert!(result.windows.iter().all(|w| w.test_returns.len() == 100));
    }

    #[test]
    fn test_too_short_series_is_configuration_error() {
        let table = sample(100);
        let result = WalkForwardOptimizer::new(grid())
            .with_periods_config(WalkForwardConfig::bars(252, 63))
            .optimize(&table, &ma_cross);
        assert!(matches!(result, Err(DeepTestError::Configuration(_))));
    }

    #[test]
    fn test_consensus_prefers_most_frequent() {
        let m = PerformanceMetrics::default();
        let make = |x: f64, num: usize| WindowResult {
            window: WalkForwardWindow {
                window_num: num,
                train: 0..1,
                test: 1..2,
                train_start: chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                train_end: chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                test_start: chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
                test_end: chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
                partial: false,
            },
            best_params: ParameterSet::new().with("x", x),
            train_metrics: m.clone(),
            test_metrics: m.clone(),
            test_returns: vec![],
        };
        let windows = vec![make(1.0, 1), make(2.0, 2), make(2.0, 3), make(1.0, 4), make(2.0, 5)];
        assert_eq!(find_consensus_params(&windows).unwrap().get("x"), Some(2.0));
        assert!(find_consensus_params(&[]).is_none());
    }
}
