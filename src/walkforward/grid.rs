//! Parameter grid and exhaustive grid search.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::data::BarTable;
use crate::error::{DeepTestError, Result};
use crate::evaluator::Evaluator;
use crate::metrics::{Metric, PerformanceMetrics};
use crate::strategy::{ParameterSet, Strategy};

/// One named axis of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAxis {
    pub name: String,
    pub values: Vec<f64>,
}

/// Parameter values to sweep; the Cartesian product of all axes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterGrid {
    axes: Vec<ParameterAxis>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an axis.
    pub fn with(mut self, name: &str, values: Vec<f64>) -> Self {
        self.axes.push(ParameterAxis {
            name: name.to_string(),
            values,
        });
        self
    }

    pub fn axes(&self) -> &[ParameterAxis] {
        &self.axes
    }

    /// Calculate total number of parameter combinations.
    pub fn total_combinations(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|a| a.values.len()).product()
    }

    /// Reject empty grids, empty or duplicate axes, non-finite values.
    pub fn validate(&self) -> Result<()> {
        if self.axes.is_empty() {
            return Err(DeepTestError::configuration("parameter grid has no axes"));
        }
        let mut seen = HashSet::new();
        for axis in &self.axes {
            if !seen.insert(axis.name.as_str()) {
                return Err(DeepTestError::configuration(format!(
                    "duplicate grid axis '{}'",
                    axis.name
                )));
            }
            if axis.values.is_empty() {
                return Err(DeepTestError::configuration(format!(
                    "grid axis '{}' has no values",
                    axis.name
                )));
            }
            if axis.values.iter().any(|v| !v.is_finite()) {
                return Err(DeepTestError::configuration(format!(
                    "grid axis '{}' has a non-finite value",
                    axis.name
                )));
            }
        }
        Ok(())
    }

    /// Generate all parameter combinations; the last axis varies fastest.
    pub fn combinations(&self) -> Vec<ParameterSet> {
        if self.axes.is_empty() {
            return Vec::new();
        }

        let mut combos = vec![ParameterSet::new()];
        for axis in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|base| {
                    axis.values
                        .iter()
                        .map(move |&v| base.clone().with(&axis.name, v))
                })
                .collect();
        }
        combos
    }
}

/// One evaluated grid cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRow {
    pub params: ParameterSet,
    pub metrics: PerformanceMetrics,
}

/// A grid cell whose strategy or backtest failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridFailure {
    pub params: ParameterSet,
    pub error: String,
}

/// Result of a grid search, rows in grid order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridSearchResult {
    pub rows: Vec<GridRow>,
    pub failures: Vec<GridFailure>,
}

impl GridSearchResult {
    /// Rows ordered best-first by `metric`; ties keep grid order.
    pub fn sorted_by(&self, metric: Metric) -> Vec<&GridRow> {
        let mut rows: Vec<&GridRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| {
            let (x, y) = (a.metrics.get(metric), b.metrics.get(metric));
            let ord = y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal);
            if metric.higher_is_better() {
                ord
            } else {
                ord.reverse()
            }
        });
        rows
    }

    /// Best row by `metric`; the earliest in grid order wins ties.
    pub fn best_by(&self, metric: Metric) -> Option<&GridRow> {
        self.sorted_by(metric).into_iter().next()
    }

    /// Get summary string of the top `n` rows.
    pub fn summary(&self, metric: Metric, n: usize) -> String {
        let mut out = format!(
            "Grid Search: {} rows, {} failed cells (ranked by {})\n",
            self.rows.len(),
            self.failures.len(),
            metric
        );
        out.push_str("| Rank | Params | CAGR | Sharpe | Sortino | MaxDD | Calmar |\n");
        out.push_str("|------|--------|------|--------|---------|-------|--------|\n");
        for (i, row) in self.sorted_by(metric).into_iter().take(n).enumerate() {
            let m = &row.metrics;
            out.push_str(&format!(
                "| {:>4} | {} | {:.2}% | {:.2} | {:.2} | {:.2}% | {:.2} |\n",
                i + 1,
                row.params,
                m.cagr * 100.0,
                m.sharpe,
                m.sortino,
                m.max_drawdown * 100.0,
                m.calmar
            ));
        }
        for failure in &self.failures {
            out.push_str(&format!("excluded {}: {}\n", failure.params, failure.error));
        }
        out
    }
}

/// Evaluate every combination of `grid` on `table`.
///
/// Cells are evaluated in parallel. A cell whose strategy or backtest
/// fails is excluded from `rows` and recorded in `failures`.
pub fn grid_search<S: Strategy + ?Sized>(
    table: &BarTable,
    strategy: &S,
    grid: &ParameterGrid,
    evaluator: &Evaluator,
) -> Result<GridSearchResult> {
    grid.validate()?;
    let combinations = grid.combinations();
    let total = combinations.len();
    debug!("Parameter combinations: {}", total);

    let progress = AtomicUsize::new(0);
    let outcomes: Vec<(ParameterSet, Result<PerformanceMetrics>)> = combinations
        .into_par_iter()
        .map(|params| {
            let outcome = evaluator
                .evaluate(strategy, table, &params)
                .map(|(_, metrics)| metrics);

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if total >= 100 && (done % (total / 10).max(1) == 0 || done == total) {
                info!(
                    "  Grid search: {:.0}% ({}/{} combinations)",
                    done as f64 / total as f64 * 100.0,
                    done,
                    total
                );
            }

            (params, outcome)
        })
        .collect();

    let mut result = GridSearchResult::default();
    for (params, outcome) in outcomes {
        match outcome {
            Ok(metrics) => result.rows.push(GridRow { params, metrics }),
            Err(e) => {
                warn!("Excluding grid cell {}: {}", params, e);
                result.failures.push(GridFailure {
                    params,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic, PositionSeries, SyntheticConfig};
    use crate::strategy::ma_cross;

    fn sample(bars: usize) -> BarTable {
        synthetic(&SyntheticConfig {
            bars,
            seed: 7,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parameter_grid_combinations() {
        let grid = ParameterGrid::new()
            .with("fast", vec![5.0, 10.0])
            .with("slow", vec![20.0, 40.0, 60.0]);

        assert_eq!(grid.total_combinations(), 6);
        let combos = grid.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0].key(), "fast=5_slow=20");
        assert_eq!(combos[1].key(), "fast=5_slow=40");
        assert_eq!(combos[3].key(), "fast=10_slow=20");
    }

    #[test]
    fn test_invalid_grids() {
        assert!(ParameterGrid::new().validate().is_err());
        assert!(ParameterGrid::new().with("fast", vec![]).validate().is_err());
        assert!(ParameterGrid::new()
            .with("fast", vec![1.0])
            .with("fast", vec![2.0])
            .validate()
            .is_err());
    }

    #[test]
    fn test_two_by_two_grid_returns_four_rows() {
        let table = sample(500);
        let grid = ParameterGrid::new()
            .with("fast", vec![5.0, 10.0])
            .with("slow", vec![20.0, 40.0]);

        let result = grid_search(&table, &ma_cross, &grid, &Evaluator::default()).unwrap();

        assert_eq!(result.rows.len(), 4);
        assert!(result.failures.is_empty());
        assert!(result.rows.iter().all(|r| r.metrics.is_finite()));
        assert_eq!(result.rows[0].params.key(), "fast=5_slow=20");
        assert_eq!(result.rows[3].params.key(), "fast=10_slow=40");
    }

    #[test]
    fn test_failed_cells_are_counted() {
        let table = sample(300);
        // fast >= slow is rejected by the strategy
        let grid = ParameterGrid::new()
            .with("fast", vec![5.0, 50.0])
            .with("slow", vec![20.0]);

        let result = grid_search(&table, &ma_cross, &grid, &Evaluator::default()).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].params.get("fast"), Some(50.0));
    }

    #[test]
    fn test_ties_keep_grid_order() {
        let table = sample(100);
        let flat_for_all = |t: &BarTable, _: &ParameterSet| -> Result<PositionSeries> {
            Ok(PositionSeries::constant(t, 0.0))
        };
        let grid = ParameterGrid::new().with("x", vec![3.0, 1.0, 2.0]);

        let result = grid_search(&table, &flat_for_all, &grid, &Evaluator::default()).unwrap();
        let sorted = result.sorted_by(Metric::Cagr);
        let order: Vec<f64> = sorted.iter().map(|r| r.params.get("x").unwrap()).collect();
        assert_eq!(order, vec![3.0, 1.0, 2.0]);
        assert_eq!(result.best_by(Metric::Cagr).unwrap().params.get("x"), Some(3.0));
    }

    #[test]
    fn test_sorted_by_metric() {
        let table = sample(500);
        let grid = ParameterGrid::new()
            .with("fast", vec![5.0, 10.0])
            .with("slow", vec![20.0, 40.0]);
        let result = grid_search(&table, &ma_cross, &grid, &Evaluator::default()).unwrap();

        let sorted = result.sorted_by(Metric::Sharpe);
        for pair in sorted.windows(2) {
            assert!(pair[0].metrics.sharpe >= pair[1].metrics.sharpe);
        }
        let by_vol = result.sorted_by(Metric::Volatility);
        for pair in by_vol.windows(2) {
            assert!(pair[0].metrics.volatility <= pair[1].metrics.volatility);
        }
    }
}
