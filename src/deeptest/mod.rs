//! Robustness procedures over a single strategy.
//!
//! - Permutation test: is the observed statistic distinguishable from
//!   block-reshuffled returns?
//! - Bootstrap: how wide is the statistic's sampling interval?
//! - `DeepTest`: grid search, walk-forward, permutation and bootstrap in
//!   sequence, using the full-sample grid winner for the resampling tests.

pub mod bootstrap;
pub mod permutation;
pub mod resample;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::BacktestResult;
use crate::data::BarTable;
use crate::error::{DeepTestError, Result};
use crate::evaluator::Evaluator;
use crate::metrics::{Metric, PerformanceMetrics};
use crate::strategy::{ParameterSet, Strategy};
use crate::walkforward::{
    grid_search, GridSearchResult, ParameterGrid, WalkForwardConfig, WalkForwardOptimizer,
    WalkForwardResult,
};

pub use bootstrap::{bootstrap_ci, BootstrapConfig, BootstrapResult};
pub use permutation::{p_value, permutation_test, Alternative, PermutationConfig, PermutationResult};
pub use resample::{block_bootstrap, block_partition, block_permute, RandomSource};

/// Everything a full deep test produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepTestReport {
    pub grid: GridSearchResult,
    pub best_params: ParameterSet,
    pub walk_forward: WalkForwardResult,
    pub permutation: PermutationResult,
    pub bootstrap: BootstrapResult,
    pub final_backtest: BacktestResult,
    pub final_metrics: PerformanceMetrics,
}

impl DeepTestReport {
    pub fn summary(&self) -> String {
        format!(
            "= Grid search on full sample =\n{}\n\
             Best params: {}\n\n\
             = Walk-forward =\n{}\n\
             = Permutation test =\n{}\n\n\
             = Bootstrap CI =\n{}\n\n\
             = Final backtest with best params =\n{}\n\n{}",
            self.grid.summary(self.walk_forward.selection_metric, 10),
            self.best_params,
            self.walk_forward.summary(),
            self.permutation.summary(),
            self.bootstrap.summary(),
            self.final_backtest.summary(),
            self.final_metrics.summary()
        )
    }
}

/// Full robustness run over one strategy.
#[derive(Debug, Clone)]
pub struct DeepTest {
    pub evaluator: Evaluator,
    pub grid: ParameterGrid,
    pub selection_metric: Metric,
    pub walk_forward: WalkForwardConfig,
    pub permutation: PermutationConfig,
    pub bootstrap: BootstrapConfig,
}

impl DeepTest {
    pub fn new(evaluator: Evaluator, grid: ParameterGrid) -> Self {
        Self {
            evaluator,
            grid,
            selection_metric: Metric::Cagr,
            walk_forward: WalkForwardConfig::default(),
            permutation: PermutationConfig::default(),
            bootstrap: BootstrapConfig::default(),
        }
    }

    pub fn run<S: Strategy + ?Sized>(&self, table: &BarTable, strategy: &S) -> Result<DeepTestReport> {
        info!("Grid search on full sample ({} bars)", table.len());
        let grid = grid_search(table, strategy, &self.grid, &self.evaluator)?;
        let best_params = grid
            .best_by(self.selection_metric)
            .map(|row| row.params.clone())
            .ok_or_else(|| DeepTestError::configuration("every parameter combination failed"))?;
        info!("Best params by {}: {}", self.selection_metric, best_params);

        info!("Walk-forward");
        let walk_forward = WalkForwardOptimizer::new(self.grid.clone())
            .with_periods_config(self.walk_forward.clone())
            .with_selection_metric(self.selection_metric)
            .with_evaluator(self.evaluator.clone())
            .optimize(table, strategy)?;

        let permutation =
            permutation_test(table, strategy, &best_params, &self.evaluator, &self.permutation)?;
        let bootstrap = bootstrap_ci(table, strategy, &best_params, &self.evaluator, &self.bootstrap)?;

        let (final_backtest, final_metrics) = self.evaluator.evaluate(strategy, table, &best_params)?;

        Ok(DeepTestReport {
            grid,
            best_params,
            walk_forward,
            permutation,
            bootstrap,
            final_backtest,
            final_metrics,
        })
    }
}
