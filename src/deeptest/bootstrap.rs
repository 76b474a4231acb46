//! Block bootstrap confidence interval.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};
use tracing::info;

use crate::backtest::Backtester;
use crate::data::BarTable;
use crate::error::{DeepTestError, Result};
use crate::evaluator::Evaluator;
use crate::metrics::Metric;
use crate::strategy::{ParameterSet, Strategy};

use super::resample::{block_bootstrap, block_partition, RandomSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub n_iter: usize,
    pub block: usize,
    /// Two-sided significance; the interval covers `1 - alpha`.
    pub alpha: f64,
    pub statistic: Metric,
    pub random: RandomSource,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_iter: 500,
            block: 5,
            alpha: 0.05,
            statistic: Metric::Cagr,
            random: RandomSource::Seeded(42),
        }
    }
}

/// Bootstrap interval of a statistic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub statistic: Metric,
    /// Statistic of the real series.
    pub observed: f64,
    /// `alpha / 2` quantile.
    pub lower: f64,
    /// `1 - alpha / 2` quantile.
    pub upper: f64,
    pub alpha: f64,
    pub n_iter: usize,
    pub block: usize,
    /// Statistic of each resample, in iteration order.
    pub distribution: Vec<f64>,
}

impl BootstrapResult {
    pub fn summary(&self) -> String {
        format!(
            "Bootstrap CI ({}, {} iterations, block {})\n\
             Observed: {:.4}\n\
             {:.0}% CI: [{:.4}, {:.4}]",
            self.statistic,
            self.n_iter,
            self.block,
            self.observed,
            (1.0 - self.alpha) * 100.0,
            self.lower,
            self.upper
        )
    }
}

/// Block bootstrap confidence interval of `strategy` with `params`.
pub fn bootstrap_ci<S: Strategy + ?Sized>(
    table: &BarTable,
    strategy: &S,
    params: &ParameterSet,
    evaluator: &Evaluator,
    config: &BootstrapConfig,
) -> Result<BootstrapResult> {
    if config.n_iter == 0 {
        return Err(DeepTestError::configuration("bootstrap needs at least one iteration"));
    }
    if !(config.alpha > 0.0 && config.alpha < 1.0) {
        return Err(DeepTestError::configuration(format!(
            "bootstrap alpha must be in (0, 1), got {}",
            config.alpha
        )));
    }

    let baseline = evaluator.backtest(strategy, table, params)?;
    block_partition(baseline.raw_returns.len(), config.block)?;
    let observed = evaluator
        .calculator
        .metric(&baseline.net_returns, config.statistic);

    info!(
        "Bootstrap: {} iterations, block {}, alpha {}",
        config.n_iter, config.block, config.alpha
    );

    let seeds = config.random.derive_seeds(config.n_iter);
    let progress = AtomicUsize::new(0);
    let total = config.n_iter;

    let distribution = seeds
        .into_par_iter()
        .map(|seed| -> Result<f64> {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = block_bootstrap(&baseline.raw_returns, config.block, &mut rng)?;
            let net = Backtester::net_returns(&sample, &baseline.positions, &evaluator.cost);

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if done % (total / 10).max(1) == 0 || done == total {
                info!(
                    "  Bootstrap: {:.0}% ({}/{} iterations)",
                    done as f64 / total as f64 * 100.0,
                    done,
                    total
                );
            }

            Ok(evaluator.calculator.metric(&net, config.statistic))
        })
        .collect::<Result<Vec<f64>>>()?;

    let mut data = Data::new(distribution.clone());
    let lower = data.quantile(config.alpha / 2.0);
    let upper = data.quantile(1.0 - config.alpha / 2.0);

    Ok(BootstrapResult {
        statistic: config.statistic,
        observed,
        lower,
        upper,
        alpha: config.alpha,
        n_iter: config.n_iter,
        block: config.block,
        distribution,
    })
}
