//! Block permutation test.
//!
//! The raw return column is reshuffled in blocks and the strategy's fixed
//! position series is reapplied to each reshuffle. The p-value is the
//! share of the null distribution at least as extreme as the observed
//! statistic, with the usual +1 correction.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::Backtester;
use crate::data::BarTable;
use crate::error::{DeepTestError, Result};
use crate::evaluator::Evaluator;
use crate::metrics::Metric;
use crate::strategy::{ParameterSet, Strategy};

use super::resample::{block_partition, block_permute, RandomSource};

/// Direction of the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alternative {
    /// Null statistics ≥ observed.
    #[default]
    OneSided,
    /// Null |statistic| ≥ |observed|.
    TwoSided,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationConfig {
    pub n_iter: usize,
    pub block: usize,
    pub statistic: Metric,
    pub alternative: Alternative,
    pub random: RandomSource,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            n_iter: 500,
            block: 5,
            statistic: Metric::Cagr,
            alternative: Alternative::OneSided,
            random: RandomSource::Seeded(7),
        }
    }
}

/// Outcome of a permutation test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermutationResult {
    pub statistic: Metric,
    pub alternative: Alternative,
    /// Statistic of the real series.
    pub observed: f64,
    /// Always in (0, 1].
    pub p_value: f64,
    pub n_iter: usize,
    pub block: usize,
    /// Statistic of each reshuffle, in iteration order.
    pub null_distribution: Vec<f64>,
}

impl PermutationResult {
    pub fn summary(&self) -> String {
        format!(
            "Permutation Test ({}, {} iterations, block {})\n\
             Observed: {:.4}\n\
             p-value ({}): {:.4}",
            self.statistic,
            self.n_iter,
            self.block,
            self.observed,
            match self.alternative {
                Alternative::OneSided => "one-sided",
                Alternative::TwoSided => "two-sided",
            },
            self.p_value
        )
    }
}

/// Run a block permutation test of `strategy` with `params` on `table`.
pub fn permutation_test<S: Strategy + ?Sized>(
    table: &BarTable,
    strategy: &S,
    params: &ParameterSet,
    evaluator: &Evaluator,
    config: &PermutationConfig,
) -> Result<PermutationResult> {
    if config.n_iter == 0 {
        return Err(DeepTestError::configuration("permutation test needs at least one iteration"));
    }

    let baseline = evaluator.backtest(strategy, table, params)?;
    block_partition(baseline.raw_returns.len(), config.block)?;
    let observed = evaluator
        .calculator
        .metric(&baseline.net_returns, config.statistic);

    info!(
        "Permutation test: {} iterations, block {}, observed {} = {:.4}",
        config.n_iter, config.block, config.statistic, observed
    );

    let seeds = config.random.derive_seeds(config.n_iter);
    let progress = AtomicUsize::new(0);
    let total = config.n_iter;

    let null_distribution = seeds
        .into_par_iter()
        .map(|seed| -> Result<f64> {
            let mut rng = StdRng::seed_from_u64(seed);
            let shuffled = block_permute(&baseline.raw_returns, config.block, &mut rng)?;
            let net = Backtester::net_returns(&shuffled, &baseline.positions, &evaluator.cost);

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if done % (total / 10).max(1) == 0 || done == total {
                info!(
                    "  Permutation: {:.0}% ({}/{} iterations)",
                    done as f64 / total as f64 * 100.0,
                    done,
                    total
                );
            }

            Ok(evaluator.calculator.metric(&net, config.statistic))
        })
        .collect::<Result<Vec<f64>>>()?;

    let p_value = p_value(observed, &null_distribution, config.alternative);

    Ok(PermutationResult {
        statistic: config.statistic,
        alternative: config.alternative,
        observed,
        p_value,
        n_iter: config.n_iter,
        block: config.block,
        null_distribution,
    })
}

/// `(#{null at least as extreme as observed} + 1) / (n + 1)`.
pub fn p_value(observed: f64, null: &[f64], alternative: Alternative) -> f64 {
    let extreme = match alternative {
        Alternative::OneSided => null.iter().filter(|s| **s >= observed).count(),
        Alternative::TwoSided => null.iter().filter(|s| s.abs() >= observed.abs()).count(),
    };
    (extreme + 1) as f64 / (null.len() + 1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic, SyntheticConfig};
    use crate::strategy::{always_long, flat, ma_cross};

    fn sample(bars: usize) -> BarTable {
        synthetic(&SyntheticConfig {
            bars,
            seed: 5,
            ..Default::default()
        })
        .unwrap()
    }

    fn config(n_iter: usize) -> PermutationConfig {
        PermutationConfig {
            n_iter,
            ..Default::default()
        }
    }

    #[test]
    fn test_p_value_formula() {
        let null = [0.1, 0.2, 0.3, 0.4];
        assert!((p_value(0.25, &null, Alternative::OneSided) - 3.0 / 5.0).abs() < 1e-12);
        assert!((p_value(1.0, &null, Alternative::OneSided) - 1.0 / 5.0).abs() < 1e-12);
        assert!((p_value(-0.35, &null, Alternative::TwoSided) - 2.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_p_value_in_unit_interval() {
        let table = sample(400);
        let params = ParameterSet::new().with("fast", 10.0).with("slow", 40.0);
        let result =
            permutation_test(&table, &ma_cross, &params, &Evaluator::default(), &config(50)).unwrap();

        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
        assert_eq!(result.null_distribution.len(), 50);
    }

    #[test]
    fn test_observed_minimum_gives_p_of_one() {
        // Flat exposure: every permutation reproduces the observed zero.
        let table = sample(200);
        let result = permutation_test(
            &table,
            &flat,
            &ParameterSet::new(),
            &Evaluator::default(),
            &config(30),
        )
        .unwrap();
        assert_eq!(result.observed, 0.0);
        assert_eq!(result.p_value, 1.0);
    }

    #[test]
    fn test_two_sided_p_value_in_unit_interval() {
        let table = sample(300);
        let cfg = PermutationConfig {
            alternative: Alternative::TwoSided,
            statistic: Metric::Sharpe,
            ..config(25)
        };
        let result =
            permutation_test(&table, &always_long, &ParameterSet::new(), &Evaluator::default(), &cfg)
                .unwrap();
        assert!(result.p_value > 0.0 && result.p_value <= 1.0);
        assert!(result.null_distribution.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_zero_iterations_is_configuration_error() {
        let table = sample(100);
        let result = permutation_test(
            &table,
            &always_long,
            &ParameterSet::new(),
            &Evaluator::default(),
            &config(0),
        );
        assert!(matches!(result, Err(DeepTestError::Configuration(_))));
    }

    #[test]
    fn test_block_longer_than_series_is_rejected() {
        let table = sample(10);
        let cfg = PermutationConfig {
            block: 11,
            ..config(5)
        };
        let result =
            permutation_test(&table, &always_long, &ParameterSet::new(), &Evaluator::default(), &cfg);
        assert!(matches!(result, Err(DeepTestError::Configuration(_))));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let table = sample(300);
        let params = ParameterSet::new().with("fast", 5.0).with("slow", 20.0);
        let evaluator = Evaluator::default();
        let a = permutation_test(&table, &ma_cross, &params, &evaluator, &config(40)).unwrap();
        let b = permutation_test(&table, &ma_cross, &params, &evaluator, &config(40)).unwrap();
        assert_eq!(a.null_distribution, b.null_distribution);
        assert_eq!(a.p_value, b.p_value);
    }
}
