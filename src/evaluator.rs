//! Strategy → Backtester → Metrics pipeline shared by every procedure.

use serde::{Deserialize, Serialize};

use crate::backtest::{BacktestConfig, BacktestResult, Backtester, CostModel};
use crate::data::BarTable;
use crate::error::Result;
use crate::metrics::{MetricsCalculator, PerformanceMetrics, TRADING_DAYS};
use crate::strategy::{ParameterSet, Strategy};

/// Annualization and risk-free settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Trading periods per year.
    pub annualization_factor: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            annualization_factor: TRADING_DAYS,
            risk_free_rate: 0.0,
        }
    }
}

/// Everything needed to score one parameter set on one table.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    pub backtester: Backtester,
    pub cost: CostModel,
    pub calculator: MetricsCalculator,
}

impl Evaluator {
    pub fn new(backtest: BacktestConfig, cost: CostModel, metrics: MetricsConfig) -> Self {
        Self {
            backtester: Backtester::new(backtest),
            cost,
            calculator: MetricsCalculator::new(metrics.annualization_factor, metrics.risk_free_rate),
        }
    }

    /// Run the strategy and backtest it.
    pub fn backtest<S: Strategy + ?Sized>(
        &self,
        strategy: &S,
        table: &BarTable,
        params: &ParameterSet,
    ) -> Result<BacktestResult> {
        let positions = strategy.positions(table, params)?;
        self.backtester.run(table, &positions, &self.cost)
    }

    /// Run the strategy, backtest it and compute its metric bundle.
    pub fn evaluate<S: Strategy + ?Sized>(
        &self,
        strategy: &S,
        table: &BarTable,
        params: &ParameterSet,
    ) -> Result<(BacktestResult, PerformanceMetrics)> {
        let result = self.backtest(strategy, table, params)?;
        let metrics = self.calculator.calculate(&result.net_returns);
        Ok((result, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic, SyntheticConfig};
    use crate::strategy::{always_long, flat};

    #[test]
    fn test_evaluate_flat_is_zero() {
        let table = synthetic(&SyntheticConfig {
            bars: 100,
            ..Default::default()
        })
        .unwrap();
        let evaluator = Evaluator::new(
            BacktestConfig::default(),
            CostModel::new(1.0, 2.0),
            MetricsConfig::default(),
        );
        let (result, metrics) = evaluator.evaluate(&flat, &table, &ParameterSet::new()).unwrap();
        assert_eq!(result.final_equity, 1.0);
        assert_eq!(metrics.cagr, 0.0);
        assert_eq!(metrics.max_drawdown, 0.0);
    }

    #[test]
    fn test_evaluate_always_long_tracks_price() {
        let table = synthetic(&SyntheticConfig {
            bars: 100,
            ..Default::default()
        })
        .unwrap();
        let evaluator = Evaluator::default();
        let (result, _) = evaluator
            .evaluate(&always_long, &table, &ParameterSet::new())
            .unwrap();
        let closes = table.closes();
        let expected = closes[closes.len() - 1] / closes[0];
        assert!((result.final_equity - expected).abs() < 1e-9);
    }
}
