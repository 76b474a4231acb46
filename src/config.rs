//! TOML run configuration.
//!
//! Every section has defaults, so a file only needs the values it
//! changes. `config/default.toml` lists them all.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backtest::{BacktestConfig, CostModel};
use crate::data::DataConfig;
use crate::deeptest::{BootstrapConfig, DeepTest, PermutationConfig};
use crate::error::{DeepTestError, Result};
use crate::evaluator::{Evaluator, MetricsConfig};
use crate::metrics::Metric;
use crate::strategy::ParameterSet;
use crate::walkforward::{ParameterGrid, WalkForwardConfig};

/// Strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Registry name.
    pub name: String,
    /// Parameters for single runs (`run`, and the resampling tests when
    /// invoked on their own).
    pub params: ParameterSet,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "ma_cross".to_string(),
            params: ParameterSet::new().with("fast", 20.0).with("slow", 100.0),
        }
    }
}

/// Grid search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Metric used to rank cells and to pick walk-forward parameters.
    pub selection_metric: Metric,
    pub axes: ParameterGrid,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            selection_metric: Metric::Cagr,
            axes: ParameterGrid::new()
                .with("fast", vec![10.0, 20.0, 30.0])
                .with("slow", vec![80.0, 100.0, 150.0])
                .with("neutral_zone", vec![0.0, 5.0, 10.0]),
        }
    }
}

/// Event study settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Calendar days on each side of the event.
    pub window_days: i64,
    /// CSV of event dates.
    pub csv_path: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            window_days: 5,
            csv_path: None,
        }
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepTestConfig {
    pub data: DataConfig,
    pub strategy: StrategyConfig,
    pub cost: CostModel,
    pub backtest: BacktestConfig,
    pub metrics: MetricsConfig,
    pub grid: GridConfig,
    pub walk_forward: WalkForwardConfig,
    pub permutation: PermutationConfig,
    pub bootstrap: BootstrapConfig,
    pub events: EventsConfig,
}

impl DeepTestConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeepTestError::ConfigFile(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DeepTestError::ConfigFile(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DeepTestError::ConfigFile(e.to_string()))
    }

    /// Backtest, cost and metrics pipeline.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.backtest.clone(), self.cost, self.metrics)
    }

    /// Full robustness run.
    pub fn deep_test(&self) -> DeepTest {
        DeepTest {
            evaluator: self.evaluator(),
            grid: self.grid.axes.clone(),
            selection_metric: self.grid.selection_metric,
            walk_forward: self.walk_forward.clone(),
            permutation: self.permutation.clone(),
            bootstrap: self.bootstrap.clone(),
        }
    }
}
