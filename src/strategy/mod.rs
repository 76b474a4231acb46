//! Strategy plug-ins.
//!
//! A strategy is any function `(table, params) -> PositionSeries`. It must
//! be pure and must keep its positions inside [-1, 1]; the backtester
//! validates but never clamps. Built-ins are reachable by name through
//! `StrategyRegistry`, and callers may pass any conforming closure.

pub mod ma_cross;
pub mod params;

use std::collections::BTreeMap;

use crate::data::{BarTable, PositionSeries};
use crate::error::{DeepTestError, Result};

pub use ma_cross::{ma_cross, rolling_mean};
pub use params::ParameterSet;

/// Capability contract for position generators.
pub trait Strategy: Sync {
    fn positions(&self, table: &BarTable, params: &ParameterSet) -> Result<PositionSeries>;
}

impl<F> Strategy for F
where
    F: Fn(&BarTable, &ParameterSet) -> Result<PositionSeries> + Sync,
{
    fn positions(&self, table: &BarTable, params: &ParameterSet) -> Result<PositionSeries> {
        self(table, params)
    }
}

/// Plain function pointer form, as stored in the registry.
pub type StrategyFn = fn(&BarTable, &ParameterSet) -> Result<PositionSeries>;

/// Fully invested long for every bar.
pub fn always_long(table: &BarTable, _params: &ParameterSet) -> Result<PositionSeries> {
    Ok(PositionSeries::constant(table, 1.0))
}

/// No exposure.
pub fn flat(table: &BarTable, _params: &ParameterSet) -> Result<PositionSeries> {
    Ok(PositionSeries::constant(table, 0.0))
}

/// Name → strategy function lookup.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, StrategyFn>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in strategies.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("ma_cross", ma_cross);
        registry.register("always_long", always_long);
        registry.register("flat", flat);
        registry
    }

    pub fn register(&mut self, name: &str, strategy: StrategyFn) {
        self.strategies.insert(name.to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Result<StrategyFn> {
        self.strategies.get(name).copied().ok_or_else(|| {
            DeepTestError::configuration(format!(
                "unknown strategy '{}' (available: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(|s| s.as_str()).collect()
    }
}
