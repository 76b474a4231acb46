//! Grid search and walk-forward validation.
//!
//! Rolling windows of train/test segments:
//! - Train: parameter optimization over the grid
//! - Test: out-of-sample evaluation of the winning parameters
//! - Roll: by the test length, so test segments never overlap

pub mod grid;
pub mod optimizer;
pub mod periods;

pub use grid::{grid_search, GridFailure, GridRow, GridSearchResult, ParameterAxis, ParameterGrid};
pub use optimizer::{
    MetricAggregate, SkippedWindow, WalkForwardOptimizer, WalkForwardResult, WindowResult,
};
pub use periods::{
    PeriodLength, TrailingWindow, WalkForwardConfig, WalkForwardPeriods, WalkForwardWindow,
};
