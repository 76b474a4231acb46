pub mod backtest;
pub mod config;
pub mod data;
pub mod deeptest;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod metrics;
pub mod strategy;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use backtest::{BacktestConfig, BacktestResult, Backtester, CostModel, NanPolicy};
pub use config::DeepTestConfig;
pub use data::{BarTable, DataConfig, DataLoader, PositionSeries};
pub use deeptest::{
    bootstrap_ci, permutation_test, BootstrapConfig, BootstrapResult, DeepTest, DeepTestReport,
    PermutationConfig, PermutationResult, RandomSource,
};
pub use error::{DeepTestError, Result};
pub use evaluator::{Evaluator, MetricsConfig};
pub use events::{Event, EventStudy, EventSummary};
pub use metrics::{Metric, MetricsCalculator, PerformanceMetrics};
pub use strategy::{ParameterSet, Strategy, StrategyRegistry};
pub use validation::{DataIntegrityReport, DataIntegrityValidator};
pub use walkforward::{
    grid_search, GridSearchResult, ParameterGrid, TrailingWindow, WalkForwardConfig,
    WalkForwardOptimizer, WalkForwardResult,
};
