//! gold-deeptest CLI
//!
//! Usage:
//!   # Backtest the configured strategy once
//!   gold-deeptest --config config/default.toml run
//!
//!   # Grid search, walk-forward, permutation test and bootstrap in sequence
//!   gold-deeptest --config config/default.toml deep-test
//!
//!   # Individual procedures, JSON output
//!   gold-deeptest --json permutation --n-iter 1000 --seed 11
//!
//!   # Data checks and event study on a CSV
//!   gold-deeptest --csv data/gold.csv validate
//!   gold-deeptest --csv data/gold.csv events --events data/events.csv

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use gold_deeptest::config::DeepTestConfig;
use gold_deeptest::data::{BarTable, DataLoader};
use gold_deeptest::deeptest::{bootstrap_ci, permutation_test, RandomSource};
use gold_deeptest::events::{load_events, EventStudy};
use gold_deeptest::strategy::{ParameterSet, StrategyFn, StrategyRegistry};
use gold_deeptest::validation::DataIntegrityValidator;
use gold_deeptest::walkforward::{grid_search, TrailingWindow, WalkForwardOptimizer};

#[derive(Parser)]
#[command(name = "gold-deeptest")]
#[command(about = "Backtest and robustness-test a trading strategy on daily closes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daily bar CSV, overriding the configured data source
    #[arg(long, global = true)]
    csv: Option<PathBuf>,

    /// Strategy name, overriding the configured one
    #[arg(short, long, global = true)]
    strategy: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest
    Run {
        /// Strategy parameter as name=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,
    },

    /// Grid search over the configured parameter grid
    Grid {
        /// Number of rows to show
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Walk-forward optimization
    WalkForward {
        /// Evaluate a trailing partial test window
        #[arg(long)]
        partial: bool,
    },

    /// Block permutation test
    Permutation {
        /// Strategy parameter as name=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,

        #[arg(long)]
        n_iter: Option<usize>,

        #[arg(long)]
        block: Option<usize>,

        /// RNG seed; omit to use the configured source
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Block bootstrap confidence interval
    Bootstrap {
        /// Strategy parameter as name=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,

        #[arg(long)]
        n_iter: Option<usize>,

        #[arg(long)]
        block: Option<usize>,

        #[arg(long)]
        alpha: Option<f64>,

        /// RNG seed; omit to use the configured source
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Grid search, walk-forward, permutation and bootstrap in sequence
    DeepTest,

    /// Data integrity checks on the loaded bars
    Validate {
        /// Longest allowed calendar gap between bars
        #[arg(long, default_value_t = 7)]
        max_gap_days: i64,
    },

    /// Price reaction around event dates
    Events {
        /// CSV of event dates, overriding the configured one
        #[arg(long)]
        events: Option<PathBuf>,

        /// Calendar days on each side of the event
        #[arg(long)]
        window: Option<i64>,
    },
}

fn parse_param(raw: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number in '{}'", raw))?;
    Ok((name.trim().to_string(), value))
}

fn with_overrides(base: &ParameterSet, overrides: &[(String, f64)]) -> ParameterSet {
    let mut params = base.clone();
    for (name, value) in overrides {
        params.set(name, *value);
    }
    params
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gold_deeptest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DeepTestConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DeepTestConfig::default(),
    };
    if let Some(csv) = &cli.csv {
        config.data.csv_path = Some(csv.clone());
    }
    if let Some(name) = &cli.strategy {
        config.strategy.name = name.clone();
    }

    let table: BarTable = DataLoader::new(config.data.clone())
        .load()
        .context("Failed to load price data")?;
    info!(
        "Loaded {} bars for {} ({:?} to {:?})",
        table.len(),
        config.data.symbol,
        table.first_date(),
        table.last_date()
    );

    let registry = StrategyRegistry::builtin();
    let strategy: StrategyFn = registry
        .get(&config.strategy.name)
        .context("Invalid strategy")?;
    let evaluator = config.evaluator();

    match cli.command {
        Commands::Run { params } => {
            let params = with_overrides(&config.strategy.params, &params);
            let (result, metrics) = evaluator
                .evaluate(&strategy, &table, &params)
                .context("Backtest failed")?;
            emit(cli.json, &(&result, &metrics), || {
                format!("Params: {}\n{}\n\n{}", params, result.summary(), metrics.summary())
            })?;
        }
        Commands::Grid { top } => {
            let pb = spinner("Grid search")?;
            let result = grid_search(&table, &strategy, &config.grid.axes, &evaluator)
                .context("Grid search failed")?;
            pb.finish_and_clear();
            emit(cli.json, &result, || result.summary(config.grid.selection_metric, top))?;
        }
        Commands::WalkForward { partial } => {
            let mut wf_config = config.walk_forward.clone();
            if partial {
                wf_config.trailing = TrailingWindow::Partial;
            }
            let pb = spinner("Walk-forward optimization")?;
            let result = WalkForwardOptimizer::new(config.grid.axes.clone())
                .with_periods_config(wf_config)
                .with_selection_metric(config.grid.selection_metric)
                .with_evaluator(evaluator)
                .optimize(&table, &strategy)
                .context("Walk-forward failed")?;
            pb.finish_and_clear();
            emit(cli.json, &result, || result.summary())?;
        }
        Commands::Permutation {
            params,
            n_iter,
            block,
            seed,
        } => {
            let params = with_overrides(&config.strategy.params, &params);
            let mut perm = config.permutation.clone();
            perm.n_iter = n_iter.unwrap_or(perm.n_iter);
            perm.block = block.unwrap_or(perm.block);
            if let Some(seed) = seed {
                perm.random = RandomSource::Seeded(seed);
            }
            let pb = spinner("Permutation test")?;
            let result = permutation_test(&table, &strategy, &params, &evaluator, &perm)
                .context("Permutation test failed")?;
            pb.finish_and_clear();
            emit(cli.json, &result, || result.summary())?;
        }
        Commands::Bootstrap {
            params,
            n_iter,
            block,
            alpha,
            seed,
        } => {
            let params = with_overrides(&config.strategy.params, &params);
            let mut boot = config.bootstrap.clone();
            boot.n_iter = n_iter.unwrap_or(boot.n_iter);
            boot.block = block.unwrap_or(boot.block);
            boot.alpha = alpha.unwrap_or(boot.alpha);
            if let Some(seed) = seed {
                boot.random = RandomSource::Seeded(seed);
            }
            let pb = spinner("Bootstrap")?;
            let result = bootstrap_ci(&table, &strategy, &params, &evaluator, &boot)
                .context("Bootstrap failed")?;
            pb.finish_and_clear();
            emit(cli.json, &result, || result.summary())?;
        }
        Commands::DeepTest => {
            let pb = spinner("Deep test")?;
            let report = config
                .deep_test()
                .run(&table, &strategy)
                .context("Deep test failed")?;
            pb.finish_and_clear();
            emit(cli.json, &report, || report.summary())?;
        }
        Commands::Validate { max_gap_days } => {
            let report = DataIntegrityValidator::new(max_gap_days).validate(&config.data.symbol, &table);
            emit(cli.json, &report, || {
                let mut out = report.summary();
                for check in &report.checks {
                    out.push_str(&format!(
                        "\n  [{}] {}: {}",
                        if check.passed { "PASS" } else { "FAIL" },
                        check.name,
                        check.message
                    ));
                    if let Some(details) = &check.details {
                        out.push_str(&format!(" ({})", details));
                    }
                }
                out
            })?;
        }
        Commands::Events { events, window } => {
            let path = events
                .or_else(|| config.events.csv_path.clone())
                .context("No event CSV given (use --events or [events] csv_path)")?;
            let event_list = load_events(&path)
                .with_context(|| format!("Failed to load events from {}", path.display()))?;
            let study = EventStudy::new(window.unwrap_or(config.events.window_days));
            let result = study.analyze(&table, &event_list).context("Event study failed")?;
            emit(cli.json, &result, || result.report())?;
        }
    }

    Ok(())
}
