//! Bar table loader.
//!
//! Loads daily closes from a CSV file into a `BarTable`, or synthesises a
//! geometric Brownian motion series when no file is configured (or when
//! the file cannot be read and fallback is enabled).
//!
//! Accepted CSV layouts:
//! - a `Date` column, or a first column named `date`, `datetime` or `time`
//!   (ISO `YYYY-MM-DD` prefix; any time-of-day suffix is ignored)
//! - a `Close` column (any case), falling back to `Adj Close`

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Weekday};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::types::BarTable;
use crate::error::Result;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters of the synthetic GBM series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of bars.
    pub bars: usize,
    /// Price of the first bar.
    pub start_price: f64,
    /// Mean daily log return.
    pub mu: f64,
    /// Daily log-return volatility.
    pub sigma: f64,
    /// RNG seed.
    pub seed: u64,
    /// First business day of the series.
    pub start_date: NaiveDate,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            bars: 3000,
            start_price: 1500.0,
            mu: 0.0001,
            sigma: 0.01,
            seed: 42,
            start_date: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
        }
    }
}

/// Where bars come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Instrument label (informational; gold futures by default).
    pub symbol: String,
    /// CSV file with daily bars. `None` means synthetic data.
    pub csv_path: Option<PathBuf>,
    /// Substitute synthetic data when the CSV cannot be loaded.
    pub fallback_to_synthetic: bool,
    /// Synthetic series parameters.
    pub synthetic: SyntheticConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            symbol: "GC=F".to_string(),
            csv_path: None,
            fallback_to_synthetic: true,
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Loader for daily bar tables.
pub struct DataLoader {
    config: DataConfig,
}

impl DataLoader {
    pub fn new(config: DataConfig) -> Self {
        Self { config }
    }

    /// Load the configured bar table.
    pub fn load(&self) -> Result<BarTable> {
        let Some(path) = &self.config.csv_path else {
            info!(
                "No CSV configured for {}, generating {} synthetic bars",
                self.config.symbol, self.config.synthetic.bars
            );
            return synthetic(&self.config.synthetic);
        };

        match load_csv(path) {
            Ok(table) => {
                info!("Loaded {} bars for {} from {}", table.len(), self.config.symbol, path.display());
                Ok(table)
            }
            Err(e) if self.config.fallback_to_synthetic => {
                warn!("Falling back to synthetic data due to: {}", e);
                synthetic(&self.config.synthetic)
            }
            Err(e) => Err(e),
        }
    }
}

/// Load daily bars from a CSV file.
///
/// Rows are sorted by date, duplicate dates keep the last row, and missing
/// closes are forward-filled then back-filled before returns are derived.
pub fn load_csv(path: &Path) -> Result<BarTable> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()).into());
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(LoaderError::from)?
        .finish()
        .map_err(LoaderError::from)?;

    let rows = extract_rows(&df)?;
    let (dates, closes) = clean_rows(rows)?;
    BarTable::from_prices(&dates, &closes)
}

fn extract_rows(df: &DataFrame) -> std::result::Result<Vec<(NaiveDate, Option<f64>)>, LoaderError> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

    let date_name = names
        .iter()
        .find(|n| n.as_str() == "Date")
        .or_else(|| {
            names.first().filter(|n| {
                matches!(n.to_lowercase().as_str(), "date" | "datetime" | "time")
            })
        })
        .ok_or_else(|| LoaderError::MissingColumn("Date".to_string()))?
        .clone();

    let close_name = names
        .iter()
        .find(|n| n.to_lowercase() == "close")
        .or_else(|| names.iter().find(|n| n.to_lowercase() == "adj close"))
        .ok_or_else(|| LoaderError::MissingColumn("Close".to_string()))?
        .clone();

    let dates_col = df.column(&date_name)?.cast(&DataType::String)?;
    let closes_col = df.column(&close_name)?.cast(&DataType::Float64)?;

    let dates = dates_col.str()?;
    let closes = closes_col.f64()?;

    let mut rows = Vec::with_capacity(df.height());
    for (raw_date, close) in dates.into_iter().zip(closes.into_iter()) {
        let raw_date = raw_date
            .ok_or_else(|| LoaderError::InvalidData("null date".to_string()))?;
        rows.push((parse_date(raw_date)?, close));
    }
    Ok(rows)
}

pub(crate) fn parse_date(raw: &str) -> std::result::Result<NaiveDate, LoaderError> {
    let trimmed = raw.trim();
    let prefix = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map_err(|_| LoaderError::InvalidData(format!("unparseable date: {}", raw)))
}

/// Sort, de-duplicate (keep last) and gap-fill raw rows.
fn clean_rows(
    mut rows: Vec<(NaiveDate, Option<f64>)>,
) -> std::result::Result<(Vec<NaiveDate>, Vec<f64>), LoaderError> {
    rows.sort_by_key(|(date, _)| *date);

    let mut deduped: Vec<(NaiveDate, Option<f64>)> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last) if last.0 == row.0 => *last = row,
            _ => deduped.push(row),
        }
    }

    let first_valid = deduped
        .iter()
        .find_map(|(_, c)| c.filter(|v| v.is_finite()))
        .ok_or_else(|| LoaderError::InvalidData("no valid close prices".to_string()))?;

    // Forward-fill, with the first valid close back-filling the head.
    let mut last = first_valid;
    let mut dates = Vec::with_capacity(deduped.len());
    let mut closes = Vec::with_capacity(deduped.len());
    for (date, close) in deduped {
        if let Some(c) = close.filter(|v| v.is_finite()) {
            last = c;
        }
        dates.push(date);
        closes.push(last);
    }

    Ok((dates, closes))
}

/// Geometric Brownian motion series on business days.
pub fn synthetic(config: &SyntheticConfig) -> Result<BarTable> {
    let normal = Normal::new(config.mu, config.sigma)
        .map_err(|e| LoaderError::InvalidData(format!("bad synthetic volatility: {}", e)))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut log_price = config.start_price.ln();
    let mut closes = Vec::with_capacity(config.bars);
    for _ in 0..config.bars {
        log_price += normal.sample(&mut rng);
        closes.push(log_price.exp());
    }

    let dates = business_days(config.start_date, config.bars);
    BarTable::from_prices(&dates, &closes)
}

/// `count` consecutive Mon–Fri dates starting at (or after) `start`.
///
/// Stops early if the calendar runs out.
pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut current = Some(start);
    while let Some(day) = current {
        if days.len() == count {
            break;
        }
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        current = day.succ_opt();
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_synthetic_is_deterministic() {
        let config = SyntheticConfig {
            bars: 250,
            ..Default::default()
        };
        let a = synthetic(&config).unwrap();
        let b = synthetic(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 250);
        assert!(a.closes().iter().all(|c| *c > 0.0));
    }

    #[test]
    fn test_business_days_skip_weekends() {
        // 2020-01-03 is a Friday
        let start = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        let days = business_days(start, 3);
        assert_eq!(days[1], NaiveDate::from_ymd_opt(2020, 1, 6).unwrap());
        assert_eq!(days[2], NaiveDate::from_ymd_opt(2020, 1, 7).unwrap());
    }

    #[test]
    fn test_business_days_stop_at_calendar_end() {
        let start = NaiveDate::MAX - chrono::Duration::days(3);
        let days = business_days(start, 10);
        assert!(days.len() < 10);
        assert!(days.iter().all(|d| *d <= NaiveDate::MAX));

        let config = SyntheticConfig {
            bars: 10,
            start_date: start,
            ..Default::default()
        };
        assert!(synthetic(&config).is_err());
    }

    #[test]
    fn test_load_csv_sorts_dedupes_and_fills() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Date,Open,Close").unwrap();
        writeln!(file, "2020-01-03,1,102.0").unwrap();
        writeln!(file, "2020-01-01,1,100.0").unwrap();
        writeln!(file, "2020-01-02,1,").unwrap();
        writeln!(file, "2020-01-03,1,104.0").unwrap();
        file.flush().unwrap();

        let table = load_csv(file.path()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.closes(), vec![100.0, 100.0, 104.0]);
        assert_eq!(table.returns()[1], 0.0);
        assert!((table.returns()[2] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_load_csv_missing_close_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "date,price").unwrap();
        writeln!(file, "2020-01-01,1.0").unwrap();
        file.flush().unwrap();

        assert!(load_csv(file.path()).is_err());
    }

    #[test]
    fn test_loader_falls_back_to_synthetic() {
        let loader = DataLoader::new(DataConfig {
            csv_path: Some(PathBuf::from("/nonexistent/gold.csv")),
            synthetic: SyntheticConfig {
                bars: 100,
                ..Default::default()
            },
            ..Default::default()
        });
        assert_eq!(loader.load().unwrap().len(), 100);

        let strict = DataLoader::new(DataConfig {
            csv_path: Some(PathBuf::from("/nonexistent/gold.csv")),
            fallback_to_synthetic: false,
            ..Default::default()
        });
        assert!(strict.load().is_err());
    }
}
