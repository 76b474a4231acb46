//! Walk-forward window generation.
//!
//! Window k trains on `[s_k, s_k + train)` and tests on
//! `[s_k + train, s_k + train + test)`, with `s_{k+1} = s_k + test`, so
//! test segments tile the series without overlap. Lengths are either bar
//! counts or calendar months/years; calendar windows are anchored on the
//! first date of the table.

use std::ops::Range;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::BarTable;
use crate::error::{DeepTestError, Result};

/// Length of a train or test segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodLength {
    Bars(usize),
    Months(u32),
    Years(u32),
}

impl PeriodLength {
    fn is_zero(&self) -> bool {
        matches!(self, Self::Bars(0) | Self::Months(0) | Self::Years(0))
    }

    fn months(&self) -> Option<u32> {
        match self {
            Self::Bars(_) => None,
            Self::Months(m) => Some(*m),
            Self::Years(y) => Some(y.saturating_mul(12)),
        }
    }
}

/// What to do with a trailing test segment shorter than a full window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingWindow {
    /// Drop it.
    #[default]
    Drop,
    /// Evaluate it on its partial length.
    Partial,
}

/// Configuration for walk-forward windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Training segment length.
    pub train: PeriodLength,
    /// Test segment length; also the roll-forward step.
    pub test: PeriodLength,
    /// Trailing partial test segment policy.
    pub trailing: TrailingWindow,
    /// Windows with fewer training bars are skipped.
    pub min_train_bars: usize,
    /// Windows with fewer test bars are skipped.
    pub min_test_bars: usize,
    /// Generate test positions with the training segment as history, so
    /// indicators are warmed up at the start of the test segment.
    pub warm_start: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train: PeriodLength::Years(3),
            test: PeriodLength::Years(1),
            trailing: TrailingWindow::Drop,
            min_train_bars: 50,
            min_test_bars: 20,
            warm_start: false,
        }
    }
}

impl WalkForwardConfig {
    /// Bar-count windows.
    pub fn bars(train: usize, test: usize) -> Self {
        Self {
            train: PeriodLength::Bars(train),
            test: PeriodLength::Bars(test),
            ..Default::default()
        }
    }

    pub fn with_trailing(mut self, trailing: TrailingWindow) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.train.is_zero() || self.test.is_zero() {
            return Err(DeepTestError::configuration(
                "walk-forward train and test lengths must be non-zero",
            ));
        }
        let calendar_train = self.train.months().is_some();
        let calendar_test = self.test.months().is_some();
        if calendar_train != calendar_test {
            return Err(DeepTestError::configuration(
                "walk-forward train and test lengths must both be bar counts or both calendar periods",
            ));
        }
        Ok(())
    }
}

/// A single walk-forward window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    /// Window number (1-indexed).
    pub window_num: usize,
    /// Training bar indices.
    pub train: Range<usize>,
    /// Test bar indices.
    pub test: Range<usize>,
    /// Training start date.
    pub train_start: NaiveDate,
    /// Last training date.
    pub train_end: NaiveDate,
    /// Test start date.
    pub test_start: NaiveDate,
    /// Last test date.
    pub test_end: NaiveDate,
    /// Test segment is shorter than a full window.
    pub partial: bool,
}

impl WalkForwardWindow {
    pub fn train_bars(&self) -> usize {
        self.train.len()
    }

    pub fn test_bars(&self) -> usize {
        self.test.len()
    }
}

/// Generator for walk-forward windows.
pub struct WalkForwardPeriods {
    config: WalkForwardConfig,
}

impl WalkForwardPeriods {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self { config }
    }

    /// Generate all windows over `table`.
    pub fn generate(&self, table: &BarTable) -> Result<Vec<WalkForwardWindow>> {
        self.config.validate()?;
        let ranges = match (self.config.train, self.config.test) {
            (PeriodLength::Bars(train), PeriodLength::Bars(test)) => {
                self.bar_ranges(table.len(), train, test)
            }
            (train, test) => {
                // validate() guarantees both are calendar lengths here
                let train_months = train.months().unwrap_or(0);
                let test_months = test.months().unwrap_or(0);
                self.calendar_ranges(table, train_months, test_months)
            }
        };

        let bars = table.bars();
        Ok(ranges
            .into_iter()
            .filter(|(train, test, _)| !train.is_empty() && !test.is_empty())
            .enumerate()
            .map(|(i, (train, test, partial))| WalkForwardWindow {
                window_num: i + 1,
                train_start: bars[train.start].date,
                train_end: bars[train.end - 1].date,
                test_start: bars[test.start].date,
                test_end: bars[test.end - 1].date,
                train,
                test,
                partial,
            })
            .collect())
    }

    fn bar_ranges(&self, n: usize, train: usize, test: usize) -> Vec<(Range<usize>, Range<usize>, bool)> {
        let mut ranges = Vec::new();
        let mut start: usize = 0;
        loop {
            let train_end = start.saturating_add(train);
            if train_end >= n {
                break;
            }
            let test_end = train_end.saturating_add(test);
            if test_end <= n {
                ranges.push((start..train_end, train_end..test_end, false));
            } else {
                if self.config.trailing == TrailingWindow::Partial {
                    ranges.push((start..train_end, train_end..n, true));
                }
                break;
            }
            start += test;
        }
        ranges
    }

    fn calendar_ranges(
        &self,
        table: &BarTable,
        train_months: u32,
        test_months: u32,
    ) -> Vec<(Range<usize>, Range<usize>, bool)> {
        let (Some(first), Some(last)) = (table.first_date(), table.last_date()) else {
            return Vec::new();
        };
        // Past the last bar; saturates at the end of the calendar
        let data_end = last.succ_opt().unwrap_or(NaiveDate::MAX);

        let mut ranges = Vec::new();
        for k in 0u32.. {
            let Some(start) = test_months.checked_mul(k).and_then(|m| add_months(first, m)) else {
                break;
            };
            let Some(train_end) = add_months(start, train_months) else {
                break;
            };
            if train_end >= data_end {
                break;
            }
            let Some(test_end) = add_months(train_end, test_months) else {
                break;
            };

            let train = table.index_range(start, train_end);
            if test_end <= data_end {
                ranges.push((train, table.index_range(train_end, test_end), false));
            } else {
                if self.config.trailing == TrailingWindow::Partial {
                    ranges.push((train, table.index_range(train_end, data_end), true));
                }
                break;
            }
        }
        ranges
    }

    /// Expected number of windows for a bar-count configuration over `n`
    /// bars, before empty or undersized windows are filtered.
    pub fn expected_windows(&self, n: usize) -> Option<usize> {
        match (self.config.train, self.config.test) {
            (PeriodLength::Bars(train), PeriodLength::Bars(test)) if test > 0 => {
                if n <= train {
                    return Some(0);
                }
                let available = n - train;
                Some(match self.config.trailing {
                    TrailingWindow::Drop => available / test,
                    TrailingWindow::Partial => available.div_ceil(test),
                })
            }
            _ => None,
        }
    }
}

/// Add calendar months, clamping to the end of shorter months.
fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{business_days, synthetic, SyntheticConfig};

    fn sample(bars: usize) -> BarTable {
        synthetic(&SyntheticConfig {
            bars,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = WalkForwardConfig::default();
        assert_eq!(config.train, PeriodLength::Years(3));
        assert_eq!(config.test, PeriodLength::Years(1));
        assert_eq!(config.trailing, TrailingWindow::Drop);
    }

    #[test]
    fn test_bar_windows_drop_trailing() {
        let table = sample(1000);
        let periods = WalkForwardPeriods::new(WalkForwardConfig::bars(252, 63));
        let windows = periods.generate(&table).unwrap();

        assert_eq!(windows.len(), 11);
        assert_eq!(periods.expected_windows(1000), Some(11));
        assert!(windows.iter().all(|w| w.test_bars() == 63 && !w.partial));
        assert_eq!(windows[0].train, 0..252);
        assert_eq!(windows[0].test, 252..315);
        assert_eq!(windows[1].test.start, windows[0].test.end);
    }

    #[test]
    fn test_bar_windows_partial_trailing() {
        let table = sample(1000);
        let periods = WalkForwardPeriods::new(
            WalkForwardConfig::bars(252, 63).with_trailing(TrailingWindow::Partial),
        );
        let windows = periods.generate(&table).unwrap();

        assert_eq!(windows.len(), 12);
        assert_eq!(periods.expected_windows(1000), Some(12));
        let last = windows.last().unwrap();
        assert!(last.partial);
        assert_eq!(last.test, 945..1000);
    }

    #[test]
    fn test_exact_fit_has_no_partial_window() {
        let table = sample(252 + 63 * 4);
        let periods = WalkForwardPeriods::new(
            WalkForwardConfig::bars(252, 63).with_trailing(TrailingWindow::Partial),
        );
        assert_eq!(periods.generate(&table).unwrap().len(), 4);
    }

    #[test]
    fn test_zero_length_is_configuration_error() {
        let table = sample(100);
        let periods = WalkForwardPeriods::new(WalkForwardConfig::bars(0, 10));
        assert!(matches!(
            periods.generate(&table),
            Err(DeepTestError::Configuration(_))
        ));
    }

    #[test]
    fn test_mixed_units_rejected() {
        let config = WalkForwardConfig {
            train: PeriodLength::Years(1),
            test: PeriodLength::Bars(20),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_calendar_windows() {
        // 2010-01-01 .. roughly 2015-09: 1500 business days
        let table = sample(1500);
        let config = WalkForwardConfig {
            train: PeriodLength::Years(3),
            test: PeriodLength::Years(1),
            ..Default::default()
        };
        let windows = WalkForwardPeriods::new(config).generate(&table).unwrap();

        // Test years 2013 and 2014 are complete; 2015 is partial and dropped.
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].train_start, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
        assert_eq!(windows[0].test_start, NaiveDate::from_ymd_opt(2013, 1, 1).unwrap());
        assert_eq!(windows[1].test_start, NaiveDate::from_ymd_opt(2014, 1, 1).unwrap());
        assert!(windows[0].test_end < NaiveDate::from_ymd_opt(2014, 1, 1).unwrap());
    }

    #[test]
    fn test_calendar_partial_window() {
        let table = sample(1500);
        let config = WalkForwardConfig {
            train: PeriodLength::Years(3),
            test: PeriodLength::Years(1),
            trailing: TrailingWindow::Partial,
            ..Default::default()
        };
        let windows = WalkForwardPeriods::new(config).generate(&table).unwrap();
        assert_eq!(windows.len(), 3);
        assert!(windows[2].partial);
        assert_eq!(windows[2].test.end, 1500);
    }

    #[test]
    fn test_oversized_lengths_give_no_windows() {
        let table = sample(300);
        for (train, test) in [
            (PeriodLength::Bars(usize::MAX), PeriodLength::Bars(20)),
            (PeriodLength::Years(u32::MAX), PeriodLength::Years(1)),
            (PeriodLength::Months(12), PeriodLength::Months(u32::MAX)),
        ] {
            let config = WalkForwardConfig {
                train,
                test,
                trailing: TrailingWindow::Partial,
                ..Default::default()
            };
            let windows = WalkForwardPeriods::new(config).generate(&table).unwrap();
            assert!(windows.iter().all(|w| w.partial), "{:?}", train);
        }
    }

    #[test]
    fn test_calendar_windows_at_calendar_end() {
        let dates: Vec<_> = (0..40).rev().map(|i| NaiveDate::MAX - chrono::Duration::days(i)).collect();
        let table = BarTable::from_prices(&dates, &[100.0; 40]).unwrap();
        let config = WalkForwardConfig {
            train: PeriodLength::Months(1),
            test: PeriodLength::Months(1),
            trailing: TrailingWindow::Partial,
            ..Default::default()
        };
        let windows = WalkForwardPeriods::new(config).generate(&table).unwrap();
        assert!(windows.len() <= 1);
    }

    #[test]
    fn test_add_months_clamps_day() {
        let date = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(add_months(date, 1), NaiveDate::from_ymd_opt(2020, 2, 29));
        let days = business_days(NaiveDate::from_ymd_opt(2020, 11, 15).unwrap(), 1);
        assert_eq!(
            add_months(days[0], 3),
            NaiveDate::from_ymd_opt(2021, 2, 16)
        );
    }
}
