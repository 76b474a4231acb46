//! Core data types for the deep-test harness.
//!
//! A `BarTable` is the single tabular input every procedure works on:
//! one row per trading day with a closing price and the simple return
//! derived from the previous close. A `PositionSeries` is the strategy's
//! target exposure aligned 1:1 with that table.

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DeepTestError, Result};

/// A single daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Trading date.
    pub date: NaiveDate,
    /// Closing price.
    pub close: f64,
    /// Simple return from the previous close (0.0 on the first bar).
    pub ret: f64,
}

/// Time-ordered table of bars with strictly increasing dates.
///
/// Deserialization goes through [`BarTable::new`], so a serialized table
/// with out-of-order dates is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBarTable")]
pub struct BarTable {
    bars: Vec<Bar>,
}

#[derive(Deserialize)]
struct RawBarTable {
    bars: Vec<Bar>,
}

impl TryFrom<RawBarTable> for BarTable {
    type Error = DeepTestError;

    fn try_from(raw: RawBarTable) -> Result<Self> {
        Self::new(raw.bars)
    }
}

impl BarTable {
    /// Build a table from pre-computed bars.
    ///
    /// Fails with `InvalidData` if dates are not strictly increasing.
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        for (i, w) in bars.windows(2).enumerate() {
            if w[1].date <= w[0].date {
                return Err(DeepTestError::invalid_data(format!(
                    "dates must be strictly increasing: bar {} ({}) follows {}",
                    i + 1,
                    w[1].date,
                    w[0].date
                )));
            }
        }
        Ok(Self { bars })
    }

    /// Build a table from dates and closes, deriving simple returns.
    pub fn from_prices(dates: &[NaiveDate], closes: &[f64]) -> Result<Self> {
        if dates.len() != closes.len() {
            return Err(DeepTestError::alignment(format!(
                "{} dates but {} closes",
                dates.len(),
                closes.len()
            )));
        }

        let bars = dates
            .iter()
            .zip(closes)
            .enumerate()
            .map(|(i, (&date, &close))| {
                let ret = if i == 0 { 0.0 } else { close / closes[i - 1] - 1.0 };
                Bar { date, close, ret }
            })
            .collect();

        Self::new(bars)
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.ret).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Sub-table over an index range. Out-of-range bounds are clamped.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.bars.len());
        let start = range.start.min(end);
        Self {
            bars: self.bars[start..end].to_vec(),
        }
    }

    /// Index range of bars with `start <= date < end`.
    pub fn index_range(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        let lo = self.bars.partition_point(|b| b.date < start);
        let hi = self.bars.partition_point(|b| b.date < end);
        lo..hi.max(lo)
    }

    /// Sub-table of bars with `start <= date < end`.
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        self.slice(self.index_range(start, end))
    }

    /// Copy of this table with the return column replaced.
    ///
    /// Closes are left untouched; resampling procedures only reapply a
    /// fixed position series to a reshuffled return column.
    pub fn with_returns(&self, returns: &[f64]) -> Result<Self> {
        if returns.len() != self.bars.len() {
            return Err(DeepTestError::alignment(format!(
                "replacement returns have length {}, table has {}",
                returns.len(),
                self.bars.len()
            )));
        }
        let bars = self
            .bars
            .iter()
            .zip(returns)
            .map(|(bar, &ret)| Bar { ret, ..*bar })
            .collect();
        Ok(Self { bars })
    }
}

/// Target exposure per bar, in [-1, 1].
///
/// The value at index t is decided at the close of bar t and earns the
/// return of bar t + 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl PositionSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(DeepTestError::alignment(format!(
                "{} dates but {} position values",
                dates.len(),
                values.len()
            )));
        }
        Ok(Self { dates, values })
    }

    /// Position series aligned with `table`.
    pub fn for_table(table: &BarTable, values: Vec<f64>) -> Result<Self> {
        Self::new(table.dates(), values)
    }

    /// Constant exposure over the whole table.
    pub fn constant(table: &BarTable, value: f64) -> Self {
        Self {
            dates: table.dates(),
            values: vec![value; table.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check that this series is aligned with `table` and every value is a
    /// finite number in [-1, 1].
    pub fn validate_against(&self, table: &BarTable) -> Result<()> {
        if self.values.len() != table.len() {
            return Err(DeepTestError::alignment(format!(
                "position series has {} values, table has {} bars",
                self.values.len(),
                table.len()
            )));
        }
        if let Some((i, (d, bar))) = self
            .dates
            .iter()
            .zip(table.bars())
            .enumerate()
            .find(|(_, (d, bar))| **d != bar.date)
        {
            return Err(DeepTestError::alignment(format!(
                "position date {} at index {} does not match table date {}",
                d, i, bar.date
            )));
        }
        if let Some((i, v)) = self
            .values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || v.abs() > 1.0)
        {
            return Err(DeepTestError::invalid_data(format!(
                "position {} at index {} is outside [-1, 1]",
                v, i
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    #[test]
    fn test_from_prices_derives_returns() {
        let table = BarTable::from_prices(&dates(3), &[100.0, 110.0, 99.0]).unwrap();
        let rets = table.returns();
        assert_eq!(rets[0], 0.0);
        assert!((rets[1] - 0.10).abs() < 1e-12);
        assert!((rets[2] - (-0.10)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_monotonic_dates() {
        let mut d = dates(3);
        d.swap(1, 2);
        let err = BarTable::from_prices(&d, &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, DeepTestError::InvalidData(_)));
    }

    #[test]
    fn test_rejects_duplicate_dates() {
        let d = vec![dates(1)[0], dates(1)[0]];
        assert!(BarTable::from_prices(&d, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_deserialize_checks_date_order() {
        let table = BarTable::from_prices(&dates(2), &[1.0, 2.0]).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(serde_json::from_str::<BarTable>(&json).unwrap(), table);

        let reversed = r#"{"bars":[
            {"date":"2020-01-02","close":2.0,"ret":1.0},
            {"date":"2020-01-01","close":1.0,"ret":0.0}
        ]}"#;
        let err = serde_json::from_str::<BarTable>(reversed).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));

        let duplicated = r#"{"bars":[
            {"date":"2020-01-01","close":1.0,"ret":0.0},
            {"date":"2020-01-01","close":2.0,"ret":1.0}
        ]}"#;
        assert!(serde_json::from_str::<BarTable>(duplicated).is_err());
    }

    #[test]
    fn test_slice_dates() {
        let d = dates(10);
        let table = BarTable::from_prices(&d, &[1.0; 10]).unwrap();
        let sub = table.slice_dates(d[2], d[5]);
        assert_eq!(sub.len(), 3);
        assert_eq!(sub.first_date(), Some(d[2]));
        assert_eq!(sub.last_date(), Some(d[4]));
    }

    #[test]
    fn test_with_returns_keeps_closes() {
        let table = BarTable::from_prices(&dates(3), &[1.0, 2.0, 3.0]).unwrap();
        let swapped = table.with_returns(&[0.5, 0.0, -0.5]).unwrap();
        assert_eq!(swapped.closes(), table.closes());
        assert_eq!(swapped.returns(), vec![0.5, 0.0, -0.5]);
        assert!(table.with_returns(&[0.0]).is_err());
    }

    #[test]
    fn test_position_validation() {
        let table = BarTable::from_prices(&dates(3), &[1.0, 2.0, 3.0]).unwrap();

        let ok = PositionSeries::for_table(&table, vec![0.0, 1.0, -1.0]).unwrap();
        assert!(ok.validate_against(&table).is_ok());

        let out_of_range = PositionSeries::for_table(&table, vec![0.0, 1.5, 0.0]).unwrap();
        assert!(matches!(
            out_of_range.validate_against(&table),
            Err(DeepTestError::InvalidData(_))
        ));

        let shifted = PositionSeries::new(dates(4)[1..].to_vec(), vec![0.0; 3]).unwrap();
        assert!(matches!(
            shifted.validate_against(&table),
            Err(DeepTestError::Alignment(_))
        ));
    }
}
