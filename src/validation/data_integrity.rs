//! Data integrity validation for price tables.
//!
//! Date ordering is already guaranteed by `BarTable` itself.
//!
//! Validates:
//! - Close validity (finite and positive)
//! - Return validity (finite, consistent with consecutive closes)
//! - Calendar continuity (no gap longer than a configured number of days)

use serde::{Deserialize, Serialize};

use crate::data::BarTable;

/// Relative tolerance for return/close consistency.
const RETURN_TOLERANCE: f64 = 1e-9;

/// Result of a single validation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: &str, details: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.to_string(),
            details,
        }
    }
}

/// Complete data integrity report for one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIntegrityReport {
    pub symbol: String,
    pub bar_count: usize,
    pub checks: Vec<CheckResult>,
}

impl DataIntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        self.checks.iter().filter(|c| !c.passed).collect()
    }

    pub fn summary(&self) -> String {
        let passed = self.checks.iter().filter(|c| c.passed).count();
        let total = self.checks.len();
        format!(
            "{} ({} bars): {}/{} checks passed",
            self.symbol, self.bar_count, passed, total
        )
    }
}

/// Validator for bar table integrity.
#[derive(Debug, Clone)]
pub struct DataIntegrityValidator {
    max_gap_days: i64,
}

impl Default for DataIntegrityValidator {
    fn default() -> Self {
        Self { max_gap_days: 7 }
    }
}

impl DataIntegrityValidator {
    pub fn new(max_gap_days: i64) -> Self {
        Self { max_gap_days }
    }

    /// Run all validation checks on `table`.
    pub fn validate(&self, symbol: &str, table: &BarTable) -> DataIntegrityReport {
        let checks = vec![
            self.check_finite_closes(table),
            self.check_positive_closes(table),
            self.check_finite_returns(table),
            self.check_return_consistency(table),
            self.check_date_gaps(table),
        ];

        DataIntegrityReport {
            symbol: symbol.to_string(),
            bar_count: table.len(),
            checks,
        }
    }

    fn check_finite_closes(&self, table: &BarTable) -> CheckResult {
        let bad: Vec<String> = table
            .bars()
            .iter()
            .filter(|b| !b.close.is_finite())
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("finite_closes", "All closes finite")
        } else {
            CheckResult::fail(
                "finite_closes",
                &format!("{} non-finite closes", bad.len()),
                Some(sample_details(&bad)),
            )
        }
    }

    fn check_positive_closes(&self, table: &BarTable) -> CheckResult {
        let bad: Vec<String> = table
            .bars()
            .iter()
            .filter(|b| b.close <= 0.0)
            .map(|b| format!("{}: {}", b.date, b.close))
            .collect();

        if bad.is_empty() {
            CheckResult::pass("positive_closes", "All closes positive")
        } else {
            CheckResult::fail(
                "positive_closes",
                &format!("{} non-positive closes", bad.len()),
                Some(sample_details(&bad)),
            )
        }
    }

    fn check_finite_returns(&self, table: &BarTable) -> CheckResult {
        let bad: Vec<String> = table
            .bars()
            .iter()
            .filter(|b| !b.ret.is_finite())
            .map(|b| b.date.to_string())
            .collect();

        if bad.is_empty() {
            CheckResult::pass("finite_returns", "All returns finite")
        } else {
            CheckResult::fail(
                "finite_returns",
                &format!("{} non-finite returns", bad.len()),
                Some(sample_details(&bad)),
            )
        }
    }

    fn check_return_consistency(&self, table: &BarTable) -> CheckResult {
        let bad: Vec<String> = table
            .bars()
            .windows(2)
            .filter(|w| w[0].close > 0.0 && w[1].ret.is_finite())
            .filter(|w| {
                let implied = w[1].close / w[0].close - 1.0;
                (implied - w[1].ret).abs() > RETURN_TOLERANCE * implied.abs().max(1.0)
            })
            .map(|w| format!("{}: ret {:.6}", w[1].date, w[1].ret))
            .collect();

        if bad.is_empty() {
            CheckResult::pass("return_consistency", "Returns match consecutive closes")
        } else {
            CheckResult::fail(
                "return_consistency",
                &format!("{} returns disagree with closes", bad.len()),
                Some(sample_details(&bad)),
            )
        }
    }

    fn check_date_gaps(&self, table: &BarTable) -> CheckResult {
        let gaps: Vec<String> = table
            .bars()
            .windows(2)
            .filter(|w| (w[1].date - w[0].date).num_days() > self.max_gap_days)
            .map(|w| {
                format!(
                    "{} -> {} ({} days)",
                    w[0].date,
                    w[1].date,
                    (w[1].date - w[0].date).num_days()
                )
            })
            .collect();

        if gaps.is_empty() {
            CheckResult::pass(
                "date_continuity",
                &format!("No gaps longer than {} days", self.max_gap_days),
            )
        } else {
            CheckResult::fail(
                "date_continuity",
                &format!("{} gaps longer than {} days", gaps.len(), self.max_gap_days),
                Some(sample_details(&gaps)),
            )
        }
    }
}

/// First few offending entries.
fn sample_details(items: &[String]) -> String {
    let shown: Vec<&str> = items.iter().take(5).map(|s| s.as_str()).collect();
    if items.len() > shown.len() {
        format!("{} (+{} more)", shown.join(", "), items.len() - shown.len())
    } else {
        shown.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{synthetic, Bar, SyntheticConfig};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_synthetic_table_passes() {
        let table = synthetic(&SyntheticConfig {
            bars: 300,
            ..Default::default()
        })
        .unwrap();
        let report = DataIntegrityValidator::default().validate("GC=F", &table);
        assert!(report.all_passed(), "{:?}", report.failed_checks());
        assert_eq!(report.checks.len(), 5);
        assert!(report.summary().contains("5/5"));
    }

    #[test]
    fn test_gap_detection() {
        let dates = [date(2020, 1, 1), date(2020, 1, 2), date(2020, 1, 20)];
        let table = BarTable::from_prices(&dates, &[100.0, 101.0, 102.0]).unwrap();
        let report = DataIntegrityValidator::default().validate("X", &table);

        let failed = report.failed_checks();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "date_continuity");
        assert!(DataIntegrityValidator::new(30).validate("X", &table).all_passed());
    }

    #[test]
    fn test_inconsistent_return_detected() {
        let bars = vec![
            Bar {
                date: date(2020, 1, 1),
                close: 100.0,
                ret: 0.0,
            },
            Bar {
                date: date(2020, 1, 2),
                close: 110.0,
                ret: 0.05,
            },
        ];
        let table = BarTable::new(bars).unwrap();
        let report = DataIntegrityValidator::default().validate("X", &table);
        let failed: Vec<&str> = report.failed_checks().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["return_consistency"]);
    }

    #[test]
    fn test_non_positive_close_detected() {
        let bars = vec![
            Bar {
                date: date(2020, 1, 1),
                close: 100.0,
                ret: 0.0,
            },
            Bar {
                date: date(2020, 1, 2),
                close: -1.0,
                ret: -1.01,
            },
        ];
        let table = BarTable::new(bars).unwrap();
        let report = DataIntegrityValidator::default().validate("X", &table);
        assert!(report
            .failed_checks()
            .iter()
            .any(|c| c.name == "positive_closes"));
    }

    #[test]
    fn test_sample_details_truncates() {
        let items: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        assert_eq!(sample_details(&items), "0, 1, 2, 3, 4 (+3 more)");
    }
}
