//! Performance metrics calculator.
//!
//! Reduces a net return series to scalar performance statistics. Every
//! metric is total: degenerate inputs (empty series, zero variance, zero
//! drawdown) map to a documented sentinel instead of an error, so metrics
//! compose inside grid/permutation/bootstrap loops.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::DeepTestError;

/// Trading periods per year for daily bars.
pub const TRADING_DAYS: f64 = 252.0;

/// Dispersion at or below this is treated as zero.
const DEGENERATE_EPS: f64 = 1e-12;

/// Named metric, used to select parameters and to choose the statistic of
/// the resampling tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "CAGR")]
    Cagr,
    #[serde(rename = "Sharpe")]
    Sharpe,
    #[serde(rename = "Sortino")]
    Sortino,
    #[serde(rename = "MaxDD")]
    MaxDrawdown,
    #[serde(rename = "Calmar")]
    Calmar,
    #[serde(rename = "TotalReturn")]
    TotalReturn,
    #[serde(rename = "Vol")]
    Volatility,
    #[serde(rename = "WinRate")]
    WinRate,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::Cagr,
        Metric::Sharpe,
        Metric::Sortino,
        Metric::MaxDrawdown,
        Metric::Calmar,
        Metric::TotalReturn,
        Metric::Volatility,
        Metric::WinRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Cagr => "CAGR",
            Metric::Sharpe => "Sharpe",
            Metric::Sortino => "Sortino",
            Metric::MaxDrawdown => "MaxDD",
            Metric::Calmar => "Calmar",
            Metric::TotalReturn => "TotalReturn",
            Metric::Volatility => "Vol",
            Metric::WinRate => "WinRate",
        }
    }

    /// Whether larger values are preferable. Drawdowns are negative, so
    /// "larger" (closer to zero) is better there too.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, Metric::Volatility)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = DeepTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cagr" => Ok(Metric::Cagr),
            "sharpe" => Ok(Metric::Sharpe),
            "sortino" => Ok(Metric::Sortino),
            "maxdd" | "max_dd" | "max_drawdown" => Ok(Metric::MaxDrawdown),
            "calmar" => Ok(Metric::Calmar),
            "totalreturn" | "total_return" => Ok(Metric::TotalReturn),
            "vol" | "volatility" => Ok(Metric::Volatility),
            "winrate" | "win_rate" => Ok(Metric::WinRate),
            other => Err(DeepTestError::configuration(format!("unknown metric: {}", other))),
        }
    }
}

/// Metric bundle of a net return series.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Return metrics
    pub cagr: f64,
    pub total_return: f64,

    // Risk-adjusted returns
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,

    // Risk metrics
    pub volatility: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,

    // Period statistics
    pub periods: usize,
    pub active_periods: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
}

impl PerformanceMetrics {
    /// Value of a named metric.
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cagr => self.cagr,
            Metric::Sharpe => self.sharpe,
            Metric::Sortino => self.sortino,
            Metric::MaxDrawdown => self.max_drawdown,
            Metric::Calmar => self.calmar,
            Metric::TotalReturn => self.total_return,
            Metric::Volatility => self.volatility,
            Metric::WinRate => self.win_rate,
        }
    }

    /// True if every metric is a finite number.
    pub fn is_finite(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_finite())
    }

    /// Generate a summary report.
    pub fn summary(&self) -> String {
        format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Total Return: {:.2}%\n\
             CAGR: {:.2}%\n\
             \n\
             Sharpe Ratio: {:.2}\n\
             Sortino Ratio: {:.2}\n\
             Calmar Ratio: {:.2}\n\
             \n\
             Volatility: {:.2}%\n\
             Max Drawdown: {:.2}% ({} bars)\n\
             \n\
             Periods: {} ({} active)\n\
             Win Rate: {:.1}%\n\
             Avg Win: {:.4}%\n\
             Avg Loss: {:.4}%",
            self.total_return * 100.0,
            self.cagr * 100.0,
            self.sharpe,
            self.sortino,
            self.calmar,
            self.volatility * 100.0,
            self.max_drawdown * 100.0,
            self.max_drawdown_duration,
            self.periods,
            self.active_periods,
            self.win_rate * 100.0,
            self.avg_win * 100.0,
            self.avg_loss * 100.0,
        )
    }
}

/// Metrics calculator.
#[derive(Debug, Clone, Copy)]
pub struct MetricsCalculator {
    /// Trading periods per year.
    pub annualization_factor: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
}

impl Default for MetricsCalculator {
    fn default() -> Self {
        Self {
            annualization_factor: TRADING_DAYS,
            risk_free_rate: 0.0,
        }
    }
}

impl MetricsCalculator {
    pub fn new(annualization_factor: f64, risk_free_rate: f64) -> Self {
        Self {
            annualization_factor,
            risk_free_rate,
        }
    }

    /// Calculate all metrics from a net return series.
    pub fn calculate(&self, returns: &[f64]) -> PerformanceMetrics {
        let af = self.annualization_factor;
        let equity = equity_from_returns(returns);

        let cagr = Self::cagr(returns, af);
        let max_drawdown = Self::max_drawdown(&equity);

        let active: Vec<f64> = returns.iter().copied().filter(|r| *r != 0.0).collect();
        let wins: Vec<f64> = active.iter().copied().filter(|r| *r > 0.0).collect();
        let losses: Vec<f64> = active.iter().copied().filter(|r| *r < 0.0).collect();

        PerformanceMetrics {
            cagr,
            total_return: equity.last().copied().unwrap_or(1.0) - 1.0,
            sharpe: Self::sharpe(returns, af, self.risk_free_rate),
            sortino: Self::sortino(returns, af, self.risk_free_rate),
            calmar: Self::calmar(cagr, max_drawdown),
            volatility: Self::volatility(returns, af),
            max_drawdown,
            max_drawdown_duration: Self::max_drawdown_duration(&equity),
            periods: returns.len(),
            active_periods: active.len(),
            win_rate: if active.is_empty() {
                0.0
            } else {
                wins.len() as f64 / active.len() as f64
            },
            avg_win: mean_or_zero(&wins),
            avg_loss: mean_or_zero(&losses),
        }
    }

    /// Compound annual growth rate:
    /// `(final / initial)^(af / n_periods) - 1`.
    ///
    /// Empty series → 0; equity wiped out (≤ 0) → -1.
    pub fn cagr(returns: &[f64], annualization_factor: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
        if growth <= 0.0 {
            return -1.0;
        }
        growth.powf(annualization_factor / returns.len() as f64) - 1.0
    }

    /// Annualized Sharpe ratio of excess returns (population stdev).
    ///
    /// Zero variance → 0.
    pub fn sharpe(returns: &[f64], annualization_factor: f64, risk_free_rate: f64) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        let rf = risk_free_rate / annualization_factor;
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();

        let mean = excess.iter().mean();
        let std_dev = excess.iter().population_std_dev();
        if !std_dev.is_finite() || std_dev <= DEGENERATE_EPS {
            return 0.0;
        }
        mean / std_dev * annualization_factor.sqrt()
    }

    /// Annualized Sortino ratio: mean excess return over downside deviation
    /// (root-mean-square of negative excess returns).
    ///
    /// Zero downside deviation → 0.
    pub fn sortino(returns: &[f64], annualization_factor: f64, risk_free_rate: f64) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let rf = risk_free_rate / annualization_factor;
        let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();

        let mean = excess.iter().mean();
        let downside_variance =
            excess.iter().map(|e| e.min(0.0).powi(2)).sum::<f64>() / excess.len() as f64;
        let downside_dev = downside_variance.sqrt();
        if !downside_dev.is_finite() || downside_dev <= DEGENERATE_EPS {
            return 0.0;
        }
        mean / downside_dev * annualization_factor.sqrt()
    }

    /// Annualized volatility (population stdev).
    pub fn volatility(returns: &[f64], annualization_factor: f64) -> f64 {
        if returns.len() < 2 {
            return 0.0;
        }
        returns.iter().population_std_dev() * annualization_factor.sqrt()
    }

    /// Drawdown series: `equity / running_max(equity) - 1`.
    pub fn drawdowns(equity: &[f64]) -> Vec<f64> {
        let mut peak = f64::NEG_INFINITY;
        equity
            .iter()
            .map(|&e| {
                peak = peak.max(e);
                if peak > 0.0 {
                    e / peak - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Most negative drawdown of an equity curve; always ≤ 0.
    pub fn max_drawdown(equity: &[f64]) -> f64 {
        Self::drawdowns(equity).into_iter().fold(0.0, f64::min)
    }

    /// Longest run of consecutive bars spent below a previous peak.
    pub fn max_drawdown_duration(equity: &[f64]) -> usize {
        let mut longest = 0;
        let mut current = 0;
        for dd in Self::drawdowns(equity) {
            if dd < 0.0 {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 0;
            }
        }
        longest
    }

    /// `CAGR / |MaxDD|`; zero drawdown → 0.
    pub fn calmar(cagr: f64, max_drawdown: f64) -> f64 {
        if max_drawdown.abs() <= DEGENERATE_EPS || !max_drawdown.is_finite() {
            return 0.0;
        }
        cagr / max_drawdown.abs()
    }

    /// Evaluate a single named metric.
    pub fn metric(&self, returns: &[f64], metric: Metric) -> f64 {
        let af = self.annualization_factor;
        match metric {
            Metric::Cagr => Self::cagr(returns, af),
            Metric::Sharpe => Self::sharpe(returns, af, self.risk_free_rate),
            Metric::Sortino => Self::sortino(returns, af, self.risk_free_rate),
            Metric::MaxDrawdown => Self::max_drawdown(&equity_from_returns(returns)),
            Metric::Volatility => Self::volatility(returns, af),
            _ => self.calculate(returns).get(metric),
        }
    }
}

/// Equity curve implied by a return series, starting at 1.0 before the
/// first return.
pub fn equity_from_returns(returns: &[f64]) -> Vec<f64> {
    let mut equity = Vec::with_capacity(returns.len() + 1);
    equity.push(1.0);
    let mut current = 1.0;
    for r in returns {
        current *= 1.0 + r;
        equity.push(current);
    }
    equity
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cagr() {
        // 1.0 -> 1.21 over 504 periods = 10% CAGR
        let daily = 1.21_f64.powf(1.0 / 504.0) - 1.0;
        let returns = vec![daily; 504];
        let cagr = MetricsCalculator::cagr(&returns, TRADING_DAYS);
        assert!((cagr - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_cagr_degenerate() {
        assert_eq!(MetricsCalculator::cagr(&[], TRADING_DAYS), 0.0);
        assert_eq!(MetricsCalculator::cagr(&[-1.0, 0.5], TRADING_DAYS), -1.0);
    }

    #[test]
    fn test_sharpe_zero_variance_sentinel() {
        assert_eq!(MetricsCalculator::sharpe(&[0.001; 50], TRADING_DAYS, 0.0), 0.0);
        assert_eq!(MetricsCalculator::sharpe(&[0.0; 50], TRADING_DAYS, 0.0), 0.0);
        assert_eq!(MetricsCalculator::sharpe(&[], TRADING_DAYS, 0.0), 0.0);
    }

    #[test]
    fn test_sharpe_value() {
        let returns = [0.01, -0.01, 0.02, 0.0];
        // mean 0.005, population stdev sqrt(0.000125)
        let expected = 0.005 / 0.000125_f64.sqrt() * TRADING_DAYS.sqrt();
        let sharpe = MetricsCalculator::sharpe(&returns, TRADING_DAYS, 0.0);
        assert!((sharpe - expected).abs() < 1e-9);
    }

    #[test]
    fn test_risk_free_rate_lowers_sharpe() {
        let returns = [0.01, -0.01, 0.02, 0.0];
        let base = MetricsCalculator::sharpe(&returns, TRADING_DAYS, 0.0);
        let with_rf = MetricsCalculator::sharpe(&returns, TRADING_DAYS, 0.05);
        assert!(with_rf < base);
    }

    #[test]
    fn test_sortino_no_downside_sentinel() {
        assert_eq!(MetricsCalculator::sortino(&[0.01, 0.02, 0.0], TRADING_DAYS, 0.0), 0.0);
        let s = MetricsCalculator::sortino(&[0.01, -0.02, 0.03], TRADING_DAYS, 0.0);
        assert!(s > 0.0);
    }

    #[test]
    fn test_max_drawdown() {
        let equity = [1.0, 1.2, 0.9, 1.1, 1.3, 1.04];
        let dd = MetricsCalculator::max_drawdown(&equity);
        assert!((dd - (-0.25)).abs() < 1e-12);
        assert_eq!(MetricsCalculator::max_drawdown_duration(&equity), 2);
    }

    #[test]
    fn test_max_drawdown_zero_iff_non_decreasing() {
        assert_eq!(MetricsCalculator::max_drawdown(&[1.0, 1.0, 1.5, 2.0]), 0.0);
        assert!(MetricsCalculator::max_drawdown(&[1.0, 1.5, 1.49]) < 0.0);
        assert_eq!(MetricsCalculator::max_drawdown(&[]), 0.0);
    }

    #[test]
    fn test_max_drawdown_never_positive() {
        let returns: Vec<f64> = (0..200).map(|i| ((i * 37 % 11) as f64 - 5.0) / 100.0).collect();
        let equity = equity_from_returns(&returns);
        assert!(MetricsCalculator::max_drawdown(&equity) <= 0.0);
    }

    #[test]
    fn test_calmar_zero_drawdown_sentinel() {
        assert_eq!(MetricsCalculator::calmar(0.15, 0.0), 0.0);
        assert!((MetricsCalculator::calmar(0.10, -0.20) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_calculate_degenerate_inputs_never_nan() {
        let calc = MetricsCalculator::default();
        for returns in [vec![], vec![0.0], vec![0.0; 100], vec![0.002; 100]] {
            let m = calc.calculate(&returns);
            assert!(m.is_finite(), "non-finite metrics for {:?}", returns);
        }
    }

    #[test]
    fn test_win_statistics() {
        let m = MetricsCalculator::default().calculate(&[0.0, 0.02, -0.01, 0.04, 0.0]);
        assert_eq!(m.periods, 5);
        assert_eq!(m.active_periods, 3);
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.avg_win - 0.03).abs() < 1e-12);
        assert!((m.avg_loss - (-0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("CAGR".parse::<Metric>().unwrap(), Metric::Cagr);
        assert_eq!("maxdd".parse::<Metric>().unwrap(), Metric::MaxDrawdown);
        assert!("alpha".parse::<Metric>().is_err());
    }

    #[test]
    fn test_performance_metrics_default() {
        let metrics = PerformanceMetrics::default();
        assert_eq!(metrics.periods, 0);
        assert_eq!(metrics.win_rate, 0.0);
    }
}
