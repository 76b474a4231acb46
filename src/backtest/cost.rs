//! Transaction cost model.
//!
//! Costs are charged proportionally to turnover: every unit change in
//! realized exposure pays `commission_bps + slippage_bps` basis points of
//! notional.

use serde::{Deserialize, Serialize};

use crate::error::{DeepTestError, Result};

/// Basis points per unit of notional.
pub const BPS: f64 = 10_000.0;

/// Proportional commission and slippage, both in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Commission per unit of turnover.
    pub commission_bps: f64,
    /// Slippage per unit of turnover.
    pub slippage_bps: f64,
}

impl CostModel {
    pub fn new(commission_bps: f64, slippage_bps: f64) -> Self {
        Self {
            commission_bps,
            slippage_bps,
        }
    }

    /// Create a zero-cost model.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Combined cost per unit of turnover, as a fraction of notional.
    pub fn rate(&self) -> f64 {
        (self.commission_bps + self.slippage_bps) / BPS
    }

    /// Cost of changing exposure by `turnover` (absolute position change).
    pub fn apply(&self, turnover: f64) -> f64 {
        turnover.abs() * self.rate()
    }

    /// Reject negative or non-finite rates.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("commission_bps", self.commission_bps),
            ("slippage_bps", self.slippage_bps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DeepTestError::configuration(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
