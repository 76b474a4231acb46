//! Moving-average crossover on closes.
//!
//! Parameters:
//! - `fast`: fast window (bars), default 20
//! - `slow`: slow window (bars), default 100
//! - `neutral_zone`: band in bps around zero spread inside which the prior
//!   position is kept, default 0
//!
//! Long when `(ma_fast - ma_slow) / ma_slow` is above the band, short when
//! below it, flat until both averages are defined.

use crate::data::{BarTable, PositionSeries};
use crate::error::{DeepTestError, Result};

use super::params::ParameterSet;

pub fn ma_cross(table: &BarTable, params: &ParameterSet) -> Result<PositionSeries> {
    let fast = params.get_window("fast", 20)?;
    let slow = params.get_window("slow", 100)?;
    let neutral_zone = params.get_or("neutral_zone", 0.0) / 1e4;

    // Equal windows are allowed and never leave flat
    if fast > slow {
        return Err(DeepTestError::configuration(format!(
            "fast window ({}) must not exceed slow window ({})",
            fast, slow
        )));
    }

    let closes = table.closes();
    let ma_fast = rolling_mean(&closes, fast);
    let ma_slow = rolling_mean(&closes, slow);

    let mut position = 0.0;
    let values = ma_fast
        .iter()
        .zip(&ma_slow)
        .map(|(f, s)| {
            if let (Some(f), Some(s)) = (f, s) {
                let spread = (f - s) / s;
                if spread > neutral_zone {
                    position = 1.0;
                } else if spread < -neutral_zone {
                    position = -1.0;
                }
            }
            position
        })
        .collect();

    PositionSeries::for_table(table, values)
}

/// Trailing mean over `window` values; `None` until the window is full.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= window {
            sum -= values[i - window];
        }
        if window > 0 && i + 1 >= window {
            out.push(Some(sum / window as f64));
        } else {
            out.push(None);
        }
    }
    out
}
