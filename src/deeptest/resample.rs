//! Block resampling of a return column.

use std::ops::Range;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{DeepTestError, Result};

/// Source of randomness for the resampling procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomSource {
    /// Deterministic generator seeded with the given value.
    Seeded(u64),
    /// Operating-system entropy; runs are not reproducible.
    Entropy,
}

impl RandomSource {
    /// Master generator.
    pub fn rng(&self) -> StdRng {
        match self {
            RandomSource::Seeded(seed) => StdRng::seed_from_u64(*seed),
            RandomSource::Entropy => StdRng::from_entropy(),
        }
    }

    /// One seed per iteration, drawn in order from the master generator.
    pub fn derive_seeds(&self, n: usize) -> Vec<u64> {
        let mut rng = self.rng();
        (0..n).map(|_| rng.gen::<u64>()).collect()
    }
}

/// Split `0..n` into consecutive blocks of `block` bars; the last block
/// holds the remainder and may be shorter.
pub fn block_partition(n: usize, block: usize) -> Result<Vec<Range<usize>>> {
    if block == 0 || block > n {
        return Err(DeepTestError::configuration(format!(
            "block length must be between 1 and {} (series length), got {}",
            n, block
        )));
    }
    Ok((0..n)
        .step_by(block)
        .map(|start| start..(start + block).min(n))
        .collect())
}

/// Reorder the blocks of `returns` at random. Every block, including the
/// shorter remainder block, appears exactly once.
pub fn block_permute<R: Rng>(returns: &[f64], block: usize, rng: &mut R) -> Result<Vec<f64>> {
    let mut blocks = block_partition(returns.len(), block)?;
    blocks.shuffle(rng);

    let mut out = Vec::with_capacity(returns.len());
    for range in blocks {
        out.extend_from_slice(&returns[range]);
    }
    Ok(out)
}

/// Draw blocks of `returns` with replacement until at least `n` values are
/// collected, then truncate to exactly `n`.
pub fn block_bootstrap<R: Rng>(returns: &[f64], block: usize, rng: &mut R) -> Result<Vec<f64>> {
    let n = returns.len();
    let blocks = block_partition(n, block)?;

    let mut out = Vec::with_capacity(n + block);
    while out.len() < n {
        let range = blocks[rng.gen_range(0..blocks.len())].clone();
        out.extend_from_slice(&returns[range]);
    }
    out.truncate(n);
    Ok(out)
}
