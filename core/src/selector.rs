use rand::Rng;

use crate::error::PickError;
use crate::models::{Pick, RECENT_WEIGHT, WeightedMeal};

/// Source of uniform floats in `[0, 1)`.
///
/// Any `FnMut() -> f64` closure qualifies, which keeps tests deterministic.
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

impl<F: FnMut() -> f64> RandomSource for F {
    fn next_f64(&mut self) -> f64 {
        self()
    }
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&mut self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Number of entries in the conceptual pool: the sum of all weights.
#[must_use]
pub fn pool_size(weighted: &[WeightedMeal]) -> u64 {
    weighted.iter().map(|w| u64::from(w.weight)).sum()
}

/// Map a uniform draw onto a pool index: `floor(r * size)`, clamped into range.
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn pool_index(r: f64, size: u64) -> u64 {
    let idx = (r * size as f64).floor() as u64;
    idx.min(size - 1)
}

/// Draw one meal with probability `weight / total_weight`.
///
/// The pool layout is the meals in input order, each repeated `weight` times;
/// the draw walks cumulative weights instead of materialising that pool.
pub fn pick(
    weighted: &[WeightedMeal],
    random: &mut impl RandomSource,
) -> Result<Pick, PickError> {
    let size = pool_size(weighted);
    if size == 0 {
        return Err(PickError::EmptyInput);
    }

    let mut remaining = pool_index(random.next_f64(), size);
    for candidate in weighted {
        let weight = u64::from(candidate.weight);
        if remaining < weight {
            tracing::debug!(
                meal = %candidate.meal,
                weight = candidate.weight,
                pool = size,
                "picked meal"
            );
            return Ok(Pick {
                meal: candidate.meal.clone(),
                was_penalized: candidate.weight == RECENT_WEIGHT,
            });
        }
        remaining -= weight;
    }

    // pool_index is always < size, so the walk above returns.
    Err(PickError::EmptyInput)
}
