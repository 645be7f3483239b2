use std::collections::HashMap;

use crate::models::{
    DEFAULT_WEIGHT, HistoryEntry, RECENT_WEIGHT, RECENT_WINDOW_MS, WeightedMeal,
};

/// Most recent timestamp recorded for each meal name.
///
/// Names are compared exactly; no case or whitespace folding.
fn last_eaten_index(history: &[HistoryEntry]) -> HashMap<&str, i64> {
    let mut index: HashMap<&str, i64> = HashMap::new();
    for entry in history {
        index
            .entry(entry.meal.as_str())
            .and_modify(|t| *t = (*t).max(entry.date))
            .or_insert(entry.date);
    }
    index
}

/// Timestamp of the latest history entry for `meal`, or `0` if it was never eaten.
#[must_use]
pub fn last_eaten(meal: &str, history: &[HistoryEntry]) -> i64 {
    history
        .iter()
        .filter(|e| e.meal == meal)
        .map(|e| e.date)
        .max()
        .unwrap_or(0)
}

/// Two-tier weight: `1` inside the recency window, `10` otherwise.
#[must_use]
pub fn weight_for(last_eaten: i64, now: i64) -> u32 {
    if now.saturating_sub(last_eaten) < RECENT_WINDOW_MS {
        RECENT_WEIGHT
    } else {
        DEFAULT_WEIGHT
    }
}

/// One weighted entry per input meal, in input order.
#[must_use]
pub fn compute_weights(
    meals: &[String],
    history: &[HistoryEntry],
    now: i64,
) -> Vec<WeightedMeal> {
    let index = last_eaten_index(history);
    meals
        .iter()
        .map(|meal| {
            let last = index.get(meal.as_str()).copied().unwrap_or(0);
            WeightedMeal {
                meal: meal.clone(),
                weight: weight_for(last, now),
            }
        })
        .collect()
}
