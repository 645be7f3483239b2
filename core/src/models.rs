use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::MealListError;

/// Lookback used for both weighting and the recent-history view: 30 days.
pub const RECENT_WINDOW_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Maximum number of entries returned by the recent-history view.
pub const RECENT_HISTORY_LIMIT: usize = 10;

/// Weight of a meal eaten inside the recency window.
pub const RECENT_WEIGHT: u32 = 1;

/// Weight of a meal not eaten inside the recency window (or never eaten).
pub const DEFAULT_WEIGHT: u32 = 10;

pub const EXPORT_VERSION: u32 = 1;

/// A record that `meal` was chosen at `date` (epoch milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub meal: String,
    pub date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedMeal {
    pub meal: String,
    pub weight: u32,
}

/// Outcome of a weighted draw. `was_penalized` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub meal: String,
    pub was_penalized: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportData {
    pub version: u32,
    #[serde(default)]
    pub meals: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub meals_added: usize,
    pub history_added: usize,
}

/// Trim surrounding whitespace and reject blank names.
///
/// Matching elsewhere is exact, so `"Pizza"` and `"pizza"` stay distinct meals.
pub fn validate_meal_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(MealListError::Blank.into());
    }
    Ok(trimmed.to_string())
}
