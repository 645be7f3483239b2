use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::db::Database;
use crate::error::MealListError;
use crate::history::recent_history;
use crate::models::{
    EXPORT_VERSION, ExportData, HistoryEntry, ImportSummary, Pick, WeightedMeal,
    validate_meal_name,
};
use crate::selector::{self, RandomSource};
use crate::weights::compute_weights;

const MEALS_KEY: &str = "meals";
const HISTORY_KEY: &str = "history";

/// Current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

fn decode<T: DeserializeOwned + Default>(key: &str, raw: Option<String>) -> Result<T> {
    match raw {
        Some(s) => serde_json::from_str(&s).with_context(|| format!("Corrupt '{key}' data")),
        None => Ok(T::default()),
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).with_context(|| format!("Failed to encode '{key}'"))
}

pub struct TonightService {
    db: Database,
}

impl TonightService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn from_db(db: Database) -> Self {
        Self { db }
    }

    // --- Meal list ---

    pub fn list_meals(&self) -> Result<Vec<String>> {
        decode(MEALS_KEY, self.db.get_value(MEALS_KEY)?)
    }

    /// Append a meal. Names are trimmed; duplicates are exact matches.
    pub fn add_meal(&self, name: &str) -> Result<String> {
        let name = validate_meal_name(name)?;
        self.db.update_value(MEALS_KEY, |raw| {
            let mut meals: Vec<String> = decode(MEALS_KEY, raw)?;
            if meals.contains(&name) {
                return Err(MealListError::Duplicate(name.clone()).into());
            }
            meals.push(name.clone());
            Ok((encode(MEALS_KEY, &meals)?, ()))
        })?;
        tracing::info!(meal = %name, "added meal");
        Ok(name)
    }

    /// Remove a meal by exact name. History is left as is.
    pub fn remove_meal(&self, name: &str) -> Result<bool> {
        let removed = self.db.update_value(MEALS_KEY, |raw| {
            let mut meals: Vec<String> = decode(MEALS_KEY, raw)?;
            let before = meals.len();
            meals.retain(|m| m != name);
            let removed = meals.len() != before;
            Ok((encode(MEALS_KEY, &meals)?, removed))
        })?;
        if removed {
            tracing::info!(meal = %name, "removed meal");
        }
        Ok(removed)
    }

    // --- History ---

    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        decode(HISTORY_KEY, self.db.get_value(HISTORY_KEY)?)
    }

    pub fn recent_history(&self, clock: &dyn Clock) -> Result<Vec<HistoryEntry>> {
        Ok(recent_history(&self.history()?, clock.now_ms()))
    }

    /// Record that `name` was eaten now. The meal does not have to be on the list.
    pub fn log_meal(&self, name: &str, clock: &dyn Clock) -> Result<HistoryEntry> {
        let meal = validate_meal_name(name)?;
        let date = clock.now_ms();
        if date < 0 {
            bail!("Clock returned a negative timestamp ({date})");
        }
        let entry = HistoryEntry { meal, date };
        self.db.update_value(HISTORY_KEY, |raw| {
            let mut history: Vec<HistoryEntry> = decode(HISTORY_KEY, raw)?;
            history.push(entry.clone());
            Ok((encode(HISTORY_KEY, &history)?, ()))
        })?;
        tracing::info!(meal = %entry.meal, date = entry.date, "recorded meal");
        Ok(entry)
    }

    /// Commit a pick to history.
    pub fn confirm(&self, pick: &Pick, clock: &dyn Clock) -> Result<HistoryEntry> {
        self.log_meal(&pick.meal, clock)
    }

    // --- Weighting and selection ---

    pub fn weights(&self, clock: &dyn Clock) -> Result<Vec<WeightedMeal>> {
        let meals = self.list_meals()?;
        let history = self.history()?;
        Ok(compute_weights(&meals, &history, clock.now_ms()))
    }

    /// Load, weight, and draw. Nothing is written; see [`Self::confirm`].
    pub fn suggest(&self, clock: &dyn Clock, random: &mut impl RandomSource) -> Result<Pick> {
        let weighted = self.weights(clock)?;
        let pick = selector::pick(&weighted, random)?;
        tracing::debug!(
            meal = %pick.meal,
            was_penalized = pick.was_penalized,
            candidates = weighted.len(),
            "suggested meal"
        );
        Ok(pick)
    }

    // --- Export / Import ---

    pub fn export_all(&self) -> Result<ExportData> {
        Ok(ExportData {
            version: EXPORT_VERSION,
            meals: self.list_meals()?,
            history: self.history()?,
        })
    }

    /// Merge exported data. Existing meals and identical history entries are skipped.
    ///
    /// History entries dated in the future (relative to `clock`) or before the
    /// epoch are dropped, and meal names go through the same validation as
    /// [`Self::add_meal`]. Both lists are written in one transaction.
    pub fn import_all(&self, data: &ExportData, clock: &dyn Clock) -> Result<ImportSummary> {
        if data.version != EXPORT_VERSION {
            bail!(
                "Unsupported export version {} (expected {EXPORT_VERSION})",
                data.version
            );
        }
        let now = clock.now_ms();

        let summary = self.db.update_values(
            [MEALS_KEY, HISTORY_KEY],
            |[meals_raw, history_raw]| {
                let mut meals: Vec<String> = decode(MEALS_KEY, meals_raw)?;
                let mut history: Vec<HistoryEntry> = decode(HISTORY_KEY, history_raw)?;
                let mut summary = ImportSummary::default();

                for name in &data.meals {
                    let Ok(name) = validate_meal_name(name) else {
                        continue;
                    };
                    if !meals.contains(&name) {
                        meals.push(name);
                        summary.meals_added += 1;
                    }
                }

                let mut seen: HashSet<(String, i64)> =
                    history.iter().map(|e| (e.meal.clone(), e.date)).collect();
                for entry in &data.history {
                    if entry.date < 0 || entry.date > now {
                        continue;
                    }
                    let Ok(meal) = validate_meal_name(&entry.meal) else {
                        continue;
                    };
                    if seen.insert((meal.clone(), entry.date)) {
                        history.push(HistoryEntry {
                            meal,
                            date: entry.date,
                        });
                        summary.history_added += 1;
                    }
                }

                let encoded = [
                    encode(MEALS_KEY, &meals)?,
                    encode(HISTORY_KEY, &history)?,
                ];
                Ok((encoded, summary))
            },
        )?;

        tracing::info!(
            meals_added = summary.meals_added,
            history_added = summary.history_added,
            "imported data"
        );
        Ok(summary)
    }
}
