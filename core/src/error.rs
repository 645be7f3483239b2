use thiserror::Error;

/// Returned by the weighted selector when there is nothing to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PickError {
    #[error("No meals available. Add a meal before picking")]
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MealListError {
    #[error("Meal name must not be empty")]
    Blank,
    #[error("Meal '{0}' is already on the list")]
    Duplicate(String),
    #[error("Meal '{0}' not found")]
    NotFound(String),
}
