use crate::models::{HistoryEntry, RECENT_HISTORY_LIMIT, RECENT_WINDOW_MS};

/// Entries newer than the recency window, newest first, at most 10.
///
/// The sort is stable, so equal timestamps keep their log order.
#[must_use]
pub fn recent_history(history: &[HistoryEntry], now: i64) -> Vec<HistoryEntry> {
    let cutoff = now.saturating_sub(RECENT_WINDOW_MS);
    let mut recent: Vec<HistoryEntry> = history
        .iter()
        .filter(|e| e.date > cutoff)
        .cloned()
        .collect();
    recent.sort_by(|a, b| b.date.cmp(&a.date));
    recent.truncate(RECENT_HISTORY_LIMIT);
    recent
}
