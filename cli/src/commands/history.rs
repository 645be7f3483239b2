use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use tonight_core::models::{HistoryEntry, RECENT_HISTORY_LIMIT};
use tonight_core::service::{Clock, TonightService};

use super::helpers::{days_ago, format_timestamp, truncate};

pub(crate) fn cmd_history(
    svc: &TonightService,
    clock: &dyn Clock,
    all: bool,
    json: bool,
) -> Result<()> {
    let entries: Vec<HistoryEntry> = if all {
        let mut entries = svc.history()?;
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries
    } else {
        svc.recent_history(clock)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        if all {
            eprintln!("No history yet. Use `tonight pick` or `tonight eat <meal>`.");
        } else {
            eprintln!("Nothing eaten in the last 30 days.");
        }
        return Ok(());
    }

    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "")]
        ago: String,
    }

    let now = clock.now_ms();
    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|e| HistoryRow {
            meal: truncate(&e.meal, 40),
            when: format_timestamp(e.date),
            ago: days_ago(e.date, now),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    if !all && entries.len() == RECENT_HISTORY_LIMIT {
        eprintln!("Showing the {RECENT_HISTORY_LIMIT} most recent. Use --all for everything.");
    }

    Ok(())
}
