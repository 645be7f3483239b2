use anyhow::{Context, Result};
use std::path::Path;

use tonight_core::models::ExportData;
use tonight_core::service::{Clock, TonightService};

pub(crate) fn cmd_export(svc: &TonightService, output: Option<&Path>) -> Result<()> {
    let data = svc.export_all()?;
    let body = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            std::fs::write(path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} meals and {} history entries to {}",
                data.meals.len(),
                data.history.len(),
                path.display()
            );
        }
        None => println!("{body}"),
    }

    Ok(())
}

pub(crate) fn cmd_import(
    svc: &TonightService,
    clock: &dyn Clock,
    file: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let data: ExportData = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid export file: {}", file.display()))?;

    let summary = if dry_run {
        // Run the merge against a scratch copy of the current data.
        let scratch = TonightService::new_in_memory()?;
        scratch.import_all(&svc.export_all()?, clock)?;
        scratch.import_all(&data, clock)?
    } else {
        svc.import_all(&data, clock)?
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "dry_run": dry_run,
                "meals_added": summary.meals_added,
                "history_added": summary.history_added,
            }))?
        );
    } else {
        let verb = if dry_run { "Would import" } else { "Imported" };
        println!(
            "{verb} {} meals and {} history entries",
            summary.meals_added, summary.history_added
        );
    }

    Ok(())
}
