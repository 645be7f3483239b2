use anyhow::Result;
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use tonight_core::error::MealListError;
use tonight_core::service::{Clock, TonightService};
use tonight_core::weights::last_eaten;

use super::helpers::{days_ago, report_error, truncate};

pub(crate) fn cmd_add(svc: &TonightService, meal: &str, json: bool) -> Result<()> {
    match svc.add_meal(meal) {
        Ok(name) => {
            if json {
                println!("{}", serde_json::json!({ "added": name }));
            } else {
                println!("Added {name}");
            }
            Ok(())
        }
        Err(e) => match e.downcast_ref::<MealListError>() {
            Some(err) => {
                report_error(&err.to_string(), json);
                process::exit(2);
            }
            _ => Err(e),
        },
    }
}

pub(crate) fn cmd_remove(svc: &TonightService, meal: &str, json: bool) -> Result<()> {
    if svc.remove_meal(meal)? {
        if json {
            println!("{}", serde_json::json!({ "removed": meal }));
        } else {
            println!("Removed {meal}");
        }
        Ok(())
    } else {
        report_error(&MealListError::NotFound(meal.to_string()).to_string(), json);
        process::exit(2);
    }
}

pub(crate) fn cmd_list(svc: &TonightService, clock: &dyn Clock, json: bool) -> Result<()> {
    #[derive(Serialize)]
    struct MealStatus {
        meal: String,
        weight: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_eaten: Option<i64>,
    }

    let now = clock.now_ms();
    let history = svc.history()?;
    let statuses: Vec<MealStatus> = svc
        .weights(clock)?
        .into_iter()
        .map(|w| {
            let last = last_eaten(&w.meal, &history);
            MealStatus {
                last_eaten: (last > 0).then_some(last),
                meal: w.meal,
                weight: w.weight,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        eprintln!("No meals yet. Use `tonight add <meal>` to add one.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "Meal")]
        meal: String,
        #[tabled(rename = "Weight")]
        weight: u32,
        #[tabled(rename = "Last eaten")]
        last_eaten: String,
    }

    let rows: Vec<MealRow> = statuses
        .iter()
        .map(|s| MealRow {
            meal: truncate(&s.meal, 40),
            weight: s.weight,
            last_eaten: s
                .last_eaten
                .map_or_else(|| "never".to_string(), |t| days_ago(t, now)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
