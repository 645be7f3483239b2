use anyhow::Result;
use std::process;

use tonight_core::error::{MealListError, PickError};
use tonight_core::selector::ThreadRandom;
use tonight_core::service::{Clock, TonightService};

use super::helpers::{prompt_confirm, report_error};

pub(crate) fn cmd_pick(
    svc: &TonightService,
    clock: &dyn Clock,
    yes: bool,
    json: bool,
) -> Result<()> {
    let pick = match svc.suggest(clock, &mut ThreadRandom) {
        Ok(pick) => pick,
        Err(e) if e.downcast_ref::<PickError>().is_some() => {
            if json {
                report_error(&e.to_string(), true);
            } else {
                eprintln!("No meals available. Add one with `tonight add <meal>` before picking.");
            }
            process::exit(2);
        }
        Err(e) => return Err(e),
    };

    if json {
        let confirmed = if yes {
            Some(svc.confirm(&pick, clock)?)
        } else {
            None
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "meal": pick.meal,
                "was_penalized": pick.was_penalized,
                "confirmed": confirmed,
            }))?
        );
        return Ok(());
    }

    println!("Tonight: {}", pick.meal);
    if pick.was_penalized {
        println!("  (eaten in the last 30 days, so it was less likely to come up)");
    }

    if yes || prompt_confirm("Eat this tonight?")? {
        svc.confirm(&pick, clock)?;
        println!("Enjoy! Recorded {} in history.", pick.meal);
    } else {
        println!("Not recorded. Run `tonight pick` again for another idea.");
    }

    Ok(())
}

pub(crate) fn cmd_eat(
    svc: &TonightService,
    clock: &dyn Clock,
    meal: &str,
    json: bool,
) -> Result<()> {
    let entry = match svc.log_meal(meal, clock) {
        Ok(entry) => entry,
        Err(e) if e.downcast_ref::<MealListError>().is_some() => {
            report_error(&e.to_string(), json);
            process::exit(2);
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("Recorded {} in history.", entry.meal);
        if !svc.list_meals()?.contains(&entry.meal) {
            eprintln!(
                "Note: '{}' is not on your meal list. Add it with `tonight add`.",
                entry.meal
            );
        }
    }

    Ok(())
}
