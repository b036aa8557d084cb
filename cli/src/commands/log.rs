use anyhow::{Result, bail};
use std::process;

use whey_core::aggregate::format_quantity;
use whey_core::models::{EntryStatus, LoggedEntry, NewConsumptionEntry};
use whey_core::service::WheyService;

use super::helpers::{json_error, parse_date, parse_grams, print_achievements, resolve_eaten_at};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_log(
    svc: &WheyService,
    food: &str,
    grams: Option<&str>,
    protein: Option<f64>,
    date: Option<String>,
    time: Option<&str>,
    planned: bool,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let eaten_at = resolve_eaten_at(date, time)?;
    let quantity_g = grams.map(parse_grams).transpose()?;
    let status = if planned {
        EntryStatus::Planned
    } else {
        EntryStatus::Done
    };

    let logged = if let Some(protein_g) = protein {
        // One-off entry that isn't in the food list
        let Some(quantity_g) = quantity_g else {
            bail!("A quantity in grams is required when logging with --protein");
        };
        svc.log_entry(&NewConsumptionEntry {
            eaten_at,
            quantity_g,
            protein_g,
            food_id: None,
            label: food.to_string(),
            status,
        })?
    } else {
        svc.log_food(food, quantity_g, eaten_at, status)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&logged)?);
    } else {
        print_logged("Logged", &logged);
    }
    Ok(())
}

pub(crate) fn cmd_status(svc: &WheyService, entry_id: i64, status: &str, json: bool) -> Result<()> {
    let status: EntryStatus = status.parse()?;
    if svc.find_entry(entry_id)?.is_none() {
        if json {
            println!("{}", json_error(&format!("Entry {entry_id} not found")));
        } else {
            eprintln!("Entry {entry_id} not found");
        }
        process::exit(2);
    }
    let logged = svc.set_entry_status(entry_id, status)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&logged)?);
    } else {
        print_logged(&format!("Marked {status}"), &logged);
    }
    Ok(())
}

pub(crate) fn cmd_delete(svc: &WheyService, entry_id: i64, json: bool) -> Result<()> {
    if svc.delete_entry(entry_id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": entry_id }));
        } else {
            println!("Deleted entry {entry_id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Entry {entry_id} not found")));
        } else {
            eprintln!("Entry {entry_id} not found");
        }
        process::exit(2);
    }
}

fn print_logged(verb: &str, logged: &LoggedEntry) {
    let e = &logged.entry;
    let id = e.id;
    let label = &e.label;
    let qty = format_quantity(e.quantity_g);
    let protein = e.protein_g;
    let at = e.eaten_at.format("%Y-%m-%d %H:%M");
    println!("{verb}: [{id}] {qty}g {label} at {at} ({protein:.1}g protein, {})", e.status);
    if !logged.new_daily_achievements.is_empty() {
        println!("Achievements unlocked:");
        print_achievements(&logged.new_daily_achievements);
    }
}
