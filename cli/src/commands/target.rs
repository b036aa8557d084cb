use anyhow::Result;

use whey_core::service::WheyService;

use super::helpers::{day_name, parse_days};

pub(crate) fn cmd_target_set(svc: &WheyService, protein_g: f64, day: &str, json: bool) -> Result<()> {
    let days = parse_days(day)?;
    let mut targets = Vec::new();

    for &d in &days {
        targets.push(svc.set_target(d, protein_g)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        for target in &targets {
            let day_name = day_name(target.day_of_week);
            println!("{day_name}: {:.0}g protein/day", target.protein_g);
        }
    }

    Ok(())
}

pub(crate) fn cmd_target_show(svc: &WheyService, json: bool) -> Result<()> {
    let targets = svc.get_all_targets()?;
    let default = svc.config()?.default_target_g;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "default_target_g": default,
                "targets": targets,
            }))?
        );
    } else if targets.is_empty() {
        println!("Every day: {default:.0}g protein/day (default)");
        eprintln!("Use `whey target set <grams>` to set a per-day target.");
    } else {
        for target in &targets {
            let day_name = day_name(target.day_of_week);
            println!("{day_name}: {:.0}g protein/day", target.protein_g);
        }
        if targets.len() < 7 {
            println!("Other days: {default:.0}g protein/day (default)");
        }
    }

    Ok(())
}

pub(crate) fn cmd_target_clear(svc: &WheyService, day: Option<&str>, json: bool) -> Result<()> {
    let cleared = if let Some(day_str) = day {
        let days = parse_days(day_str)?;
        let mut any_cleared = false;
        for &d in &days {
            if svc.clear_target(d)? {
                any_cleared = true;
            }
        }
        any_cleared
    } else {
        svc.clear_all_targets()?
    };

    if json {
        println!("{}", serde_json::json!({ "cleared": cleared }));
    } else if cleared {
        println!("Target(s) cleared");
    } else {
        eprintln!("No target was set");
    }
    Ok(())
}
