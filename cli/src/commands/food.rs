use anyhow::Result;
use std::process;

use whey_core::models::NewFood;
use whey_core::service::WheyService;

use super::helpers::{parse_grams, print_food_table};

pub(crate) fn cmd_food_add(
    svc: &WheyService,
    name: &str,
    protein_per_100g: f64,
    serving: Option<&str>,
    json: bool,
) -> Result<()> {
    let default_serving_g = serving.map(parse_grams).transpose()?;
    let food = svc.add_food(&NewFood {
        name: name.trim().to_string(),
        protein_per_100g,
        default_serving_g,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        let id = food.id;
        let name = &food.name;
        let protein = food.protein_per_100g;
        print!("Added food [{id}] {name} ({protein:.1}g protein/100g");
        if let Some(s) = food.default_serving_g {
            print!(", serving {s:.0}g");
        }
        println!(")");
    }
    Ok(())
}

pub(crate) fn cmd_food_list(svc: &WheyService, search: Option<&str>, json: bool) -> Result<()> {
    let foods = svc.list_foods(search)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
        return Ok(());
    }
    if foods.is_empty() {
        match search {
            Some(q) => eprintln!("No foods matching '{q}'"),
            None => eprintln!("No foods yet. Add one with `whey food add <name> <protein>`"),
        }
        process::exit(2);
    }
    print_food_table(&foods);
    Ok(())
}
