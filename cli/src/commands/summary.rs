use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use whey_core::aggregate::format_quantity;
use whey_core::service::WheyService;

use super::helpers::{no_neg_zero, parse_date, progress_bar, truncate};

pub(crate) fn cmd_entries(
    svc: &WheyService,
    date: Option<String>,
    list: bool,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;

    if list {
        let entries = svc.get_entries(date)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }
        if entries.is_empty() {
            eprintln!("No entries for {date}");
            process::exit(2);
        }

        #[derive(Tabled)]
        struct EntryRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Time")]
            time: String,
            #[tabled(rename = "Food")]
            label: String,
            #[tabled(rename = "Qty")]
            quantity: String,
            #[tabled(rename = "Protein")]
            protein: String,
            #[tabled(rename = "Status")]
            status: String,
        }

        let rows: Vec<EntryRow> = entries
            .iter()
            .map(|e| EntryRow {
                id: e.id,
                time: e.eaten_at.format("%H:%M").to_string(),
                label: truncate(&e.label, 30),
                quantity: format!("{}g", format_quantity(e.quantity_g)),
                protein: format!("{:.1}g", e.protein_g),
                status: e.status.to_string(),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
            .to_string();
        println!("{table}");
        return Ok(());
    }

    let groups = svc.get_aggregated_entries(date)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(());
    }
    if groups.is_empty() {
        eprintln!("Nothing eaten on {date}");
        process::exit(2);
    }

    println!("=== {date} ===\n");
    for g in &groups {
        let last = g.last_eaten_at.format("%H:%M");
        let protein = g.total_protein_g;
        println!("  {:<32} {protein:>6.1}g  (last {last})", g.display_text);
    }
    let total: f64 = groups.iter().map(|g| g.total_protein_g).sum();
    println!("\n  TOTAL: {total:.1}g protein");
    Ok(())
}

pub(crate) fn cmd_balance(
    svc: &WheyService,
    date: Option<String>,
    days: Option<u32>,
    json: bool,
) -> Result<()> {
    if let Some(days) = days {
        return balance_history(svc, days, json);
    }

    let date = parse_date(date)?;
    let report = svc.get_daily_balance(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let b = &report.balance;
    let state = if report.evaluated { "closed" } else { "open" };
    println!("=== {date} ({state}) ===\n");
    println!("  TARGET:    {:.0}g", b.target_protein);
    println!("  ADJUSTED:  {:.1}g", no_neg_zero(b.adjusted_target));
    println!("  CONSUMED:  {:.1}g", b.consumed_protein);
    println!("  REMAINING: {:.1}g", no_neg_zero(report.deficit));
    println!("  ROLLOVER:  {:+.1}g", no_neg_zero(b.rollover_balance));
    let pct = report.progress_percentage * 100.0;
    println!(
        "\n  {} {pct:.0}%",
        progress_bar(report.progress_percentage, 30)
    );
    Ok(())
}

fn balance_history(svc: &WheyService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct BalanceRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Consumed")]
        consumed: String,
        #[tabled(rename = "Rollover")]
        rollover: String,
        #[tabled(rename = "Next target")]
        adjusted: String,
    }

    let today = Local::now().date_naive();
    let from = today - chrono::Duration::days(i64::from(days.saturating_sub(1)));
    let history = svc.get_balance_history(from, today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    if history.is_empty() {
        eprintln!("No closed days in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<BalanceRow> = history
        .iter()
        .map(|r| {
            let b = &r.balance;
            BalanceRow {
                date: b.date.to_string(),
                target: format!("{:.0}g", b.target_protein),
                consumed: format!("{:.1}g", b.consumed_protein),
                rollover: format!("{:+.1}g", no_neg_zero(b.rollover_balance)),
                adjusted: format!("{:.1}g", b.adjusted_target),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
