use anyhow::Result;
use chrono::Local;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use whey_core::level::{LEVELS, level_for_streak};
use whey_core::service::WheyService;
use whey_core::streak::BADGES;

use super::helpers::{no_neg_zero, parse_date, print_achievements, progress_bar};

pub(crate) fn cmd_close(svc: &WheyService, date: Option<String>, saver: bool, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let result = svc.evaluate_day(date, saver)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let b = &result.balance.balance;
    let verdict = if result.target_hit {
        "target hit"
    } else if result.saver_used {
        "missed, covered by streak saver"
    } else {
        "missed"
    };
    println!("=== {date} closed: {verdict} ===\n");
    println!(
        "  CONSUMED: {:.1}g of {:.1}g",
        b.consumed_protein, result.hit_target
    );
    println!("  ROLLOVER: {:+.1}g", no_neg_zero(b.rollover_balance));
    println!("  TOMORROW: {:.1}g", b.adjusted_target);
    println!("  STREAK:   {} day(s)", result.current_streak);

    if saver && !result.saver_used && !result.target_hit {
        eprintln!("Streak saver not available for this day");
    }
    for badge in &result.newly_unlocked_badges {
        println!("\nBadge unlocked: {}", badge.title());
    }
    if let Some(up) = result.level_up {
        println!("\nLevel up: {} -> {}", up.from.name, up.to.name);
    }
    if !result.new_daily_achievements.is_empty() {
        println!("\nAchievements unlocked:");
        print_achievements(&result.new_daily_achievements);
    }
    Ok(())
}

pub(crate) fn cmd_streak(svc: &WheyService, json: bool) -> Result<()> {
    let today = Local::now().date_naive();
    let snapshot = svc.get_streak_state(today)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let s = &snapshot.state;
    println!("=== Streak ===\n");
    println!("  CURRENT:  {} day(s)", s.current_streak);
    println!("  BEST:     {} day(s)", s.best_streak);
    println!("  GOAL DAYS: {}", s.total_days_with_goal);
    println!(
        "  THIS WEEK: {}/{} ({:.0}%)",
        s.this_week_target_hits,
        s.this_week_total_days,
        snapshot.weekly_success_rate * 100.0
    );
    let saver = if snapshot.can_use_streak_saver {
        "available"
    } else if s.streak_saver_used_this_week {
        "used this week"
    } else {
        "not yet available"
    };
    println!("  SAVER:    {saver}");

    let level = snapshot.current_level;
    println!("\n  LEVEL {}: {}", level.ordinal, level.name);
    if let Some(next) = snapshot.next_level {
        println!(
            "  {} {} day(s) to {}",
            progress_bar(snapshot.progress_to_next_level, 20),
            snapshot.days_until_next_level,
            next.name
        );
    }
    if snapshot.is_streak_at_risk {
        println!("\nStreak at risk: close today with the target hit to keep it going");
    }
    Ok(())
}

pub(crate) fn cmd_levels(svc: &WheyService, json: bool) -> Result<()> {
    let state = svc.get_streak_state(Local::now().date_naive())?.state;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "levels": LEVELS,
                "badges": BADGES.iter().map(|b| serde_json::json!({
                    "badge": b,
                    "title": b.title(),
                    "required_days": b.required_days(),
                    "unlocked": state.unlocked_badges.contains(b),
                })).collect::<Vec<_>>(),
            }))?
        );
        return Ok(());
    }

    #[derive(Tabled)]
    struct LevelRow {
        #[tabled(rename = "")]
        marker: &'static str,
        #[tabled(rename = "Level")]
        name: String,
        #[tabled(rename = "Streak")]
        days: String,
    }

    #[derive(Tabled)]
    struct BadgeRow {
        #[tabled(rename = "")]
        marker: &'static str,
        #[tabled(rename = "Badge")]
        title: &'static str,
        #[tabled(rename = "Streak")]
        days: String,
    }

    let current = level_for_streak(i64::from(state.current_streak));
    let level_rows: Vec<LevelRow> = LEVELS
        .iter()
        .map(|l| LevelRow {
            marker: if *l == current { ">" } else { "" },
            name: format!("{}. {}", l.ordinal, l.name),
            days: format!("{}d", l.required_days),
        })
        .collect();
    let badge_rows: Vec<BadgeRow> = BADGES
        .iter()
        .map(|b| BadgeRow {
            marker: if state.unlocked_badges.contains(b) { "*" } else { "" },
            title: b.title(),
            days: format!("{}d", b.required_days()),
        })
        .collect();

    for table in [
        Table::new(&level_rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
            .to_string(),
        Table::new(&badge_rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
            .to_string(),
    ] {
        println!("{table}");
    }
    Ok(())
}
