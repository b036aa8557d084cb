use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use whey_core::models::{DailyAchievement, Food};

pub(crate) const DAY_NAMES: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

pub(crate) fn parse_grams(s: &str) -> Result<f64> {
    let trimmed = s.trim().trim_end_matches('g').trim();
    let value: f64 = trimmed
        .parse()
        .with_context(|| format!("Invalid quantity: '{s}'. Use a number like '200' or '200g'"))?;
    if !value.is_finite() || value <= 0.0 {
        bail!("Quantity must be greater than 0");
    }
    Ok(value)
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// When an entry was eaten. Without `--time`, today's entries use the current
/// time and other days use noon.
pub(crate) fn resolve_eaten_at(date: NaiveDate, time: Option<&str>) -> Result<NaiveDateTime> {
    let time = match time {
        Some(t) => NaiveTime::parse_from_str(t.trim(), "%H:%M")
            .with_context(|| format!("Invalid time '{t}'. Use HH:MM (24h)"))?,
        None => {
            let now = Local::now().naive_local();
            if now.date() == date {
                now.time()
            } else {
                NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
            }
        }
    };
    Ok(date.and_time(time))
}

pub(crate) fn parse_days(day: &str) -> Result<Vec<i64>> {
    match day.to_lowercase().as_str() {
        "monday" | "mon" => Ok(vec![0]),
        "tuesday" | "tue" => Ok(vec![1]),
        "wednesday" | "wed" => Ok(vec![2]),
        "thursday" | "thu" => Ok(vec![3]),
        "friday" | "fri" => Ok(vec![4]),
        "saturday" | "sat" => Ok(vec![5]),
        "sunday" | "sun" => Ok(vec![6]),
        "weekdays" => Ok(vec![0, 1, 2, 3, 4]),
        "weekends" => Ok(vec![5, 6]),
        "all" => Ok(vec![0, 1, 2, 3, 4, 5, 6]),
        _ => bail!("Invalid day: {day}. Use monday-sunday, mon-sun, weekdays, weekends, or all"),
    }
}

#[allow(clippy::cast_sign_loss)]
pub(crate) fn day_name(day_of_week: i64) -> &'static str {
    DAY_NAMES
        .get(day_of_week as usize)
        .copied()
        .unwrap_or("Unknown")
}

pub(crate) fn print_food_table(foods: &[Food]) {
    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "P/100g")]
        protein: String,
        #[tabled(rename = "Serving")]
        serving: String,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id,
            name: truncate(&f.name, 35),
            protein: format!("{:.1}", f.protein_per_100g),
            serving: f
                .default_serving_g
                .map_or("-".into(), |s| format!("{s:.0}g")),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_achievements(achievements: &[DailyAchievement]) {
    for a in achievements {
        println!("  * {}", a.description());
    }
}

/// Text progress bar for a fraction in `[0, 1]`.
#[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grams() {
        assert!((parse_grams("200").unwrap() - 200.0).abs() < f64::EPSILON);
        assert!((parse_grams("200g").unwrap() - 200.0).abs() < f64::EPSILON);
        assert!((parse_grams("12.5g").unwrap() - 12.5).abs() < f64::EPSILON);
        assert!(parse_grams("abc").is_err());
        assert!(parse_grams("0").is_err());
        assert!(parse_grams("-50g").is_err());
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso_and_invalid() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_resolve_eaten_at() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let at = resolve_eaten_at(date, Some("07:45")).unwrap();
        assert_eq!(at, date.and_hms_opt(7, 45, 0).unwrap());

        let noon = resolve_eaten_at(date, None).unwrap();
        assert_eq!(noon, date.and_hms_opt(12, 0, 0).unwrap());

        assert!(resolve_eaten_at(date, Some("25:00")).is_err());
    }

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days("mon").unwrap(), vec![0]);
        assert_eq!(parse_days("Weekends").unwrap(), vec![5, 6]);
        assert_eq!(parse_days("all").unwrap().len(), 7);
        assert!(parse_days("someday").is_err());
        assert_eq!(day_name(6), "Sunday");
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.5, 10), "[#####-----]");
        assert_eq!(progress_bar(1.7, 4), "[####]");
        assert_eq!(progress_bar(-1.0, 4), "[----]");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert!((no_neg_zero(-3.0) - -3.0).abs() < f64::EPSILON);
    }
}
