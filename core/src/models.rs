use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ProgressError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Food {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub name: String,
    pub protein_per_100g: f64,
    pub default_serving_g: Option<f64>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Food {
    #[must_use]
    pub fn protein_for(&self, quantity_g: f64) -> f64 {
        self.protein_per_100g * quantity_g / 100.0
    }
}

#[derive(Debug, Clone)]
pub struct NewFood {
    pub name: String,
    pub protein_per_100g: f64,
    pub default_serving_g: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Planned,
    Done,
    Skipped,
}

pub const ENTRY_STATUSES: &[&str] = &["planned", "done", "skipped"];

impl EntryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Done => "done",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "planned" => Ok(Self::Planned),
            "done" => Ok(Self::Done),
            "skipped" => Ok(Self::Skipped),
            _ => bail!(
                "Invalid status '{s}'. Must be one of: {}",
                ENTRY_STATUSES.join(", ")
            ),
        }
    }
}

/// A single logged (or planned) portion of food.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionEntry {
    pub id: i64,
    #[serde(default)]
    pub uuid: String,
    pub eaten_at: NaiveDateTime,
    pub quantity_g: f64,
    pub protein_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_id: Option<i64>,
    pub label: String,
    pub status: EntryStatus,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl ConsumptionEntry {
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.eaten_at.date()
    }

    /// Only completed entries count toward the day's protein.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.status == EntryStatus::Done
    }
}

#[derive(Debug, Clone)]
pub struct NewConsumptionEntry {
    pub eaten_at: NaiveDateTime,
    pub quantity_g: f64,
    pub protein_g: f64,
    pub food_id: Option<i64>,
    pub label: String,
    pub status: EntryStatus,
}

pub fn validate_new_entry(entry: &NewConsumptionEntry) -> Result<(), ProgressError> {
    if entry.label.trim().is_empty() {
        return Err(ProgressError::InvalidEntry(
            "label must not be empty".to_string(),
        ));
    }
    if !entry.quantity_g.is_finite() || entry.quantity_g <= 0.0 {
        return Err(ProgressError::InvalidEntry(
            "quantity_g must be greater than 0".to_string(),
        ));
    }
    if !entry.protein_g.is_finite() || entry.protein_g < 0.0 {
        return Err(ProgressError::InvalidEntry(
            "protein_g must not be negative".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_new_food(food: &NewFood) -> Result<()> {
    if food.name.trim().is_empty() {
        bail!("Food name must not be empty");
    }
    if !food.protein_per_100g.is_finite() || food.protein_per_100g < 0.0 {
        bail!("protein_per_100g must not be negative");
    }
    if food.protein_per_100g > 100.0 {
        bail!("protein_per_100g cannot exceed 100");
    }
    if food.default_serving_g.is_some_and(|s| s <= 0.0) {
        bail!("default_serving_g must be greater than 0");
    }
    Ok(())
}

/// Same-food, same-day entries collapsed for display. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_id: Option<i64>,
    pub name: String,
    pub total_quantity_g: f64,
    pub total_protein_g: f64,
    pub count: usize,
    pub entries: Vec<ConsumptionEntry>,
    pub last_eaten_at: NaiveDateTime,
    pub display_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProteinTarget {
    pub day_of_week: i64,
    pub protein_g: f64,
}

/// One closed day's rollover bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBalance {
    pub date: NaiveDate,
    pub target_protein: f64,
    pub consumed_protein: f64,
    pub rollover_balance: f64,
    pub adjusted_target: f64,
}

impl DailyBalance {
    #[must_use]
    pub fn deficit(&self) -> f64 {
        self.adjusted_target - self.consumed_protein
    }

    /// Fraction of the adjusted target reached, in `[0, 1]`.
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        if self.adjusted_target <= 0.0 {
            return 0.0;
        }
        (self.consumed_protein / self.adjusted_target).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    #[serde(flatten)]
    pub balance: DailyBalance,
    pub deficit: f64,
    pub progress_percentage: f64,
    /// `false` while the day is still open and the figures are a preview.
    pub evaluated: bool,
}

impl BalanceReport {
    #[must_use]
    pub fn new(balance: DailyBalance, evaluated: bool) -> Self {
        Self {
            deficit: balance.deficit(),
            progress_percentage: balance.progress_percentage(),
            balance,
            evaluated,
        }
    }
}

/// Streak milestones. Declaration order is table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    FirstDay,
    ThreeDays,
    OneWeek,
    TwoWeeks,
    OneMonth,
    TwoMonths,
    HundredDays,
    OneYear,
}

/// Same-day micro rewards; the set is cleared every calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyAchievement {
    FirstEntry,
    DailyStart,
    QuarterTarget,
    HalfTarget,
    ThreeQuarterTarget,
    TargetReached,
    EarlyBird,
    NightOwl,
    ExactMatch,
    Overachiever,
    Variety,
    Comeback,
}

impl DailyAchievement {
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::FirstEntry => "Logged your very first entry",
            Self::DailyStart => "Started the day",
            Self::QuarterTarget => "25% of today's target",
            Self::HalfTarget => "Halfway to today's target",
            Self::ThreeQuarterTarget => "75% of today's target",
            Self::TargetReached => "Hit today's target",
            Self::EarlyBird => "Protein before 9am",
            Self::NightOwl => "Late-night protein",
            Self::ExactMatch => "Landed right on target",
            Self::Overachiever => "150% of today's target",
            Self::Variety => "Five different foods in one day",
            Self::Comeback => "Back at it after a broken streak",
        }
    }
}

/// Persisted progression state for the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_success_date: Option<NaiveDate>,
    pub total_days_with_goal: u32,
    pub streak_saver_used_this_week: bool,
    pub week_start_date: Option<NaiveDate>,
    pub this_week_target_hits: u32,
    pub this_week_total_days: u32,
    pub unlocked_badges: BTreeSet<Badge>,
    pub daily_achievements: BTreeSet<DailyAchievement>,
    pub achievements_date: Option<NaiveDate>,
    pub last_evaluated_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Level {
    pub ordinal: u8,
    pub name: &'static str,
    pub required_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub from: Level,
    pub to: Level,
}

/// Read-only view of the streak state plus everything derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct StreakSnapshot {
    #[serde(flatten)]
    pub state: StreakState,
    pub weekly_success_rate: f64,
    pub is_streak_at_risk: bool,
    pub can_use_streak_saver: bool,
    pub current_level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_level: Option<Level>,
    pub progress_to_next_level: f64,
    pub days_until_next_level: u32,
}

/// Outcome of closing one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct DayEvaluation {
    pub date: NaiveDate,
    pub entries: Vec<AggregatedEntry>,
    pub balance: BalanceReport,
    pub hit_target: f64,
    pub target_hit: bool,
    pub saver_used: bool,
    pub current_streak: u32,
    pub newly_unlocked_badges: Vec<Badge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_up: Option<LevelUp>,
    pub new_daily_achievements: Vec<DailyAchievement>,
}

/// A stored entry together with any same-day achievements it triggered.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedEntry {
    pub entry: ConsumptionEntry,
    pub new_daily_achievements: Vec<DailyAchievement>,
}
