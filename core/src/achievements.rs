use std::collections::{BTreeSet, HashSet};

use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

use crate::aggregate::GroupKey;
use crate::models::{ConsumptionEntry, DailyAchievement, StreakState};

const EARLY_BIRD_BEFORE: (u32, u32) = (9, 0);
const NIGHT_OWL_FROM: (u32, u32) = (21, 0);
const EXACT_MATCH_TOLERANCE_G: f64 = 1.0;
const OVERACHIEVER_RATIO: f64 = 1.5;
const VARIETY_MIN_FOODS: usize = 5;

const PROGRESS_MILESTONES: &[(f64, DailyAchievement)] = &[
    (0.25, DailyAchievement::QuarterTarget),
    (0.5, DailyAchievement::HalfTarget),
    (0.75, DailyAchievement::ThreeQuarterTarget),
    (1.0, DailyAchievement::TargetReached),
];

/// What the achievement check needs to know about one calendar day.
#[derive(Debug, Clone, Copy)]
pub struct AchievementContext<'a> {
    pub date: NaiveDate,
    /// The day's entries; anything not done is ignored.
    pub entries: &'a [ConsumptionEntry],
    /// Target the day is measured against.
    pub target_g: f64,
    /// Whether any done entry exists on an earlier day.
    pub has_prior_entries: bool,
}

/// Re-check the same-day achievements for `ctx.date`.
///
/// Moving to a new day clears the set first. Checks for a day earlier than
/// the one the set belongs to change nothing. Returns the updated state and
/// the achievements that were not already held, in catalogue order.
#[must_use]
pub fn check_daily_achievements(
    state: &StreakState,
    ctx: &AchievementContext<'_>,
) -> (StreakState, Vec<DailyAchievement>) {
    if state.achievements_date.is_some_and(|d| ctx.date < d) {
        return (state.clone(), Vec::new());
    }

    let mut next = state.clone();
    if next.achievements_date != Some(ctx.date) {
        next.daily_achievements.clear();
        next.achievements_date = Some(ctx.date);
    }

    let earned = earned_achievements(state, ctx);
    let newly: Vec<DailyAchievement> = earned
        .difference(&next.daily_achievements)
        .copied()
        .collect();
    next.daily_achievements.extend(newly.iter().copied());

    for achievement in &newly {
        debug!(date = %ctx.date, ?achievement, "daily achievement unlocked");
    }

    (next, newly)
}

fn earned_achievements(state: &StreakState, ctx: &AchievementContext<'_>) -> BTreeSet<DailyAchievement> {
    let done: Vec<&ConsumptionEntry> = ctx.entries.iter().filter(|e| e.is_consumed()).collect();
    let mut earned = BTreeSet::new();
    if done.is_empty() {
        return earned;
    }

    earned.insert(DailyAchievement::DailyStart);
    if !ctx.has_prior_entries {
        earned.insert(DailyAchievement::FirstEntry);
    }
    if state.current_streak == 0 && state.total_days_with_goal > 0 {
        earned.insert(DailyAchievement::Comeback);
    }

    let early = time_of(EARLY_BIRD_BEFORE);
    let late = time_of(NIGHT_OWL_FROM);
    if done.iter().any(|e| e.eaten_at.time() < early) {
        earned.insert(DailyAchievement::EarlyBird);
    }
    if done.iter().any(|e| e.eaten_at.time() >= late) {
        earned.insert(DailyAchievement::NightOwl);
    }

    let distinct: HashSet<GroupKey> = done.iter().map(|e| GroupKey::of(e)).collect();
    if distinct.len() >= VARIETY_MIN_FOODS {
        earned.insert(DailyAchievement::Variety);
    }

    let consumed: f64 = done.iter().map(|e| e.protein_g).sum();
    if ctx.target_g > 0.0 {
        let ratio = consumed / ctx.target_g;
        for &(threshold, achievement) in PROGRESS_MILESTONES {
            if ratio >= threshold {
                earned.insert(achievement);
            }
        }
        if ratio >= OVERACHIEVER_RATIO {
            earned.insert(DailyAchievement::Overachiever);
        }
        if (consumed - ctx.target_g).abs() <= EXACT_MATCH_TOLERANCE_G {
            earned.insert(DailyAchievement::ExactMatch);
        }
    }

    earned
}

fn time_of((hour, minute): (u32, u32)) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
