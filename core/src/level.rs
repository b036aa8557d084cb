use crate::models::{Level, LevelUp};

/// Levels in ascending `required_days` order. The first entry is the floor.
pub const LEVELS: &[Level] = &[
    Level {
        ordinal: 1,
        name: "Sprout",
        required_days: 0,
    },
    Level {
        ordinal: 2,
        name: "Seedling",
        required_days: 3,
    },
    Level {
        ordinal: 3,
        name: "Regular",
        required_days: 7,
    },
    Level {
        ordinal: 4,
        name: "Committed",
        required_days: 14,
    },
    Level {
        ordinal: 5,
        name: "Dedicated",
        required_days: 30,
    },
    Level {
        ordinal: 6,
        name: "Athlete",
        required_days: 60,
    },
    Level {
        ordinal: 7,
        name: "Champion",
        required_days: 100,
    },
    Level {
        ordinal: 8,
        name: "Legend",
        required_days: 365,
    },
];

/// Highest level whose threshold the streak has reached. Falls back to the
/// lowest level, including for zero and negative streaks.
#[must_use]
pub fn level_for_streak(streak: i64) -> Level {
    LEVELS
        .iter()
        .rev()
        .find(|level| i64::from(level.required_days) <= streak)
        .copied()
        .unwrap_or(LEVELS[0])
}

#[must_use]
pub fn next_level(level: &Level) -> Option<Level> {
    LEVELS
        .iter()
        .find(|candidate| candidate.ordinal > level.ordinal)
        .copied()
}

/// Fraction of the way from `level` to the next one, in `[0, 1]`.
/// Always `1.0` at the top level.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_to_next_level(level: &Level, streak: i64) -> f64 {
    let Some(next) = next_level(level) else {
        return 1.0;
    };
    let span = i64::from(next.required_days) - i64::from(level.required_days);
    if span <= 0 {
        return 1.0;
    }
    let into_band = streak - i64::from(level.required_days);
    (into_band as f64 / span as f64).clamp(0.0, 1.0)
}

/// Days still needed to reach the next level; `0` at the top.
#[must_use]
pub fn days_until_next_level(streak: u32) -> u32 {
    let level = level_for_streak(i64::from(streak));
    next_level(&level).map_or(0, |next| next.required_days.saturating_sub(streak))
}

/// Fires only when the streak change moved to a strictly higher level.
#[must_use]
pub fn check_level_up(previous_streak: i64, new_streak: i64) -> Option<LevelUp> {
    let from = level_for_streak(previous_streak.max(0));
    let to = level_for_streak(new_streak.max(0));
    (to.ordinal > from.ordinal).then_some(LevelUp { from, to })
}
