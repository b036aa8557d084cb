use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::ProgressError;
use crate::models::{Badge, StreakState};

/// Badge table, ascending by required streak length.
pub const BADGES: &[Badge] = &[
    Badge::FirstDay,
    Badge::ThreeDays,
    Badge::OneWeek,
    Badge::TwoWeeks,
    Badge::OneMonth,
    Badge::TwoMonths,
    Badge::HundredDays,
    Badge::OneYear,
];

/// Minimum streak before a missed day can be covered by the weekly saver.
pub const STREAK_SAVER_MIN_STREAK: u32 = 3;

impl Badge {
    #[must_use]
    pub fn required_days(self) -> u32 {
        match self {
            Self::FirstDay => 1,
            Self::ThreeDays => 3,
            Self::OneWeek => 7,
            Self::TwoWeeks => 14,
            Self::OneMonth => 30,
            Self::TwoMonths => 60,
            Self::HundredDays => 100,
            Self::OneYear => 365,
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::FirstDay => "First Day",
            Self::ThreeDays => "Three in a Row",
            Self::OneWeek => "One Week",
            Self::TwoWeeks => "Two Weeks",
            Self::OneMonth => "One Month",
            Self::TwoMonths => "Two Months",
            Self::HundredDays => "Hundred Days",
            Self::OneYear => "One Year",
        }
    }
}

/// First day of the week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate, first_day: Weekday) -> NaiveDate {
    let offset =
        (date.weekday().num_days_from_monday() + 7 - first_day.num_days_from_monday()) % 7;
    date - Duration::days(i64::from(offset))
}

/// Badges earned at `streak` that are not yet in `unlocked`, in table order.
#[must_use]
pub fn unlock_badges(unlocked: &BTreeSet<Badge>, streak: u32) -> Vec<Badge> {
    BADGES
        .iter()
        .copied()
        .filter(|badge| badge.required_days() <= streak && !unlocked.contains(badge))
        .collect()
}

impl StreakState {
    /// The weekly saver is unspent and the streak is long enough. Whether it
    /// can cover a particular day also needs the day before to be a success;
    /// see [`Self::can_use_streak_saver_on`].
    #[must_use]
    pub fn can_use_streak_saver(&self) -> bool {
        !self.streak_saver_used_this_week && self.current_streak >= STREAK_SAVER_MIN_STREAK
    }

    /// Whether a miss on `date` could be covered: the saver is available and
    /// the day before `date` was a success.
    #[must_use]
    pub fn can_use_streak_saver_on(&self, date: NaiveDate) -> bool {
        self.can_use_streak_saver() && self.succeeded_on(date.pred_opt())
    }

    /// Spend this week's saver. Returns `None` when it is not available.
    #[must_use]
    pub fn use_streak_saver(&self) -> Option<Self> {
        if !self.can_use_streak_saver() {
            return None;
        }
        Some(Self {
            streak_saver_used_this_week: true,
            ..self.clone()
        })
    }

    /// A live streak whose last success was before yesterday will be lost
    /// unless today is a hit.
    #[must_use]
    pub fn is_streak_at_risk(&self, today: NaiveDate) -> bool {
        let Some(yesterday) = today.pred_opt() else {
            return false;
        };
        self.current_streak > 0 && self.last_success_date.is_none_or(|d| d < yesterday)
    }

    #[must_use]
    pub fn weekly_success_rate(&self) -> f64 {
        if self.this_week_total_days == 0 {
            return 0.0;
        }
        f64::from(self.this_week_target_hits) / f64::from(self.this_week_total_days)
    }

    fn succeeded_on(&self, date: Option<NaiveDate>) -> bool {
        date.is_some() && self.last_success_date == date
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakTransition {
    pub state: StreakState,
    /// In badge table order.
    pub newly_unlocked: Vec<Badge>,
    pub saver_used: bool,
}

/// Day-close state machine for streaks, weekly counters, and badges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakEngine {
    week_start: Weekday,
}

impl Default for StreakEngine {
    fn default() -> Self {
        Self::new(Weekday::Mon)
    }
}

impl StreakEngine {
    #[must_use]
    pub fn new(week_start: Weekday) -> Self {
        Self { week_start }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.week_start)
    }

    #[must_use]
    pub fn week_start_of(&self, date: NaiveDate) -> NaiveDate {
        week_start(date, self.week_start)
    }

    /// Reset the weekly counters and saver when `date` falls in a new week.
    #[must_use]
    pub fn roll_week(&self, state: &StreakState, date: NaiveDate) -> StreakState {
        let current_week = self.week_start_of(date);
        if state.week_start_date == Some(current_week) {
            return state.clone();
        }
        StreakState {
            streak_saver_used_this_week: false,
            week_start_date: Some(current_week),
            this_week_target_hits: 0,
            this_week_total_days: 0,
            ..state.clone()
        }
    }

    /// Apply one closed day.
    ///
    /// `elect_saver` asks to cover a miss with this week's streak saver; it is
    /// ignored on hits and when the saver is unavailable. A covered miss keeps
    /// the streak and counts as continuity for the next day, but not as a goal day.
    pub fn evaluate_day(
        &self,
        state: &StreakState,
        date: NaiveDate,
        target_hit: bool,
        elect_saver: bool,
    ) -> Result<StreakTransition, ProgressError> {
        if let Some(last) = state.last_evaluated_date {
            if date <= last {
                return Err(ProgressError::DayAlreadyEvaluated { date, last });
            }
        }

        let mut next = self.roll_week(state, date);
        let yesterday = date.pred_opt();
        let mut newly_unlocked = Vec::new();
        let mut saver_used = false;

        next.this_week_total_days += 1;

        if target_hit {
            next.this_week_target_hits += 1;
            next.current_streak = if next.succeeded_on(yesterday) {
                next.current_streak.saturating_add(1)
            } else {
                1
            };
            next.last_success_date = Some(date);
            next.total_days_with_goal += 1;
            next.best_streak = next.best_streak.max(next.current_streak);

            newly_unlocked = unlock_badges(&next.unlocked_badges, next.current_streak);
            next.unlocked_badges.extend(newly_unlocked.iter().copied());
        } else {
            let covered = if elect_saver && next.can_use_streak_saver_on(date) {
                next.use_streak_saver()
            } else {
                None
            };
            if let Some(mut covered) = covered {
                covered.last_success_date = Some(date);
                next = covered;
                saver_used = true;
            } else {
                next.current_streak = 0;
            }
        }

        next.last_evaluated_date = Some(date);

        debug!(
            %date,
            target_hit,
            saver_used,
            streak = next.current_streak,
            unlocked = newly_unlocked.len(),
            "streak evaluated"
        );

        Ok(StreakTransition {
            state: next,
            newly_unlocked,
            saver_used,
        })
    }
}
