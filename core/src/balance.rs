use chrono::NaiveDate;

use crate::config::{DEFAULT_ALPHA, DEFAULT_MAX_ROLLOVER_G, EngineConfig};
use crate::models::DailyBalance;

/// Bounded rollover of protein surplus/deficit into future daily targets.
///
/// The balance accumulates `consumed - target` each closed day, clamped to
/// `[-max_rollover, max_rollover]`. A deficit (negative balance) raises the
/// next target by `alpha` of the balance; a surplus lowers it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceTracker {
    alpha: f64,
    max_rollover: f64,
}

impl Default for BalanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA, DEFAULT_MAX_ROLLOVER_G)
    }
}

impl BalanceTracker {
    #[must_use]
    pub fn new(alpha: f64, max_rollover: f64) -> Self {
        Self {
            alpha: finite_or_zero(alpha),
            max_rollover: finite_or_zero(max_rollover).max(0.0),
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.alpha, config.max_rollover)
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[must_use]
    pub fn max_rollover(&self) -> f64 {
        self.max_rollover
    }

    #[must_use]
    pub fn clamp_balance(&self, balance: f64) -> f64 {
        finite_or_zero(balance).clamp(-self.max_rollover, self.max_rollover)
    }

    #[must_use]
    pub fn adjusted_target(&self, target: f64, balance: f64) -> f64 {
        finite_or_zero(target) - self.alpha * self.clamp_balance(balance)
    }

    /// Close a day: fold its delta into the carried balance.
    ///
    /// `previous_balance` must be the balance stored for the last closed day
    /// before `date`. Calling this twice for the same day counts its delta twice.
    #[must_use]
    pub fn update_rollover(
        &self,
        previous_balance: f64,
        date: NaiveDate,
        consumed: f64,
        target: f64,
    ) -> DailyBalance {
        let consumed = finite_or_zero(consumed);
        let target = finite_or_zero(target);
        let delta = consumed - target;
        let rollover_balance = self.clamp_balance(self.clamp_balance(previous_balance) + delta);

        DailyBalance {
            date,
            target_protein: target,
            consumed_protein: consumed,
            rollover_balance,
            adjusted_target: target - self.alpha * rollover_balance,
        }
    }

    /// Figures for a day that has not been closed yet: the carried balance and
    /// the target it implies for that day.
    #[must_use]
    pub fn preview(
        &self,
        carried_balance: f64,
        date: NaiveDate,
        consumed: f64,
        target: f64,
    ) -> DailyBalance {
        let rollover_balance = self.clamp_balance(carried_balance);
        DailyBalance {
            date,
            target_protein: finite_or_zero(target),
            consumed_protein: finite_or_zero(consumed),
            rollover_balance,
            adjusted_target: self.adjusted_target(target, rollover_balance),
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
