use chrono::NaiveDate;
use thiserror::Error;

/// Conditions callers are expected to tell apart from generic failures.
///
/// These travel inside `anyhow::Error`; match on them with `downcast_ref`.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// The day (or a later one) has already been closed.
    #[error("{date} has already been evaluated (last evaluated day: {last})")]
    DayAlreadyEvaluated { date: NaiveDate, last: NaiveDate },

    /// The balance/streak write was rolled back; the previous state is still in effect.
    #[error("failed to commit progression state: {0}")]
    CommitFailed(#[source] rusqlite::Error),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),
}
