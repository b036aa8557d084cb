mod food;
mod helpers;
mod log;
mod progress;
mod settings;
mod summary;
mod target;

pub(crate) use food::{cmd_food_add, cmd_food_list};
pub(crate) use log::{cmd_delete, cmd_log, cmd_status};
pub(crate) use progress::{cmd_close, cmd_levels, cmd_streak};
pub(crate) use settings::{cmd_settings_reset, cmd_settings_set, cmd_settings_show};
pub(crate) use summary::{cmd_balance, cmd_entries};
pub(crate) use target::{cmd_target_clear, cmd_target_set, cmd_target_show};
