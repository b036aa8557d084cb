use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_ALPHA: f64 = 0.3;
pub const DEFAULT_MAX_ROLLOVER_G: f64 = 50.0;
pub const DEFAULT_TARGET_G: f64 = 120.0;

pub const SETTING_ALPHA: &str = "alpha";
pub const SETTING_MAX_ROLLOVER: &str = "max_rollover";
pub const SETTING_DEFAULT_TARGET: &str = "default_target_g";
pub const SETTING_TARGET_BASIS: &str = "target_basis";
pub const SETTING_WEEK_START: &str = "week_start";

pub const SETTING_KEYS: &[&str] = &[
    SETTING_ALPHA,
    SETTING_MAX_ROLLOVER,
    SETTING_DEFAULT_TARGET,
    SETTING_TARGET_BASIS,
    SETTING_WEEK_START,
];

/// Which target a day's consumption is compared against to decide a streak hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetBasis {
    /// The configured daily target, ignoring rollover.
    #[default]
    Raw,
    /// The rollover-adjusted target in effect for the day.
    Adjusted,
}

impl TargetBasis {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Adjusted => "adjusted",
        }
    }
}

impl FromStr for TargetBasis {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "adjusted" => Ok(Self::Adjusted),
            _ => bail!("Invalid target basis '{s}'. Must be one of: raw, adjusted"),
        }
    }
}

/// Tunables for the balance tracker and streak engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineConfig {
    pub alpha: f64,
    pub max_rollover: f64,
    pub default_target_g: f64,
    pub target_basis: TargetBasis,
    pub week_start: Weekday,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            max_rollover: DEFAULT_MAX_ROLLOVER_G,
            default_target_g: DEFAULT_TARGET_G,
            target_basis: TargetBasis::Raw,
            week_start: Weekday::Mon,
        }
    }
}

impl EngineConfig {
    /// Build a config from stored settings. Missing keys use defaults; values
    /// that no longer parse are logged and ignored.
    pub fn from_settings<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        let mut config = Self::default();
        for &key in SETTING_KEYS {
            if let Some(value) = lookup(key)? {
                if let Err(e) = config.apply(key, &value) {
                    warn!(key, value = %value, "ignoring stored setting: {e:#}");
                }
            }
        }
        Ok(config)
    }

    /// Validate and apply a single `key = value` setting.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            SETTING_ALPHA => {
                let alpha = parse_number(key, value)?;
                if !(0.0..=1.0).contains(&alpha) {
                    bail!("alpha must be between 0 and 1");
                }
                self.alpha = alpha;
            }
            SETTING_MAX_ROLLOVER => {
                let max = parse_number(key, value)?;
                if max < 0.0 {
                    bail!("max_rollover must not be negative");
                }
                self.max_rollover = max;
            }
            SETTING_DEFAULT_TARGET => {
                let target = parse_number(key, value)?;
                if target <= 0.0 {
                    bail!("default_target_g must be greater than 0");
                }
                self.default_target_g = target;
            }
            SETTING_TARGET_BASIS => self.target_basis = value.parse()?,
            SETTING_WEEK_START => {
                self.week_start = value
                    .trim()
                    .parse::<Weekday>()
                    .map_err(|_| anyhow::anyhow!("Invalid week_start '{value}'. Use a weekday name"))?;
            }
            _ => bail!(
                "Unknown setting '{key}'. Must be one of: {}",
                SETTING_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// The target a day's consumption must reach to count as a hit, given the
    /// raw target and the rollover balance carried into that day.
    #[must_use]
    pub fn hit_target(&self, raw_target: f64, carried_balance: f64) -> f64 {
        match self.target_basis {
            TargetBasis::Raw => raw_target,
            TargetBasis::Adjusted => raw_target - self.alpha * carried_balance,
        }
    }
}

fn parse_number(key: &str, value: &str) -> Result<f64> {
    let n: f64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} must be a number (got '{value}')"))?;
    if !n.is_finite() {
        bail!("{key} must be finite");
    }
    Ok(n)
}
