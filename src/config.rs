//! Configuration loaded from `stagehand.toml`.
//!
//! [`Config`] holds the runner policy and per-action settings. Every field
//! has a default; a file only needs the values it changes. Several files
//! can be layered, later ones overriding earlier ones field by field.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::action::{ActionSettings, MAX_COOLDOWN_MINUTES};
use crate::error::ConfigError;
use crate::runner::{RunnerPolicy, parse_time_of_day};
use crate::state_machine::DelayProfile;

/// Default file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "stagehand.toml";

/// Setting this to `1` or `true` forces test mode regardless of the files.
pub const TEST_MODE_ENV: &str = "STAGEHAND_TEST_MODE";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub runner: RunnerPolicy,
    /// Keyed by action key, e.g. `gather_resources`.
    pub actions: BTreeMap<String, ActionSettings>,
}

/// One configuration file as written: every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverlay {
    #[serde(default)]
    pub runner: RunnerOverlay,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerOverlay {
    pub refresh_rate_seconds: Option<f64>,
    pub continuous_running: Option<bool>,
    pub night_sleep_enabled: Option<bool>,
    /// `HH:MM`
    pub night_sleep_start: Option<String>,
    pub night_sleep_end: Option<String>,
    pub break_chance: Option<f64>,
    pub break_min_minutes: Option<f64>,
    pub break_max_minutes: Option<f64>,
    pub min_break_interval_minutes: Option<f64>,
    pub action_gap_min_seconds: Option<f64>,
    pub action_gap_max_seconds: Option<f64>,
    #[serde(default)]
    pub test_mode: TestModeOverlay,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestModeOverlay {
    pub enabled: Option<bool>,
    pub dummy_execution_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionOverlay {
    pub enabled: Option<bool>,
    pub cooldown_minutes: Option<f64>,
    pub max_retries: Option<u32>,
    pub default_wait_seconds: Option<f64>,
    /// Merged by profile name.
    #[serde(default)]
    pub delay_profiles: HashMap<String, DelayProfile>,
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl ConfigOverlay {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}

impl Config {
    /// Defaults with one TOML document applied.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply(ConfigOverlay::parse(contents)?)?;
        Ok(config)
    }

    /// Apply `overlay` on top of the current values.
    pub fn apply(&mut self, overlay: ConfigOverlay) -> Result<(), ConfigError> {
        let runner = overlay.runner;
        let policy = &mut self.runner;
        set(&mut policy.refresh_rate_seconds, runner.refresh_rate_seconds);
        set(&mut policy.continuous_running, runner.continuous_running);
        set(&mut policy.night.enabled, runner.night_sleep_enabled);
        if let Some(start) = runner.night_sleep_start {
            policy.night.start = parse_time_of_day(&start)?;
        }
        if let Some(end) = runner.night_sleep_end {
            policy.night.end = parse_time_of_day(&end)?;
        }
        set(&mut policy.breaks.chance, runner.break_chance);
        set(&mut policy.breaks.min_minutes, runner.break_min_minutes);
        set(&mut policy.breaks.max_minutes, runner.break_max_minutes);
        set(
            &mut policy.breaks.min_interval_minutes,
            runner.min_break_interval_minutes,
        );
        set(&mut policy.action_gap_min_seconds, runner.action_gap_min_seconds);
        set(&mut policy.action_gap_max_seconds, runner.action_gap_max_seconds);
        set(&mut policy.test_mode.enabled, runner.test_mode.enabled);
        set(
            &mut policy.test_mode.dummy_execution_seconds,
            runner.test_mode.dummy_execution_seconds,
        );

        for (key, action) in overlay.actions {
            let settings = self.actions.entry(key).or_default();
            set(&mut settings.enabled, action.enabled);
            set(&mut settings.cooldown_minutes, action.cooldown_minutes);
            set(&mut settings.max_retries, action.max_retries);
            set(&mut settings.default_wait_seconds, action.default_wait_seconds);
            settings.delay_profiles.extend(action.delay_profiles);
        }
        Ok(())
    }

    /// Start from defaults and apply each existing file in order.
    /// Missing files are skipped.
    pub fn from_layers<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for path in paths {
            let path = path.as_ref();
            let contents = match std::fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "config file not found, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            debug!(path = %path.display(), "applying config file");
            config.apply(ConfigOverlay::parse(&contents)?)?;
        }
        Ok(config)
    }

    /// Load `path` (or `stagehand.toml` in the working directory), apply
    /// the environment and validate. Defaults if no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let mut config = Self::from_layers(&[path])?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// The environment takes precedence over the files.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(TEST_MODE_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.runner.test_mode.enabled = true,
                "0" | "false" | "no" => self.runner.test_mode.enabled = false,
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runner.validate()?;
        for (key, action) in &self.actions {
            if !(action.cooldown_minutes.is_finite() && action.cooldown_minutes >= 0.0) {
                return Err(ConfigError::invalid(
                    format!("actions.{key}.cooldown_minutes"),
                    "must not be negative",
                ));
            }
            if action.cooldown_minutes > MAX_COOLDOWN_MINUTES {
                return Err(ConfigError::invalid(
                    format!("actions.{key}.cooldown_minutes"),
                    format!("must not exceed {MAX_COOLDOWN_MINUTES} minutes"),
                ));
            }
            if !(action.default_wait_seconds.is_finite() && action.default_wait_seconds >= 0.0) {
                return Err(ConfigError::invalid(
                    format!("actions.{key}.default_wait_seconds"),
                    "must not be negative",
                ));
            }
            for (name, profile) in &action.delay_profiles {
                profile.validate().map_err(|e| {
                    ConfigError::invalid(format!("actions.{key}.delay_profiles.{name}"), e.to_string())
                })?;
            }
        }
        Ok(())
    }

    /// Settings for `key`, or the defaults when the file does not mention it.
    pub fn action(&self, key: &str) -> ActionSettings {
        self.actions.get(key).cloned().unwrap_or_default()
    }
}
