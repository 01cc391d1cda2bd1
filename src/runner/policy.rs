//! Knobs of the control loop: refresh rate, night window, random breaks,
//! the gap between actions and the simulation timing.

use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use rand::Rng;

use crate::action::elapsed_minutes;
use crate::error::ConfigError;
use crate::state_machine::draw_between;

/// Parse `HH:MM` (or `HH:MM:SS`).
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| ConfigError::TimeOfDay(value.to_string()))
}

/// Time-of-day range during which no action runs. May cross midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for NightWindow {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
        }
    }
}

impl NightWindow {
    /// Window bounds are inclusive at both ends.
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start > self.end {
            now >= self.start || now <= self.end
        } else {
            self.start <= now && now <= self.end
        }
    }

    pub fn is_night(&self, now: NaiveTime) -> bool {
        self.enabled && self.contains(now)
    }
}

/// Randomly triggered pauses, rate-limited by a minimum spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakPolicy {
    /// Probability of a break per cycle, 0..=1.
    pub chance: f64,
    pub min_minutes: f64,
    pub max_minutes: f64,
    pub min_interval_minutes: f64,
}

impl Default for BreakPolicy {
    fn default() -> Self {
        Self {
            chance: 0.05,
            min_minutes: 10.0,
            max_minutes: 30.0,
            min_interval_minutes: 120.0,
        }
    }
}

impl BreakPolicy {
    /// Whether enough time has passed since the last break to draw at all.
    pub fn draw_allowed(&self, last_break: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_break {
            Some(last) => elapsed_minutes(last, now) >= self.min_interval_minutes,
            None => true,
        }
    }

    /// `draw` is only called when the spacing rule allows a break.
    pub fn should_take(
        &self,
        last_break: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        draw: impl FnOnce() -> f64,
    ) -> bool {
        self.draw_allowed(last_break, now) && draw() < self.chance
    }

    pub fn draw_duration(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_secs_f64(draw_between(rng, self.min_minutes, self.max_minutes) * 60.0)
    }
}

/// Simulation settings: actions are replaced by a fixed-length sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestMode {
    pub enabled: bool,
    pub dummy_execution_seconds: f64,
}

impl Default for TestMode {
    fn default() -> Self {
        Self {
            enabled: false,
            dummy_execution_seconds: 15.0,
        }
    }
}

impl TestMode {
    pub fn dummy_execution(&self) -> Duration {
        Duration::from_secs_f64(self.dummy_execution_seconds.max(0.0))
    }
}

/// Everything that shapes a runner's control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerPolicy {
    pub refresh_rate_seconds: f64,
    /// When false the loop ends after one full pass.
    pub continuous_running: bool,
    pub night: NightWindow,
    pub breaks: BreakPolicy,
    /// Randomized pause between consecutive actions within a pass.
    pub action_gap_min_seconds: f64,
    pub action_gap_max_seconds: f64,
    pub test_mode: TestMode,
}

impl Default for RunnerPolicy {
    fn default() -> Self {
        Self {
            refresh_rate_seconds: 60.0,
            continuous_running: true,
            night: NightWindow::default(),
            breaks: BreakPolicy::default(),
            action_gap_min_seconds: 1.0,
            action_gap_max_seconds: 3.0,
            test_mode: TestMode::default(),
        }
    }
}

impl RunnerPolicy {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh_rate_seconds.max(0.0))
    }

    pub fn draw_action_gap(&self, rng: &mut impl Rng) -> Duration {
        let secs = draw_between(rng, self.action_gap_min_seconds, self.action_gap_max_seconds);
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.refresh_rate_seconds.is_finite() && self.refresh_rate_seconds > 0.0) {
            return Err(ConfigError::invalid(
                "runner.refresh_rate_seconds",
                "must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.breaks.chance) {
            return Err(ConfigError::invalid(
                "runner.break_chance",
                "must be within 0..=1",
            ));
        }
        check_range(
            "runner.break_min_minutes",
            self.breaks.min_minutes,
            self.breaks.max_minutes,
        )?;
        if !(self.breaks.min_interval_minutes >= 0.0) {
            return Err(ConfigError::invalid(
                "runner.min_break_interval_minutes",
                "must not be negative",
            ));
        }
        check_range(
            "runner.action_gap_min_seconds",
            self.action_gap_min_seconds,
            self.action_gap_max_seconds,
        )?;
        if !(self.test_mode.dummy_execution_seconds.is_finite()
            && self.test_mode.dummy_execution_seconds > 0.0)
        {
            return Err(ConfigError::invalid(
                "runner.test_mode.dummy_execution_seconds",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn check_range(field: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if !(min.is_finite() && max.is_finite()) || min < 0.0 {
        return Err(ConfigError::invalid(field, "must be a non-negative number"));
    }
    if min > max {
        return Err(ConfigError::invalid(
            field,
            format!("minimum {min} exceeds maximum {max}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::cell::Cell;

    fn t(value: &str) -> NaiveTime {
        parse_time_of_day(value).unwrap()
    }

    fn window(start: &str, end: &str) -> NightWindow {
        NightWindow {
            enabled: true,
            start: t(start),
            end: t(end),
        }
    }

    #[test]
    fn window_crossing_midnight() {
        let night = window("23:00", "07:00");
        assert!(night.is_night(t("00:30")));
        assert!(night.is_night(t("23:00")));
        assert!(night.is_night(t("07:00")));
        assert!(!night.is_night(t("12:00")));
        assert!(!night.is_night(t("22:59")));
    }

    #[test]
    fn window_within_one_day() {
        let office = window("09:00", "17:00");
        assert!(office.is_night(t("12:00")));
        assert!(!office.is_night(t("20:00")));
        assert!(!office.is_night(t("08:59")));
    }

    #[test]
    fn disabled_window_never_suppresses() {
        let mut night = window("00:00", "23:59");
        night.enabled = false;
        assert!(!night.is_night(t("12:00")));
    }

    #[test]
    fn time_of_day_parsing() {
        assert_eq!(t("07:05"), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert_eq!(t("07:05:30"), NaiveTime::from_hms_opt(7, 5, 30).unwrap());
        assert!(matches!(
            parse_time_of_day("7pm"),
            Err(ConfigError::TimeOfDay(v)) if v == "7pm"
        ));
        assert!(parse_time_of_day("25:00").is_err());
    }

    #[test]
    fn break_draw_respects_minimum_interval() {
        let policy = BreakPolicy {
            chance: 0.05,
            min_interval_minutes: 120.0,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let drawn = Cell::new(false);
        let taken = policy.should_take(Some(now - ChronoDuration::minutes(200)), now, || {
            drawn.set(true);
            0.01
        });
        assert!(drawn.get());
        assert!(taken);

        let drawn = Cell::new(false);
        let taken = policy.should_take(Some(now - ChronoDuration::minutes(30)), now, || {
            drawn.set(true);
            0.0
        });
        assert!(!drawn.get());
        assert!(!taken);
    }

    #[test]
    fn break_draw_above_chance_is_declined() {
        let policy = BreakPolicy::default();
        let now = Utc::now();
        assert!(!policy.should_take(None, now, || 0.5));
        assert!(policy.should_take(None, now, || 0.049));
    }

    #[test]
    fn break_duration_within_configured_range() {
        let policy = BreakPolicy {
            min_minutes: 1.0,
            max_minutes: 2.0,
            ..Default::default()
        };
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let secs = policy.draw_duration(&mut rng).as_secs_f64();
            assert!((60.0..=120.0).contains(&secs));
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(RunnerPolicy::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut policy = RunnerPolicy {
            refresh_rate_seconds: 0.0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());

        policy = RunnerPolicy::default();
        policy.breaks.chance = 1.5;
        assert!(policy.validate().is_err());

        policy = RunnerPolicy::default();
        policy.breaks.min_minutes = 40.0;
        assert!(policy.validate().is_err());

        policy = RunnerPolicy::default();
        policy.test_mode.dummy_execution_seconds = 0.0;
        assert!(policy.validate().is_err());

        policy = RunnerPolicy::default();
        policy.action_gap_max_seconds = 0.5;
        assert!(policy.validate().is_err());
    }
}
