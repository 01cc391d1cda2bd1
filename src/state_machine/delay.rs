//! Randomized pre/post delays attached to transitions.
//!
//! A [`DelayProfile`] holds two ranges in seconds. Named profiles come from
//! the built-in table or from per-action overrides in [`DelayProfiles`];
//! overrides win. The engine draws a value uniformly from each range and
//! hands it to a [`Pacer`].

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Pre- and post-effect delay ranges, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayProfile {
    pub pre_delay_min: f64,
    pub pre_delay_max: f64,
    pub post_delay_min: f64,
    pub post_delay_max: f64,
}

impl DelayProfile {
    pub const NONE: DelayProfile = DelayProfile::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(pre_min: f64, pre_max: f64, post_min: f64, post_max: f64) -> Self {
        Self {
            pre_delay_min: pre_min,
            pre_delay_max: pre_max,
            post_delay_min: post_min,
            post_delay_max: post_max,
        }
    }

    /// All bounds non-negative and finite, each min ≤ its max.
    pub fn validate(&self) -> Result<(), EngineError> {
        check_range("pre", self.pre_delay_min, self.pre_delay_max)?;
        check_range("post", self.post_delay_min, self.post_delay_max)
    }

    pub fn has_pre(&self) -> bool {
        self.pre_delay_max > 0.0
    }

    pub fn has_post(&self) -> bool {
        self.post_delay_max > 0.0
    }

    pub fn draw_pre(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_secs_f64(draw_between(rng, self.pre_delay_min, self.pre_delay_max))
    }

    pub fn draw_post(&self, rng: &mut impl Rng) -> Duration {
        Duration::from_secs_f64(draw_between(rng, self.post_delay_min, self.post_delay_max))
    }
}

fn check_range(which: &str, min: f64, max: f64) -> Result<(), EngineError> {
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max < 0.0 {
        return Err(EngineError::InvalidDelay(format!(
            "{which}-delay bounds must be finite and non-negative (got {min}..{max})"
        )));
    }
    if min > max {
        return Err(EngineError::InvalidDelay(format!(
            "{which}-delay minimum {min} exceeds maximum {max}"
        )));
    }
    Ok(())
}

/// Uniform draw from `[min, max]`; collapses to `min` for an empty range.
pub fn draw_between(rng: &mut impl Rng, min: f64, max: f64) -> f64 {
    if max <= min {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

/// Built-in named profiles.
pub const BUILTIN_PROFILES: [(&str, DelayProfile); 5] = [
    ("quick", DelayProfile::new(0.2, 0.5, 0.3, 0.6)),
    ("normal", DelayProfile::new(0.5, 1.0, 0.8, 1.2)),
    ("verification", DelayProfile::new(0.5, 1.0, 0.2, 0.4)),
    ("long_wait", DelayProfile::new(0.3, 0.6, 2.0, 3.0)),
    ("menu_navigation", DelayProfile::new(0.3, 0.7, 1.0, 1.5)),
];

/// Profile lookup table: caller overrides layered over the built-ins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelayProfiles {
    overrides: HashMap<String, DelayProfile>,
}

impl DelayProfiles {
    pub fn with_overrides(overrides: HashMap<String, DelayProfile>) -> Result<Self, EngineError> {
        for profile in overrides.values() {
            profile.validate()?;
        }
        Ok(Self { overrides })
    }

    pub fn resolve(&self, name: &str) -> Option<DelayProfile> {
        if let Some(profile) = self.overrides.get(name) {
            return Some(*profile);
        }
        BUILTIN_PROFILES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, profile)| *profile)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// How a transition chooses its delays. A named profile and explicit bounds
/// are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DelaySpec {
    #[default]
    None,
    /// Resolved against [`DelayProfiles`] each time the transition fires.
    Profile(String),
    Explicit(DelayProfile),
}

impl DelaySpec {
    pub fn profile(name: impl Into<String>) -> Self {
        Self::Profile(name.into())
    }

    pub fn explicit(pre_min: f64, pre_max: f64, post_min: f64, post_max: f64) -> Self {
        Self::Explicit(DelayProfile::new(pre_min, pre_max, post_min, post_max))
    }
}

/// Applies a drawn delay. The production pacer blocks the calling thread;
/// tests substitute one that records instead of sleeping.
pub trait Pacer: Send + Sync {
    fn pause(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn builtin_profiles_are_valid() {
        for (name, profile) in BUILTIN_PROFILES {
            assert!(profile.validate().is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn overrides_take_precedence_over_builtins() {
        let custom = DelayProfile::new(0.0, 0.1, 0.0, 0.1);
        let profiles =
            DelayProfiles::with_overrides(HashMap::from([("normal".to_string(), custom)])).unwrap();

        assert_eq!(profiles.resolve("normal"), Some(custom));
        assert_eq!(
            profiles.resolve("quick"),
            Some(DelayProfile::new(0.2, 0.5, 0.3, 0.6))
        );
        assert_eq!(profiles.resolve("missing"), None);
    }

    #[test]
    fn inverted_override_is_rejected() {
        let bad = DelayProfile::new(1.0, 0.5, 0.0, 0.0);
        let err = DelayProfiles::with_overrides(HashMap::from([("slow".to_string(), bad)]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDelay(_)));
    }

    #[test]
    fn negative_bounds_are_rejected() {
        assert!(DelayProfile::new(0.0, 0.0, -0.1, 0.2).validate().is_err());
        assert!(DelayProfile::new(0.0, f64::NAN, 0.0, 0.0).validate().is_err());
    }

    #[test]
    fn draws_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let profile = DelayProfile::new(0.5, 1.0, 2.0, 3.0);
        for _ in 0..200 {
            let pre = profile.draw_pre(&mut rng).as_secs_f64();
            let post = profile.draw_post(&mut rng).as_secs_f64();
            assert!((0.5..=1.0).contains(&pre));
            assert!((2.0..=3.0).contains(&post));
        }
    }

    #[test]
    fn degenerate_range_returns_minimum() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(draw_between(&mut rng, 0.4, 0.4), 0.4);
        assert!(!DelayProfile::NONE.has_pre());
        assert!(!DelayProfile::NONE.has_post());
    }
}
