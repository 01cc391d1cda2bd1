//! What the runner reports about each action: a coarse [`Phase`] plus the
//! cooldown figures, and a board that notifies a callback on changes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::Action;
use crate::state_machine::State;
use crate::util::lock;

/// What the runner reports an action to be doing, independent of its
/// machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Working,
    Done,
    NotAvailable,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Working => "working",
            Phase::Done => "done",
            Phase::NotAvailable => "n/a",
        }
    }

    /// Reported for an action the runner is idle about.
    pub fn idle_for(enabled: bool) -> Self {
        if enabled {
            Phase::Waiting
        } else {
            Phase::NotAvailable
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionStatus {
    pub name: String,
    pub key: String,
    pub state: State,
    pub phase: Phase,
    pub enabled: bool,
    pub on_cooldown: bool,
    /// Minutes.
    pub cooldown_remaining: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl ActionStatus {
    /// Status as the live runner sees it: cooldown straight from the action.
    pub fn live(action: &Action, phase: Phase, now: DateTime<Utc>) -> Self {
        Self {
            name: action.name().to_string(),
            key: action.key().to_string(),
            state: action.state(),
            phase,
            enabled: action.is_enabled(),
            on_cooldown: action.is_on_cooldown_at(now),
            cooldown_remaining: action.cooldown_remaining_at(now),
            last_execution: action.last_execution(),
        }
    }

    /// Status as a simulation reports it: cooldowns do not apply.
    pub fn simulated(action: &Action, phase: Phase) -> Self {
        Self {
            name: action.name().to_string(),
            key: action.key().to_string(),
            state: action.state(),
            phase,
            enabled: action.is_enabled(),
            on_cooldown: false,
            cooldown_remaining: 0.0,
            last_execution: None,
        }
    }
}

/// Called with the action name and its new phase.
pub type StatusCallback = Arc<dyn Fn(&str, Phase) + Send + Sync>;

/// Reported phase per action, keyed by action key.
#[derive(Default)]
pub struct StatusBoard {
    phases: Mutex<HashMap<String, Phase>>,
    callback: Mutex<Option<StatusCallback>>,
}

impl fmt::Debug for StatusBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusBoard")
            .field("phases", &*lock(&self.phases))
            .finish_non_exhaustive()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback(&self, callback: Option<StatusCallback>) {
        *lock(&self.callback) = callback;
    }

    pub fn get(&self, key: &str) -> Option<Phase> {
        lock(&self.phases).get(key).copied()
    }

    /// Record a phase under `key`. The callback, given `name`, only fires
    /// when the phase actually changes, and runs after the board lock is
    /// released.
    pub fn set(&self, key: &str, name: &str, phase: Phase) {
        let previous = lock(&self.phases).insert(key.to_string(), phase);
        if previous == Some(phase) {
            return;
        }
        let callback = lock(&self.callback).clone();
        if let Some(callback) = callback {
            callback(name, phase);
        }
    }

    pub fn remove(&self, key: &str) {
        lock(&self.phases).remove(key);
    }

    /// Phase for `key`, falling back to the idle phase for its enabled flag.
    pub fn phase_or_idle(&self, key: &str, enabled: bool) -> Phase {
        self.get(key).unwrap_or_else(|| Phase::idle_for(enabled))
    }
}
