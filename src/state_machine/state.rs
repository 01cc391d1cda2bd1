use std::fmt;

use serde::{Deserialize, Serialize};

/// The states every action workflow moves through.
///
/// A run starts in `Idle` and normally ends in `Completed`:
/// IDLE → STARTING → ... → SUCCEEDED | FAILED → COMPLETED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Idle,
    Starting,
    Detecting,
    Clicking,
    Typing,
    Waiting,
    Verifying,
    ExtractingText,
    Succeeded,
    Failed,
    Completed,
}

impl State {
    pub const ALL: [State; 11] = [
        State::Idle,
        State::Starting,
        State::Detecting,
        State::Clicking,
        State::Typing,
        State::Waiting,
        State::Verifying,
        State::ExtractingText,
        State::Succeeded,
        State::Failed,
        State::Completed,
    ];

    /// Initial state of every machine.
    pub const INITIAL: State = State::Idle;

    /// Terminal state of a run.
    pub const TERMINAL: State = State::Completed;

    pub fn is_terminal(self) -> bool {
        self == Self::TERMINAL
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Idle => write!(f, "idle"),
            State::Starting => write!(f, "starting"),
            State::Detecting => write!(f, "detecting"),
            State::Clicking => write!(f, "clicking"),
            State::Typing => write!(f, "typing"),
            State::Waiting => write!(f, "waiting"),
            State::Verifying => write!(f, "verifying"),
            State::ExtractingText => write!(f, "extracting_text"),
            State::Succeeded => write!(f, "succeeded"),
            State::Failed => write!(f, "failed"),
            State::Completed => write!(f, "completed"),
        }
    }
}

/// Name of a transition. Built-in triggers are associated constants;
/// workflows declare their own with [`Trigger::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trigger(&'static str);

impl Trigger {
    pub const START: Trigger = Trigger("start");
    pub const DETECT: Trigger = Trigger("detect");
    pub const CLICK: Trigger = Trigger("click");
    pub const WAIT: Trigger = Trigger("wait");
    pub const VERIFY: Trigger = Trigger("verify");
    pub const EXTRACT_TEXT: Trigger = Trigger("extract_text");
    pub const SUCCEED: Trigger = Trigger("succeed");
    pub const FAIL: Trigger = Trigger("fail");
    pub const COMPLETE: Trigger = Trigger("complete");
    pub const RESET: Trigger = Trigger("reset");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Which states a transition may fire from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Matches the current state whatever it is.
    Any,
    States(Vec<State>),
}

impl Source {
    pub fn matches(&self, current: State) -> bool {
        match self {
            Source::Any => true,
            Source::States(states) => states.contains(&current),
        }
    }
}

impl From<State> for Source {
    fn from(state: State) -> Self {
        Source::States(vec![state])
    }
}

impl<const N: usize> From<[State; N]> for Source {
    fn from(states: [State; N]) -> Self {
        Source::States(states.to_vec())
    }
}
