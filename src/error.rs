use thiserror::Error;

use crate::state_machine::{State, Trigger};

#[derive(Debug, Error)]
pub enum StagehandError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Workflow error: {0}")]
    Engine(#[from] EngineError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Problems found while building or driving a state machine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Transition `{trigger}` refers to unknown delay profile `{profile}`")]
    UnknownProfile { trigger: Trigger, profile: String },

    #[error("Invalid delay bounds: {0}")]
    InvalidDelay(String),

    #[error("Workflow exceeded {limit} steps (last trigger `{trigger}` in state {state})")]
    StepLimit {
        limit: usize,
        trigger: Trigger,
        state: State,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Invalid time of day `{0}`, expected HH:MM")]
    TimeOfDay(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action `{action}` aborted: {source}")]
    Engine {
        action: String,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Runner must be started from within a tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("Action worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
