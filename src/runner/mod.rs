//! Background scheduling of actions: a control loop per runner, driven by
//! a [`RunnerPolicy`] and controlled through the [`Runner`] trait.

mod control;
mod live;
mod policy;
mod signals;
mod simulation;
mod status;

use std::sync::Arc;

use async_trait::async_trait;

use crate::action::Action;
use crate::error::{ConfigError, RunnerError};

pub use control::{STOP_TIMEOUT, SaveHook};
pub use live::ActionRunner;
pub use policy::{BreakPolicy, NightWindow, RunnerPolicy, TestMode, parse_time_of_day};
pub use signals::{POLL_INTERVAL, RunSignals, SleepOutcome};
pub use simulation::SimulationRunner;
pub use status::{ActionStatus, Phase, StatusBoard, StatusCallback};

/// The control surface shared by live and simulated runners.
///
/// `start` spawns the loop on the ambient tokio runtime and returns at once;
/// everything else may be called from any thread while the loop runs.
#[async_trait]
pub trait Runner: Send + Sync {
    fn mode(&self) -> &'static str;

    /// Register an action; one with the same key is replaced.
    fn add_action(&self, action: Arc<Action>);
    fn remove_action(&self, name: &str) -> Option<Arc<Action>>;
    /// `false` if no action has that name or key.
    fn set_action_enabled(&self, name: &str, enabled: bool) -> bool;

    fn start(&self) -> Result<(), RunnerError>;
    /// Interrupt the loop, wait up to [`STOP_TIMEOUT`] for it, and report
    /// every action idle.
    async fn stop(&self) -> Result<(), RunnerError>;
    /// Wait for the loop to end by itself.
    async fn join(&self) -> Result<(), RunnerError>;
    fn pause(&self);
    fn resume(&self);

    fn is_running(&self) -> bool;
    fn is_paused(&self) -> bool;
    /// Cycles started since construction.
    fn cycles(&self) -> u64;
    fn statuses(&self) -> Vec<ActionStatus>;
    fn set_status_callback(&self, callback: Option<StatusCallback>);

    fn policy(&self) -> RunnerPolicy;
    /// Replace the policy; the loop picks it up at its next cycle.
    fn set_policy(&self, policy: RunnerPolicy) -> Result<(), ConfigError>;
}

/// A simulation runner when test mode is on, a live one otherwise.
pub fn create_runner(policy: RunnerPolicy) -> Box<dyn Runner> {
    if policy.test_mode.enabled {
        Box::new(SimulationRunner::new(policy))
    } else {
        Box::new(ActionRunner::new(policy))
    }
}
