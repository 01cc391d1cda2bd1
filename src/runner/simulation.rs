//! The simulation runner: the live control loop with each action replaced
//! by a fixed sleep, for rehearsing a schedule without touching anything.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Span, info, warn};

use super::Runner;
use super::control::{Core, Mode, PassReport, Shared};
use super::policy::RunnerPolicy;
use super::status::{ActionStatus, Phase, StatusCallback};
use crate::action::Action;
use crate::error::{ConfigError, RunnerError};

/// Stands in a fixed sleep for each enabled action. Cooldowns are neither
/// consulted nor touched.
pub(crate) async fn run_pass(shared: &Shared, policy: &RunnerPolicy) -> PassReport {
    let duration = policy.test_mode.dummy_execution();
    let mut executed = 0;
    for action in shared.actions() {
        if shared.signals.checkpoint().await.interrupted() {
            return PassReport {
                executed,
                interrupted: true,
            };
        }
        if !action.is_enabled() {
            continue;
        }

        shared.report(&action, Phase::Working);
        info!(
            action = %action.name(),
            secs = duration.as_secs_f64(),
            "simulating action"
        );
        if shared.signals.interruptible_sleep(duration).await.interrupted() {
            info!(action = %action.name(), "simulated action interrupted");
            return PassReport {
                executed,
                interrupted: true,
            };
        }
        shared.report(&action, Phase::Done);
        info!(action = %action.name(), "simulated action complete");
        executed += 1;
    }
    PassReport {
        executed,
        interrupted: false,
    }
}

/// Rehearses scheduling: same loop, statuses and controls as
/// [`ActionRunner`](super::ActionRunner), without running any action.
pub struct SimulationRunner {
    core: Core,
}

impl SimulationRunner {
    pub fn new(policy: RunnerPolicy) -> Self {
        let core = Core::new(Mode::Simulation, policy);
        Self::announce(&core);
        Self { core }
    }

    pub fn with_span(policy: RunnerPolicy, span: Span) -> Self {
        let core = Core::with_span(Mode::Simulation, policy, span);
        Self::announce(&core);
        Self { core }
    }

    fn announce(core: &Core) {
        warn!(
            dummy_execution_secs = core.policy().test_mode.dummy_execution_seconds,
            "simulation mode, actions will not run"
        );
    }
}

#[async_trait]
impl Runner for SimulationRunner {
    fn mode(&self) -> &'static str {
        "simulation"
    }

    fn add_action(&self, action: Arc<Action>) {
        self.core.add_action(action);
    }

    fn remove_action(&self, name: &str) -> Option<Arc<Action>> {
        self.core.remove_action(name)
    }

    fn set_action_enabled(&self, name: &str, enabled: bool) -> bool {
        self.core.set_action_enabled(name, enabled)
    }

    fn start(&self) -> Result<(), RunnerError> {
        self.core.start()
    }

    async fn stop(&self) -> Result<(), RunnerError> {
        self.core.stop().await
    }

    async fn join(&self) -> Result<(), RunnerError> {
        self.core.join().await
    }

    fn pause(&self) {
        self.core.pause();
    }

    fn resume(&self) {
        self.core.resume();
    }

    fn is_running(&self) -> bool {
        self.core.is_running()
    }

    fn is_paused(&self) -> bool {
        self.core.is_paused()
    }

    fn cycles(&self) -> u64 {
        self.core.cycles()
    }

    fn statuses(&self) -> Vec<ActionStatus> {
        self.core.statuses()
    }

    fn set_status_callback(&self, callback: Option<StatusCallback>) {
        self.core.set_status_callback(callback);
    }

    fn policy(&self) -> RunnerPolicy {
        self.core.policy()
    }

    fn set_policy(&self, policy: RunnerPolicy) -> Result<(), ConfigError> {
        self.core.set_policy(policy)
    }
}
