//! The live runner: each pass executes eligible actions for real, saves
//! cooldowns after every execution and spaces actions with a random gap.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Span, debug};

use super::Runner;
use super::control::{Core, Mode, PassReport, SaveHook, Shared};
use super::policy::RunnerPolicy;
use super::status::{ActionStatus, Phase, StatusCallback};
use crate::action::{Action, CooldownSnapshot};
use crate::error::{ConfigError, RunnerError};

/// Executes each eligible action for real, on the blocking pool.
pub(crate) async fn run_pass(
    shared: &Shared,
    policy: &RunnerPolicy,
) -> Result<PassReport, RunnerError> {
    let mut executed = 0;
    for action in shared.actions() {
        if shared.signals.checkpoint().await.interrupted() {
            return Ok(PassReport {
                executed,
                interrupted: true,
            });
        }
        if !action.is_enabled() {
            continue;
        }
        if action.is_on_cooldown() {
            debug!(
                action = %action.name(),
                remaining_minutes = action.cooldown_remaining(),
                "on cooldown, skipping"
            );
            continue;
        }

        shared.report(&action, Phase::Working);
        let worker = action.clone();
        let ran = match tokio::task::spawn_blocking(move || worker.execute()).await {
            Ok(Ok(ran)) => ran,
            Ok(Err(err)) => {
                shared.report(&action, Phase::Waiting);
                return Err(err.into());
            }
            Err(err) => {
                shared.report(&action, Phase::Waiting);
                return Err(err.into());
            }
        };
        shared.report(&action, Phase::Done);
        if !ran {
            continue;
        }
        executed += 1;
        shared.save_cooldowns();

        let gap = policy.draw_action_gap(&mut rand::thread_rng());
        debug!(secs = gap.as_secs_f64(), "gap before next action");
        if shared.signals.interruptible_sleep(gap).await.interrupted() {
            return Ok(PassReport {
                executed,
                interrupted: true,
            });
        }
    }
    Ok(PassReport {
        executed,
        interrupted: false,
    })
}

/// Runs registered actions through their state machines on a background
/// loop, honoring cooldowns, night suppression and breaks.
pub struct ActionRunner {
    core: Core,
}

impl ActionRunner {
    pub fn new(policy: RunnerPolicy) -> Self {
        Self {
            core: Core::new(Mode::Live, policy),
        }
    }

    /// Log under `span` instead of the default `runner{mode=live}`.
    pub fn with_span(policy: RunnerPolicy, span: Span) -> Self {
        Self {
            core: Core::with_span(Mode::Live, policy, span),
        }
    }

    /// Called after every real execution, e.g. to persist cooldowns.
    pub fn set_save_hook(&self, hook: Option<SaveHook>) {
        self.core.set_save_hook(hook);
    }

    /// Restore cooldowns of registered actions from a saved snapshot, e.g.
    /// the one the save hook last wrote. Returns how many actions matched.
    pub fn restore_cooldowns(&self, snapshot: &CooldownSnapshot) -> usize {
        self.core.restore_cooldowns(snapshot)
    }
}

#[async_trait]
impl Runner for ActionRunner {
    fn mode(&self) -> &'static str {
        "live"
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
