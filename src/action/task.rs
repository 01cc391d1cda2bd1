use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, info_span, warn};

use super::cooldown::{CooldownRecord, CooldownTracker};
use super::perception::{Location, Perception};
use crate::error::{ActionError, EngineError};
use crate::state_machine::{
    DelayProfile, DelayProfiles, DelaySpec, Fired, MachineBuilder, Pacer, State, StateMachine,
    Transition, Trigger,
};
use crate::util::lock;

/// Upper bound on transitions fired by one attempt. A retry starts a fresh
/// count, so the retry budget alone bounds how many attempts a run makes.
pub const MAX_WORKFLOW_STEPS: usize = 256;

/// Per-action settings as they appear in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    pub enabled: bool,
    pub cooldown_minutes: f64,
    /// Failed attempts allowed per run before the action is forced to completion.
    pub max_retries: u32,
    /// Base duration of the built-in `wait` step, in seconds.
    pub default_wait_seconds: f64,
    /// Named delay profiles overriding the built-in ones.
    pub delay_profiles: HashMap<String, DelayProfile>,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_minutes: 30.0,
            max_retries: 3,
            default_wait_seconds: 1.0,
            delay_profiles: HashMap::new(),
        }
    }
}

/// What guards and effects see while an action runs.
pub struct ActionContext {
    name: String,
    perception: Arc<dyn Perception>,
    default_wait_seconds: f64,
    marks: HashMap<String, Location>,
}

impl ActionContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn perception(&self) -> &dyn Perception {
        self.perception.as_ref()
    }

    pub fn default_wait_seconds(&self) -> f64 {
        self.default_wait_seconds
    }

    /// Remember a location for a later step of the same workflow.
    pub fn mark(&mut self, key: impl Into<String>, at: Location) {
        self.marks.insert(key.into(), at);
    }

    pub fn recall(&self, key: &str) -> Option<Location> {
        self.marks.get(key).copied()
    }
}

/// How the most recent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RunOutcome {
    Succeeded,
    /// Every attempt failed; the action was forced to completion.
    Exhausted { attempts: u32 },
    /// Reached completion without passing through success or failure.
    Finished,
    /// The chain stopped outside the terminal state.
    Stalled { state: State },
}

/// Readable without waiting for a run in progress.
#[derive(Debug, Clone)]
struct Progress {
    state: State,
    retry_count: u32,
    trail: Vec<State>,
    last_outcome: Option<RunOutcome>,
}

struct Workflow {
    machine: StateMachine<ActionContext>,
    ctx: ActionContext,
    max_retries: u32,
    retry_count: u32,
}

impl Workflow {
    /// Drive one run from idle to wherever the chain of triggers stops.
    fn run(&mut self, progress: &Mutex<Progress>) -> Result<RunOutcome, EngineError> {
        self.machine.clear_history();
        {
            let mut p = lock(progress);
            p.trail.clear();
        }

        let mut queue = VecDeque::new();
        if self.machine.state() != State::Idle {
            debug!(state = %self.machine.state(), "machine left mid-run, resetting");
            queue.push_back(Trigger::RESET);
        }
        queue.push_back(Trigger::START);

        let mut steps = 0;
        let mut succeeded = false;
        let mut exhausted = None;

        while let Some(trigger) = queue.pop_front() {
            steps += 1;
            if steps > MAX_WORKFLOW_STEPS {
                return Err(EngineError::StepLimit {
                    limit: MAX_WORKFLOW_STEPS,
                    trigger,
                    state: self.machine.state(),
                });
            }

            let Fired::Moved { to, follow_up, .. } = self.machine.fire(trigger, &mut self.ctx) else {
                continue;
            };

            match to {
                State::Failed => {
                    self.retry_count += 1;
                    queue.clear();
                    if self.retry_count < self.max_retries {
                        steps = 0;
                        warn!(
                            attempt = self.retry_count,
                            max = self.max_retries,
                            "action failed, retrying"
                        );
                        queue.push_back(Trigger::RESET);
                        queue.push_back(Trigger::START);
                    } else {
                        warn!(
                            attempts = self.retry_count,
                            max = self.max_retries,
                            "action failed, retries exhausted"
                        );
                        exhausted = Some(self.retry_count);
                        queue.push_back(Trigger::COMPLETE);
                    }
                }
                State::Succeeded => {
                    self.retry_count = 0;
                    succeeded = true;
                    queue.push_front(follow_up.unwrap_or(Trigger::COMPLETE));
                }
                _ => {
                    if let Some(next) = follow_up {
                        queue.push_front(next);
                    }
                }
            }

            let mut p = lock(progress);
            p.state = to;
            p.retry_count = self.retry_count;
            p.trail.push(to);
        }

        let outcome = match (self.machine.state(), exhausted) {
            (State::Completed, Some(attempts)) => RunOutcome::Exhausted { attempts },
            (State::Completed, None) if succeeded => RunOutcome::Succeeded,
            (State::Completed, None) => RunOutcome::Finished,
            (state, _) => RunOutcome::Stalled { state },
        };
        lock(progress).last_outcome = Some(outcome);
        Ok(outcome)
    }
}

/// A named, schedulable unit of work built on one [`StateMachine`].
///
/// Shared between the runner's worker and callers reading status, so every
/// field is behind its own lock or atomic. The workflow lock is held for
/// the whole run; status reads never take it.
pub struct Action {
    name: String,
    key: String,
    enabled: AtomicBool,
    cooldown: Mutex<CooldownTracker>,
    progress: Mutex<Progress>,
    workflow: Mutex<Workflow>,
    span: Span,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Lowercase, whitespace collapsed to underscores: "Gather Resources" → "gather_resources".
pub fn action_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

impl Action {
    pub fn builder(name: impl Into<String>, perception: Arc<dyn Perception>) -> ActionBuilder {
        ActionBuilder::new(name.into(), perception)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identifier used in configuration and cooldown snapshots.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn state(&self) -> State {
        lock(&self.progress).state
    }

    pub fn retry_count(&self) -> u32 {
        lock(&self.progress).retry_count
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        lock(&self.progress).last_outcome
    }

    /// States entered during the most recent run.
    pub fn trail(&self) -> Vec<State> {
        lock(&self.progress).trail.clone()
    }

    pub fn last_execution(&self) -> Option<DateTime<Utc>> {
        lock(&self.cooldown).last_execution()
    }

    pub fn is_on_cooldown(&self) -> bool {
        self.is_on_cooldown_at(Utc::now())
    }

    pub fn is_on_cooldown_at(&self, now: DateTime<Utc>) -> bool {
        lock(&self.cooldown).is_on_cooldown(now)
    }

    /// Remaining cooldown in minutes.
    pub fn cooldown_remaining(&self) -> f64 {
        self.cooldown_remaining_at(Utc::now())
    }

    pub fn cooldown_remaining_at(&self, now: DateTime<Utc>) -> f64 {
        lock(&self.cooldown).remaining_minutes(now)
    }

    pub fn cooldown_record(&self, now: DateTime<Utc>) -> CooldownRecord {
        lock(&self.cooldown).record(now)
    }

    pub fn restore_cooldown(&self, record: &CooldownRecord, now: DateTime<Utc>) {
        lock(&self.cooldown).restore(record, now);
    }

    /// Apply changed settings. Takes effect from the next run.
    pub fn apply_settings(&self, settings: &ActionSettings) -> Result<(), EngineError> {
        let profiles = DelayProfiles::with_overrides(settings.delay_profiles.clone())?;
        self.set_enabled(settings.enabled);
        lock(&self.cooldown).set_cooldown_minutes(settings.cooldown_minutes);
        let mut workflow = lock(&self.workflow);
        workflow.max_retries = settings.max_retries;
        workflow.ctx.default_wait_seconds = settings.default_wait_seconds;
        workflow.machine.set_profiles(profiles);
        Ok(())
    }

    /// Run the workflow once.
    ///
    /// Returns `Ok(false)` without side effects when the action is disabled
    /// or on cooldown. Otherwise records the execution time, drives the
    /// machine from `start` and returns `Ok(true)`, whatever the outcome.
    pub fn execute(&self) -> Result<bool, ActionError> {
        self.execute_at(Utc::now())
    }

    pub fn execute_at(&self, now: DateTime<Utc>) -> Result<bool, ActionError> {
        let _entered = self.span.enter();

        if !self.is_enabled() {
            info!("action disabled, skipping");
            return Ok(false);
        }

        {
            let mut cooldown = lock(&self.cooldown);
            if cooldown.is_on_cooldown(now) {
                info!(
                    remaining_minutes = cooldown.remaining_minutes(now),
                    "action on cooldown"
                );
                return Ok(false);
            }
            cooldown.mark_executed(now);
        }

        info!("executing action");
        let outcome = lock(&self.workflow)
            .run(&self.progress)
            .map_err(|source| ActionError::Engine {
                action: self.name.clone(),
                source,
            })?;

        match outcome {
            RunOutcome::Succeeded => info!("action succeeded"),
            RunOutcome::Finished => info!("action completed"),
            RunOutcome::Exhausted { attempts } => {
                warn!(attempts, "action forced to completion after repeated failures")
            }
            RunOutcome::Stalled { state } => warn!(%state, "action stopped before completing"),
        }
        Ok(true)
    }
}

/// Registers the common transitions every action shares, then the
/// action's own, and validates the result.
pub struct ActionBuilder {
    name: String,
    key: Option<String>,
    settings: ActionSettings,
    perception: Arc<dyn Perception>,
    machine: MachineBuilder<ActionContext>,
    pacer: Option<Arc<dyn Pacer>>,
    span: Option<Span>,
}

fn common_transitions(mut machine: MachineBuilder<ActionContext>) -> MachineBuilder<ActionContext> {
    let logged = |step: &'static str| {
        move |ctx: &mut ActionContext| -> Option<Trigger> {
            debug!(action = %ctx.name, step, "step");
            None
        }
    };

    machine.push(Transition::new(Trigger::START, State::Idle, State::Starting).effect(logged("start")));
    machine.push(
        Transition::new(Trigger::DETECT, State::Starting, State::Detecting).effect(logged("detect")),
    );
    machine.push(
        Transition::new(Trigger::CLICK, State::Detecting, State::Clicking).effect(logged("click")),
    );
    machine.push(Transition::from_any(Trigger::WAIT, State::Waiting).effect(
        |ctx: &mut ActionContext| {
            let base = ctx.default_wait_seconds;
            let waited = ctx.perception.wait(base * 0.8, base * 1.2);
            debug!(action = %ctx.name, secs = waited, "waited");
            None
        },
    ));
    machine.push(Transition::from_any(Trigger::VERIFY, State::Verifying).effect(logged("verify")));
    machine.push(
        Transition::from_any(Trigger::EXTRACT_TEXT, State::ExtractingText)
            .effect(logged("extract_text")),
    );
    machine.push(Transition::from_any(Trigger::SUCCEED, State::Succeeded).effect(logged("succeed")));
    machine.push(Transition::from_any(Trigger::FAIL, State::Failed).effect(logged("fail")));
    machine.push(Transition::from_any(Trigger::COMPLETE, State::Completed).effect(logged("complete")));
    machine.push(Transition::from_any(Trigger::RESET, State::Idle).effect(logged("reset")));
    machine
}

impl ActionBuilder {
    fn new(name: String, perception: Arc<dyn Perception>) -> Self {
        Self {
            name,
            key: None,
            settings: ActionSettings::default(),
            perception,
            machine: common_transitions(MachineBuilder::new()),
            pacer: None,
            span: None,
        }
    }

    pub fn settings(mut self, settings: ActionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the key derived from the name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn transition(mut self, transition: Transition<ActionContext>) -> Self {
        self.machine.push(transition);
        self
    }

    /// Replace the effect of a common transition (`start`, `succeed`, ...).
    pub fn on(
        mut self,
        trigger: Trigger,
        effect: impl FnMut(&mut ActionContext) -> Option<Trigger> + Send + 'static,
    ) -> Self {
        if !self.machine.set_effect(trigger, effect) {
            warn!(action = %self.name, %trigger, "no transition to attach effect to");
        }
        self
    }

    /// Set the delay of a common transition.
    pub fn delay(mut self, trigger: Trigger, spec: DelaySpec) -> Self {
        if !self.machine.set_delay(trigger, spec) {
            warn!(action = %self.name, %trigger, "no transition to attach delay to");
        }
        self
    }

    pub fn pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    /// Log span for this action; defaults to `action{name=...}`.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<Action, EngineError> {
        let profiles = DelayProfiles::with_overrides(self.settings.delay_profiles.clone())?;
        let mut machine = self.machine.profiles(profiles);
        if let Some(pacer) = self.pacer {
            machine = machine.pacer(pacer);
        }
        let machine = machine.build()?;

        let key = self.key.unwrap_or_else(|| action_key(&self.name));
        let span = self
            .span
            .unwrap_or_else(|| info_span!("action", name = %self.name));

        Ok(Action {
            enabled: AtomicBool::new(self.settings.enabled),
            cooldown: Mutex::new(CooldownTracker::new(self.settings.cooldown_minutes)),
            progress: Mutex::new(Progress {
                state: machine.state(),
                retry_count: 0,
                trail: Vec::new(),
                last_outcome: None,
            }),
            workflow: Mutex::new(Workflow {
                machine,
                ctx: ActionContext {
                    name: self.name.clone(),
                    perception: self.perception,
                    default_wait_seconds: self.settings.default_wait_seconds,
                    marks: HashMap::new(),
                },
                max_retries: self.settings.max_retries,
                retry_count: 0,
            }),
            name: self.name,
            key,
            span,
        })
    }
}
