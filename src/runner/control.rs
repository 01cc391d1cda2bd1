//! The control loop shared by the live and simulation runners: night
//! suppression, breaks, one pass over the actions, refresh sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use super::live;
use super::policy::RunnerPolicy;
use super::signals::{POLL_INTERVAL, RunSignals, SleepOutcome};
use super::simulation;
use super::status::{ActionStatus, Phase, StatusBoard, StatusCallback};
use crate::action::{Action, CooldownSnapshot};
use crate::error::{ConfigError, RunnerError};
use crate::util::{lock, read, write};

/// How long `stop` waits for the loop to notice the interrupt.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives a fresh snapshot of every action's cooldown after each real
/// execution.
pub type SaveHook = Arc<dyn Fn(&CooldownSnapshot) + Send + Sync>;

type LocalClock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Live,
    Simulation,
}

impl Mode {
    fn label(self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Simulation => "simulation",
        }
    }
}

/// How a pass over the actions ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PassReport {
    pub executed: usize,
    pub interrupted: bool,
}

/// State the loop and the caller both touch.
pub(crate) struct Shared {
    pub mode: Mode,
    pub signals: RunSignals,
    pub board: StatusBoard,
    policy: RwLock<RunnerPolicy>,
    actions: RwLock<Vec<Arc<Action>>>,
    last_break: Mutex<Option<DateTime<Utc>>>,
    cycles: AtomicU64,
    save_hook: Mutex<Option<SaveHook>>,
    local_time: Mutex<LocalClock>,
}

impl Shared {
    pub fn policy(&self) -> RunnerPolicy {
        read(&self.policy).clone()
    }

    /// Snapshot of the registered actions; the list may change mid-pass.
    pub fn actions(&self) -> Vec<Arc<Action>> {
        read(&self.actions).clone()
    }

    pub fn save_cooldowns(&self) {
        let hook = lock(&self.save_hook).clone();
        let Some(hook) = hook else {
            return;
        };
        let now = Utc::now();
        let mut snapshot = CooldownSnapshot::default();
        for action in self.actions() {
            snapshot.insert(action.key(), action.cooldown_record(now));
        }
        hook(&snapshot);
    }

    /// Restore every registered action's cooldown found in `snapshot`.
    /// Returns how many actions matched.
    pub fn restore_cooldowns(&self, snapshot: &CooldownSnapshot) -> usize {
        let now = Utc::now();
        let mut restored = 0;
        for action in self.actions() {
            if let Some(record) = snapshot.get(action.key()) {
                action.restore_cooldown(record, now);
                restored += 1;
            }
        }
        restored
    }

    /// Publish a phase for `action`, unless it was removed meanwhile.
    pub fn report(&self, action: &Action, phase: Phase) {
        let registered = read(&self.actions)
            .iter()
            .any(|a| std::ptr::eq(a.as_ref(), action));
        if registered {
            self.board.set(action.key(), action.name(), phase);
        }
    }

    fn local_time(&self) -> NaiveTime {
        let clock = lock(&self.local_time).clone();
        clock()
    }

    fn reset_enabled_to_waiting(&self) {
        for action in self.actions() {
            if action.is_enabled() {
                self.board.set(action.key(), action.name(), Phase::Waiting);
            }
        }
    }

    fn reset_to_idle(&self) {
        for action in self.actions() {
            self.board.set(
                action.key(),
                action.name(),
                Phase::idle_for(action.is_enabled()),
            );
        }
    }
}

/// Clears the run flags however the loop exits.
struct FinishGuard<'a>(&'a RunSignals);

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Owns the shared state and the background worker of one runner.
pub(crate) struct Core {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl Core {
    pub fn new(mode: Mode, policy: RunnerPolicy) -> Self {
        Self::with_span(mode, policy, info_span!("runner", mode = mode.label()))
    }

    pub fn with_span(mode: Mode, policy: RunnerPolicy, span: Span) -> Self {
        let local: LocalClock = Arc::new(|| Local::now().time());
        Self {
            shared: Arc::new(Shared {
                mode,
                signals: RunSignals::new(),
                board: StatusBoard::new(),
                policy: RwLock::new(policy),
                actions: RwLock::new(Vec::new()),
                last_break: Mutex::new(None),
                cycles: AtomicU64::new(0),
                save_hook: Mutex::new(None),
                local_time: Mutex::new(local),
            }),
            worker: Mutex::new(None),
            span,
        }
    }

    /// Register an action. One with the same key is replaced in place.
    pub fn add_action(&self, action: Arc<Action>) {
        let phase = Phase::idle_for(action.is_enabled());
        {
            let mut actions = write(&self.shared.actions);
            let existing = actions.iter().position(|a| a.key() == action.key());
            match existing {
                Some(index) => actions[index] = action.clone(),
                None => actions.push(action.clone()),
            }
        }
        debug!(
            parent: &self.span,
            action = %action.name(),
            key = %action.key(),
            "action registered"
        );
        self.shared.board.set(action.key(), action.name(), phase);
    }

    /// Remove by name or key.
    pub fn remove_action(&self, name: &str) -> Option<Arc<Action>> {
        let removed = {
            let mut actions = write(&self.shared.actions);
            let index = actions
                .iter()
                .position(|a| a.name() == name || a.key() == name)?;
            actions.remove(index)
        };
        self.shared.board.remove(removed.key());
        debug!(parent: &self.span, action = %removed.name(), "action removed");
        Some(removed)
    }

    pub fn set_action_enabled(&self, name: &str, enabled: bool) -> bool {
        let Some(action) = self
            .shared
            .actions()
            .into_iter()
            .find(|a| a.name() == name || a.key() == name)
        else {
            return false;
        };
        action.set_enabled(enabled);
        if self.shared.board.get(action.key()) != Some(Phase::Working) {
            self.shared
                .board
                .set(action.key(), action.name(), Phase::idle_for(enabled));
        }
        info!(parent: &self.span, action = %action.name(), enabled, "action toggled");
        true
    }

    pub fn set_policy(&self, policy: RunnerPolicy) -> Result<(), ConfigError> {
        policy.validate()?;
        *write(&self.shared.policy) = policy;
        Ok(())
    }

    pub fn policy(&self) -> RunnerPolicy {
        self.shared.policy()
    }

    pub fn set_status_callback(&self, callback: Option<StatusCallback>) {
        self.shared.board.set_callback(callback);
    }

    pub fn set_save_hook(&self, hook: Option<SaveHook>) {
        *lock(&self.shared.save_hook) = hook;
    }

    pub fn restore_cooldowns(&self, snapshot: &CooldownSnapshot) -> usize {
        let restored = self.shared.restore_cooldowns(snapshot);
        info!(parent: &self.span, restored, "cooldowns restored");
        restored
    }

    #[cfg(test)]
    pub(crate) fn set_local_clock(&self, clock: impl Fn() -> NaiveTime + Send + Sync + 'static) {
        *lock(&self.shared.local_time) = Arc::new(clock);
    }

    pub fn is_running(&self) -> bool {
        self.shared.signals.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.signals.is_paused()
    }

    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::SeqCst)
    }

    pub fn statuses(&self) -> Vec<ActionStatus> {
        let now = Utc::now();
        self.shared
            .actions()
            .iter()
            .map(|action| {
                let phase = self
                    .shared
                    .board
                    .phase_or_idle(action.key(), action.is_enabled());
                match self.shared.mode {
                    Mode::Live => ActionStatus::live(action, phase, now),
                    Mode::Simulation => ActionStatus::simulated(action, phase),
                }
            })
            .collect()
    }

    /// Spawn the loop on the current tokio runtime. A second call while
    /// the loop runs is a no-op.
    pub fn start(&self) -> Result<(), RunnerError> {
        let handle = Handle::try_current().map_err(|_| RunnerError::NoRuntime)?;
        if !self.shared.signals.begin() {
            warn!(parent: &self.span, "runner already running");
            return Ok(());
        }
        info!(parent: &self.span, "starting runner");
        let shared = self.shared.clone();
        let worker = handle.spawn(run_loop(shared).instrument(self.span.clone()));
        *lock(&self.worker) = Some(worker);
        Ok(())
    }

    /// Request an interrupt, wait up to [`STOP_TIMEOUT`] for the loop to
    /// exit, then report every action idle.
    pub async fn stop(&self) -> Result<(), RunnerError> {
        if !self.is_running() {
            warn!(parent: &self.span, "runner not running");
        } else {
            info!(parent: &self.span, "stopping runner");
        }
        self.shared.signals.request_interrupt();

        let worker = lock(&self.worker).take();
        let joined = match worker {
            Some(mut worker) => match tokio::time::timeout(STOP_TIMEOUT, &mut worker).await {
                Ok(result) => result.map_err(RunnerError::from),
                Err(_) => {
                    warn!(
                        parent: &self.span,
                        timeout_secs = STOP_TIMEOUT.as_secs(),
                        "runner loop did not exit in time, detaching"
                    );
                    Ok(())
                }
            },
            // Someone else holds the handle (a `join` in flight): watch the flag.
            None => {
                let idle = async {
                    while self.is_running() {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                };
                if tokio::time::timeout(STOP_TIMEOUT, idle).await.is_err() {
                    warn!(parent: &self.span, "runner loop did not exit in time");
                }
                Ok(())
            }
        };

        self.shared.reset_to_idle();
        joined
    }

    /// Wait for the loop to end on its own.
    pub async fn join(&self) -> Result<(), RunnerError> {
        let worker = lock(&self.worker).take();
        match worker {
            Some(worker) => worker.await.map_err(RunnerError::from),
            None => Ok(()),
        }
    }

    pub fn pause(&self) {
        if !self.is_running() {
            warn!(parent: &self.span, "cannot pause, runner not running");
            return;
        }
        self.shared.signals.set_paused(true);
        info!(parent: &self.span, "runner paused");
    }

    pub fn resume(&self) {
        if !self.is_running() {
            warn!(parent: &self.span, "cannot resume, runner not running");
            return;
        }
        self.shared.signals.set_paused(false);
        info!(parent: &self.span, "runner resumed");
    }
}

async fn run_loop(shared: Arc<Shared>) {
    let _finish = FinishGuard(&shared.signals);
    info!("runner loop started");
    match drive(&shared).await {
        Ok(()) => info!(
            cycles = shared.cycles.load(Ordering::SeqCst),
            "runner loop stopped"
        ),
        Err(err) => error!(error = %err, "runner loop failed"),
    }
}

async fn drive(shared: &Shared) -> Result<(), RunnerError> {
    loop {
        if shared.signals.checkpoint().await.interrupted() {
            info!("run loop interrupted");
            return Ok(());
        }

        let policy = shared.policy();
        if policy.night.is_night(shared.local_time()) {
            info!("night window, skipping cycle");
            if sleep(shared, policy.refresh_interval()).await.interrupted() {
                return Ok(());
            }
            continue;
        }

        let now = Utc::now();
        let last_break = *lock(&shared.last_break);
        if policy
            .breaks
            .should_take(last_break, now, rand::random::<f64>)
        {
            let duration = policy.breaks.draw_duration(&mut rand::thread_rng());
            *lock(&shared.last_break) = Some(now);
            info!(minutes = duration.as_secs_f64() / 60.0, "taking a break");
            if sleep(shared, duration).await.interrupted() {
                return Ok(());
            }
            info!("break over");
        }

        let cycle = shared.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        info!(cycle, "starting cycle");
        shared.reset_enabled_to_waiting();

        let report = match shared.mode {
            Mode::Live => live::run_pass(shared, &policy).await?,
            Mode::Simulation => simulation::run_pass(shared, &policy).await,
        };
        if report.interrupted {
            info!(cycle, "cycle interrupted");
            return Ok(());
        }
        if report.executed == 0 {
            info!(cycle, "no actions ran this cycle");
        }
        info!(cycle, executed = report.executed, "cycle complete");

        if !policy.continuous_running {
            info!("continuous running disabled, stopping after one cycle");
            return Ok(());
        }

        debug!(
            secs = policy.refresh_rate_seconds,
            "waiting for next cycle"
        );
        if sleep(shared, policy.refresh_interval()).await.interrupted() {
            return Ok(());
        }
    }
}

async fn sleep(shared: &Shared, duration: Duration) -> SleepOutcome {
    shared.signals.interruptible_sleep(duration).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::NullPerception;
    use crate::runner::policy::{BreakPolicy, NightWindow, TestMode};
    use crate::state_machine::Trigger;

    fn policy(continuous: bool) -> RunnerPolicy {
        RunnerPolicy {
            refresh_rate_seconds: 0.2,
            continuous_running: continuous,
            breaks: BreakPolicy {
                chance: 0.0,
                ..Default::default()
            },
            action_gap_min_seconds: 0.0,
            action_gap_max_seconds: 0.0,
            test_mode: TestMode {
                enabled: false,
                dummy_execution_seconds: 0.05,
            },
            ..Default::default()
        }
    }

    fn action(name: &str) -> Arc<Action> {
        Arc::new(
            Action::builder(name, Arc::new(NullPerception))
                .on(Trigger::START, |_| Some(Trigger::SUCCEED))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let core = Core::new(Mode::Live, policy(false));
        assert!(matches!(core.start(), Err(RunnerError::NoRuntime)));
        assert!(!core.is_running());
    }

    #[test]
    fn add_replace_and_remove_actions() {
        let core = Core::new(Mode::Live, policy(false));
        core.add_action(action("Open Mails"));
        core.add_action(action("Gather Resources"));
        core.add_action(action("Open Mails"));
        let names: Vec<_> = core.statuses().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["Open Mails", "Gather Resources"]);

        assert!(core.remove_action("gather_resources").is_some());
        assert!(core.remove_action("missing").is_none());
        assert_eq!(core.statuses().len(), 1);
    }

    #[test]
    fn toggling_updates_reported_phase() {
        let core = Core::new(Mode::Live, policy(false));
        core.add_action(action("Open Mails"));
        assert!(core.set_action_enabled("open_mails", false));
        let status = &core.statuses()[0];
        assert!(!status.enabled);
        assert_eq!(status.phase, Phase::NotAvailable);
        assert!(!core.set_action_enabled("nope", true));
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let core = Core::new(Mode::Live, policy(false));
        let mut bad = policy(false);
        bad.refresh_rate_seconds = -1.0;
        assert!(core.set_policy(bad).is_err());
        assert_eq!(core.policy().refresh_rate_seconds, 0.2);
    }

    #[test]
    fn actions_sharing_a_name_keep_separate_phases() {
        let core = Core::new(Mode::Live, policy(false));
        let wood = Arc::new(
            Action::builder("Gather", Arc::new(NullPerception))
                .key("gather_wood")
                .build()
                .unwrap(),
        );
        let food = Arc::new(
            Action::builder("Gather", Arc::new(NullPerception))
                .key("gather_food")
                .build()
                .unwrap(),
        );
        core.add_action(wood.clone());
        core.add_action(food.clone());
        core.set_action_enabled("gather_food", false);
        core.shared.report(&wood, Phase::Working);

        let phases: Vec<_> = core
            .statuses()
            .into_iter()
            .map(|s| (s.key, s.phase))
            .collect();
        assert_eq!(
            phases,
            [
                ("gather_wood".to_string(), Phase::Working),
                ("gather_food".to_string(), Phase::NotAvailable),
            ]
        );
    }

    #[test]
    fn removed_action_is_not_reported_again() {
        let core = Core::new(Mode::Live, policy(false));
        let mails = action("Open Mails");
        core.add_action(mails.clone());
        core.remove_action("open_mails");

        core.shared.report(&mails, Phase::Done);
        assert_eq!(core.shared.board.get("open_mails"), None);
        assert!(core.statuses().is_empty());
    }

    #[test]
    fn snapshot_restores_cooldowns_of_registered_actions() {
        let before = action("Open Mails");
        before.execute().unwrap();
        let mut snapshot = CooldownSnapshot::default();
        snapshot.insert(before.key(), before.cooldown_record(Utc::now()));
        snapshot.insert("unknown", before.cooldown_record(Utc::now()));

        let core = Core::new(Mode::Live, policy(false));
        let after = action("Open Mails");
        let other = action("Gather Resources");
        core.add_action(after.clone());
        core.add_action(other.clone());

        assert_eq!(core.restore_cooldowns(&snapshot), 1);
        assert!(after.is_on_cooldown());
        assert!(after.cooldown_remaining() > 29.0);
        assert!(!other.is_on_cooldown());
    }

    fn breaking(min_minutes: f64, max_minutes: f64) -> RunnerPolicy {
        let mut with_breaks = policy(true);
        with_breaks.breaks = BreakPolicy {
            chance: 1.0,
            min_minutes,
            max_minutes,
            min_interval_minutes: 60.0,
        };
        with_breaks
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn break_delays_the_first_cycle_and_is_spaced_out() {
        // 0.005 minutes is a 300 ms break.
        let core = Core::new(Mode::Live, breaking(0.005, 0.005));
        core.add_action(action("Open Mails"));

        let started = Utc::now();
        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(core.cycles(), 0);
        let first_break = (*lock(&core.shared.last_break)).unwrap();
        assert!(first_break >= started);

        tokio::time::sleep(Duration::from_millis(900)).await;
        // Refresh is 200 ms, so several cycles ran after the break without another.
        assert!(core.cycles() >= 2);
        assert_eq!(*lock(&core.shared.last_break), Some(first_break));
        core.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_break_returns_promptly() {
        let core = Core::new(Mode::Live, breaking(10.0, 10.0));
        let mails = action("Open Mails");
        core.add_action(mails.clone());

        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(lock(&core.shared.last_break).is_some());

        let stopping = std::time::Instant::now();
        core.stop().await.unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(2));
        assert!(!core.is_running());
        assert_eq!(core.cycles(), 0);
        assert_eq!(mails.last_execution(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_pass_runs_each_enabled_action_once() {
        let core = Core::new(Mode::Live, policy(false));
        let first = action("Open Mails");
        let second = action("Gather Resources");
        let disabled = action("Close Game");
        disabled.set_enabled(false);
        core.add_action(first.clone());
        core.add_action(second.clone());
        core.add_action(disabled.clone());

        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = phases.clone();
        core.set_status_callback(Some(Arc::new(move |name: &str, phase: Phase| {
            sink.lock().unwrap().push((name.to_string(), phase));
        })));
        let saves = Arc::new(AtomicU64::new(0));
        let counter = saves.clone();
        core.set_save_hook(Some(Arc::new(move |snapshot: &CooldownSnapshot| {
            assert!(snapshot.get("open_mails").is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        core.start().unwrap();
        core.join().await.unwrap();

        assert!(!core.is_running());
        assert_eq!(core.cycles(), 1);
        assert!(first.is_on_cooldown());
        assert!(second.is_on_cooldown());
        assert!(!disabled.is_on_cooldown());
        assert_eq!(disabled.last_execution(), None);
        assert_eq!(saves.load(Ordering::SeqCst), 2);

        let phases = phases.lock().unwrap();
        let open_mails: Vec<_> = phases
            .iter()
            .filter(|(name, _)| name == "Open Mails")
            .map(|(_, phase)| *phase)
            .collect();
        assert_eq!(open_mails, [Phase::Working, Phase::Done]);
        assert!(phases.iter().all(|(name, _)| name != "Close Game"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_cycle_skips_actions_on_cooldown() {
        let core = Core::new(Mode::Live, policy(true));
        let first = action("Open Mails");
        core.add_action(first.clone());

        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(core.cycles() >= 2);
        core.stop().await.unwrap();

        assert!(!core.is_running());
        let status = &core.statuses()[0];
        assert_eq!(status.phase, Phase::Waiting);
        assert!(status.on_cooldown);
        assert!(status.cooldown_remaining > 29.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn night_window_suppresses_every_pass() {
        let mut night_policy = policy(true);
        night_policy.night = NightWindow {
            enabled: true,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        };
        let core = Core::new(Mode::Live, night_policy);
        core.set_local_clock(|| NaiveTime::from_hms_opt(23, 30, 0).unwrap());
        let first = action("Open Mails");
        core.add_action(first.clone());

        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        core.stop().await.unwrap();

        assert_eq!(core.cycles(), 0);
        assert_eq!(first.last_execution(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_interrupts_refresh_sleep_promptly() {
        let mut slow = policy(true);
        slow.refresh_rate_seconds = 600.0;
        let core = Core::new(Mode::Live, slow);
        core.add_action(action("Open Mails"));

        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let started = std::time::Instant::now();
        core.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!core.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn start_twice_runs_one_loop() {
        let core = Core::new(Mode::Live, policy(true));
        core.add_action(action("Open Mails"));
        core.start().unwrap();
        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(core.cycles(), 1);
        core.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pause_holds_the_loop_until_resumed() {
        let core = Core::new(Mode::Live, policy(true));
        core.add_action(action("Open Mails"));
        core.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        core.pause();
        assert!(core.is_paused());
        tokio::time::sleep(Duration::from_millis(300)).await;
        let cycles = core.cycles();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(core.cycles(), cycles);

        core.resume();
        assert!(!core.is_paused());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(core.cycles() > cycles);
        core.stop().await.unwrap();
    }

    #[test]
    fn pause_when_stopped_is_ignored() {
        let core = Core::new(Mode::Live, policy(true));
        core.pause();
        assert!(!core.is_paused());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_execution_ends_the_loop() {
        let core = Core::new(Mode::Live, policy(true));
        let looping = Arc::new(
            Action::builder("Spinner", Arc::new(NullPerception))
                .on(Trigger::START, |_| Some(Trigger::RESET))
                .on(Trigger::RESET, |_| Some(Trigger::START))
                .build()
                .unwrap(),
        );
        core.add_action(looping);

        core.start().unwrap();
        core.join().await.unwrap();
        assert!(!core.is_running());
        assert_eq!(core.cycles(), 1);
        // Status stays readable after a loop-fatal error.
        assert_eq!(core.statuses().len(), 1);
    }
}
