//! Run-state flags shared between a runner's control surface and its loop,
//! and the interruptible sleep every blocking point of the loop goes through.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Granularity at which sleeps notice interrupt and pause requests.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct RunSignals {
    running: AtomicBool,
    interrupt: AtomicBool,
    paused: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    Interrupted,
}

impl SleepOutcome {
    pub fn interrupted(self) -> bool {
        self == SleepOutcome::Interrupted
    }
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn interrupt_requested(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Mark running and clear a stale interrupt. `false` if already running.
    pub fn begin(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.interrupt.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        true
    }

    /// Called by the loop alone when it exits.
    pub fn finish(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.interrupt.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Block while paused. Returns [`SleepOutcome::Interrupted`] if an
    /// interrupt arrives before or during the pause.
    pub async fn checkpoint(&self) -> SleepOutcome {
        if self.interrupt_requested() {
            return SleepOutcome::Interrupted;
        }
        if self.is_paused() {
            debug!("paused, waiting to resume");
            while self.is_paused() {
                if self.interrupt_requested() {
                    return SleepOutcome::Interrupted;
                }
                sleep(POLL_INTERVAL).await;
            }
            debug!("resumed");
        }
        if self.interrupt_requested() {
            SleepOutcome::Interrupted
        } else {
            SleepOutcome::Completed
        }
    }

    /// Sleep for `duration` in [`POLL_INTERVAL`] steps, returning early on
    /// interrupt. Time spent paused does not count toward `duration`.
    pub async fn interruptible_sleep(&self, duration: Duration) -> SleepOutcome {
        let mut remaining = duration;
        loop {
            if self.checkpoint().await.interrupted() {
                debug!(
                    remaining_secs = remaining.as_secs_f64(),
                    "sleep interrupted"
                );
                return SleepOutcome::Interrupted;
            }
            if remaining.is_zero() {
                return SleepOutcome::Completed;
            }
            let step = remaining.min(POLL_INTERVAL);
            sleep(step).await;
            remaining -= step;
        }
    }
}
