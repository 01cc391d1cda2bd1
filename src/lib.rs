//! Automation engine: actions built on randomized-delay state machines,
//! scheduled by a background runner with cooldowns, night suppression and
//! random breaks.
//!
//! An [`Action`](action::Action) wraps one [`StateMachine`](state_machine::StateMachine)
//! and drives it from `start` until the chain of triggers its effects return
//! runs out. A [`Runner`](runner::Runner) walks the registered actions on a
//! tokio task; the [`SimulationRunner`](runner::SimulationRunner) replays the
//! same schedule with a fixed sleep in place of each action.

pub mod action;
pub mod config;
pub mod error;
pub mod runner;
pub mod state_machine;
mod util;

pub use action::{Action, ActionSettings, Perception};
pub use config::Config;
pub use error::StagehandError;
pub use runner::{ActionRunner, Runner, RunnerPolicy, SimulationRunner, create_runner};
pub use state_machine::{State, StateMachine, Trigger};
