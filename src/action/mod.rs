mod cooldown;
mod perception;
mod task;

pub use cooldown::{
    CooldownRecord, CooldownSnapshot, CooldownTracker, MAX_COOLDOWN_MINUTES, elapsed_minutes,
};
pub use perception::{ElementRef, Location, NullPerception, Perception, PerceptionError, Region};
pub use task::{
    Action, ActionBuilder, ActionContext, ActionSettings, MAX_WORKFLOW_STEPS, RunOutcome,
    action_key,
};
