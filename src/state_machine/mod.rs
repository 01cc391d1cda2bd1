mod delay;
mod machine;
mod state;

pub use delay::{
    BUILTIN_PROFILES, DelayProfile, DelayProfiles, DelaySpec, Pacer, ThreadPacer, draw_between,
};
pub use machine::{Effect, Fired, Guard, MachineBuilder, StateMachine, Transition};
pub use state::{Source, State, Trigger};
