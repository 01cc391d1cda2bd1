//! The transition table and the machine that fires it.
//!
//! A [`Transition`] names a trigger, its sources and a destination, plus
//! optional guards, an effect and a delay. [`StateMachine::fire`] picks the
//! first matching transition, wildcard sources first, and paces it with the
//! resolved delay profile.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::delay::{DelayProfile, DelayProfiles, DelaySpec, Pacer, ThreadPacer};
use super::state::{Source, State, Trigger};
use crate::error::EngineError;

/// Predicate over the machine's context.
pub type Guard<C> = Box<dyn Fn(&C) -> bool + Send + Sync>;

/// Work performed on entering a transition's destination. May name the
/// trigger to fire next.
pub type Effect<C> = Box<dyn FnMut(&mut C) -> Option<Trigger> + Send>;

/// One row of the transition table.
pub struct Transition<C> {
    trigger: Trigger,
    source: Source,
    dest: State,
    conditions: Vec<Guard<C>>,
    unless: Vec<Guard<C>>,
    effect: Option<Effect<C>>,
    delay: DelaySpec,
}

impl<C> Transition<C> {
    pub fn new(trigger: Trigger, source: impl Into<Source>, dest: State) -> Self {
        Self {
            trigger,
            source: source.into(),
            dest,
            conditions: Vec::new(),
            unless: Vec::new(),
            effect: None,
            delay: DelaySpec::None,
        }
    }

    /// A transition available from every state.
    pub fn from_any(trigger: Trigger, dest: State) -> Self {
        Self::new(trigger, Source::Any, dest)
    }

    /// Fire only if `guard` holds. Multiple conditions are ANDed.
    pub fn when(mut self, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.conditions.push(Box::new(guard));
        self
    }

    /// Refuse to fire if `guard` holds. Any true `unless` blocks the transition.
    pub fn unless(mut self, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.unless.push(Box::new(guard));
        self
    }

    pub fn effect(mut self, effect: impl FnMut(&mut C) -> Option<Trigger> + Send + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }

    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.delay = DelaySpec::profile(name);
        self
    }

    pub fn delays(mut self, pre_min: f64, pre_max: f64, post_min: f64, post_max: f64) -> Self {
        self.delay = DelaySpec::explicit(pre_min, pre_max, post_min, post_max);
        self
    }

    pub fn delay(mut self, spec: DelaySpec) -> Self {
        self.delay = spec;
        self
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn dest(&self) -> State {
        self.dest
    }

    fn permits(&self, ctx: &C) -> bool {
        self.conditions.iter().all(|guard| guard(ctx)) && !self.unless.iter().any(|guard| guard(ctx))
    }
}

/// Result of [`StateMachine::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    /// No transition matched the current state, or every match was guarded off.
    Ignored,
    Moved {
        from: State,
        to: State,
        follow_up: Option<Trigger>,
    },
}

/// Collects transitions and validates them into a [`StateMachine`].
pub struct MachineBuilder<C> {
    transitions: Vec<Transition<C>>,
    profiles: DelayProfiles,
    pacer: Arc<dyn Pacer>,
}

impl<C> Default for MachineBuilder<C> {
    fn default() -> Self {
        Self {
            transitions: Vec::new(),
            profiles: DelayProfiles::default(),
            pacer: Arc::new(ThreadPacer),
        }
    }
}

impl<C> MachineBuilder<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profiles(mut self, profiles: DelayProfiles) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn transition(mut self, transition: Transition<C>) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn push(&mut self, transition: Transition<C>) {
        self.transitions.push(transition);
    }

    /// Replace the effect of the first transition registered for `trigger`.
    /// Returns `false` if no such transition exists.
    pub fn set_effect(
        &mut self,
        trigger: Trigger,
        effect: impl FnMut(&mut C) -> Option<Trigger> + Send + 'static,
    ) -> bool {
        match self.transitions.iter_mut().find(|t| t.trigger == trigger) {
            Some(transition) => {
                transition.effect = Some(Box::new(effect));
                true
            }
            None => false,
        }
    }

    /// Replace the delay of every transition registered for `trigger`.
    pub fn set_delay(&mut self, trigger: Trigger, spec: DelaySpec) -> bool {
        let mut found = false;
        for transition in self.transitions.iter_mut().filter(|t| t.trigger == trigger) {
            transition.delay = spec.clone();
            found = true;
        }
        found
    }

    /// Validate delay specifications and index the table by (state, trigger).
    pub fn build(self) -> Result<StateMachine<C>, EngineError> {
        let mut wildcard: HashMap<Trigger, Vec<usize>> = HashMap::new();
        let mut by_state: HashMap<(State, Trigger), Vec<usize>> = HashMap::new();

        for (idx, transition) in self.transitions.iter().enumerate() {
            match &transition.delay {
                DelaySpec::None => {}
                DelaySpec::Profile(name) => {
                    if !self.profiles.contains(name) {
                        return Err(EngineError::UnknownProfile {
                            trigger: transition.trigger,
                            profile: name.clone(),
                        });
                    }
                }
                DelaySpec::Explicit(profile) => profile.validate()?,
            }

            match &transition.source {
                Source::Any => wildcard.entry(transition.trigger).or_default().push(idx),
                Source::States(states) => {
                    for state in states {
                        let slots = by_state.entry((*state, transition.trigger)).or_default();
                        if !slots.contains(&idx) {
                            slots.push(idx);
                        }
                    }
                }
            }
        }

        Ok(StateMachine {
            state: State::INITIAL,
            transitions: self.transitions,
            wildcard,
            by_state,
            profiles: self.profiles,
            pacer: self.pacer,
            history: Vec::new(),
        })
    }
}

/// A finite-state machine over [`State`] whose transitions carry guards,
/// an effect and randomized delays around that effect.
pub struct StateMachine<C> {
    state: State,
    transitions: Vec<Transition<C>>,
    wildcard: HashMap<Trigger, Vec<usize>>,
    by_state: HashMap<(State, Trigger), Vec<usize>>,
    profiles: DelayProfiles,
    pacer: Arc<dyn Pacer>,
    history: Vec<State>,
}

impl<C> StateMachine<C> {
    pub fn builder() -> MachineBuilder<C> {
        MachineBuilder::new()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Destination states entered since the last [`clear_history`](Self::clear_history).
    pub fn history(&self) -> &[State] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Swap the profile overrides used for name resolution on later fires.
    pub fn set_profiles(&mut self, profiles: DelayProfiles) {
        self.profiles = profiles;
    }

    /// Whether `trigger` would move the machine right now.
    pub fn can_fire(&self, trigger: Trigger, ctx: &C) -> bool {
        self.select(trigger, ctx).is_some()
    }

    /// Attempt `trigger` from the current state.
    ///
    /// Wildcard transitions are consulted before state-specific ones; within
    /// each group the first transition whose guards pass wins. On a match the
    /// destination becomes current, then pre-delay, effect and post-delay run
    /// in that order.
    pub fn fire(&mut self, trigger: Trigger, ctx: &mut C) -> Fired {
        let Some(idx) = self.select(trigger, ctx) else {
            debug!(%trigger, state = %self.state, "trigger ignored");
            return Fired::Ignored;
        };

        let from = self.state;
        let to = self.transitions[idx].dest;
        self.state = to;
        self.history.push(to);
        debug!(%trigger, %from, %to, "transition");

        let delay = self.resolve_delay(&self.transitions[idx].delay);
        let mut rng = rand::thread_rng();

        if delay.has_pre() {
            let pause = delay.draw_pre(&mut rng);
            debug!(%trigger, secs = pause.as_secs_f64(), "pre-delay");
            self.pacer.pause(pause);
        }

        let follow_up = match self.transitions[idx].effect.as_mut() {
            Some(effect) => effect(ctx),
            None => None,
        };

        if delay.has_post() {
            let pause = delay.draw_post(&mut rng);
            debug!(%trigger, secs = pause.as_secs_f64(), "post-delay");
            self.pacer.pause(pause);
        }

        Fired::Moved {
            from,
            to,
            follow_up,
        }
    }

    fn select(&self, trigger: Trigger, ctx: &C) -> Option<usize> {
        let wildcard = self.wildcard.get(&trigger).into_iter().flatten();
        let specific = self.by_state.get(&(self.state, trigger)).into_iter().flatten();
        wildcard
            .chain(specific)
            .copied()
            .find(|&idx| self.transitions[idx].permits(ctx))
    }

    fn resolve_delay(&self, spec: &DelaySpec) -> DelayProfile {
        match spec {
            DelaySpec::None => DelayProfile::NONE,
            DelaySpec::Explicit(profile) => *profile,
            DelaySpec::Profile(name) => self.profiles.resolve(name).unwrap_or_else(|| {
                warn!(profile = %name, "delay profile not found, firing without delay");
                DelayProfile::NONE
            }),
        }
    }
}
