//! Engine entry points.
//!
//! [`TrackpadEngine`] wraps the gesture state machine behind the
//! one-action-per-call contract: each `process_input` or `tick` returns at
//! most one [`Action`], and anything extra a sample produced is handed out by
//! the following `tick` calls.

mod hsm;

use statig::blocking::IntoStateMachineExt as _;

use crate::{
    config::TrackpadConfig,
    types::{Action, EngineStatus, Phase, TouchEvent},
};

use self::hsm::{DispatchContext, EngineEvent, TrackpadHsm};

/// Deferred actions awaiting the next `tick`.
#[derive(Debug)]
struct PendingActions {
    head: usize,
    len: usize,
    slots: [Option<Action>; Self::CAP],
}

impl PendingActions {
    const CAP: usize = 8;

    const fn new() -> Self {
        Self {
            head: 0,
            len: 0,
            slots: [None; Self::CAP],
        }
    }

    fn clear(&mut self) {
        *self = Self::new();
    }

    fn push_back(&mut self, action: Action) {
        if self.len >= Self::CAP {
            // Unreachable at the contracted poll cadence: at most two actions
            // arrive per call and every tick drains one.
            return;
        }
        self.slots[(self.head + self.len) % Self::CAP] = Some(action);
        self.len += 1;
    }

    fn pop_front(&mut self) -> Option<Action> {
        if self.len == 0 {
            return None;
        }
        let action = self.slots[self.head].take();
        self.head = (self.head + 1) % Self::CAP;
        self.len -= 1;
        action
    }
}

/// The trackpad gesture engine.
///
/// Pure and single-threaded: the host polling loop feeds it touch transitions
/// and timestamps, and it returns [`Action`] values. It never blocks, never
/// performs I/O and never queries a clock.
pub struct TrackpadEngine {
    config: TrackpadConfig,
    machine: statig::blocking::StateMachine<TrackpadHsm>,
    pending: PendingActions,
    last_now_ms: u64,
}

impl TrackpadEngine {
    /// Builds an engine from an already validated configuration.
    pub fn new(config: TrackpadConfig) -> Self {
        Self {
            config,
            machine: TrackpadHsm::new(config).state_machine(),
            pending: PendingActions::new(),
            last_now_ms: 0,
        }
    }

    /// Feeds one touch transition into the engine.
    pub fn process_input(&mut self, event: TouchEvent, now_ms: u64) -> Action {
        let now_ms = self.clamp_monotonic(now_ms);
        let mut context = DispatchContext::default();
        self.machine
            .handle_with_context(&EngineEvent::Touch { event, now_ms }, &mut context);
        self.collect(context)
    }

    /// Drives time-based transitions: multi-tap window expiry and
    /// hold-to-drag promotion. Call at least as often as samples arrive,
    /// ideally every poll iteration.
    ///
    /// A call that returns a previously deferred action does nothing else
    /// that cycle; timers are examined again on the next call.
    pub fn tick(&mut self, now_ms: u64) -> Action {
        if let Some(action) = self.pending.pop_front() {
            return action;
        }
        let now_ms = self.clamp_monotonic(now_ms);
        let mut context = DispatchContext::default();
        self.machine
            .handle_with_context(&EngineEvent::Tick { now_ms }, &mut context);
        self.collect(context)
    }

    /// Returns the engine to a clean idle state without emitting anything.
    ///
    /// Deferred actions are dropped and configuration is preserved; calling
    /// it repeatedly is harmless.
    pub fn reset(&mut self) {
        self.machine = TrackpadHsm::new(self.config).state_machine();
        self.pending.clear();
    }

    pub fn config(&self) -> &TrackpadConfig {
        &self.config
    }

    /// Externally visible gesture phase.
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Snapshot of the cursor-relevant fields. Everything in it is
    /// word-sized, so a host may mirror the values for a UI thread without a
    /// lock.
    pub fn status(&self) -> EngineStatus {
        let inner = &self.machine;
        EngineStatus {
            pos: inner.last_pos(),
            touched: inner.is_touched(),
            zone: inner.current_zone(),
            phase: inner.phase(),
        }
    }

    #[cfg(test)]
    fn inner(&self) -> &TrackpadHsm {
        &self.machine
    }

    /// Clamps a decreasing timestamp to the last one seen, collapsing the
    /// elapsed time to zero without touching gesture state.
    fn clamp_monotonic(&mut self, now_ms: u64) -> u64 {
        if now_ms < self.last_now_ms {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "non-monotonic timestamp: {} after {}",
                now_ms,
                self.last_now_ms
            );
            return self.last_now_ms;
        }
        self.last_now_ms = now_ms;
        now_ms
    }

    fn collect(&mut self, context: DispatchContext) -> Action {
        let mut first = Action::None;
        for action in context.actions.iter() {
            if first.is_none() {
                first = action;
            } else {
                self.pending.push_back(action);
            }
        }
        first
    }
}
