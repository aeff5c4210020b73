//! Generic event-driven state machine.
//!
//! States are opaque [`StateId`] handles created by [`StateMachine::add_state`].
//! Transitions map an event kind to a decision that picks the next state,
//! possibly from the event payload. Enter/re-enter/exit actions run
//! synchronously against a caller-owned context `C`, which keeps the engine
//! free of the orchestration state it drives.
//!
//! Actions may emit further events through the [`Emitter`]. Emitted events
//! are queued and dispatched in order before the outer `start`/`handle_event`
//! call returns, so a chain of transitions never grows the call stack.
//!
//! Misuse (foreign states, dispatch before `start`, an event with no
//! transition in the current state) means the transition table is
//! incomplete. Those paths panic with an [`InvariantViolation`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// An event the state machine can dispatch.
pub trait StateMachineEvent: fmt::Debug {
    /// Payload-free discriminant used for transition lookup.
    type Kind: Copy + Eq + Hash + fmt::Debug;

    /// The kind of this event.
    fn kind(&self) -> Self::Kind;
}

/// Opaque handle to a state owned by one [`StateMachine`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId {
    machine: u64,
    index: usize,
}

impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateId({}#{})", self.machine, self.index)
    }
}

/// Contract violations. These are programming errors, never runtime faults.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    /// `handle_event` before `start`.
    #[error("state machine is not started")]
    NotStarted,

    /// `start` called twice.
    #[error("state machine is already started in state \"{0}\"")]
    AlreadyStarted(String),

    /// A state handle from another machine (or a forged one).
    #[error("state {0:?} does not belong to this state machine")]
    ForeignState(StateId),

    /// No transition registered for this event in the current state.
    #[error("unknown transition from state \"{state}\" with event {event}")]
    UnhandledEvent {
        /// Label of the current state.
        state: String,
        /// Debug rendering of the event.
        event: String,
    },
}

#[track_caller]
fn violation(violation: InvariantViolation) -> ! {
    panic!("invariant violation: {violation}")
}

/// Collects events raised by actions while a transition is in progress.
pub struct Emitter<E> {
    queue: VecDeque<E>,
    current: Option<StateId>,
}

impl<E> Emitter<E> {
    fn new(current: Option<StateId>) -> Self {
        Self {
            queue: VecDeque::new(),
            current,
        }
    }

    /// Queue an event for dispatch once the running action returns.
    pub fn emit(&mut self, event: E) {
        self.queue.push_back(event);
    }

    /// The machine's current state, already updated to the transition target.
    pub fn current(&self) -> Option<StateId> {
        self.current
    }
}

type Action<E, C> = Box<dyn FnMut(&mut C, &mut Emitter<E>) + Send>;
type Decision<E, C> = Box<dyn FnMut(&mut C, &E) -> StateId + Send>;

struct State<E: StateMachineEvent, C> {
    label: String,
    on_enter: Option<Action<E, C>>,
    on_reenter: Option<Action<E, C>>,
    on_exit: Option<Action<E, C>>,
    transitions: HashMap<E::Kind, Decision<E, C>>,
}

static NEXT_MACHINE_ID: AtomicU64 = AtomicU64::new(1);

/// Event-driven finite state machine over events `E` and context `C`.
pub struct StateMachine<E: StateMachineEvent, C> {
    id: u64,
    states: Vec<State<E, C>>,
    current: Option<StateId>,
}

impl<E: StateMachineEvent, C> StateMachine<E, C> {
    /// Create an empty, not yet started machine.
    pub fn new() -> Self {
        Self {
            id: NEXT_MACHINE_ID.fetch_add(1, Ordering::Relaxed),
            states: Vec::new(),
            current: None,
        }
    }

    /// Register a new state.
    pub fn add_state(&mut self, label: impl Into<String>) -> StateId {
        let id = StateId {
            machine: self.id,
            index: self.states.len(),
        };
        self.states.push(State {
            label: label.into(),
            on_enter: None,
            on_reenter: None,
            on_exit: None,
            transitions: HashMap::new(),
        });
        id
    }

    /// Action run when `state` becomes current.
    pub fn on_enter(
        &mut self,
        state: StateId,
        action: impl FnMut(&mut C, &mut Emitter<E>) + Send + 'static,
    ) {
        let index = self.ensure_own(state);
        self.states[index].on_enter = Some(Box::new(action));
    }

    /// Action run when a transition targets the already current `state`.
    pub fn on_reenter(
        &mut self,
        state: StateId,
        action: impl FnMut(&mut C, &mut Emitter<E>) + Send + 'static,
    ) {
        let index = self.ensure_own(state);
        self.states[index].on_reenter = Some(Box::new(action));
    }

    /// Action run when `state` stops being current.
    pub fn on_exit(
        &mut self,
        state: StateId,
        action: impl FnMut(&mut C, &mut Emitter<E>) + Send + 'static,
    ) {
        let index = self.ensure_own(state);
        self.states[index].on_exit = Some(Box::new(action));
    }

    /// Unconditional transition `from` → `to` on events of kind `on`.
    pub fn add_transition(&mut self, from: StateId, to: StateId, on: E::Kind) {
        self.ensure_own(to);
        self.add_decision(from, on, move |_, _| to);
    }

    /// Conditional transition: `decide` picks the target at dispatch time.
    ///
    /// Registering the same `(from, on)` pair twice replaces the decision.
    pub fn add_decision(
        &mut self,
        from: StateId,
        on: E::Kind,
        decide: impl FnMut(&mut C, &E) -> StateId + Send + 'static,
    ) {
        let index = self.ensure_own(from);
        self.states[index].transitions.insert(on, Box::new(decide));
    }

    /// Enter `initial` and run its enter action.
    pub fn start(&mut self, ctx: &mut C, initial: StateId) {
        self.ensure_own(initial);
        if let Some(current) = self.current {
            violation(InvariantViolation::AlreadyStarted(
                self.states[current.index].label.clone(),
            ));
        }

        let mut emitter = Emitter::new(None);
        self.move_to(ctx, initial, &mut emitter);
        self.drain(ctx, emitter);
    }

    /// Dispatch `event` against the current state.
    ///
    /// Returns once the transition and every event emitted by its actions
    /// have been processed.
    pub fn handle_event(&mut self, ctx: &mut C, event: E) {
        let mut emitter = Emitter::new(self.current);
        self.dispatch(ctx, event, &mut emitter);
        self.drain(ctx, emitter);
    }

    /// The current state, `None` before `start`.
    pub fn current(&self) -> Option<StateId> {
        self.current
    }

    /// Whether `start` has been called.
    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    /// Debug label of `state`.
    pub fn label(&self, state: StateId) -> &str {
        let index = self.ensure_own(state);
        &self.states[index].label
    }

    fn drain(&mut self, ctx: &mut C, mut emitter: Emitter<E>) {
        while let Some(event) = emitter.queue.pop_front() {
            self.dispatch(ctx, event, &mut emitter);
        }
    }

    fn dispatch(&mut self, ctx: &mut C, event: E, emitter: &mut Emitter<E>) {
        let Some(current) = self.current else {
            violation(InvariantViolation::NotStarted);
        };

        let state = &mut self.states[current.index];
        let target = match state.transitions.get_mut(&event.kind()) {
            Some(decide) => decide(ctx, &event),
            None => violation(InvariantViolation::UnhandledEvent {
                state: state.label.clone(),
                event: format!("{:?}", event.kind()),
            }),
        };
        self.ensure_own(target);

        tracing::debug!(
            from = %self.states[current.index].label,
            to = %self.states[target.index].label,
            event = ?event.kind(),
            "state transition"
        );
        self.move_to(ctx, target, emitter);
    }

    fn move_to(&mut self, ctx: &mut C, target: StateId, emitter: &mut Emitter<E>) {
        if self.current == Some(target) {
            if let Some(action) = self.states[target.index].on_reenter.as_mut() {
                action(ctx, emitter);
            }
            return;
        }

        // Current is updated first so actions observe the target.
        let previous = self.current.replace(target);
        emitter.current = Some(target);

        if let Some(previous) = previous {
            if let Some(action) = self.states[previous.index].on_exit.as_mut() {
                action(ctx, emitter);
            }
        }
        if let Some(action) = self.states[target.index].on_enter.as_mut() {
            action(ctx, emitter);
        }
    }

    fn ensure_own(&self, state: StateId) -> usize {
        if state.machine != self.id || state.index >= self.states.len() {
            violation(InvariantViolation::ForeignState(state));
        }
        state.index
    }
}

impl<E: StateMachineEvent, C> Default for StateMachine<E, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: StateMachineEvent, C> fmt::Debug for StateMachine<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.states.iter().map(|s| s.label.as_str()).collect();
        f.debug_struct("StateMachine")
            .field("id", &self.id)
            .field("states", &labels)
            .field(
                "current",
                &self.current.map(|c| self.states[c.index].label.as_str()),
            )
            .finish()
    }
}
