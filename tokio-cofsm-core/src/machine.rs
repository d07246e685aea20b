//! The transition engine.
//!
//! A [`StateMachine`] owns the current, last and destination state of one
//! owner and resolves every transition request into one of: a no-op, an
//! immediate synchronous transition, an asynchronous transition, a
//! retarget of the transition in flight, or a queued request that runs
//! once the current enter phase ends.
//!
//! All requests and tick dispatch for one machine are expected to come
//! from a single logical thread of control. The engine lock only guards
//! its own bookkeeping; hooks and listeners always run with it released,
//! so they may call back into the machine.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::clock::HostClock;
use crate::error::FsmError;
use crate::notify::{ChangeListeners, ListenerId, StateChange};
use crate::options::TransitionOptions;
use crate::registry::{PhaseHook, StateBinding, StateRegistry};
use crate::runner::{TickKind, Tickable};
use crate::scheduler::{Canceller, Completion, HookScheduler, HookTask, TokioScheduler};
use crate::state::{StateId, StateOwner};

/// A state paired with its hooks. `state` is `None` before the first
/// transition.
pub struct StateSlot<S, O> {
    state: Option<S>,
    binding: Arc<StateBinding<O>>,
}

impl<S: Copy, O> StateSlot<S, O> {
    fn nil() -> Self {
        Self {
            state: None,
            binding: Arc::new(StateBinding::default()),
        }
    }

    #[must_use]
    pub fn state(&self) -> Option<S> {
        self.state
    }

    #[must_use]
    pub fn binding(&self) -> &Arc<StateBinding<O>> {
        &self.binding
    }
}

impl<S: Copy, O> Clone for StateSlot<S, O> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            binding: Arc::clone(&self.binding),
        }
    }
}

/// Where a transition in flight currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    /// No transition in flight.
    Idle,
    /// Leaving the current state; the destination may still be retargeted.
    Exiting,
    /// The destination became current and its enter hook is running.
    Entering,
}

struct Queued<S> {
    target: S,
    seq: u64,
    // Set once the waiter has been started.
    waiter: Option<Canceller>,
}

impl<S> Queued<S> {
    fn cancel(&self) {
        if let Some(waiter) = &self.waiter {
            waiter.cancel();
        }
    }
}

struct Inner<S, O> {
    current: StateSlot<S, O>,
    last: StateSlot<S, O>,
    destination: Option<StateSlot<S, O>>,
    changed_at: Instant,
    phase: TransitionPhase,
    // Bumped for every transition started; stale continuations compare
    // against it before touching state.
    transition_id: u64,
    transition_task: Option<Canceller>,
    exit_op: Option<Canceller>,
    enter_op: Option<Canceller>,
    // Exit started by an overwriting transition; never awaited.
    detached_exit: Option<Canceller>,
    queued: Option<Queued<S>>,
    queue_seq: u64,
}

impl<S, O> Inner<S, O> {
    /// Cancels the continuation and any outstanding exit/enter operation,
    /// detached or not. Returns whether anything was still running.
    fn cancel_in_flight(&mut self) -> bool {
        let mut cancelled = false;
        for canceller in [
            self.transition_task.take(),
            self.exit_op.take(),
            self.enter_op.take(),
            self.detached_exit.take(),
        ]
        .into_iter()
        .flatten()
        {
            cancelled |= !canceller.is_finished();
            canceller.cancel();
        }
        self.destination = None;
        cancelled
    }
}

struct Shared<S: StateId, O: StateOwner> {
    owner: Arc<O>,
    registry: Arc<StateRegistry<S, O>>,
    scheduler: Arc<dyn HookScheduler>,
    clock: HostClock,
    inner: Mutex<Inner<S, O>>,
    listeners: ChangeListeners<S>,
    busy: watch::Sender<bool>,
    state_tx: watch::Sender<Option<S>>,
}

impl<S: StateId, O: StateOwner> Drop for Shared<S, O> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.cancel_in_flight();
        if let Some(queued) = inner.queued.take() {
            queued.cancel();
        }
    }
}

/// A finite state machine bound to one owner.
///
/// Cloning yields another handle to the same machine. Dropping the last
/// handle cancels every operation the machine started.
pub struct StateMachine<S: StateId, O: StateOwner> {
    shared: Arc<Shared<S, O>>,
}

impl<S: StateId, O: StateOwner> Clone for StateMachine<S, O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: StateId, O: StateOwner> StateMachine<S, O> {
    /// Creates a machine in the "no state" slot, running asynchronous hooks
    /// on the ambient tokio runtime.
    pub fn new(owner: Arc<O>, registry: Arc<StateRegistry<S, O>>) -> Self {
        Self::with_runtime(
            owner,
            registry,
            Arc::new(TokioScheduler::new()),
            HostClock::new(),
        )
    }

    /// Creates a machine that starts asynchronous hooks on `scheduler` and
    /// gates queued requests on `clock`.
    pub fn with_runtime(
        owner: Arc<O>,
        registry: Arc<StateRegistry<S, O>>,
        scheduler: Arc<dyn HookScheduler>,
        clock: HostClock,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(None);
        let inner = Inner {
            current: StateSlot::nil(),
            last: StateSlot::nil(),
            destination: None,
            changed_at: clock.now(),
            phase: TransitionPhase::Idle,
            transition_id: 0,
            transition_task: None,
            exit_op: None,
            enter_op: None,
            detached_exit: None,
            queued: None,
            queue_seq: 0,
        };

        Self {
            shared: Arc::new(Shared {
                owner,
                registry,
                scheduler,
                clock,
                inner: Mutex::new(inner),
                listeners: ChangeListeners::default(),
                busy,
                state_tx,
            }),
        }
    }

    /// Transition without self transition or overwrite.
    pub fn transit(&self, target: S) -> Result<(), FsmError> {
        self.request_transition(target, TransitionOptions::SAFE)
    }

    /// Transition that re-runs the current state's cycle if `target` is
    /// already current.
    pub fn transit_self(&self, target: S) -> Result<(), FsmError> {
        self.request_transition(target, TransitionOptions::ALLOW_SELF)
    }

    /// Transition that abandons any transition in flight.
    pub fn transit_overwrite(&self, target: S) -> Result<(), FsmError> {
        self.request_transition(target, TransitionOptions::OVERWRITE)
    }

    /// `OVERWRITE | ALLOW_SELF`.
    pub fn transit_force(&self, target: S) -> Result<(), FsmError> {
        self.request_transition(target, TransitionOptions::FORCE)
    }

    /// Requests a transition to `target`.
    ///
    /// Resolution happens before this returns. A synchronous transition has
    /// fully completed by then; an asynchronous one has started its exit
    /// (or enter) operation and continues on the scheduler.
    ///
    /// Without `OVERWRITE`, a request made while the current state is still
    /// exiting retargets that transition, and a request made while the new
    /// state is entering is queued until the transition ends. Only the most
    /// recent queued request survives.
    ///
    /// With `OVERWRITE`, the transition in flight and its outstanding
    /// operations are cancelled without waiting and without running any of
    /// their remaining steps.
    pub fn request_transition(&self, target: S, options: TransitionOptions) -> Result<(), FsmError> {
        let shared = &self.shared;
        if shared.registry.is_empty() {
            return Err(FsmError::NotInitialized);
        }
        let binding = shared
            .registry
            .resolve(target)
            .ok_or(FsmError::UnknownState(target.name()))?;
        let next = StateSlot {
            state: Some(target),
            binding: Arc::clone(binding),
        };

        let mut inner = shared.lock();
        if !options.allows_self() && inner.current.state == Some(target) {
            tracing::trace!(state = target.name(), "already in requested state");
            return Ok(());
        }

        if let Some(queued) = inner.queued.take() {
            queued.cancel();
            tracing::debug!(
                dropped = queued.target.name(),
                to = target.name(),
                "discarding queued transition"
            );
        }

        if options.overwrites() {
            if inner.cancel_in_flight() {
                tracing::debug!(to = target.name(), "abandoning transition in flight");
            }
        } else {
            let phase = inner.phase;
            match phase {
                TransitionPhase::Exiting => {
                    tracing::debug!(
                        from = state_name(inner.current.state),
                        to = target.name(),
                        "retargeting transition during exit"
                    );
                    inner.destination = Some(next);
                    return Ok(());
                }
                TransitionPhase::Entering => {
                    tracing::debug!(to = target.name(), "queueing transition behind enter");
                    shared.defer(inner, target);
                    return Ok(());
                }
                TransitionPhase::Idle => {}
            }
        }

        inner.transition_id += 1;
        let id = inner.transition_id;

        if inner.current.binding.has_async_exit() || next.binding.has_async_enter() {
            shared.begin_async(inner, id, next, options);
        } else {
            shared.run_sync(inner, id, next);
        }
        Ok(())
    }

    /// The current state, `None` before the first transition.
    #[must_use]
    pub fn current_state(&self) -> Option<S> {
        self.shared.lock().current.state
    }

    /// The state that was current before the last completed change.
    #[must_use]
    pub fn last_state(&self) -> Option<S> {
        self.shared.lock().last.state
    }

    #[must_use]
    pub fn is_in_transition(&self) -> bool {
        self.phase() != TransitionPhase::Idle
    }

    /// Which part of a transition, if any, is in flight.
    #[must_use]
    pub fn phase(&self) -> TransitionPhase {
        self.shared.lock().phase
    }

    #[must_use]
    pub fn has_queued_transition(&self) -> bool {
        self.shared.lock().queued.is_some()
    }

    /// Time elapsed since the current state became current.
    #[must_use]
    pub fn time_since_last_change(&self) -> Duration {
        let changed_at = self.shared.lock().changed_at;
        self.shared.clock.now().saturating_duration_since(changed_at)
    }

    /// The current state together with its hooks.
    #[must_use]
    pub fn current_slot(&self) -> StateSlot<S, O> {
        self.shared.lock().current.clone()
    }

    /// The hooks of the current state.
    #[must_use]
    pub fn current_binding(&self) -> Arc<StateBinding<O>> {
        Arc::clone(&self.shared.lock().current.binding)
    }

    #[must_use]
    pub fn owner(&self) -> &Arc<O> {
        &self.shared.owner
    }

    #[must_use]
    pub fn clock(&self) -> &HostClock {
        &self.shared.clock
    }

    /// Registers a listener for completed state changes.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StateChange<S>) + Send + Sync + 'static,
    {
        self.shared.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.listeners.unsubscribe(id)
    }

    /// A receiver that observes the current state as it changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<Option<S>> {
        self.shared.state_tx.subscribe()
    }

    /// Waits until `target` becomes the current state.
    pub async fn wait_for_state(&self, target: S) -> Result<(), watch::error::RecvError> {
        let mut rx = self.shared.state_tx.subscribe();
        rx.wait_for(|state| *state == Some(target)).await?;
        Ok(())
    }

    /// Waits until no transition is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.busy.subscribe();
        // The sender is owned by this machine and outlives the borrow.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// Runs the current state's hook for `kind`.
    ///
    /// Nothing runs while a transition is in flight or while the owner is
    /// disabled. Returns whether a hook ran.
    pub fn tick(&self, kind: TickKind) -> bool {
        self.shared.tick(kind)
    }

    /// A tick target that does not keep the machine alive.
    pub(crate) fn tick_target(&self) -> Weak<dyn Tickable> {
        let weak: Weak<Shared<S, O>> = Arc::downgrade(&self.shared);
        weak
    }
}

impl<S: StateId, O: StateOwner> Tickable for Shared<S, O> {
    fn tick(&self, kind: TickKind) -> bool {
        if !self.owner.is_enabled() {
            return false;
        }
        let binding = {
            let inner = self.lock();
            if inner.phase != TransitionPhase::Idle {
                return false;
            }
            Arc::clone(&inner.current.binding)
        };
        binding.run_tick(kind, &self.owner)
    }
}

impl<S: StateId, O: StateOwner> Shared<S, O> {
    fn lock(&self) -> MutexGuard<'_, Inner<S, O>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exit, finally, swap, enter and notify, all before returning.
    fn run_sync(&self, inner: MutexGuard<'_, Inner<S, O>>, id: u64, next: StateSlot<S, O>) {
        let from = inner.current.clone();
        drop(inner);

        if let Some(PhaseHook::Sync(exit)) = from.binding.exit() {
            exit(&self.owner);
        }
        from.binding.run_finally(&self.owner);

        {
            let mut inner = self.lock();
            if inner.transition_id != id {
                // A hook started another transition.
                return;
            }
            inner.last = std::mem::replace(&mut inner.current, next.clone());
            inner.changed_at = self.clock.now();
        }
        self.state_tx.send_replace(next.state);

        if let Some(PhaseHook::Sync(enter)) = next.binding.enter() {
            enter(&self.owner);
        }
        self.emit_change(from.state, next.state);
        self.finish(id);
    }

    /// Runs the transition up to its first suspension and leaves the rest
    /// to a continuation on the scheduler.
    fn begin_async(
        self: &Arc<Self>,
        mut inner: MutexGuard<'_, Inner<S, O>>,
        id: u64,
        next: StateSlot<S, O>,
        options: TransitionOptions,
    ) {
        let from = inner.current.clone();
        tracing::debug!(
            from = state_name(from.state),
            to = state_name(next.state),
            ?options,
            "starting asynchronous transition"
        );
        inner.phase = TransitionPhase::Exiting;
        inner.destination = Some(next);
        drop(inner);
        self.busy.send_replace(true);

        match from.binding.exit() {
            Some(PhaseHook::Async(exit)) => {
                let task = self.scheduler.start(exit(Arc::clone(&self.owner)));
                let mut inner = self.lock();
                if inner.transition_id != id {
                    // Building the exit operation started another transition.
                    task.canceller().cancel();
                    return;
                }
                if options.overwrites() {
                    // Overwriting transitions never wait for exit. The
                    // operation runs on until it ends, is overwritten or
                    // the machine is dropped.
                    if let Some(previous) = inner.detached_exit.replace(task.canceller()) {
                        previous.cancel();
                    }
                } else {
                    inner.exit_op = Some(task.canceller());
                    drop(inner);
                    self.await_phase(id, task, TransitionPhase::Exiting);
                    return;
                }
            }
            Some(PhaseHook::Sync(exit)) => exit(&self.owner),
            None => {}
        }

        self.finish_exit(id);
    }

    /// Starts the continuation that resumes transition `id` once `task`
    /// ends, and records it while the transition is still in `phase`.
    fn await_phase(self: &Arc<Self>, id: u64, task: HookTask, phase: TransitionPhase) {
        let weak = Arc::downgrade(self);
        let continuation = self.scheduler.start(Box::pin(async move {
            match phase {
                TransitionPhase::Exiting => {
                    let completion = task.completion().await;
                    if let Some(shared) = upgrade(&weak, completion, "exit") {
                        shared.finish_exit(id);
                    }
                }
                _ => {
                    let completion = task.completion().await;
                    if let Some(shared) = upgrade(&weak, completion, "enter") {
                        shared.finish(id);
                    }
                }
            }
        }));

        let mut inner = self.lock();
        if inner.transition_id != id {
            continuation.canceller().cancel();
        } else if inner.phase == phase {
            inner.transition_task = Some(continuation.canceller());
        }
        // Otherwise the continuation has already moved the transition on.
    }

    /// Runs finally, makes the destination current and starts its enter.
    fn finish_exit(self: &Arc<Self>, id: u64) {
        let from = {
            let mut inner = self.lock();
            if inner.transition_id != id {
                return;
            }
            inner.exit_op = None;
            inner.current.clone()
        };
        from.binding.run_finally(&self.owner);

        let (last, next) = {
            let mut inner = self.lock();
            if inner.transition_id != id {
                return;
            }
            let Some(next) = inner.destination.take() else {
                return;
            };
            inner.last = std::mem::replace(&mut inner.current, next.clone());
            inner.changed_at = self.clock.now();
            inner.phase = TransitionPhase::Entering;
            (inner.last.state, next)
        };
        self.state_tx.send_replace(next.state);

        match next.binding.enter() {
            Some(PhaseHook::Async(enter)) => {
                let task = self.scheduler.start(enter(Arc::clone(&self.owner)));
                {
                    let mut inner = self.lock();
                    if inner.transition_id != id {
                        task.canceller().cancel();
                        return;
                    }
                    inner.enter_op = Some(task.canceller());
                }

                // Listeners hear about the change once entry has begun.
                self.emit_change(last, next.state);

                if self.lock().transition_id != id {
                    // A listener overwrote this transition; it already
                    // cancelled the enter operation.
                    return;
                }
                self.await_phase(id, task, TransitionPhase::Entering);
            }
            Some(PhaseHook::Sync(enter)) => {
                enter(&self.owner);
                self.emit_change(last, next.state);
                self.finish(id);
            }
            None => {
                self.emit_change(last, next.state);
                self.finish(id);
            }
        }
    }

    fn finish(&self, id: u64) {
        let mut inner = self.lock();
        if inner.transition_id != id {
            return;
        }
        inner.enter_op = None;
        inner.transition_task = None;
        if inner.phase != TransitionPhase::Idle {
            inner.phase = TransitionPhase::Idle;
            drop(inner);
            self.busy.send_replace(false);
        }
    }

    /// Stores `target` as the single queued request and starts a waiter
    /// that re-issues it once the machine is idle and the host is running.
    fn defer(self: &Arc<Self>, mut inner: MutexGuard<'_, Inner<S, O>>, target: S) {
        inner.queue_seq += 1;
        let seq = inner.queue_seq;
        // Recorded before the waiter exists so a waiter that runs at once
        // still finds its request.
        inner.queued = Some(Queued {
            target,
            seq,
            waiter: None,
        });
        drop(inner);

        let weak = Arc::downgrade(self);
        let mut busy = self.busy.subscribe();
        let clock = self.clock.clone();

        let waiter = self.scheduler.start(Box::pin(async move {
            if busy.wait_for(|busy| !*busy).await.is_err() {
                return;
            }
            clock.resumed().await;

            let Some(shared) = weak.upgrade() else {
                return;
            };
            {
                let mut inner = shared.lock();
                if inner.queued.as_ref().is_some_and(|queued| queued.seq == seq) {
                    inner.queued = None;
                } else {
                    return;
                }
            }

            let machine = StateMachine { shared };
            if let Err(err) = machine.request_transition(target, TransitionOptions::SAFE) {
                tracing::warn!(%err, to = target.name(), "queued transition failed");
            }
        }));

        let mut inner = self.lock();
        match inner.queued.as_mut() {
            Some(queued) if queued.seq == seq => queued.waiter = Some(waiter.canceller()),
            // Already re-issued, or replaced and the waiter will find
            // nothing to do.
            _ => {}
        }
    }

    fn emit_change(&self, from: Option<S>, to: Option<S>) {
        let Some(to) = to else {
            return;
        };
        tracing::debug!(from = state_name(from), to = to.name(), "state changed");
        self.listeners.emit(StateChange { from, to });
    }
}

/// Reports how a hook operation ended and upgrades the engine reference.
fn upgrade<S: StateId, O: StateOwner>(
    weak: &Weak<Shared<S, O>>,
    completion: Completion,
    hook: &'static str,
) -> Option<Arc<Shared<S, O>>> {
    match completion {
        Completion::Finished => {}
        Completion::Cancelled => {
            tracing::trace!(hook, "hook operation cancelled");
            return None;
        }
        Completion::Panicked => {
            tracing::error!(hook, "hook operation panicked; continuing transition");
        }
    }
    weak.upgrade()
}

fn state_name<S: StateId>(state: Option<S>) -> &'static str {
    state.map_or("<none>", |state| state.name())
}

impl<S: StateId, O: StateOwner> fmt::Debug for StateMachine<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("StateMachine")
            .field("current", &inner.current.state)
            .field("last", &inner.last.state)
            .field("phase", &inner.phase)
            .field("queued", &inner.queued.as_ref().map(|queued| queued.target))
            .finish()
    }
}
