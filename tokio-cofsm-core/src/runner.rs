//! Per-tick dispatch of state hooks.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::task::{Context, Poll};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::RunnerConfig;
use crate::error::{DriverError, FsmError};
use crate::machine::StateMachine;
use crate::registry::StateRegistry;
use crate::state::{StateId, StateOwner};

/// Which periodic hook a tick runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    /// Once per frame.
    Tick,
    /// Once per frame, after every machine's `Tick`.
    LateTick,
    /// Once per fixed-rate step.
    FixedTick,
}

/// Something a [`StateMachineRunner`] can tick.
pub trait Tickable: Send + Sync {
    /// Runs the hook for `kind` if allowed; returns whether one ran.
    fn tick(&self, kind: TickKind) -> bool;
}

/// Dispatches tick hooks to every attached machine.
///
/// The runner does not keep machines alive. Once the last handle to a
/// machine is dropped it stops being ticked and is pruned on the next
/// dispatch.
#[derive(Default)]
pub struct StateMachineRunner {
    machines: Mutex<Vec<Weak<dyn Tickable>>>,
}

impl StateMachineRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<S: StateId, O: StateOwner>(&self, machine: &StateMachine<S, O>) {
        self.lock().push(machine.tick_target());
    }

    /// Attaches a custom tick target for as long as `target` is alive.
    pub fn attach_tickable<T: Tickable + 'static>(&self, target: &Arc<T>) {
        let weak: Weak<T> = Arc::downgrade(target);
        self.lock().push(weak);
    }

    /// Stops ticking `machine`. Returns `false` if it was not attached.
    pub fn detach<S: StateId, O: StateOwner>(&self, machine: &StateMachine<S, O>) -> bool {
        let target = machine.tick_target();
        let mut machines = self.lock();
        let before = machines.len();
        machines.retain(|attached| !Weak::ptr_eq(attached, &target));
        machines.len() != before
    }

    /// Creates a machine for `owner` and attaches it.
    pub fn initialize<S, O>(&self, owner: Arc<O>, registry: Arc<StateRegistry<S, O>>) -> StateMachine<S, O>
    where
        S: StateId,
        O: StateOwner,
    {
        let machine = StateMachine::new(owner, registry);
        self.attach(&machine);
        machine
    }

    /// Like [`initialize`](Self::initialize), then requests `start`.
    pub fn initialize_with<S, O>(
        &self,
        owner: Arc<O>,
        registry: Arc<StateRegistry<S, O>>,
        start: S,
    ) -> Result<StateMachine<S, O>, FsmError>
    where
        S: StateId,
        O: StateOwner,
    {
        let machine = self.initialize(owner, registry);
        machine.transit(start)?;
        Ok(machine)
    }

    /// Runs `Tick` hooks. Returns how many ran.
    pub fn update(&self) -> usize {
        self.dispatch(TickKind::Tick)
    }

    /// Runs `LateTick` hooks. Returns how many ran.
    pub fn late_update(&self) -> usize {
        self.dispatch(TickKind::LateTick)
    }

    /// Runs `FixedTick` hooks. Returns how many ran.
    pub fn fixed_update(&self) -> usize {
        self.dispatch(TickKind::FixedTick)
    }

    /// Number of attached machines that are still alive.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut machines = self.lock();
        machines.retain(|attached| attached.strong_count() > 0);
        machines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detaches every machine.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Spawns a loop that ticks this runner at the configured rates until
    /// the returned driver is shut down or dropped.
    pub fn drive(self: &Arc<Self>, config: RunnerConfig) -> Result<RunnerDriver, FsmError> {
        config.validate()?;
        let runner = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut frame = tokio::time::interval(config.frame_interval);
            frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut fixed = tokio::time::interval(config.fixed_interval);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = fixed.tick() => {
                        runner.fixed_update();
                    }
                    _ = frame.tick() => {
                        runner.update();
                        runner.late_update();
                    }
                }
            }
            tracing::debug!("runner driver stopped");
        });

        Ok(RunnerDriver {
            shutdown_tx,
            handle,
        })
    }

    fn dispatch(&self, kind: TickKind) -> usize {
        // Hooks may attach machines, so tick a snapshot.
        let targets: Vec<Arc<dyn Tickable>> = {
            let mut machines = self.lock();
            machines.retain(|attached| attached.strong_count() > 0);
            machines.iter().filter_map(Weak::upgrade).collect()
        };
        targets.iter().filter(|target| target.tick(kind)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<dyn Tickable>>> {
        self.machines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for StateMachineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineRunner")
            .field("machines", &self.len())
            .finish()
    }
}

/// Handle to a spawned tick loop.
///
/// Awaiting it yields once the loop has stopped.
#[derive(Debug)]
pub struct RunnerDriver {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RunnerDriver {
    /// Stops the loop after the tick in progress, if any.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for RunnerDriver {
    type Output = Result<(), DriverError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|res| res.map_err(DriverError::from))
    }
}
