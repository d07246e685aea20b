//! The task-running capability the transition engine depends on.
//!
//! The engine never runs the operations itself. It asks a
//! [`HookScheduler`] to start them, awaits their [`Completion`], and
//! cancels them through a [`Canceller`] when a transition is overwritten.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};

/// A boxed asynchronous hook operation.
pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Starts cancellable operations.
pub trait HookScheduler: Send + Sync + 'static {
    /// Starts `op` and returns a handle to await or cancel it.
    fn start(&self, op: HookFuture) -> HookTask;
}

/// How a started operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    Cancelled,
    Panicked,
}

/// A started operation.
pub struct HookTask {
    join: JoinHandle<()>,
}

impl HookTask {
    #[must_use]
    pub fn new(join: JoinHandle<()>) -> Self {
        Self { join }
    }

    /// A handle that can cancel the operation without owning it.
    #[must_use]
    pub fn canceller(&self) -> Canceller {
        Canceller(self.join.abort_handle())
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the operation to end.
    ///
    /// Dropping this future does not cancel the operation.
    pub async fn completion(self) -> Completion {
        match self.join.await {
            Ok(()) => Completion::Finished,
            Err(err) if err.is_cancelled() => Completion::Cancelled,
            Err(_) => Completion::Panicked,
        }
    }
}

impl fmt::Debug for HookTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookTask")
            .field("id", &self.join.id())
            .field("finished", &self.join.is_finished())
            .finish()
    }
}

/// Cancels a started operation.
///
/// Cancellation is prompt but not awaited: the operation stops at its
/// next suspension point and never completes normally.
#[derive(Debug, Clone)]
pub struct Canceller(AbortHandle);

impl Canceller {
    pub fn cancel(&self) {
        self.0.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// Runs operations as tokio tasks.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Spawns on whichever runtime is current when an operation starts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns on `handle`.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

impl HookScheduler for TokioScheduler {
    fn start(&self, op: HookFuture) -> HookTask {
        let join = match &self.handle {
            Some(handle) => handle.spawn(op),
            None => tokio::spawn(op),
        };
        HookTask::new(join)
    }
}
