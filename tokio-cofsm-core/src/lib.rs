//! Transition engine and runtime types for tokio-cofsm.

mod clock;
mod config;
mod error;
mod machine;
mod notify;
mod options;
mod registry;
mod runner;
mod scheduler;
mod state;

pub use clock::HostClock;
pub use config::RunnerConfig;
pub use error::{DriverError, FsmError};
pub use machine::{StateMachine, StateSlot, TransitionPhase};
pub use notify::{ChangeListeners, ListenerId, StateChange};
pub use options::TransitionOptions;
pub use registry::{
    AsyncHook, HookKind, HookTable, PhaseHook, RegistryBuilder, RegistryCache, StateBinding,
    StateRegistry, SyncHook,
};
pub use runner::{RunnerDriver, StateMachineRunner, TickKind, Tickable};
pub use scheduler::{Canceller, Completion, HookFuture, HookScheduler, HookTask, TokioScheduler};
pub use state::{StateId, StateOwner};
