//! Error types.

use crate::registry::HookKind;

/// Errors surfaced to whoever configures or drives a state machine.
///
/// All variants are caller or configuration errors; none are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// The requested state is not part of the registry's domain.
    #[error("no state named `{0}` is registered with this machine")]
    UnknownState(&'static str),

    /// The machine was created against a registry that was never built.
    #[error("states have not been configured; build the registry before requesting a transition")]
    NotInitialized,

    /// A declared hook could not be bound.
    #[error("cannot bind {hook} hook for state `{state}`: {reason}")]
    DelegateBinding {
        state: &'static str,
        hook: HookKind,
        reason: &'static str,
    },

    /// The state type declares no values.
    #[error("state type must declare at least one value")]
    EmptyDomain,

    /// A runner configuration value is out of range.
    #[error("invalid runner configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Error returned when awaiting a [`RunnerDriver`](crate::RunnerDriver).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The driver task panicked or was aborted.
    #[error("driver task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
