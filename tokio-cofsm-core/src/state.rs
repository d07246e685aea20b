//! State identifiers and the owner contract.

use std::fmt::Debug;
use std::hash::Hash;

/// Identifier for one state in a machine's finite domain.
///
/// Usually implemented for a fieldless enum via `#[derive(StateId)]`:
///
/// ```rust
/// # use tokio_cofsm_core::StateId;
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Door {
///     Open,
///     Closed,
/// }
///
/// impl StateId for Door {
///     fn all() -> &'static [Self] {
///         &[Door::Open, Door::Closed]
///     }
///
///     fn name(&self) -> &'static str {
///         match self {
///             Door::Open => "Open",
///             Door::Closed => "Closed",
///         }
///     }
/// }
/// ```
pub trait StateId: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every value of the domain, in declaration order.
    fn all() -> &'static [Self];

    /// Name used in logs and error messages.
    fn name(&self) -> &'static str;
}

/// The entity a machine is bound to.
///
/// Hooks receive the owner; tick dispatch skips machines whose owner is
/// disabled.
pub trait StateOwner: Send + Sync + 'static {
    /// Whether tick hooks should run for this owner.
    fn is_enabled(&self) -> bool {
        true
    }
}
