//! # tokio-cofsm
//!
//! Finite state machines whose enter and exit steps may be asynchronous,
//! driven by tokio.
//!
//! Each state binds up to six hooks on its owner: `enter`, `exit`,
//! `finally`, `tick`, `late_tick` and `fixed_tick`. `enter` and `exit` may
//! be `async`; a transition that involves one runs on the scheduler while
//! the machine reports [`StateMachine::is_in_transition`] and tick hooks are
//! suppressed. Requests made mid-transition are retargeted, queued or, with
//! [`TransitionOptions::OVERWRITE`], allowed to preempt.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tokio_cofsm::{HookTable, StateId, StateMachine, StateOwner, state_hooks};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StateId)]
//! enum Stance {
//!     Idle,
//!     Run,
//! }
//!
//! struct Player;
//!
//! impl StateOwner for Player {}
//!
//! #[state_hooks(state = Stance)]
//! impl Player {
//!     #[hook]
//!     async fn idle_exit(&self) {
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!     }
//!
//!     #[hook]
//!     fn run_enter(&self) {}
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tokio_cofsm::FsmError> {
//! let registry = Arc::new(Player::registry()?);
//! let machine = StateMachine::new(Arc::new(Player), registry);
//!
//! machine.transit(Stance::Idle)?;
//! machine.transit(Stance::Run)?;
//! assert!(machine.is_in_transition());
//!
//! machine.wait_idle().await;
//! assert_eq!(machine.current_state(), Some(Stance::Run));
//! # Ok(())
//! # }
//! ```

pub use tokio_cofsm_core::*;
pub use tokio_cofsm_macros::{StateId, state_hooks};
