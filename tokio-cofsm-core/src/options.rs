//! Transition options.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Flags controlling how a transition request is resolved.
///
/// `ALLOW_SELF` makes a request for the current state run a full
/// exit/finally/enter cycle instead of being ignored. `OVERWRITE` abandons
/// any transition in flight and starts the new one immediately.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransitionOptions(u8);

impl TransitionOptions {
    /// No self transition, no overwrite.
    pub const SAFE: Self = Self(0);
    /// Transitioning to the current state is not a no-op.
    pub const ALLOW_SELF: Self = Self(0x01);
    /// Preempt any transition in flight.
    pub const OVERWRITE: Self = Self(0x02);
    /// `OVERWRITE | ALLOW_SELF`.
    pub const FORCE: Self = Self(0x03);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn allows_self(self) -> bool {
        self.contains(Self::ALLOW_SELF)
    }

    #[must_use]
    pub const fn overwrites(self) -> bool {
        self.contains(Self::OVERWRITE)
    }
}

impl BitOr for TransitionOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransitionOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TransitionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.allows_self(), self.overwrites()) {
            (false, false) => f.write_str("Safe"),
            (true, false) => f.write_str("AllowSelf"),
            (false, true) => f.write_str("Overwrite"),
            (true, true) => f.write_str("AllowSelf | Overwrite"),
        }
    }
}
