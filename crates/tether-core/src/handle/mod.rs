//! Object base and handle registry
//!
//! Objects shared between threads are registered in a [`Registry`] and
//! referred to by an opaque [`Handle`] instead of their address. A handle can
//! be resolved back into a strong [`Ref`] for as long as the object is alive;
//! once the last reference is released the handle is retired and any later
//! lookup fails, even if the slot that backed it has since been reused.

mod kind;
mod reference;
mod registry;

pub use kind::{Kind, Resource};
pub use reference::Ref;
pub use registry::{Registry, RegistryOptions, RegistryStats, Strategy};

use std::fmt;
use std::num::NonZeroUsize;

/// Hard cap on concurrently live handles
pub const DEFAULT_MAX_HANDLES: usize = 1 << 24;

/// Initial number of slots in a fresh registry
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Opaque, pointer-sized token naming a registered object
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroUsize);

impl Handle {
    /// Get the raw token value
    pub fn as_usize(self) -> usize {
        self.0.get()
    }

    /// Rebuild a handle from a raw token; `0` is the null handle
    pub fn from_usize(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Handle)
    }

    /// Slot index for a table of `capacity` (a power of two) slots
    #[inline]
    pub(crate) fn slot(self, capacity: usize) -> usize {
        debug_assert!(capacity.is_power_of_two());
        self.0.get() & (capacity - 1)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
