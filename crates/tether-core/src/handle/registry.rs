//! Handle registry
//!
//! The registry is a power-of-two table of slots. A handle maps to the slot
//! `handle & (capacity - 1)`; every access re-checks that the slot still
//! stores the requested handle, so a stale handle never resolves to an
//! object that reused its slot. Handles come from a monotonically increasing
//! counter, which keeps a retired handle from being issued again.
//!
//! Each slot carries its own reference count, which doubles as a liveness
//! flag:
//!
//! | count  | meaning                                      |
//! |--------|----------------------------------------------|
//! | `-1`   | free                                         |
//! | `0`    | being destroyed; lookups may not revive it   |
//! | `> 0`  | live, with that many strong references       |
//!
//! Two strategies are available. [`Strategy::Locked`] serializes every
//! operation on one table lock. [`Strategy::Atomic`] only takes the table
//! lock exclusively to insert, remove or grow; lookups and non-final
//! discards run under a shared lock with compare-and-swap on the slot count.
//! Both give identical observable behavior.

use super::{Handle, Kind, Ref, Resource, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_HANDLES};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicIsize, AtomicU64, Ordering};
use std::sync::Arc;

const FREE: isize = -1;
const DYING: isize = 0;

/// Concurrency strategy for the handle table
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// A single lock guards every table operation
    #[default]
    Locked,
    /// Per-slot compare-and-swap counting under a shared table lock
    Atomic,
}

/// Registry construction options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    /// Concurrency strategy
    pub strategy: Strategy,
    /// Maximum number of simultaneously live handles
    pub max_handles: usize,
    /// Initial slot count (rounded up to a power of two)
    pub initial_capacity: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Locked,
            max_handles: DEFAULT_MAX_HANDLES,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Objects currently registered
    pub live: usize,
    /// Current slot count
    pub capacity: usize,
    /// Objects ever created
    pub created: u64,
    /// Objects whose handle has been retired
    pub destroyed: u64,
}

struct Slot {
    /// Raw handle stored in this slot; 0 when free
    handle: usize,
    count: AtomicIsize,
    object: Option<Arc<dyn Resource>>,
}

impl Slot {
    fn free() -> Self {
        Slot {
            handle: 0,
            count: AtomicIsize::new(FREE),
            object: None,
        }
    }
}

struct Slots {
    entries: Vec<Slot>,
    live: usize,
    next: usize,
}

impl Slots {
    fn index_of(&self, handle: Handle) -> Option<usize> {
        let index = handle.slot(self.entries.len());
        (self.entries[index].handle == handle.as_usize()).then_some(index)
    }

    fn find(&self, handle: Handle) -> Option<&Slot> {
        self.index_of(handle).map(|index| &self.entries[index])
    }

    /// Next handle whose slot is free. Requires `live < capacity`.
    fn next_free_handle(&mut self) -> Handle {
        debug_assert!(self.live < self.entries.len());
        let capacity = self.entries.len();
        loop {
            let raw = self.next;
            self.next = self.next.wrapping_add(1);
            let Some(handle) = Handle::from_usize(raw) else {
                continue;
            };
            if self.entries[handle.slot(capacity)].handle == 0 {
                return handle;
            }
        }
    }

    fn grow(&mut self) -> Result<()> {
        let old_capacity = self.entries.len();
        let new_capacity = old_capacity.checked_mul(2).ok_or(Error::Exhausted)?;

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(new_capacity)
            .map_err(|_| Error::Exhausted)?;
        entries.resize_with(new_capacity, Slot::free);

        for slot in self.entries.drain(..) {
            if slot.handle == 0 {
                continue;
            }
            let index = slot.handle & (new_capacity - 1);
            // Doubling a power of two can never map two live handles together
            assert_eq!(entries[index].handle, 0, "handle table rehash collision");
            entries[index] = slot;
        }
        self.entries = entries;

        tracing::debug!(old_capacity, new_capacity, "handle table grown");
        Ok(())
    }

    /// Retire a slot whose count has reached zero and hand back its object
    fn remove(&mut self, handle: Handle) -> Option<Arc<dyn Resource>> {
        let index = self.index_of(handle)?;
        let slot = &mut self.entries[index];
        assert_eq!(
            slot.count.load(Ordering::Acquire),
            DYING,
            "retiring a handle that is still referenced"
        );
        slot.handle = 0;
        slot.count.store(FREE, Ordering::Release);
        self.live -= 1;
        slot.object.take()
    }
}

struct Table {
    strategy: Strategy,
    max_handles: usize,
    slots: RwLock<Slots>,
    created: AtomicU64,
    destroyed: AtomicU64,
}

/// Shared table of reference-counted objects
///
/// Cloning a `Registry` is cheap; all clones refer to the same table.
#[derive(Clone)]
pub struct Registry {
    table: Arc<Table>,
}

impl Registry {
    /// Create a registry with default options
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    /// Create a registry with the given options
    pub fn with_options(options: RegistryOptions) -> Self {
        let capacity = options.initial_capacity.max(1).next_power_of_two();
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, Slot::free);

        Self {
            table: Arc::new(Table {
                strategy: options.strategy,
                max_handles: options.max_handles.max(1),
                slots: RwLock::new(Slots {
                    entries,
                    live: 0,
                    next: 1,
                }),
                created: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
            }),
        }
    }

    /// The strategy this registry was built with
    pub fn strategy(&self) -> Strategy {
        self.table.strategy
    }

    /// Register `value` and return the creator's strong reference (count 1)
    pub fn create<T: Resource>(&self, value: T) -> Result<Ref<T>> {
        self.create_with(|_| value)
    }

    /// Register a value built from its own handle
    ///
    /// `init` runs while the table is locked exclusively and must not call
    /// back into this registry.
    pub fn create_with<T, F>(&self, init: F) -> Result<Ref<T>>
    where
        T: Resource,
        F: FnOnce(Handle) -> T,
    {
        let (handle, object) = {
            let mut slots = self.table.slots.write();
            if slots.live >= self.table.max_handles {
                return Err(Error::Exhausted);
            }
            if slots.live == slots.entries.len() {
                slots.grow()?;
            }

            let handle = slots.next_free_handle();
            let object = Arc::new(init(handle));
            let capacity = slots.entries.len();
            let slot = &mut slots.entries[handle.slot(capacity)];
            slot.handle = handle.as_usize();
            slot.count.store(1, Ordering::Release);
            slot.object = Some(object.clone() as Arc<dyn Resource>);
            slots.live += 1;
            (handle, object)
        };

        self.table.created.fetch_add(1, Ordering::Relaxed);
        Ok(Ref::from_parts(self.clone(), handle, object))
    }

    /// Resolve a handle into a new strong reference
    ///
    /// Returns `None` for stale, never-issued or dying handles.
    pub fn lookup(&self, handle: Handle) -> Option<Ref<dyn Resource>> {
        let object = self.acquire(handle, |_| true)?;
        Some(Ref::from_parts(self.clone(), handle, object))
    }

    /// Resolve a handle into a strong reference of a concrete type
    pub fn get<T: Resource>(&self, handle: Handle) -> Result<Ref<T>> {
        let object = self
            .acquire(handle, |object| {
                let any: &dyn Any = &**object;
                any.is::<T>()
            })
            .ok_or(Error::InvalidHandle)?;

        let any: Arc<dyn Any + Send + Sync> = object;
        match any.downcast::<T>() {
            Ok(typed) => Ok(Ref::from_parts(self.clone(), handle, typed)),
            Err(_) => {
                // The type was checked under the lock
                self.release(handle)?;
                Err(Error::InvalidHandle)
            }
        }
    }

    /// Resolve a handle whose kind must be `required` or one of its descendants
    pub fn get_kind(&self, handle: Handle, required: Kind) -> Result<Ref<dyn Resource>> {
        let object = self
            .acquire(handle, |object| object.kind().is_a(required))
            .ok_or(Error::InvalidHandle)?;
        Ok(Ref::from_parts(self.clone(), handle, object))
    }

    /// Kind of a live object, without taking a reference
    pub fn kind_of(&self, handle: Handle) -> Option<Kind> {
        let slots = self.table.slots.read();
        let slot = slots.find(handle)?;
        if slot.count.load(Ordering::Acquire) <= 0 {
            return None;
        }
        slot.object.as_ref().map(|object| object.kind())
    }

    /// Release one raw strong reference (see [`Ref::into_handle`])
    ///
    /// Returns [`Error::InvalidHandle`] when the handle is no longer live,
    /// which includes a second discard of the last reference.
    pub fn discard(&self, handle: Handle) -> Result<()> {
        self.release(handle)
    }

    /// Add one strong reference to a live handle
    pub(crate) fn retain(&self, handle: Handle) -> Result<()> {
        self.acquire(handle, |_| true)
            .map(drop)
            .ok_or(Error::InvalidHandle)
    }

    /// Snapshot of the registry counters
    pub fn stats(&self) -> RegistryStats {
        let slots = self.table.slots.read();
        RegistryStats {
            live: slots.live,
            capacity: slots.entries.len(),
            created: self.table.created.load(Ordering::Relaxed),
            destroyed: self.table.destroyed.load(Ordering::Relaxed),
        }
    }

    /// Increment the count of a live slot whose object satisfies `accept`
    fn acquire<F>(&self, handle: Handle, accept: F) -> Option<Arc<dyn Resource>>
    where
        F: FnOnce(&Arc<dyn Resource>) -> bool,
    {
        match self.table.strategy {
            Strategy::Locked => {
                let slots = self.table.slots.write();
                let slot = slots.find(handle)?;
                let object = slot.object.as_ref()?;
                if slot.count.load(Ordering::Relaxed) <= 0 || !accept(object) {
                    return None;
                }
                slot.count.fetch_add(1, Ordering::Relaxed);
                Some(object.clone())
            }
            Strategy::Atomic => {
                let slots = self.table.slots.read();
                let slot = slots.find(handle)?;
                let object = slot.object.as_ref()?;
                if !accept(object) {
                    return None;
                }
                let mut current = slot.count.load(Ordering::Acquire);
                loop {
                    if current <= DYING {
                        return None;
                    }
                    match slot.count.compare_exchange_weak(
                        current,
                        current + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Some(object.clone()),
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }

    /// Drop one strong reference; retire the handle on the 1 -> 0 transition
    pub(crate) fn release(&self, handle: Handle) -> Result<()> {
        let removed = match self.table.strategy {
            Strategy::Locked => {
                let mut slots = self.table.slots.write();
                let slot = slots.find(handle).ok_or(Error::InvalidHandle)?;
                let count = slot.count.load(Ordering::Relaxed);
                if count <= DYING {
                    return Err(Error::InvalidHandle);
                }
                slot.count.store(count - 1, Ordering::Relaxed);
                if count > 1 {
                    return Ok(());
                }
                slots.remove(handle)
            }
            Strategy::Atomic => {
                {
                    let slots = self.table.slots.read();
                    let slot = slots.find(handle).ok_or(Error::InvalidHandle)?;
                    let mut current = slot.count.load(Ordering::Acquire);
                    loop {
                        if current <= DYING {
                            return Err(Error::InvalidHandle);
                        }
                        match slot.count.compare_exchange_weak(
                            current,
                            current - 1,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        ) {
                            Ok(_) => break,
                            Err(actual) => current = actual,
                        }
                    }
                    if current > 1 {
                        return Ok(());
                    }
                }
                // The count now reads DYING, so no lookup can revive it
                // while we wait for exclusive access.
                let mut slots = self.table.slots.write();
                slots.remove(handle)
            }
        };

        debug_assert!(removed.is_some(), "retired slot had no object");
        self.table.destroyed.fetch_add(1, Ordering::Relaxed);
        // Runs the destructor (if this was the last Arc) with no lock held
        drop(removed);
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("Registry")
            .field("strategy", &self.table.strategy)
            .field("live", &stats.live)
            .field("capacity", &stats.capacity)
            .finish()
    }
}
