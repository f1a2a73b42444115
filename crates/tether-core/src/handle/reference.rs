//! Strong references
//!
//! A [`Ref`] is one counted reference to a registered object. Creating or
//! resolving a handle yields a `Ref`, cloning adds a reference and dropping
//! removes one.

use super::{Handle, Kind, Registry, Resource};
use crate::error::Result;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Counted strong reference to a registered object
pub struct Ref<T: ?Sized> {
    registry: Registry,
    handle: Handle,
    object: Arc<T>,
}

impl<T: ?Sized> Ref<T> {
    /// Wrap a reference whose count has already been taken
    pub(crate) fn from_parts(registry: Registry, handle: Handle, object: Arc<T>) -> Self {
        Self {
            registry,
            handle,
            object,
        }
    }

    /// The object's handle
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// The registry the object lives in
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Convert into a raw handle that still owns this reference
    ///
    /// The reference must later be released with [`Registry::discard`].
    pub fn into_handle(self) -> Handle {
        let handle = self.handle;
        // The live reference we hold guarantees this succeeds
        let retained = self.registry.retain(handle);
        debug_assert!(retained.is_ok());
        handle
    }

    /// Whether two references name the same object
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        a.handle == b.handle
    }
}

impl Ref<dyn Resource> {
    /// Whether this object can be used as `required`
    pub fn is_a(&self, required: Kind) -> bool {
        self.object.kind().is_a(required)
    }

    /// Checked downcast to a concrete type
    ///
    /// On mismatch the original reference is handed back.
    pub fn downcast<T: Resource>(self) -> std::result::Result<Ref<T>, Self> {
        match self.registry.get::<T>(self.handle) {
            Ok(typed) => Ok(typed),
            Err(_) => Err(self),
        }
    }
}

impl<T: Resource> Ref<T> {
    /// Erase the concrete type
    pub fn into_dyn(self) -> Result<Ref<dyn Resource>> {
        self.registry.retain(self.handle)?;
        let object: Arc<dyn Resource> = self.object.clone();
        Ok(Ref::from_parts(self.registry.clone(), self.handle, object))
    }
}

impl<T: ?Sized> Clone for Ref<T> {
    fn clone(&self) -> Self {
        let retained = self.registry.retain(self.handle);
        debug_assert!(retained.is_ok(), "cloning a reference to a dead handle");
        Self {
            registry: self.registry.clone(),
            handle: self.handle,
            object: self.object.clone(),
        }
    }
}

impl<T: ?Sized> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: ?Sized> Drop for Ref<T> {
    fn drop(&mut self) {
        let released = self.registry.release(self.handle);
        debug_assert!(released.is_ok(), "strong reference outlived its handle");
    }
}

impl<T: ?Sized> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&self.handle).finish()
    }
}
