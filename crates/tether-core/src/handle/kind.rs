//! Object kinds
//!
//! Every registered type reports a [`Kind`]. Kinds form a single-parent
//! ancestry (`object`, `object:queue`, `object:queue:pool`, ...) and an
//! is-a test walks that ancestry.

use std::any::Any;

/// Tag identifying a registered object's concrete type and its ancestry
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The root of every ancestry
    Object,
    /// A synchronized queue
    Queue,
    /// A thread pool (composes a queue)
    Pool,
    /// A scheduled task
    Task,
    /// A user-defined type; its parent is [`Kind::Object`]
    Custom(&'static str),
}

impl Kind {
    /// Immediate parent in the ancestry
    pub fn parent(self) -> Option<Kind> {
        match self {
            Kind::Object => None,
            Kind::Queue | Kind::Task | Kind::Custom(_) => Some(Kind::Object),
            Kind::Pool => Some(Kind::Queue),
        }
    }

    /// Short name of this kind alone
    pub fn name(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Queue => "queue",
            Kind::Pool => "pool",
            Kind::Task => "task",
            Kind::Custom(name) => name,
        }
    }

    /// Ancestry from the root down to `self`
    pub fn chain(self) -> Vec<Kind> {
        let mut chain = vec![self];
        let mut cur = self;
        while let Some(parent) = cur.parent() {
            chain.push(parent);
            cur = parent;
        }
        chain.reverse();
        chain
    }

    /// Colon-joined ancestry, e.g. `"object:queue:pool"`
    pub fn type_chain(self) -> String {
        self.chain()
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Whether an object of kind `self` may be used where `required` is
    /// expected, i.e. `required`'s chain is a prefix of ours.
    pub fn is_a(self, required: Kind) -> bool {
        let actual = self.chain();
        let required = required.chain();
        actual.starts_with(&required)
    }
}

/// Interface shared by every object stored in a registry
///
/// The value's `Drop` is the object's destructor: it runs exactly once, after
/// the last strong reference is released and the handle has been retired.
pub trait Resource: Any + Send + Sync {
    /// The concrete kind of this object
    fn kind(&self) -> Kind {
        Kind::Object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_chain_strings() {
        assert_eq!(Kind::Object.type_chain(), "object");
        assert_eq!(Kind::Queue.type_chain(), "object:queue");
        assert_eq!(Kind::Pool.type_chain(), "object:queue:pool");
        assert_eq!(Kind::Custom("string").type_chain(), "object:string");
    }

    #[test]
    fn test_is_a_prefix() {
        assert!(Kind::Pool.is_a(Kind::Queue));
        assert!(Kind::Pool.is_a(Kind::Object));
        assert!(Kind::Pool.is_a(Kind::Pool));
        assert!(!Kind::Queue.is_a(Kind::Pool));
        assert!(!Kind::Task.is_a(Kind::Queue));
        assert!(!Kind::Custom("a").is_a(Kind::Custom("b")));
    }
}
