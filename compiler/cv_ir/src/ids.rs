//! Identifier newtypes and the program-scoped allocator.
//!
//! All id spaces share one monotonic counter. Contexts, instructions, value
//! slots, and quants are cross-referenced by raw id rather than by handle,
//! so uniqueness across every arena is what keeps a stale reference
//! detectable instead of silently aliasing a newer object.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a raw id. Only the allocator and tests should need this.
            pub fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            /// The raw numeric id.
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_newtype!(
    /// Identifies one [`crate::Context`] in the program's context arena.
    CtxId,
    "ctx#"
);
id_newtype!(
    /// Identifies one value slot inside a context's value table.
    ValueId,
    "val#"
);
id_newtype!(
    /// Identifies one [`crate::Instruction`] in the instruction arena.
    InsId,
    "ins#"
);
id_newtype!(
    /// Process-unique identity of a [`crate::Quant`], preserved across
    /// slot moves and aliasing.
    QuantId,
    "q#"
);
id_newtype!(
    /// Identifies a registered native handler.
    NativeId,
    "nat#"
);

/// Monotonic id source owned by a [`crate::Program`].
///
/// Ids start at 1 and are never reused; 0 is reserved so a zeroed id can
/// never be mistaken for a live object.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator {
            next: AtomicU32::new(1),
        }
    }

    fn bump(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_ctx(&self) -> CtxId {
        CtxId(self.bump())
    }

    pub fn next_value(&self) -> ValueId {
        ValueId(self.bump())
    }

    pub fn next_ins(&self) -> InsId {
        InsId(self.bump())
    }

    pub fn next_quant(&self) -> QuantId {
        QuantId(self.bump())
    }

    pub fn next_native(&self) -> NativeId {
        NativeId(self.bump())
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_monotonic() {
        let alloc = IdAllocator::new();
        let a = alloc.next_ctx();
        let b = alloc.next_value();
        let c = alloc.next_ins();
        assert!(a.raw() < b.raw());
        assert!(b.raw() < c.raw());
    }

    #[test]
    fn zero_is_never_allocated() {
        let alloc = IdAllocator::new();
        assert_ne!(alloc.next_quant().raw(), 0);
    }
}
