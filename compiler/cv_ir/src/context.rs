//! Lexical scopes.
//!
//! A [`Context`] owns a value table (slot id → quant handle), a name table
//! (local bindings), and a prefetch cache keyed by instruction id. Name
//! lookup walks the parent chain outward through the program; a context
//! never owns its parent. The tables are individually locked so a host
//! thread can inspect a context while an evaluation is parked elsewhere —
//! at most one logical evaluation is ever active against a context tree.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ids::{CtxId, IdAllocator, InsId, ValueId};
use crate::quant::{Quant, QuantKind, QuantRef};

/// A lexical scope in the program's context arena.
#[derive(Debug)]
pub struct Context {
    pub id: CtxId,
    parent: Option<CtxId>,
    alloc: Arc<IdAllocator>,
    values: RwLock<FxHashMap<ValueId, QuantRef>>,
    names: RwLock<FxHashMap<String, ValueId>>,
    prefetch: RwLock<FxHashMap<InsId, (CtxId, ValueId)>>,
}

impl Context {
    pub(crate) fn new(id: CtxId, parent: Option<CtxId>, alloc: Arc<IdAllocator>) -> Self {
        Context {
            id,
            parent,
            alloc,
            values: RwLock::new(FxHashMap::default()),
            names: RwLock::new(FxHashMap::default()),
            prefetch: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn parent(&self) -> Option<CtxId> {
        self.parent
    }

    /// Build a fresh quant without storing it anywhere.
    pub fn build(&self, kind: QuantKind) -> QuantRef {
        Arc::new(RwLock::new(Quant {
            id: self.alloc.next_quant(),
            kind,
        }))
    }

    pub fn build_nil(&self) -> QuantRef {
        self.build(QuantKind::Nil)
    }

    pub fn build_number(&self, n: f64) -> QuantRef {
        self.build(QuantKind::Number(n))
    }

    pub fn build_string(&self, s: impl Into<String>) -> QuantRef {
        self.build(QuantKind::String(s.into()))
    }

    /// Store an existing handle in a fresh slot and return the slot id.
    pub fn store(&self, quant: QuantRef) -> ValueId {
        let slot = self.alloc.next_value();
        self.values.write().insert(slot, quant);
        slot
    }

    /// Reserve a slot holding nil — the promise half of a proxy pair.
    pub fn promise(&self) -> ValueId {
        self.store(self.build_nil())
    }

    /// Fetch the handle in a slot.
    pub fn value(&self, slot: ValueId) -> Option<QuantRef> {
        self.values.read().get(&slot).cloned()
    }

    /// Overwrite (or create) a slot with a new handle.
    pub fn set_value(&self, slot: ValueId, quant: QuantRef) {
        self.values.write().insert(slot, quant);
    }

    /// Bind a local name to a slot.
    pub fn bind_name(&self, name: impl Into<String>, slot: ValueId) {
        self.names.write().insert(name.into(), slot);
    }

    /// Local name lookup; parent-chain walking lives on [`crate::Program`].
    pub fn name_slot(&self, name: &str) -> Option<ValueId> {
        self.names.read().get(name).copied()
    }

    /// Snapshot the whole value table — one call frame's worth of slots.
    pub fn values_snapshot(&self) -> FxHashMap<ValueId, QuantRef> {
        self.values.read().clone()
    }

    /// Re-apply a snapshot over the current table. Slots created since the
    /// snapshot survive; slots it covers revert to their saved handles.
    pub fn values_restore(&self, snapshot: FxHashMap<ValueId, QuantRef>) {
        self.values.write().extend(snapshot);
    }

    pub fn prefetch_get(&self, ins: InsId) -> Option<(CtxId, ValueId)> {
        self.prefetch.read().get(&ins).copied()
    }

    pub fn prefetch_set(&self, ins: InsId, at: (CtxId, ValueId)) {
        self.prefetch.write().insert(ins, at);
    }

    /// Drop every cached prefetch entry (a fresh function call).
    pub fn prefetch_clear(&self) {
        self.prefetch.write().clear();
    }

    /// Snapshot the prefetch cache so re-entrant calls can restore it.
    pub fn prefetch_snapshot(&self) -> FxHashMap<InsId, (CtxId, ValueId)> {
        self.prefetch.read().clone()
    }

    pub fn prefetch_restore(&self, snapshot: FxHashMap<InsId, (CtxId, ValueId)>) {
        *self.prefetch.write() = snapshot;
    }

    /// Number of values this context owns. Used by tests and the REPL.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
