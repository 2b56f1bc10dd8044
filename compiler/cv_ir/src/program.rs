//! The program: context arena, instruction arena, and the id allocator.
//!
//! The program is the sole allocator. Context deletion only happens for
//! per-call scratch contexts whose values have already been copied into an
//! outer-living context, so a deleted context's ids are void by the time
//! the slot map drops them.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::ids::{CtxId, IdAllocator, InsId, ValueId};
use crate::instruction::{InsKind, Instruction};
use crate::quant::{Quant, QuantKind, QuantRef};
use crate::token::Token;

/// Owns every context and instruction produced by translation and
/// execution, plus the entry point of the most recent compilation.
#[derive(Debug)]
pub struct Program {
    alloc: Arc<IdAllocator>,
    contexts: RwLock<FxHashMap<CtxId, Arc<Context>>>,
    instructions: RwLock<FxHashMap<InsId, Instruction>>,
    root: CtxId,
    entrypoint: Mutex<Option<InsId>>,
}

impl Program {
    /// Create a program with a fresh root context.
    pub fn new() -> Self {
        let alloc = Arc::new(IdAllocator::new());
        let root_id = alloc.next_ctx();
        let root = Arc::new(Context::new(root_id, None, Arc::clone(&alloc)));
        let mut contexts = FxHashMap::default();
        contexts.insert(root_id, root);
        Program {
            alloc,
            contexts: RwLock::new(contexts),
            instructions: RwLock::new(FxHashMap::default()),
            root: root_id,
            entrypoint: Mutex::new(None),
        }
    }

    pub fn root(&self) -> CtxId {
        self.root
    }

    pub fn entrypoint(&self) -> Option<InsId> {
        *self.entrypoint.lock()
    }

    pub fn set_entrypoint(&self, ins: InsId) {
        *self.entrypoint.lock() = Some(ins);
    }

    /// Allocate a new context, optionally parented to an outer scope.
    pub fn create_context(&self, parent: Option<CtxId>) -> Arc<Context> {
        let id = self.alloc.next_ctx();
        let ctx = Arc::new(Context::new(id, parent, Arc::clone(&self.alloc)));
        self.contexts.write().insert(id, Arc::clone(&ctx));
        ctx
    }

    /// Drop a per-call scratch context. The root context is never deleted.
    pub fn delete_context(&self, id: CtxId) -> bool {
        if id == self.root {
            return false;
        }
        self.contexts.write().remove(&id).is_some()
    }

    pub fn context(&self, id: CtxId) -> Option<Arc<Context>> {
        self.contexts.read().get(&id).cloned()
    }

    /// Fetch the quant stored at (context, slot).
    pub fn fetch(&self, ctx: CtxId, slot: ValueId) -> Option<QuantRef> {
        self.context(ctx).and_then(|c| c.value(slot))
    }

    /// Resolve a name by walking the parent chain outward from `ctx`.
    /// Returns the owning context and slot of the first hit.
    pub fn lookup_name(&self, ctx: CtxId, name: &str) -> Option<(CtxId, ValueId)> {
        let mut cursor = Some(ctx);
        while let Some(id) = cursor {
            let context = self.context(id)?;
            if let Some(slot) = context.name_slot(name) {
                return Some((id, slot));
            }
            cursor = context.parent();
        }
        None
    }

    /// Allocate an instruction node in the arena.
    pub fn create_instruction(&self, kind: InsKind, token: Token) -> InsId {
        let id = self.alloc.next_ins();
        let ins = Instruction::new(id, kind, token);
        self.instructions.write().insert(id, ins);
        id
    }

    /// Fetch a copy of an instruction. The arena entry itself stays put;
    /// execution never holds the arena lock across a dispatch.
    pub fn instruction(&self, id: InsId) -> Option<Instruction> {
        self.instructions.read().get(&id).cloned()
    }

    /// Thread a block's instructions together via `next`/`prev` in order.
    pub fn thread(&self, chain: &[InsId]) {
        let mut instructions = self.instructions.write();
        for pair in chain.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if let Some(ins) = instructions.get_mut(&a) {
                ins.next = Some(b);
            }
            if let Some(ins) = instructions.get_mut(&b) {
                ins.prev = Some(a);
            }
        }
    }

    /// Build a fresh quant from the program-wide id space.
    pub fn build_quant(&self, kind: QuantKind) -> QuantRef {
        Arc::new(RwLock::new(Quant {
            id: self.alloc.next_quant(),
            kind,
        }))
    }

    pub fn alloc(&self) -> &Arc<IdAllocator> {
        &self.alloc
    }

    /// Recursively clone a quant so the copy shares no mutable storage
    /// with the original. Numbers and strings clone trivially; lists and
    /// stores recurse member-wise; functions and natives share their
    /// definition (code has no mutable payload to isolate).
    pub fn deep_copy(&self, quant: &QuantRef) -> QuantRef {
        let kind = {
            let q = quant.read();
            match &q.kind {
                QuantKind::Nil => QuantKind::Nil,
                QuantKind::Number(n) => QuantKind::Number(*n),
                QuantKind::String(s) => QuantKind::String(s.clone()),
                QuantKind::List(members) => {
                    QuantKind::List(members.iter().map(|m| self.deep_copy(m)).collect())
                }
                QuantKind::Store(members) => QuantKind::Store(
                    members
                        .iter()
                        .map(|(k, v)| (k.clone(), self.deep_copy(v)))
                        .collect(),
                ),
                QuantKind::Function(def) => QuantKind::Function(def.clone()),
                QuantKind::Native(def) => QuantKind::Native(def.clone()),
            }
        };
        self.build_quant(kind)
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root_context_exists() {
        let prog = Program::new();
        assert!(prog.context(prog.root()).is_some());
    }

    #[test]
    fn name_lookup_walks_parent_chain() {
        let prog = Program::new();
        let root = prog.context(prog.root()).map(|c| c.id);
        let outer = prog.create_context(root);
        let inner = prog.create_context(Some(outer.id));

        let slot = outer.store(outer.build_number(7.0));
        outer.bind_name("x", slot);

        assert_eq!(prog.lookup_name(inner.id, "x"), Some((outer.id, slot)));
        assert_eq!(prog.lookup_name(inner.id, "y"), None);
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let prog = Program::new();
        let outer = prog.create_context(Some(prog.root()));
        let inner = prog.create_context(Some(outer.id));

        let outer_slot = outer.store(outer.build_number(1.0));
        outer.bind_name("x", outer_slot);
        let inner_slot = inner.store(inner.build_number(2.0));
        inner.bind_name("x", inner_slot);

        assert_eq!(
            prog.lookup_name(inner.id, "x"),
            Some((inner.id, inner_slot))
        );
    }

    #[test]
    fn thread_links_next_and_prev() {
        let prog = Program::new();
        let a = prog.create_instruction(InsKind::Noop, Token::default());
        let b = prog.create_instruction(InsKind::Noop, Token::default());
        let c = prog.create_instruction(InsKind::Noop, Token::default());
        prog.thread(&[a, b, c]);

        let got_a = prog.instruction(a);
        let got_b = prog.instruction(b);
        assert_eq!(got_a.and_then(|i| i.next), Some(b));
        let b_ins = got_b.map(|i| (i.prev, i.next));
        assert_eq!(b_ins, Some((Some(a), Some(c))));
    }

    #[test]
    fn deleted_context_is_gone_but_root_survives() {
        let prog = Program::new();
        let scratch = prog.create_context(Some(prog.root()));
        assert!(prog.delete_context(scratch.id));
        assert!(prog.context(scratch.id).is_none());
        assert!(!prog.delete_context(prog.root()));
    }

    #[test]
    fn deep_copy_severs_list_aliasing() {
        let prog = Program::new();
        let shared = prog.build_quant(QuantKind::Number(1.0));
        let list = prog.build_quant(QuantKind::List(vec![shared.clone()]));

        let copy = prog.deep_copy(&list);
        shared.write().kind = QuantKind::Number(99.0);

        let copied_member = match &copy.read().kind {
            QuantKind::List(members) => members.first().cloned(),
            _ => None,
        };
        let n = copied_member.and_then(|m| m.read().as_number());
        assert_eq!(n, Some(1.0));
    }
}
