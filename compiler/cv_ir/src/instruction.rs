//! Instruction graph nodes.
//!
//! Each instruction is a closed sum type with named fields — there is no
//! loosely-typed `data[]`/`params[]` encoding. Instructions inside one
//! compiled block are threaded through `next`/`prev` in source order;
//! operand instructions elsewhere are reachable only through their owning
//! variant's fields. Once the translator finishes a compilation unit the
//! nodes are immutable and live for the rest of the program.

use smallvec::SmallVec;

use crate::ids::{CtxId, InsId, ValueId};
use crate::token::Token;

/// Operand-instruction list. Most forms take a handful of operands.
pub type InsArgs = SmallVec<[InsId; 4]>;

/// Which interrupt a `skip`/`yield`/`return` form raises.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptKind {
    Skip,
    Yield,
    Return,
}

impl InterruptKind {
    pub fn name(self) -> &'static str {
        match self {
            InterruptKind::Skip => "skip",
            InterruptKind::Yield => "yield",
            InterruptKind::Return => "return",
        }
    }
}

/// The operation an instruction performs.
#[derive(Clone, Debug)]
pub enum InsKind {
    /// Translation failed; executing this forces a crash.
    Noop,
    /// Direct lookup of a value by (context, slot). No side effects.
    StaticProxy { ctx: CtxId, value: ValueId },
    /// Evaluate `inner` once, store the result in `slot`, and replay it
    /// from the owning context's prefetch cache thereafter.
    Promise {
        inner: InsId,
        ctx: CtxId,
        slot: ValueId,
    },
    /// `~name[VALUE]`: bind `name` to the wrapped result (or a fresh nil
    /// when there is no value), writing through the pre-allocated ghost
    /// slot so forward references observe the final value.
    Namer {
        name: String,
        inner: Option<InsId>,
        ctx: CtxId,
        slot: ValueId,
    },
    /// `^EXPR`: evaluate the wrapped instruction; the enclosing
    /// list/store/call splices the result one level.
    Expander { inner: InsId },
    /// Evaluate members in order and collect them into a list, splicing
    /// expander members that produce lists or stores.
    ConstructList { members: InsArgs },
    /// Like `ConstructList`, but members are named and collect into a
    /// store. `names` runs parallel to `members`.
    ConstructStore {
        names: Vec<String>,
        members: InsArgs,
    },
    /// `let NAME VALUE`: evaluate `value` into the reserved slot on first
    /// run; replay the cached slot thereafter.
    Let {
        name: String,
        ctx: CtxId,
        slot: ValueId,
        value: InsId,
    },
    /// `mut NAME VALUE`: overwrite the slot's payload in place. Both sides
    /// must be the same Number or String kind, checked at execution time.
    Mut {
        name: String,
        ctx: CtxId,
        slot: ValueId,
        value: InsId,
    },
    /// `cc VALUE`: evaluate, deep-copy, and hold the copy in a fresh slot.
    CarbonCopy {
        ctx: CtxId,
        slot: ValueId,
        value: InsId,
    },
    /// `skip` / `yield` / `return`, with an optional payload expression
    /// evaluated at interrupt time.
    Interrupt {
        kind: InterruptKind,
        payload: Option<InsId>,
    },
    /// Call a user function resolved at translation time to (ctx, slot).
    /// The result lands in the promised (`out_ctx`, `out_slot`) pair.
    InvokeFunction {
        func_ctx: CtxId,
        func_slot: ValueId,
        args: InsArgs,
        out_ctx: CtxId,
        out_slot: ValueId,
    },
    /// Call a native handler. Arguments were compiled against `args_ctx`, a
    /// dedicated child context, so the handler can evaluate them lazily.
    InvokeNative {
        func_ctx: CtxId,
        func_slot: ValueId,
        args: InsArgs,
        args_ctx: CtxId,
        out_ctx: CtxId,
        out_slot: ValueId,
    },
    /// Store member access: `store ~a` yields the member, `store ~a ~b`
    /// yields a list of members.
    Access {
        subject_ctx: CtxId,
        subject_slot: ValueId,
        members: Vec<String>,
    },
    /// `bring NAME` / `bring:dynamic-library NAME`: evaluate `name` to a
    /// string, then import a source file or resolve a registered
    /// extension into `ctx`.
    Import {
        dynamic: bool,
        name: InsId,
        ctx: CtxId,
    },
}

impl InsKind {
    /// Short tag for tracing.
    pub fn tag(&self) -> &'static str {
        match self {
            InsKind::Noop => "NOOP",
            InsKind::StaticProxy { .. } => "PROXY_STATIC",
            InsKind::Promise { .. } => "PROXY_PROMISE",
            InsKind::Namer { .. } => "PROXY_NAMER",
            InsKind::Expander { .. } => "PROXY_EXPANDER",
            InsKind::ConstructList { .. } => "CONSTRUCT_LIST",
            InsKind::ConstructStore { .. } => "CONSTRUCT_STORE",
            InsKind::Let { .. } => "LET",
            InsKind::Mut { .. } => "MUT",
            InsKind::CarbonCopy { .. } => "CARBON_COPY",
            InsKind::Interrupt { .. } => "CF_INTERRUPT",
            InsKind::InvokeFunction { .. } => "CF_INVOKE_FUNCTION",
            InsKind::InvokeNative { .. } => "CF_INVOKE_BINARY_FUNCTION",
            InsKind::Access { .. } => "ACCESS",
            InsKind::Import { .. } => "IMPORT",
        }
    }
}

/// One node in the program's instruction arena.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub id: InsId,
    pub kind: InsKind,
    /// The surface token this instruction was compiled from.
    pub token: Token,
    /// Next instruction in the enclosing block chain, if any.
    pub next: Option<InsId>,
    /// Previous instruction in the enclosing block chain, if any.
    pub prev: Option<InsId>,
}

impl Instruction {
    pub fn new(id: InsId, kind: InsKind, token: Token) -> Self {
        Instruction {
            id,
            kind,
            token,
            next: None,
            prev: None,
        }
    }
}
