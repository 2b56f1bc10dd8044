//! The runtime: one [`Program`] plus the native-handler and extension
//! registries, with the compile/evaluate entry points the host drives.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use cv_diagnostic::Cursor;
use cv_ir::{
    CtxId, InsId, NativeDef, NativeId, Program, QuantKind, QuantRef, Token, ValueId,
};

use crate::control::Unwind;

/// A registered native function body. It receives the raw, unevaluated
/// argument instructions and is responsible for evaluating whichever it
/// needs, checking its own arity and types against the cursor, and writing
/// its result into the call's promised slot.
pub type NativeHandler =
    Arc<dyn Fn(&Runtime, &NativeCall, &Cursor) -> Result<(), Unwind> + Send + Sync>;

/// The entry point a loadable extension exposes: register named natives
/// into the given context, returning `false` (with the cursor raised) on
/// failure. The built-in `std` extension goes through this same signature.
pub type ExtensionEntry = fn(&Runtime, CtxId, &Cursor) -> bool;

/// Everything a native handler needs about one invocation.
pub struct NativeCall {
    /// The name the call site used, for error messages.
    pub name: String,
    /// The originating token, for line numbers.
    pub token: Token,
    /// Raw operand instructions, in call-site order. Not yet evaluated.
    pub args: Vec<InsId>,
    /// Context the operands were compiled against; handlers build scratch
    /// values here.
    pub exec_ctx: CtxId,
    /// Where the result must land.
    pub out_ctx: CtxId,
    pub out_slot: ValueId,
}

/// The language runtime: program arenas plus handler registries.
pub struct Runtime {
    pub(crate) program: Arc<Program>,
    pub(crate) natives: RwLock<FxHashMap<NativeId, NativeHandler>>,
    pub(crate) extensions: RwLock<FxHashMap<String, ExtensionEntry>>,
}

impl Runtime {
    /// A fresh runtime with the core library registered into the root
    /// context.
    pub fn new() -> Self {
        let rt = Runtime {
            program: Arc::new(Program::new()),
            natives: RwLock::new(FxHashMap::default()),
            extensions: RwLock::new(FxHashMap::default()),
        };
        crate::natives::install(&rt);
        rt
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn root(&self) -> CtxId {
        self.program.root()
    }

    pub(crate) fn nil(&self) -> QuantRef {
        self.program.build_quant(QuantKind::Nil)
    }

    /// Register a native handler under `name` in `ctx`, exactly as a loaded
    /// extension would.
    pub fn register_native(&self, ctx: CtxId, name: &str, handler: NativeHandler) {
        let id = self.program.alloc().next_native();
        self.natives.write().insert(id, handler);
        let quant = self.program.build_quant(QuantKind::Native(NativeDef {
            name: name.to_string(),
            home: ctx,
            handler: id,
        }));
        if let Some(context) = self.program.context(ctx) {
            let slot = context.store(quant);
            context.bind_name(name, slot);
        }
    }

    pub(crate) fn native_handler(&self, id: NativeId) -> Option<NativeHandler> {
        self.natives.read().get(&id).cloned()
    }

    /// Register a loadable extension for `bring:dynamic-library`.
    pub fn register_extension(&self, name: &str, entry: ExtensionEntry) {
        self.extensions.write().insert(name.to_string(), entry);
    }

    pub(crate) fn extension(&self, name: &str) -> Option<ExtensionEntry> {
        self.extensions.read().get(name).copied()
    }

    /// Write a native call's result into its promised slot.
    pub fn fulfill(&self, call: &NativeCall, quant: QuantRef) {
        if let Some(ctx) = self.program.context(call.out_ctx) {
            ctx.set_value(call.out_slot, quant);
        }
    }

    /// Compile a lexed unit against `ctx` and record its entry point.
    /// Returns `None` with the cursor raised on any translation failure.
    pub fn compile(&self, root: &Token, ctx: CtxId, cursor: &Cursor) -> Option<InsId> {
        let entry = self.compile_unit(root, ctx, cursor)?;
        self.program.set_entrypoint(entry);
        Some(entry)
    }

    /// Compile without touching the recorded entry point (imports compile
    /// into the middle of a running program).
    pub(crate) fn compile_unit(
        &self,
        root: &Token,
        ctx: CtxId,
        cursor: &Cursor,
    ) -> Option<InsId> {
        tracing::debug!(unit = %root.render(), "compile");
        let statements: Vec<&Token> =
            if !root.children.is_empty() && root.children.iter().all(Token::is_complex) {
                root.children.iter().collect()
            } else {
                vec![root]
            };
        let mut entries = Vec::with_capacity(statements.len());
        for statement in statements {
            let entry = self.translate(statement, ctx, cursor);
            if cursor.error() {
                return None;
            }
            entries.push(entry);
        }
        for pair in entries.windows(2) {
            self.link_chain(pair[0], pair[1]);
        }
        entries.first().copied()
    }

    /// Append `next_entry` after the chain that starts at `entry`. A
    /// statement may itself be a threaded block, so the link lands on the
    /// chain's tail, not on the entry node.
    pub(crate) fn link_chain(&self, entry: InsId, next_entry: InsId) {
        let mut tail = entry;
        while let Some(ins) = self.program.instruction(tail) {
            match ins.next {
                Some(next) => tail = next,
                None => break,
            }
        }
        self.program.thread(&[tail, next_entry]);
    }

    /// Translate and execute one statement. A top-level interrupt resolves
    /// to its payload; `None` means the cursor holds a diagnostic.
    pub fn eval_statement(
        &self,
        token: &Token,
        ctx: CtxId,
        cursor: &Cursor,
    ) -> Option<QuantRef> {
        let entry = self.translate(token, ctx, cursor);
        if cursor.error() {
            return None;
        }
        match self.execute(entry, cursor) {
            Ok(value) => Some(value),
            Err(Unwind::Interrupt { payload, .. }) => Some(payload),
            Err(Unwind::Raised) => None,
        }
    }

    /// Lex, then evaluate statement by statement against the root context,
    /// returning the last statement's value. Statements run as they
    /// compile, so a `let` from one statement is a resolved value by the
    /// time the next statement translates.
    pub fn eval(&self, source: &str, cursor: &Cursor) -> Option<QuantRef> {
        let root = cv_lexer::lex(source, cursor)?;
        self.eval_unit(&root, self.root(), cursor)
    }

    /// Statement-by-statement evaluation of a lexed unit against `ctx`.
    pub fn eval_unit(&self, root: &Token, ctx: CtxId, cursor: &Cursor) -> Option<QuantRef> {
        let statements: Vec<&Token> =
            if !root.children.is_empty() && root.children.iter().all(Token::is_complex) {
                root.children.iter().collect()
            } else {
                vec![root]
            };
        let mut last = None;
        for statement in statements {
            last = Some(self.eval_statement(statement, ctx, cursor)?);
        }
        last
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
