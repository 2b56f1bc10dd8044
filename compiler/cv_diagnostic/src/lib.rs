//! The Cursor: the single-slot error channel shared by the translator and
//! the execution engine.
//!
//! There is no typed exception hierarchy in the surface language — every
//! failure is one diagnostic with a kind, a message, a line, and the
//! offending token. Producers raise into the cursor and return a
//! placeholder; every caller checks the cursor immediately after any
//! operation that could set it. The slot is lock-guarded because native
//! handlers and recursive evaluation may race a host thread inspecting it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use cv_ir::Token;

/// Diagnostic taxonomy. The variant name doubles as the rendered title.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Mismatched brackets or quotes, empty program.
    #[error("Syntax error")]
    Syntax,
    /// Undefined identifier, or an invalid/reserved binding name.
    #[error("Name error")]
    Name,
    /// Too few or too many operands to a form or function.
    #[error("Arity error")]
    Arity,
    /// Operand of the wrong quant kind, or a `mut` type mismatch.
    #[error("Type error")]
    Type,
    /// Misused constructor, e.g. a non-namer token inside a store.
    #[error("Constructor error")]
    Constructor,
    /// Missing source file or unresolved native extension.
    #[error("Import error")]
    Import,
}

/// One raised diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub line: u32,
    pub token: Option<Token>,
}

impl fmt::Display for Diagnostic {
    /// The single structured error surface:
    /// `[Line #<n>] <title>: <message> in '<offending-token-text>'`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Line #{}] {}: {}", self.line, self.kind, self.message)?;
        if let Some(token) = &self.token {
            write!(f, " in '{}'", token.render())?;
        }
        Ok(())
    }
}

/// The per-evaluation error state.
///
/// Once set, the cursor short-circuits all further translation and
/// execution until explicitly cleared (relaxed/batch mode) or the process
/// exits. The first raise wins; later raises while an error is pending are
/// dropped, since by contract the producer that raised first has already
/// unwound.
#[derive(Debug, Default)]
pub struct Cursor {
    slot: Mutex<Option<Diagnostic>>,
    should_exit: AtomicBool,
}

impl Cursor {
    pub fn new() -> Self {
        Cursor::default()
    }

    /// Raise a diagnostic. No-op when one is already pending.
    pub fn raise(&self, kind: ErrorKind, message: impl Into<String>, line: u32) {
        self.raise_with(kind, message, line, None);
    }

    /// Raise a diagnostic pointing at the offending token.
    pub fn raise_with(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        line: u32,
        token: Option<Token>,
    ) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(Diagnostic {
                kind,
                message: message.into(),
                line,
                token,
            });
        }
    }

    /// Whether a diagnostic is pending.
    pub fn error(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Copy of the pending diagnostic, if any.
    pub fn raised(&self) -> Option<Diagnostic> {
        self.slot.lock().clone()
    }

    /// Clear the slot — relaxed/batch mode keeps going statement by
    /// statement after reporting.
    pub fn clear(&self) {
        *self.slot.lock() = None;
        self.should_exit.store(false, Ordering::Relaxed);
    }

    /// Mark the failure as fatal for the host (extension loading).
    pub fn mark_fatal(&self) {
        self.should_exit.store(true, Ordering::Relaxed);
    }

    /// Whether the host should terminate rather than recover.
    pub fn should_exit(&self) -> bool {
        self.should_exit.load(Ordering::Relaxed)
    }
}
