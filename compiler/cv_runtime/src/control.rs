//! Control-flow unwinding.
//!
//! Every evaluation step returns `Result<QuantRef, Unwind>`. An `Err` means
//! the current chain walk stops immediately: either the cursor already
//! holds a diagnostic, or a `skip`/`yield`/`return` interrupt is traveling
//! outward looking for the construct that absorbs it. Function invocation
//! absorbs `Return`; the `while` builtin absorbs `Skip` and `Yield`; an
//! interrupt that reaches the top level resolves to its payload.

use cv_ir::{InterruptKind, QuantRef};

/// Why an evaluation stopped before completing its chain.
#[derive(Clone, Debug)]
pub enum Unwind {
    /// The cursor holds the diagnostic; nothing further may run.
    Raised,
    /// A structured non-local exit with its payload (nil when the interrupt
    /// form carried no value expression).
    Interrupt {
        kind: InterruptKind,
        payload: QuantRef,
    },
}

/// The result of evaluating one instruction or chain.
pub type ExecResult = Result<QuantRef, Unwind>;
