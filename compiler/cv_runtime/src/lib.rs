//! The canvas runtime: translator, execution engine, core library, and
//! import machinery.
//!
//! The host drives three operations: [`Runtime::compile`] lowers a lexed
//! token tree into the instruction graph, [`Runtime::execute`] walks a
//! chain and produces a value, and [`Runtime::eval`] does both statement
//! by statement. Failures surface on the shared
//! [`cv_diagnostic::Cursor`]; control-flow interrupts travel as
//! [`Unwind`] values.

mod control;
mod exec;
mod natives;
mod runtime;
pub mod stdlib;
mod translate;

#[cfg(test)]
mod tests;

pub use control::{ExecResult, Unwind};
pub use runtime::{ExtensionEntry, NativeCall, NativeHandler, Runtime};
