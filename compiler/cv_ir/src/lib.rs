//! Core types for the canvas runtime.
//!
//! Everything the translator and execution engine share lives here:
//! identifier newtypes and the [`Program`]-scoped allocator, the [`Token`]
//! tree produced by the lexer, the [`Quant`] runtime value model, the
//! [`Instruction`] graph node, and the [`Context`] scoping model.
//!
//! The [`Program`] is the sole allocator: contexts, instructions, and quants
//! all draw their ids from one monotonic counter, so an id never collides
//! across arenas and raw-id cross references stay unambiguous for the life
//! of the program.

mod context;
mod ids;
mod instruction;
mod program;
mod quant;
mod token;

pub use context::Context;
pub use ids::{CtxId, IdAllocator, InsId, NativeId, QuantId, ValueId};
pub use instruction::{InsArgs, InsKind, Instruction, InterruptKind};
pub use program::Program;
pub use quant::{
    quant_to_text, FunctionDef, NativeDef, Quant, QuantKind, QuantRef, QuantType,
};
pub use token::Token;
