//! The built-in `std` extension.
//!
//! Registered through the same entry-point signature a dynamically loaded
//! library would export, which keeps the extension contract exercised even
//! with no external modules present.

use std::io::Write;
use std::sync::Arc;

use cv_diagnostic::Cursor;
use cv_ir::{quant_to_text, CtxId, QuantKind};

use crate::control::Unwind;
use crate::runtime::{NativeCall, Runtime};

/// Extension entry point: register the standard natives into `ctx`.
pub fn install(rt: &Runtime, ctx: CtxId, _cursor: &Cursor) -> bool {
    rt.register_native(ctx, "out", Arc::new(out));
    true
}

/// Print each operand. Strings print raw (their escapes were resolved at
/// translation); everything else renders as the REPL would show it.
fn out(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    let mut rendered = String::new();
    for value in &values {
        let piece = {
            match &value.read().kind {
                QuantKind::String(s) => s.clone(),
                _ => quant_to_text(value),
            }
        };
        rendered.push_str(&piece);
    }
    print!("{rendered}");
    let _ = std::io::stdout().flush();
    let result = values
        .into_iter()
        .last()
        .unwrap_or_else(|| rt.program().build_quant(QuantKind::Nil));
    rt.fulfill(call, result);
    Ok(())
}
