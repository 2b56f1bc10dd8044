//! The runtime value model.
//!
//! A [`Quant`] is the tagged runtime value: nil, number, string, list,
//! store, user function, or native function. Lists and stores hold *shared*
//! handles to their members — aliasing is legal and intentional, and
//! mutation through one alias is visible through every other. Only a deep
//! copy (`cc`) severs that sharing.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::ids::{CtxId, InsId, NativeId, QuantId};
use crate::token::Token;

/// Shared handle to a quant. Contexts own the table slot; lists, stores,
/// and other contexts may alias the same handle.
pub type QuantRef = Arc<RwLock<Quant>>;

/// Coarse type tag, used for error messages and `mut` type checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantType {
    Nil,
    Number,
    String,
    List,
    Store,
    Function,
    NativeFunction,
}

impl QuantType {
    pub fn name(self) -> &'static str {
        match self {
            QuantType::Nil => "NIL",
            QuantType::Number => "NUMBER",
            QuantType::String => "STRING",
            QuantType::List => "LIST",
            QuantType::Store => "STORE",
            QuantType::Function => "FUNCTION",
            QuantType::NativeFunction => "NATIVE-FUNCTION",
        }
    }
}

impl fmt::Display for QuantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A user-defined function: where its compiled body starts, the context it
/// was defined against (holding its parameter slots), and its parameter
/// names in declaration order.
#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub entry: InsId,
    pub home: CtxId,
    pub params: Vec<String>,
    /// The body token, kept for rendering and error reporting.
    pub body: Token,
}

/// A registered native function: its public name, the context it was
/// registered into, and the handler id resolved through the runtime's
/// native registry.
#[derive(Clone, Debug)]
pub struct NativeDef {
    pub name: String,
    pub home: CtxId,
    pub handler: NativeId,
}

/// The payload of a quant.
#[derive(Clone, Debug)]
pub enum QuantKind {
    Nil,
    Number(f64),
    String(String),
    List(Vec<QuantRef>),
    Store(FxHashMap<String, QuantRef>),
    Function(FunctionDef),
    Native(NativeDef),
}

/// A runtime value with its process-unique identity.
#[derive(Clone, Debug)]
pub struct Quant {
    pub id: QuantId,
    pub kind: QuantKind,
}

impl Quant {
    pub fn quant_type(&self) -> QuantType {
        match &self.kind {
            QuantKind::Nil => QuantType::Nil,
            QuantKind::Number(_) => QuantType::Number,
            QuantKind::String(_) => QuantType::String,
            QuantKind::List(_) => QuantType::List,
            QuantKind::Store(_) => QuantType::Store,
            QuantKind::Function(_) => QuantType::Function,
            QuantKind::Native(_) => QuantType::NativeFunction,
        }
    }

    /// Truthiness: nil and 0 are false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            QuantKind::Nil => false,
            QuantKind::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        if let QuantKind::Number(n) = self.kind {
            Some(n)
        } else {
            None
        }
    }
}

/// Format a number the way the surface language prints it: fixed precision
/// with trailing zeros (and a trailing dot) stripped.
pub(crate) fn number_to_text(n: f64) -> String {
    let mut s = format!("{n:.8}");
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    s
}

/// Render a quant for the REPL / diagnostics.
///
/// Stores render their members sorted by name so output is deterministic;
/// member order is not significant in the model.
pub fn quant_to_text(quant: &QuantRef) -> String {
    let q = quant.read();
    match &q.kind {
        QuantKind::Nil => "nil".to_string(),
        QuantKind::Number(n) => number_to_text(*n),
        QuantKind::String(s) => format!("'{s}'"),
        QuantKind::List(members) => {
            let parts: Vec<String> = members.iter().map(quant_to_text).collect();
            format!("[{}]", parts.join(" "))
        }
        QuantKind::Store(members) => {
            let mut names: Vec<&String> = members.keys().collect();
            names.sort();
            let parts: Vec<String> = names
                .iter()
                .filter_map(|name| {
                    members
                        .get(*name)
                        .map(|v| format!("~{name}[{}]", quant_to_text(v)))
                })
                .collect();
            format!("[{}]", parts.join(" "))
        }
        QuantKind::Function(def) => {
            format!("[fn [{}] [{}]]", def.params.join(" "), def.body.render())
        }
        QuantKind::Native(def) => format!("[fn [...] ['{}' BINARY]]", def.name),
    }
}
