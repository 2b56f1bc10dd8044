//! The execution engine: iterative chain walking with per-kind dispatch.
//!
//! `execute` walks `next` links from an entry instruction. Every step
//! returns `Result<QuantRef, Unwind>`; an `Err` stops the current chain at
//! once and travels outward until something absorbs it — function
//! invocation absorbs `Return`, the `while` builtin absorbs `Skip` and
//! `Yield`, and `Raised` (the cursor holds a diagnostic) is absorbed by
//! nothing.

use rustc_hash::FxHashMap;

use cv_diagnostic::{Cursor, ErrorKind};
use cv_ir::{
    CtxId, FunctionDef, InsId, InsKind, Instruction, InterruptKind, NativeDef, QuantKind,
    QuantRef, Token, ValueId,
};

use crate::control::{ExecResult, Unwind};
use crate::runtime::{NativeCall, Runtime};

enum Callee {
    User(FunctionDef),
    Native(NativeDef),
}

impl Runtime {
    /// Walk the chain starting at `entry`, returning the last produced
    /// value.
    pub fn execute(&self, entry: InsId, cursor: &Cursor) -> ExecResult {
        let mut current = Some(entry);
        let mut last = self.nil();
        while let Some(id) = current {
            if cursor.error() {
                return Err(Unwind::Raised);
            }
            let Some(ins) = self.program.instruction(id) else {
                cursor.raise(
                    ErrorKind::Name,
                    format!("Stale instruction reference {id}"),
                    0,
                );
                return Err(Unwind::Raised);
            };
            tracing::trace!(ins = %id, tag = ins.kind.tag(), "step");
            last = self.step(&ins, cursor)?;
            if cursor.error() {
                return Err(Unwind::Raised);
            }
            current = ins.next;
        }
        Ok(last)
    }

    fn raise(&self, cursor: &Cursor, kind: ErrorKind, message: String, token: &Token) -> Unwind {
        cursor.raise_with(kind, message, token.line, Some(token.clone()));
        Unwind::Raised
    }

    fn fetch_slot(
        &self,
        ctx: CtxId,
        slot: ValueId,
        cursor: &Cursor,
        token: &Token,
    ) -> Result<QuantRef, Unwind> {
        self.program.fetch(ctx, slot).ok_or_else(|| {
            self.raise(
                cursor,
                ErrorKind::Name,
                format!("Stale value reference {ctx}/{slot}"),
                token,
            )
        })
    }

    /// Evaluate operand instructions in order, splicing an expander's
    /// list/store result one level into the argument positions.
    pub fn eval_args(&self, args: &[InsId], cursor: &Cursor) -> Result<Vec<QuantRef>, Unwind> {
        let mut out = Vec::with_capacity(args.len());
        for &arg in args {
            let is_expander = matches!(
                self.program.instruction(arg).map(|i| i.kind),
                Some(InsKind::Expander { .. })
            );
            let value = self.execute(arg, cursor)?;
            if is_expander {
                let spliced = {
                    let q = value.read();
                    match &q.kind {
                        QuantKind::List(members) => Some(members.clone()),
                        QuantKind::Store(members) => Some(members.values().cloned().collect()),
                        _ => None,
                    }
                };
                match spliced {
                    Some(items) => out.extend(items),
                    None => out.push(value),
                }
            } else {
                out.push(value);
            }
        }
        Ok(out)
    }

    fn step(&self, ins: &Instruction, cursor: &Cursor) -> ExecResult {
        let token = &ins.token;
        match &ins.kind {
            InsKind::Noop => Err(self.raise(
                cursor,
                ErrorKind::Syntax,
                "Unsolved instruction".to_string(),
                token,
            )),
            InsKind::StaticProxy { ctx, value } => self.fetch_slot(*ctx, *value, cursor, token),
            InsKind::Promise { inner, ctx, slot } => {
                let value = self.execute(*inner, cursor)?;
                if let Some(context) = self.program.context(*ctx) {
                    context.set_value(*slot, value.clone());
                }
                Ok(value)
            }
            InsKind::Namer {
                inner, ctx, slot, ..
            } => {
                let Some(context) = self.program.context(*ctx) else {
                    return Err(self.raise(
                        cursor,
                        ErrorKind::Name,
                        format!("Stale context reference {ctx}"),
                        token,
                    ));
                };
                if let Some((cached_ctx, cached_slot)) = context.prefetch_get(ins.id) {
                    return self.fetch_slot(cached_ctx, cached_slot, cursor, token);
                }
                let value = match inner {
                    Some(inner) => self.execute(*inner, cursor)?,
                    None => self.nil(),
                };
                context.set_value(*slot, value.clone());
                context.prefetch_set(ins.id, (*ctx, *slot));
                Ok(value)
            }
            InsKind::Expander { inner } => self.execute(*inner, cursor),
            InsKind::ConstructList { members } => {
                let values = self.eval_args(members, cursor)?;
                Ok(self.program.build_quant(QuantKind::List(values)))
            }
            InsKind::ConstructStore { names, members } => {
                let mut map = FxHashMap::default();
                for (name, &member) in names.iter().zip(members.iter()) {
                    let value = self.execute(member, cursor)?;
                    if name.is_empty() {
                        let spliced = {
                            match &value.read().kind {
                                QuantKind::Store(members) => Some(members.clone()),
                                _ => None,
                            }
                        };
                        match spliced {
                            Some(members) => map.extend(members),
                            None => {
                                return Err(self.raise(
                                    cursor,
                                    ErrorKind::Constructor,
                                    "Only a STORE may be expanded into a store".to_string(),
                                    token,
                                ));
                            }
                        }
                    } else {
                        map.insert(name.clone(), value);
                    }
                }
                Ok(self.program.build_quant(QuantKind::Store(map)))
            }
            InsKind::Let {
                ctx, slot, value, ..
            } => {
                let Some(context) = self.program.context(*ctx) else {
                    return Err(self.raise(
                        cursor,
                        ErrorKind::Name,
                        format!("Stale context reference {ctx}"),
                        token,
                    ));
                };
                if context.prefetch_get(ins.id).is_some() {
                    return self.fetch_slot(*ctx, *slot, cursor, token);
                }
                let result = self.execute(*value, cursor)?;
                context.set_value(*slot, result.clone());
                context.prefetch_set(ins.id, (*ctx, *slot));
                Ok(result)
            }
            InsKind::Mut {
                name,
                ctx,
                slot,
                value,
            } => {
                let new_value = self.execute(*value, cursor)?;
                let current = self.fetch_slot(*ctx, *slot, cursor, token)?;
                let outcome = {
                    let have = current.read();
                    let got = new_value.read();
                    match (&have.kind, &got.kind) {
                        (QuantKind::Number(_), QuantKind::Number(n)) => Ok(QuantKind::Number(*n)),
                        (QuantKind::String(_), QuantKind::String(s)) => {
                            Ok(QuantKind::String(s.clone()))
                        }
                        _ => Err((have.quant_type(), got.quant_type())),
                    }
                };
                match outcome {
                    Ok(kind) => {
                        current.write().kind = kind;
                        Ok(current)
                    }
                    Err((have, got)) => Err(self.raise(
                        cursor,
                        ErrorKind::Type,
                        format!("Cannot mutate '{name}' of type {have} with a {got} value"),
                        token,
                    )),
                }
            }
            InsKind::CarbonCopy { ctx, slot, value } => {
                let original = self.execute(*value, cursor)?;
                let copy = self.program.deep_copy(&original);
                if let Some(context) = self.program.context(*ctx) {
                    context.set_value(*slot, copy.clone());
                }
                Ok(copy)
            }
            InsKind::Interrupt { kind, payload } => {
                let payload = match payload {
                    Some(payload) => self.execute(*payload, cursor)?,
                    None => self.nil(),
                };
                Err(Unwind::Interrupt {
                    kind: *kind,
                    payload,
                })
            }
            InsKind::InvokeFunction {
                func_ctx,
                func_slot,
                args,
                out_ctx,
                out_slot,
            } => {
                let callee = self.fetch_slot(*func_ctx, *func_slot, cursor, token)?;
                let resolved = {
                    match &callee.read().kind {
                        QuantKind::Function(def) => Some(Callee::User(def.clone())),
                        QuantKind::Native(def) => Some(Callee::Native(def.clone())),
                        _ => None,
                    }
                };
                match resolved {
                    Some(Callee::User(def)) => {
                        self.invoke_function(&def, args, *out_ctx, *out_slot, cursor, token)
                    }
                    Some(Callee::Native(def)) => {
                        self.invoke_native(&def, args, *out_ctx, *out_slot, *out_ctx, cursor, token)
                    }
                    None => Err(self.raise(
                        cursor,
                        ErrorKind::Type,
                        format!("'{}' is not invocable", call_site_name(token)),
                        token,
                    )),
                }
            }
            InsKind::InvokeNative {
                func_ctx,
                func_slot,
                args,
                args_ctx,
                out_ctx,
                out_slot,
            } => {
                let callee = self.fetch_slot(*func_ctx, *func_slot, cursor, token)?;
                let def = {
                    match &callee.read().kind {
                        QuantKind::Native(def) => Some(def.clone()),
                        _ => None,
                    }
                };
                let Some(def) = def else {
                    return Err(self.raise(
                        cursor,
                        ErrorKind::Type,
                        format!("'{}' is not a native function", call_site_name(token)),
                        token,
                    ));
                };
                self.invoke_native(&def, args, *out_ctx, *out_slot, *args_ctx, cursor, token)
            }
            InsKind::Access {
                subject_ctx,
                subject_slot,
                members,
            } => self.access_members(*subject_ctx, *subject_slot, members, cursor, token),
            InsKind::Import { dynamic, name, ctx } => {
                self.run_import(*dynamic, *name, *ctx, cursor, token)
            }
        }
    }

    fn invoke_function(
        &self,
        def: &FunctionDef,
        args: &[InsId],
        out_ctx: CtxId,
        out_slot: ValueId,
        cursor: &Cursor,
        token: &Token,
    ) -> ExecResult {
        let Some(home) = self.program.context(def.home) else {
            return Err(self.raise(
                cursor,
                ErrorKind::Name,
                format!("Stale context reference {}", def.home),
                token,
            ));
        };
        let values = self.eval_args(args, cursor)?;
        if values.len() != def.params.len() {
            return Err(self.raise(
                cursor,
                ErrorKind::Arity,
                format!(
                    "Expected {} arguments, {} were provided",
                    def.params.len(),
                    values.len()
                ),
                token,
            ));
        }
        // Save the whole home frame and the prefetch cache so a recursive
        // or re-entrant call cannot clobber the caller's parameters or the
        // body's `let`/namer locals, which share the same slot table.
        let frame = home.values_snapshot();
        let prefetch = home.prefetch_snapshot();
        home.prefetch_clear();
        for (param, value) in def.params.iter().zip(values) {
            if let Some(slot) = home.name_slot(param) {
                home.set_value(slot, value);
            }
        }
        tracing::debug!(entry = %def.entry, home = %def.home, "invoke");
        let outcome = self.execute(def.entry, cursor);
        home.values_restore(frame);
        home.prefetch_restore(prefetch);
        let result = match outcome {
            Ok(value) => value,
            Err(Unwind::Interrupt {
                kind: InterruptKind::Return,
                payload,
            }) => payload,
            Err(other) => return Err(other),
        };
        if let Some(out) = self.program.context(out_ctx) {
            out.set_value(out_slot, result.clone());
        }
        Ok(result)
    }

    fn invoke_native(
        &self,
        def: &NativeDef,
        args: &[InsId],
        out_ctx: CtxId,
        out_slot: ValueId,
        exec_ctx: CtxId,
        cursor: &Cursor,
        token: &Token,
    ) -> ExecResult {
        let Some(handler) = self.native_handler(def.handler) else {
            return Err(self.raise(
                cursor,
                ErrorKind::Import,
                format!("Native handler for '{}' is not registered", def.name),
                token,
            ));
        };
        let call = NativeCall {
            name: def.name.clone(),
            token: token.clone(),
            args: args.to_vec(),
            exec_ctx,
            out_ctx,
            out_slot,
        };
        handler(self, &call, cursor)?;
        if cursor.error() {
            return Err(Unwind::Raised);
        }
        self.fetch_slot(out_ctx, out_slot, cursor, token)
    }

    fn access_members(
        &self,
        subject_ctx: CtxId,
        subject_slot: ValueId,
        members: &[String],
        cursor: &Cursor,
        token: &Token,
    ) -> ExecResult {
        let subject = self.fetch_slot(subject_ctx, subject_slot, cursor, token)?;
        let found = {
            let q = subject.read();
            match &q.kind {
                QuantKind::Store(map) => {
                    let mut found = Vec::with_capacity(members.len());
                    for name in members {
                        match map.get(name) {
                            Some(value) => found.push(value.clone()),
                            None => {
                                return Err(self.raise(
                                    cursor,
                                    ErrorKind::Name,
                                    format!("Store has no member '~{name}'"),
                                    token,
                                ));
                            }
                        }
                    }
                    Ok(found)
                }
                _ => Err(q.quant_type()),
            }
        };
        match found {
            Ok(mut found) => {
                if found.len() == 1 {
                    if let Some(single) = found.pop() {
                        return Ok(single);
                    }
                }
                Ok(self.program.build_quant(QuantKind::List(found)))
            }
            Err(got) => Err(self.raise(
                cursor,
                ErrorKind::Type,
                format!("Member access requires a STORE, got {got}"),
                token,
            )),
        }
    }

    fn run_import(
        &self,
        dynamic: bool,
        name: InsId,
        ctx: CtxId,
        cursor: &Cursor,
        token: &Token,
    ) -> ExecResult {
        let name_value = self.execute(name, cursor)?;
        let target = {
            match &name_value.read().kind {
                QuantKind::String(s) => Some(s.clone()),
                _ => None,
            }
        };
        let Some(target) = target else {
            return Err(self.raise(
                cursor,
                ErrorKind::Type,
                "'bring' expects a STRING name".to_string(),
                token,
            ));
        };
        if dynamic {
            let Some(entry) = self.extension(&target) else {
                let err = self.raise(
                    cursor,
                    ErrorKind::Import,
                    format!("No dynamic library named '{target}'"),
                    token,
                );
                cursor.mark_fatal();
                return Err(err);
            };
            tracing::debug!(library = %target, "bring:dynamic-library");
            if !entry(self, ctx, cursor) || cursor.error() {
                let err = self.raise(
                    cursor,
                    ErrorKind::Import,
                    format!("Failed to initialize dynamic library '{target}'"),
                    token,
                );
                cursor.mark_fatal();
                return Err(err);
            }
            return Ok(self.nil());
        }
        let source = match std::fs::read_to_string(&target) {
            Ok(source) => source,
            Err(err) => {
                return Err(self.raise(
                    cursor,
                    ErrorKind::Import,
                    format!("Cannot open source file '{target}': {err}"),
                    token,
                ));
            }
        };
        tracing::debug!(file = %target, "bring");
        let Some(root) = cv_lexer::lex(&source, cursor) else {
            return Err(Unwind::Raised);
        };
        match self.eval_unit(&root, ctx, cursor) {
            Some(value) => Ok(value),
            None => Err(Unwind::Raised),
        }
    }
}

/// The name a call-site token leads with, for error messages.
fn call_site_name(token: &Token) -> &str {
    token
        .children
        .first()
        .map_or(token.text.as_str(), |head| head.text.as_str())
}
