//! The built-in core library, registered into the root context exactly as
//! a loaded extension would register its own natives.
//!
//! Handlers receive the raw argument instructions and evaluate them
//! themselves — `&`, `|`, the comparison branches, `if`, and `while` rely
//! on this to stay lazy. Everything else evaluates eagerly through
//! [`Runtime::eval_args`], which also splices expander arguments.

use std::sync::Arc;

use cv_diagnostic::{Cursor, ErrorKind};
use cv_ir::{InterruptKind, QuantKind, QuantRef};

use crate::control::Unwind;
use crate::runtime::{NativeCall, Runtime};

pub(crate) fn install(rt: &Runtime) {
    let root = rt.root();
    rt.register_native(root, "+", Arc::new(|rt, c, cur| fold(rt, c, cur, |a, b| a + b)));
    rt.register_native(root, "-", Arc::new(|rt, c, cur| fold(rt, c, cur, |a, b| a - b)));
    rt.register_native(root, "*", Arc::new(|rt, c, cur| fold(rt, c, cur, |a, b| a * b)));
    rt.register_native(root, "/", Arc::new(|rt, c, cur| fold(rt, c, cur, |a, b| a / b)));
    rt.register_native(root, "&", Arc::new(and));
    rt.register_native(root, "|", Arc::new(or));
    rt.register_native(root, "!", Arc::new(not));
    rt.register_native(root, "=", Arc::new(|rt, c, cur| compare(rt, c, cur, |a, b| a == b)));
    rt.register_native(root, "!=", Arc::new(|rt, c, cur| compare(rt, c, cur, |a, b| a != b)));
    rt.register_native(root, ">", Arc::new(|rt, c, cur| compare(rt, c, cur, |a, b| a > b)));
    rt.register_native(root, ">=", Arc::new(|rt, c, cur| compare(rt, c, cur, |a, b| a >= b)));
    rt.register_native(root, "<", Arc::new(|rt, c, cur| compare(rt, c, cur, |a, b| a < b)));
    rt.register_native(root, "<=", Arc::new(|rt, c, cur| compare(rt, c, cur, |a, b| a <= b)));
    rt.register_native(root, "if", Arc::new(branch_if));
    rt.register_native(root, "nth", Arc::new(nth));
    rt.register_native(root, "len", Arc::new(len));
    rt.register_native(root, ">>", Arc::new(push_front));
    rt.register_native(root, "<<", Arc::new(push_back));
    rt.register_native(root, "splice", Arc::new(splice));
    rt.register_native(root, "l-rev", Arc::new(reverse));
    rt.register_native(root, "++", Arc::new(|rt, c, cur| step_each(rt, c, cur, |n| n + 1.0)));
    rt.register_native(root, "--", Arc::new(|rt, c, cur| step_each(rt, c, cur, |n| n - 1.0)));
    rt.register_native(root, "//", Arc::new(|rt, c, cur| step_each(rt, c, cur, |n| n / 2.0)));
    rt.register_native(root, "**", Arc::new(|rt, c, cur| step_each(rt, c, cur, |n| n * n)));
    rt.register_native(root, "while", Arc::new(while_loop));
}

fn raise(cursor: &Cursor, call: &NativeCall, kind: ErrorKind, message: String) -> Unwind {
    cursor.raise_with(kind, message, call.token.line, Some(call.token.clone()));
    Unwind::Raised
}

fn numbers(
    values: &[QuantRef],
    call: &NativeCall,
    cursor: &Cursor,
) -> Result<Vec<f64>, Unwind> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let q = value.read();
        match q.as_number() {
            Some(n) => out.push(n),
            None => {
                return Err(raise(
                    cursor,
                    call,
                    ErrorKind::Type,
                    format!(
                        "'{}' expects NUMBER operands, got {}",
                        call.name,
                        q.quant_type()
                    ),
                ));
            }
        }
    }
    Ok(out)
}

fn finish_number(rt: &Runtime, call: &NativeCall, n: f64) {
    rt.fulfill(call, rt.program().build_quant(QuantKind::Number(n)));
}

fn fold(
    rt: &Runtime,
    call: &NativeCall,
    cursor: &Cursor,
    op: fn(f64, f64) -> f64,
) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.len() < 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            format!("'{}' expects at least 2 operands", call.name),
        ));
    }
    let nums = numbers(&values, call, cursor)?;
    let mut acc = nums[0];
    for &n in &nums[1..] {
        acc = op(acc, n);
    }
    finish_number(rt, call, acc);
    Ok(())
}

fn and(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    if call.args.len() < 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'&' expects at least 2 operands".to_string(),
        ));
    }
    for &arg in &call.args {
        let value = rt.execute(arg, cursor)?;
        if !value.read().is_truthy() {
            finish_number(rt, call, 0.0);
            return Ok(());
        }
    }
    finish_number(rt, call, 1.0);
    Ok(())
}

fn or(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    if call.args.len() < 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'|' expects at least 2 operands".to_string(),
        ));
    }
    for &arg in &call.args {
        let value = rt.execute(arg, cursor)?;
        if value.read().is_truthy() {
            finish_number(rt, call, 1.0);
            return Ok(());
        }
    }
    finish_number(rt, call, 0.0);
    Ok(())
}

fn not(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    if call.args.len() != 1 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'!' expects exactly 1 operand".to_string(),
        ));
    }
    let value = rt.execute(call.args[0], cursor)?;
    let truthy = value.read().is_truthy();
    finish_number(rt, call, if truthy { 0.0 } else { 1.0 });
    Ok(())
}

/// Comparisons take two numeric operands plus up to two lazily-evaluated
/// branch expressions: the third runs when the comparison holds, the
/// fourth when it does not.
fn compare(
    rt: &Runtime,
    call: &NativeCall,
    cursor: &Cursor,
    op: fn(f64, f64) -> bool,
) -> Result<(), Unwind> {
    if call.args.len() < 2 || call.args.len() > 4 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            format!("'{}' expects 2 operands and up to 2 branches", call.name),
        ));
    }
    let lhs = rt.execute(call.args[0], cursor)?;
    let rhs = rt.execute(call.args[1], cursor)?;
    let pair = numbers(&[lhs, rhs], call, cursor)?;
    let holds = op(pair[0], pair[1]);
    let branch = if holds { call.args.get(2) } else { call.args.get(3) };
    match branch {
        Some(&ins) => {
            let value = rt.execute(ins, cursor)?;
            rt.fulfill(call, value);
        }
        None => finish_number(rt, call, if holds { 1.0 } else { 0.0 }),
    }
    Ok(())
}

fn branch_if(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    if call.args.len() < 2 || call.args.len() > 3 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'if' expects a condition, a branch, and an optional else".to_string(),
        ));
    }
    let cond = rt.execute(call.args[0], cursor)?;
    let truthy = cond.read().is_truthy();
    let result = if truthy {
        rt.execute(call.args[1], cursor)?
    } else if let Some(&other) = call.args.get(2) {
        rt.execute(other, cursor)?
    } else {
        rt.program().build_quant(QuantKind::Nil)
    };
    rt.fulfill(call, result);
    Ok(())
}

fn nth(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.len() != 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'nth' expects an index and a list".to_string(),
        ));
    }
    let index = {
        match values[0].read().as_number() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
            _ => {
                return Err(raise(
                    cursor,
                    call,
                    ErrorKind::Type,
                    "'nth' expects a whole, non-negative index".to_string(),
                ));
            }
        }
    };
    let item = {
        let q = values[1].read();
        match &q.kind {
            QuantKind::List(members) => match members.get(index) {
                Some(member) => Ok(member.clone()),
                None => {
                    return Err(raise(
                        cursor,
                        call,
                        ErrorKind::Type,
                        format!("Index {index} is out of range (length {})", members.len()),
                    ));
                }
            },
            _ => Err(q.quant_type()),
        }
    };
    match item {
        Ok(item) => {
            rt.fulfill(call, item);
            Ok(())
        }
        Err(got) => Err(raise(
            cursor,
            call,
            ErrorKind::Type,
            format!("'nth' expects a LIST subject, got {got}"),
        )),
    }
}

fn len(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.len() != 1 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'len' expects exactly 1 operand".to_string(),
        ));
    }
    let length = {
        let q = values[0].read();
        match &q.kind {
            QuantKind::List(members) => Ok(members.len()),
            QuantKind::Store(members) => Ok(members.len()),
            QuantKind::String(s) => Ok(s.chars().count()),
            _ => Err(q.quant_type()),
        }
    };
    match length {
        Ok(n) => {
            finish_number(rt, call, n as f64);
            Ok(())
        }
        Err(got) => Err(raise(
            cursor,
            call,
            ErrorKind::Type,
            format!("'len' expects a LIST, STORE, or STRING, got {got}"),
        )),
    }
}

fn push_front(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    push_items(rt, call, cursor, true)
}

fn push_back(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    push_items(rt, call, cursor, false)
}

/// `>>`/`<<`: push the leading operands into the trailing list, in place.
fn push_items(
    rt: &Runtime,
    call: &NativeCall,
    cursor: &Cursor,
    front: bool,
) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.len() < 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            format!("'{}' expects at least 1 item and a list", call.name),
        ));
    }
    let (items, subject) = values.split_at(values.len() - 1);
    let subject = &subject[0];
    let pushed = {
        let mut q = subject.write();
        match &mut q.kind {
            QuantKind::List(members) => {
                for (offset, item) in items.iter().enumerate() {
                    if front {
                        members.insert(offset, item.clone());
                    } else {
                        members.push(item.clone());
                    }
                }
                true
            }
            _ => false,
        }
    };
    if !pushed {
        let got = subject.read().quant_type();
        return Err(raise(
            cursor,
            call,
            ErrorKind::Type,
            format!("'{}' expects a LIST subject, got {got}", call.name),
        ));
    }
    rt.fulfill(call, subject.clone());
    Ok(())
}

/// Concatenate lists into a new list, or merge stores into a new store.
/// Member handles are shared, not copied.
fn splice(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.len() < 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'splice' expects at least 2 operands".to_string(),
        ));
    }
    let all_lists = values
        .iter()
        .all(|v| matches!(v.read().kind, QuantKind::List(_)));
    if all_lists {
        let mut joined = Vec::new();
        for value in &values {
            if let QuantKind::List(members) = &value.read().kind {
                joined.extend(members.iter().cloned());
            }
        }
        rt.fulfill(call, rt.program().build_quant(QuantKind::List(joined)));
        return Ok(());
    }
    let all_stores = values
        .iter()
        .all(|v| matches!(v.read().kind, QuantKind::Store(_)));
    if all_stores {
        let mut joined = rustc_hash::FxHashMap::default();
        for value in &values {
            if let QuantKind::Store(members) = &value.read().kind {
                joined.extend(members.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        rt.fulfill(call, rt.program().build_quant(QuantKind::Store(joined)));
        return Ok(());
    }
    Err(raise(
        cursor,
        call,
        ErrorKind::Type,
        "'splice' expects operands of one kind, all LIST or all STORE".to_string(),
    ))
}

fn reverse(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.len() != 1 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'l-rev' expects exactly 1 operand".to_string(),
        ));
    }
    let reversed = {
        let q = values[0].read();
        match &q.kind {
            QuantKind::List(members) => Ok(members.iter().rev().cloned().collect::<Vec<_>>()),
            _ => Err(q.quant_type()),
        }
    };
    match reversed {
        Ok(members) => {
            rt.fulfill(call, rt.program().build_quant(QuantKind::List(members)));
            Ok(())
        }
        Err(got) => Err(raise(
            cursor,
            call,
            ErrorKind::Type,
            format!("'l-rev' expects a LIST, got {got}"),
        )),
    }
}

/// `++`/`--`/`//`/`**`: mutate each numeric operand in place. One operand
/// yields that quant back; several yield a list of them.
fn step_each(
    rt: &Runtime,
    call: &NativeCall,
    cursor: &Cursor,
    op: fn(f64) -> f64,
) -> Result<(), Unwind> {
    let values = rt.eval_args(&call.args, cursor)?;
    if values.is_empty() {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            format!("'{}' expects at least 1 operand", call.name),
        ));
    }
    for value in &values {
        let n = value.read().as_number();
        match n {
            Some(n) => value.write().kind = QuantKind::Number(op(n)),
            None => {
                let got = value.read().quant_type();
                return Err(raise(
                    cursor,
                    call,
                    ErrorKind::Type,
                    format!("'{}' expects NUMBER operands, got {got}", call.name),
                ));
            }
        }
    }
    if values.len() == 1 {
        rt.fulfill(call, values[0].clone());
    } else {
        rt.fulfill(call, rt.program().build_quant(QuantKind::List(values)));
    }
    Ok(())
}

/// `while COND BODY`: re-evaluates its raw condition each turn; `skip`
/// moves to the next iteration, `yield` stops the loop and becomes its
/// value.
fn while_loop(rt: &Runtime, call: &NativeCall, cursor: &Cursor) -> Result<(), Unwind> {
    if call.args.len() != 2 {
        return Err(raise(
            cursor,
            call,
            ErrorKind::Arity,
            "'while' expects a condition and a body".to_string(),
        ));
    }
    let cond = call.args[0];
    let body = call.args[1];
    let mut result = rt.program().build_quant(QuantKind::Nil);
    loop {
        let holds = rt.execute(cond, cursor)?.read().is_truthy();
        if !holds {
            break;
        }
        match rt.execute(body, cursor) {
            Ok(value) => result = value,
            Err(Unwind::Interrupt {
                kind: InterruptKind::Skip,
                ..
            }) => {}
            Err(Unwind::Interrupt {
                kind: InterruptKind::Yield,
                payload,
            }) => {
                result = payload;
                break;
            }
            Err(other) => return Err(other),
        }
    }
    rt.fulfill(call, result);
    Ok(())
}
