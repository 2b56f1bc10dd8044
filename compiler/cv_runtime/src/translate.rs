//! The translator: recursive descent over the token tree, allocating
//! instruction nodes and context slots as it goes.
//!
//! Translation never throws: any failure raises into the cursor and yields
//! a `Noop` instruction, so every recursive call site checks the cursor
//! before using its result. Dispatch order for a bracket group: unwrap a
//! single child, named special forms, literal-headed implicit lists, store
//! construction (all-namer groups), then plain-name resolution — callable
//! values become invocations, stores with `~name` arguments become member
//! access, anything else falls back to list construction. A group whose
//! head is itself a bracket group is a sequential block when every child is
//! a form, a nested list otherwise.

use cv_diagnostic::{Cursor, ErrorKind};
use cv_ir::{
    CtxId, FunctionDef, InsArgs, InsId, InsKind, InterruptKind, QuantKind, QuantType, Token,
};

use crate::runtime::Runtime;

/// Names no binding may take.
const RESERVED: &[&str] = &[
    "let",
    "mut",
    "fn",
    "cc",
    "bring",
    "bring:dynamic-library",
    "skip",
    "yield",
    "return",
    "nil",
];

/// Strict numeric test: optional sign, digits, at most one dot.
fn is_number_literal(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|&c| c == '.').count() <= 1
        && body.chars().any(|c| c.is_ascii_digit())
}

fn is_string_literal(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'')
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !RESERVED.contains(&name)
        && !is_number_literal(name)
        && !name.contains(['[', ']', '\'', '~', '^', '#', ' '])
}

fn interrupt_kind(text: &str) -> Option<InterruptKind> {
    match text {
        "skip" => Some(InterruptKind::Skip),
        "yield" => Some(InterruptKind::Yield),
        "return" => Some(InterruptKind::Return),
        _ => None,
    }
}

/// Split `~name` / `~name[PAYLOAD]` into the name and the raw payload text.
fn parse_namer(text: &str) -> Option<(&str, Option<&str>)> {
    let body = text.strip_prefix('~')?;
    match body.find('[') {
        Some(idx) if idx > 0 && body.ends_with(']') => Some((&body[..idx], Some(&body[idx..]))),
        Some(_) => None,
        None => Some((body, None)),
    }
}

/// A bare `~name` with no payload, as used for store member access.
fn is_plain_namer(token: &Token) -> bool {
    !token.is_complex()
        && token.text.starts_with('~')
        && !token.text.contains('[')
        && token.text.len() > 1
}

fn is_literal_text(text: &str) -> bool {
    text == "nil" || text == "[]" || is_number_literal(text) || is_string_literal(text)
}

impl Runtime {
    pub(crate) fn translate(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        if cursor.error() {
            return self.noop(token);
        }
        if token.is_complex() {
            self.translate_group(token, ctx, cursor)
        } else {
            self.translate_leaf(token, ctx, cursor)
        }
    }

    fn noop(&self, token: &Token) -> InsId {
        self.program.create_instruction(InsKind::Noop, token.clone())
    }

    fn fail(&self, cursor: &Cursor, kind: ErrorKind, message: String, token: &Token) -> InsId {
        cursor.raise_with(kind, message, token.line, Some(token.clone()));
        self.noop(token)
    }

    /// Build a value in `ctx` and reference it directly.
    fn literal(&self, token: &Token, ctx: CtxId, kind: QuantKind) -> InsId {
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        let slot = context.store(context.build(kind));
        self.program
            .create_instruction(InsKind::StaticProxy { ctx, value: slot }, token.clone())
    }

    fn translate_leaf(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let text = token.text.as_str();
        if let Some(kind) = interrupt_kind(text) {
            return self
                .program
                .create_instruction(InsKind::Interrupt { kind, payload: None }, token.clone());
        }
        if text.starts_with('~') {
            return self.translate_namer(token, ctx, cursor);
        }
        if text.starts_with('^') {
            return self.translate_expander(token, ctx, cursor);
        }
        if text == "nil" {
            return self.literal(token, ctx, QuantKind::Nil);
        }
        if text == "[]" || !token.is_solved() {
            // `[]` and `[ ]` are empty lists, not names
            return self.program.create_instruction(
                InsKind::ConstructList {
                    members: InsArgs::new(),
                },
                token.clone(),
            );
        }
        if is_number_literal(text) {
            if let Ok(n) = text.parse::<f64>() {
                return self.literal(token, ctx, QuantKind::Number(n));
            }
        }
        if is_string_literal(text) {
            let body = cv_lexer::unescape(&text[1..text.len() - 1]);
            return self.literal(token, ctx, QuantKind::String(body));
        }
        match self.program.lookup_name(ctx, text) {
            Some((found_ctx, slot)) => self.program.create_instruction(
                InsKind::StaticProxy {
                    ctx: found_ctx,
                    value: slot,
                },
                token.clone(),
            ),
            None => self.fail(
                cursor,
                ErrorKind::Name,
                format!("Undefined name '{text}'"),
                token,
            ),
        }
    }

    fn translate_group(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let children = &token.children;
        if children.len() == 1 {
            return self.translate(&children[0], ctx, cursor);
        }
        let head = &children[0];
        if head.is_complex() {
            if children.len() >= 2 && children.iter().all(|c| self.is_form(c, ctx)) {
                return self.translate_block(token, ctx, cursor);
            }
            return self.translate_list(token, ctx, cursor);
        }
        let head_text = head.text.as_str();
        match head_text {
            "let" => return self.translate_let(token, ctx, cursor),
            "mut" => return self.translate_mut(token, ctx, cursor),
            "fn" => return self.translate_fn(token, ctx, cursor),
            "cc" => return self.translate_cc(token, ctx, cursor),
            "bring" => return self.translate_bring(token, ctx, cursor, false),
            "bring:dynamic-library" => return self.translate_bring(token, ctx, cursor, true),
            _ => {}
        }
        if let Some(kind) = interrupt_kind(head_text) {
            return self.translate_interrupt(token, kind, ctx, cursor);
        }
        if head_text.starts_with('~') {
            return self.translate_store(token, ctx, cursor);
        }
        if is_literal_text(head_text) || head_text.starts_with('^') {
            return self.translate_list(token, ctx, cursor);
        }
        let Some((found_ctx, found_slot)) = self.program.lookup_name(ctx, head_text) else {
            return self.fail(
                cursor,
                ErrorKind::Name,
                format!("Undefined name '{head_text}'"),
                token,
            );
        };
        let resolved = self
            .program
            .fetch(found_ctx, found_slot)
            .map(|q| q.read().quant_type());
        match resolved {
            Some(QuantType::NativeFunction) => {
                self.translate_native_call(token, found_ctx, found_slot, ctx, cursor)
            }
            Some(QuantType::Function) => {
                self.translate_function_call(token, found_ctx, found_slot, ctx, cursor, false)
            }
            Some(QuantType::Store) if children[1..].iter().all(is_plain_namer) => {
                self.translate_access(token, found_ctx, found_slot, cursor)
            }
            // Bound but still nil: a forward or recursive reference whose
            // value only exists once the enclosing chain runs. Resolve the
            // callee (or store) at execution time instead.
            Some(QuantType::Nil) => {
                if children[1..].iter().all(is_plain_namer) {
                    self.translate_access(token, found_ctx, found_slot, cursor)
                } else {
                    self.translate_function_call(token, found_ctx, found_slot, ctx, cursor, true)
                }
            }
            _ => self.translate_list(token, ctx, cursor),
        }
    }

    /// Whether a token reads as an executable form (a statement) rather
    /// than a value, deciding block-vs-list for bracket groups.
    fn is_form(&self, token: &Token, ctx: CtxId) -> bool {
        if !token.is_complex() {
            return interrupt_kind(&token.text).is_some();
        }
        let head = &token.children[0];
        if head.is_complex() {
            return token.children.len() >= 2
                && token.children.iter().all(|c| self.is_form(c, ctx));
        }
        let text = head.text.as_str();
        if RESERVED.contains(&text) && text != "nil" {
            return true;
        }
        if text.starts_with('~') || text.starts_with('^') || is_literal_text(text) {
            return false;
        }
        match self.program.lookup_name(ctx, text) {
            Some((found_ctx, found_slot)) => {
                match self
                    .program
                    .fetch(found_ctx, found_slot)
                    .map(|q| q.read().quant_type())
                {
                    Some(QuantType::Function | QuantType::NativeFunction) => true,
                    Some(QuantType::Nil) => token.children.len() >= 2,
                    _ => false,
                }
            }
            None => false,
        }
    }

    fn translate_block(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let mut entries = Vec::with_capacity(token.children.len());
        for child in &token.children {
            let entry = self.translate(child, ctx, cursor);
            if cursor.error() {
                return self.noop(token);
            }
            entries.push(entry);
        }
        for pair in entries.windows(2) {
            self.link_chain(pair[0], pair[1]);
        }
        entries
            .first()
            .copied()
            .unwrap_or_else(|| self.noop(token))
    }

    fn translate_list(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let mut members = InsArgs::new();
        for child in &token.children {
            members.push(self.translate(child, ctx, cursor));
            if cursor.error() {
                return self.noop(token);
            }
        }
        self.program
            .create_instruction(InsKind::ConstructList { members }, token.clone())
    }

    fn translate_store(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let mut names = Vec::with_capacity(token.children.len());
        let mut members = InsArgs::new();
        for child in &token.children {
            if child.is_complex() {
                return self.fail(
                    cursor,
                    ErrorKind::Constructor,
                    format!("Store construction accepts only ~name members, got '{}'", child.render()),
                    token,
                );
            }
            let text = child.text.as_str();
            if text.starts_with('^') {
                names.push(String::new());
                members.push(self.translate(child, ctx, cursor));
            } else {
                let Some((name, payload)) = parse_namer(text) else {
                    return self.fail(
                        cursor,
                        ErrorKind::Constructor,
                        format!("Store construction accepts only ~name members, got '{text}'"),
                        token,
                    );
                };
                if !is_valid_name(name) {
                    return self.fail(
                        cursor,
                        ErrorKind::Name,
                        format!("Invalid or reserved name '{name}'"),
                        token,
                    );
                }
                names.push(name.to_string());
                let member = match payload {
                    Some(payload_text) => {
                        let Some(value) =
                            self.fragment_token(payload_text, child.line, cursor)
                        else {
                            return self.noop(token);
                        };
                        self.translate(&value, ctx, cursor)
                    }
                    None => self.literal(child, ctx, QuantKind::Nil),
                };
                members.push(member);
            }
            if cursor.error() {
                return self.noop(token);
            }
        }
        self.program
            .create_instruction(InsKind::ConstructStore { names, members }, token.clone())
    }

    fn translate_let(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let children = &token.children;
        if children.len() != 3 {
            return self.fail(
                cursor,
                ErrorKind::Arity,
                format!("'let' expects a name and a value, got {} operands", children.len() - 1),
                token,
            );
        }
        let name_token = &children[1];
        if name_token.is_complex() || !is_valid_name(&name_token.text) {
            return self.fail(
                cursor,
                ErrorKind::Name,
                format!("Invalid or reserved name '{}'", name_token.render()),
                token,
            );
        }
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        // Bind before compiling the value so forward and self references
        // inside the value resolve to this slot.
        let slot = context.promise();
        context.bind_name(name_token.text.as_str(), slot);
        let value = self.translate(&children[2], ctx, cursor);
        if cursor.error() {
            return self.noop(token);
        }
        self.program.create_instruction(
            InsKind::Let {
                name: name_token.text.clone(),
                ctx,
                slot,
                value,
            },
            token.clone(),
        )
    }

    fn translate_mut(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let children = &token.children;
        if children.len() != 3 {
            return self.fail(
                cursor,
                ErrorKind::Arity,
                format!("'mut' expects a name and a value, got {} operands", children.len() - 1),
                token,
            );
        }
        let name = children[1].text.as_str();
        let Some((found_ctx, found_slot)) = self.program.lookup_name(ctx, name) else {
            return self.fail(
                cursor,
                ErrorKind::Name,
                format!("Cannot mutate undefined name '{name}'"),
                token,
            );
        };
        let value = self.translate(&children[2], ctx, cursor);
        if cursor.error() {
            return self.noop(token);
        }
        self.program.create_instruction(
            InsKind::Mut {
                name: name.to_string(),
                ctx: found_ctx,
                slot: found_slot,
                value,
            },
            token.clone(),
        )
    }

    fn translate_fn(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let children = &token.children;
        if children.len() != 3 {
            return self.fail(
                cursor,
                ErrorKind::Arity,
                "'fn' expects a parameter list and a body".to_string(),
                token,
            );
        }
        let params_token = &children[1];
        let mut params = Vec::new();
        if params_token.is_complex() {
            for param in &params_token.children {
                if param.is_complex() || !is_valid_name(&param.text) {
                    return self.fail(
                        cursor,
                        ErrorKind::Name,
                        format!("Invalid parameter name '{}'", param.render()),
                        token,
                    );
                }
                params.push(param.text.clone());
            }
        } else if params_token.text != "[]" && params_token.is_solved() {
            if !is_valid_name(&params_token.text) {
                return self.fail(
                    cursor,
                    ErrorKind::Constructor,
                    "Function parameters must be a bracketed list of names".to_string(),
                    token,
                );
            }
            params.push(params_token.text.clone());
        }
        let home = self.program.create_context(Some(ctx));
        for param in &params {
            let slot = home.promise();
            home.bind_name(param.as_str(), slot);
        }
        let entry = self.translate(&children[2], home.id, cursor);
        if cursor.error() {
            return self.noop(token);
        }
        let quant = self.program.build_quant(QuantKind::Function(FunctionDef {
            entry,
            home: home.id,
            params,
            body: children[2].clone(),
        }));
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        let slot = context.store(quant);
        self.program
            .create_instruction(InsKind::StaticProxy { ctx, value: slot }, token.clone())
    }

    fn translate_cc(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        if token.children.len() != 2 {
            return self.fail(
                cursor,
                ErrorKind::Arity,
                "'cc' expects exactly one value".to_string(),
                token,
            );
        }
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        let slot = context.promise();
        let value = self.translate(&token.children[1], ctx, cursor);
        if cursor.error() {
            return self.noop(token);
        }
        self.program
            .create_instruction(InsKind::CarbonCopy { ctx, slot, value }, token.clone())
    }

    fn translate_bring(
        &self,
        token: &Token,
        ctx: CtxId,
        cursor: &Cursor,
        dynamic: bool,
    ) -> InsId {
        if token.children.len() != 2 {
            return self.fail(
                cursor,
                ErrorKind::Arity,
                "'bring' expects exactly one name".to_string(),
                token,
            );
        }
        let name = self.translate(&token.children[1], ctx, cursor);
        if cursor.error() {
            return self.noop(token);
        }
        self.program
            .create_instruction(InsKind::Import { dynamic, name, ctx }, token.clone())
    }

    fn translate_interrupt(
        &self,
        token: &Token,
        kind: InterruptKind,
        ctx: CtxId,
        cursor: &Cursor,
    ) -> InsId {
        if token.children.len() > 2 {
            return self.fail(
                cursor,
                ErrorKind::Arity,
                format!("'{}' accepts at most one value", kind.name()),
                token,
            );
        }
        let payload = match token.children.get(1) {
            Some(child) => {
                let ins = self.translate(child, ctx, cursor);
                if cursor.error() {
                    return self.noop(token);
                }
                Some(ins)
            }
            None => None,
        };
        self.program
            .create_instruction(InsKind::Interrupt { kind, payload }, token.clone())
    }

    fn translate_namer(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let Some((name, payload)) = parse_namer(&token.text) else {
            return self.fail(
                cursor,
                ErrorKind::Name,
                format!("Malformed namer '{}'", token.text),
                token,
            );
        };
        if !is_valid_name(name) {
            return self.fail(
                cursor,
                ErrorKind::Name,
                format!("Invalid or reserved name '{name}'"),
                token,
            );
        }
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        // The ghost slot: bound now so forward references compile against
        // it, written when the namer runs.
        let slot = context.promise();
        context.bind_name(name, slot);
        let inner = match payload {
            Some(payload_text) => {
                let Some(value) = self.fragment_token(payload_text, token.line, cursor) else {
                    return self.noop(token);
                };
                let ins = self.translate(&value, ctx, cursor);
                if cursor.error() {
                    return self.noop(token);
                }
                Some(ins)
            }
            None => None,
        };
        self.program.create_instruction(
            InsKind::Namer {
                name: name.to_string(),
                inner,
                ctx,
                slot,
            },
            token.clone(),
        )
    }

    fn translate_expander(&self, token: &Token, ctx: CtxId, cursor: &Cursor) -> InsId {
        let body = &token.text[1..];
        if body.is_empty() {
            return self.fail(
                cursor,
                ErrorKind::Syntax,
                "Expander requires an expression".to_string(),
                token,
            );
        }
        let Some(inner_token) = self.fragment_token(body, token.line, cursor) else {
            return self.noop(token);
        };
        let inner = self.translate(&inner_token, ctx, cursor);
        if cursor.error() {
            return self.noop(token);
        }
        self.program
            .create_instruction(InsKind::Expander { inner }, token.clone())
    }

    /// Re-lex an embedded payload (`~name[...]`, `^...`) into exactly one
    /// token.
    fn fragment_token(&self, text: &str, line: u32, cursor: &Cursor) -> Option<Token> {
        let mut tokens = cv_lexer::lex_fragment(text, line, cursor)?;
        match tokens.len() {
            1 => tokens.pop(),
            0 => {
                cursor.raise(ErrorKind::Syntax, format!("Empty expression in '{text}'"), line);
                None
            }
            _ => {
                cursor.raise(ErrorKind::Syntax, format!("Malformed expression '{text}'"), line);
                None
            }
        }
    }

    fn translate_function_call(
        &self,
        token: &Token,
        func_ctx: CtxId,
        func_slot: cv_ir::ValueId,
        ctx: CtxId,
        cursor: &Cursor,
        dynamic: bool,
    ) -> InsId {
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        let mut args = InsArgs::new();
        let mut has_expander = false;
        for child in &token.children[1..] {
            if !child.is_complex() && child.text.starts_with('^') {
                has_expander = true;
            }
            args.push(self.translate(child, ctx, cursor));
            if cursor.error() {
                return self.noop(token);
            }
        }
        // Static arity check: only when the callee is already resolved and
        // no expander can change the argument count at run time.
        if !dynamic && !has_expander {
            if let Some(callee) = self.program.fetch(func_ctx, func_slot) {
                if let QuantKind::Function(def) = &callee.read().kind {
                    if def.params.len() != args.len() {
                        return self.fail(
                            cursor,
                            ErrorKind::Arity,
                            format!(
                                "'{}' expects {} arguments, {} were provided",
                                token.children[0].text,
                                def.params.len(),
                                args.len()
                            ),
                            token,
                        );
                    }
                }
            }
        }
        let out_slot = context.promise();
        let invoke = self.program.create_instruction(
            InsKind::InvokeFunction {
                func_ctx,
                func_slot,
                args,
                out_ctx: ctx,
                out_slot,
            },
            token.clone(),
        );
        self.program.create_instruction(
            InsKind::Promise {
                inner: invoke,
                ctx,
                slot: out_slot,
            },
            token.clone(),
        )
    }

    fn translate_native_call(
        &self,
        token: &Token,
        func_ctx: CtxId,
        func_slot: cv_ir::ValueId,
        ctx: CtxId,
        cursor: &Cursor,
    ) -> InsId {
        let Some(context) = self.program.context(ctx) else {
            return self.noop(token);
        };
        // Arguments compile against a dedicated child context so the
        // handler can evaluate them lazily without touching the caller's
        // scratch values.
        let args_ctx = self.program.create_context(Some(ctx));
        let mut args = InsArgs::new();
        for child in &token.children[1..] {
            args.push(self.translate(child, args_ctx.id, cursor));
            if cursor.error() {
                return self.noop(token);
            }
        }
        let out_slot = context.promise();
        let invoke = self.program.create_instruction(
            InsKind::InvokeNative {
                func_ctx,
                func_slot,
                args,
                args_ctx: args_ctx.id,
                out_ctx: ctx,
                out_slot,
            },
            token.clone(),
        );
        self.program.create_instruction(
            InsKind::Promise {
                inner: invoke,
                ctx,
                slot: out_slot,
            },
            token.clone(),
        )
    }

    fn translate_access(
        &self,
        token: &Token,
        subject_ctx: CtxId,
        subject_slot: cv_ir::ValueId,
        cursor: &Cursor,
    ) -> InsId {
        let mut members = Vec::with_capacity(token.children.len() - 1);
        for child in &token.children[1..] {
            match child.text.strip_prefix('~') {
                Some(name) if is_valid_name(name) => members.push(name.to_string()),
                _ => {
                    return self.fail(
                        cursor,
                        ErrorKind::Name,
                        format!("Invalid member name '{}'", child.render()),
                        token,
                    );
                }
            }
        }
        self.program.create_instruction(
            InsKind::Access {
                subject_ctx,
                subject_slot,
                members,
            },
            token.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literal_test_is_strict() {
        assert!(is_number_literal("42"));
        assert!(is_number_literal("-0.5"));
        assert!(!is_number_literal("1.2.3"));
        assert!(!is_number_literal("-"));
        assert!(!is_number_literal("4x"));
        assert!(!is_number_literal(""));
    }

    #[test]
    fn namer_parsing_splits_payload() {
        assert_eq!(parse_namer("~a"), Some(("a", None)));
        assert_eq!(parse_namer("~a[+ 1 2]"), Some(("a", Some("[+ 1 2]"))));
        assert_eq!(parse_namer("~[x]"), None);
        assert_eq!(parse_namer("x"), None);
    }

    #[test]
    fn reserved_words_are_not_valid_names() {
        assert!(!is_valid_name("let"));
        assert!(!is_valid_name("nil"));
        assert!(!is_valid_name("3"));
        assert!(is_valid_name("total"));
        assert!(is_valid_name("l-rev"));
    }
}
