//! Lexing: raw source text to a token hierarchy.
//!
//! Lexing is two passes. The first splits source into flat sibling tokens
//! at bracket depth zero, after stripping `#...#` comments and verifying
//! that brackets and quotes balance. The second recursively re-lexes every
//! token whose text is itself a bracketed expression, attaching the result
//! as children. Strings are single-quoted; brackets inside a string are
//! plain characters.
//!
//! Escape sequences inside string literals are NOT resolved here — the
//! token keeps the raw spelling so quote detection stays a prefix/suffix
//! check. [`unescape`] resolves them when a literal becomes a value.

use cv_diagnostic::{Cursor, ErrorKind};
use cv_ir::Token;

/// Drop `#...#` comments. Newlines inside a comment are preserved so line
/// numbers downstream stay accurate; tabs become spaces.
fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut on_string = false;
    let mut on_comment = false;
    let mut prev = '\0';
    for c in input.chars() {
        if c == '#' && !on_string {
            on_comment = !on_comment;
            prev = c;
            continue;
        }
        if on_comment {
            if c == '\n' {
                out.push('\n');
            }
            prev = c;
            continue;
        }
        if c == '\'' && prev != '\\' {
            on_string = !on_string;
        }
        out.push(if c == '\t' { ' ' } else { c });
        prev = c;
    }
    out
}

/// Verify brackets and quotes balance over the whole input. Raises a
/// syntax diagnostic naming the line where the unmatched bracket or quote
/// opened (or, for a stray `]`, where it appeared).
fn check_balance(input: &str, base_line: u32, cursor: &Cursor) -> bool {
    let mut on_string = false;
    let mut string_line = base_line;
    let mut prev = '\0';
    let mut opens: Vec<u32> = Vec::new();
    let mut stray_close: Option<u32> = None;
    let mut quotes = 0u32;
    let mut line = base_line;
    for c in input.chars() {
        if c == '\n' {
            line += 1;
        }
        if c == '\'' && prev != '\\' {
            on_string = !on_string;
            if on_string {
                string_line = line;
            }
            quotes += 1;
        } else if !on_string {
            if c == '[' {
                opens.push(line);
            } else if c == ']' && opens.pop().is_none() && stray_close.is_none() {
                stray_close = Some(line);
            }
        }
        prev = c;
    }
    if quotes % 2 != 0 {
        cursor.raise(ErrorKind::Syntax, "Mismatching quotes", string_line);
        return false;
    }
    if let Some(&open_line) = opens.first() {
        cursor.raise(ErrorKind::Syntax, "Mismatching brackets", open_line);
        return false;
    }
    if let Some(close_line) = stray_close {
        cursor.raise(ErrorKind::Syntax, "Mismatching brackets", close_line);
        return false;
    }
    true
}

fn flush(tokens: &mut Vec<Token>, buffer: &mut String, line: u32) {
    let text = buffer.trim();
    if !text.is_empty() {
        tokens.push(Token::new(text, line));
    }
    buffer.clear();
}

/// Split `input` into sibling tokens at bracket depth zero. Whitespace
/// separates tokens; a bracketed sub-expression is captured whole, text
/// and all, to be solved later. Adjacent bracket groups (`[a][b]`) split
/// even without whitespace between them.
fn split(input: &str, base_line: u32) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut buffer = String::new();
    let mut buffer_line = base_line;
    let mut line = base_line;
    let mut depth = 0i32;
    let mut on_string = false;
    let mut prev = '\0';
    for c in input.chars() {
        if c == '\n' {
            line += 1;
        }
        if (c == ' ' || c == '\n' || c == '\r') && depth == 0 && !on_string {
            flush(&mut tokens, &mut buffer, buffer_line);
            prev = c;
            continue;
        }
        if c == '\'' && prev != '\\' {
            on_string = !on_string;
        } else if !on_string {
            if c == '[' {
                depth += 1;
            } else if c == ']' {
                depth -= 1;
            }
        }
        if buffer.is_empty() {
            buffer_line = line;
        }
        buffer.push(c);
        if c == ']' && depth == 0 && !on_string {
            flush(&mut tokens, &mut buffer, buffer_line);
        }
        prev = c;
    }
    flush(&mut tokens, &mut buffer, buffer_line);
    tokens
}

/// Recursively re-lex a token whose text is a bracketed expression,
/// attaching the inner tokens as children.
fn solve(token: &mut Token) {
    if token.is_solved() {
        return;
    }
    let inner = &token.text[1..token.text.len() - 1];
    let mut children = split(inner, token.line);
    for child in &mut children {
        solve(child);
    }
    token.children = children;
}

/// Lex a source fragment into sibling tokens. The translator uses this for
/// namer and expander payloads, so there is no empty-input check.
pub fn lex_fragment(source: &str, base_line: u32, cursor: &Cursor) -> Option<Vec<Token>> {
    let cleaned = strip_comments(source);
    if !check_balance(&cleaned, base_line, cursor) {
        return None;
    }
    let mut tokens = split(&cleaned, base_line);
    for token in &mut tokens {
        solve(token);
    }
    Some(tokens)
}

/// Lex a source unit into a root token whose children are the top-level
/// statements. A program with no instructions is a syntax error; so are
/// mismatched brackets or quotes. On failure the cursor carries the
/// diagnostic and `None` comes back.
pub fn lex(source: &str, cursor: &Cursor) -> Option<Token> {
    let children = lex_fragment(source, 1, cursor)?;
    if children.is_empty() {
        cursor.raise(ErrorKind::Syntax, "This program has no instructions", 1);
        return None;
    }
    let mut root = Token::new(source.trim(), 1);
    root.children = children;
    Some(root)
}

/// Resolve escape sequences in a string literal's body (`\n`, `\t`, `\'`,
/// `\\`). Unknown escapes pass through verbatim.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn splits_flat_tokens_on_whitespace() {
        let cursor = Cursor::new();
        let root = lex("+ 1 2", &cursor);
        let root = root.unwrap();
        assert_eq!(texts(&root.children), vec!["+", "1", "2"]);
    }

    #[test]
    fn captures_bracketed_groups_whole() {
        let cursor = Cursor::new();
        let root = lex("set x [+ 1 [g 2]]", &cursor).unwrap();
        assert_eq!(texts(&root.children), vec!["set", "x", "[+ 1 [g 2]]"]);
        let group = &root.children[2];
        assert!(group.is_complex());
        assert_eq!(texts(&group.children), vec!["+", "1", "[g 2]"]);
        assert_eq!(texts(&group.children[2].children), vec!["g", "2"]);
    }

    #[test]
    fn adjacent_groups_split_without_whitespace() {
        let cursor = Cursor::new();
        let root = lex("[a][b]", &cursor).unwrap();
        assert_eq!(texts(&root.children), vec!["[a]", "[b]"]);
    }

    #[test]
    fn strings_keep_spaces_and_brackets() {
        let cursor = Cursor::new();
        let root = lex("print 'a [b] c'", &cursor).unwrap();
        assert_eq!(texts(&root.children), vec!["print", "'a [b] c'"]);
    }

    #[test]
    fn comments_are_dropped_but_lines_survive() {
        let cursor = Cursor::new();
        let root = lex("# heading #\nfirst\n# gone #second", &cursor).unwrap();
        assert_eq!(texts(&root.children), vec!["first", "second"]);
        assert_eq!(root.children[0].line, 2);
        assert_eq!(root.children[1].line, 3);
    }

    #[test]
    fn mismatched_brackets_raise_syntax_error() {
        let cursor = Cursor::new();
        assert!(lex("[+ 1 2", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.kind, ErrorKind::Syntax);
        assert_eq!(raised.message, "Mismatching brackets");
    }

    #[test]
    fn bracket_mismatch_names_the_opening_line() {
        let cursor = Cursor::new();
        assert!(lex("[let a 5]\n[let b\n[+ a 1]", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.message, "Mismatching brackets");
        assert_eq!(raised.line, 2);
    }

    #[test]
    fn stray_close_names_its_own_line() {
        let cursor = Cursor::new();
        assert!(lex("[let a 5]\n+ 1 2]", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.message, "Mismatching brackets");
        assert_eq!(raised.line, 2);
    }

    #[test]
    fn quote_mismatch_names_the_opening_line() {
        let cursor = Cursor::new();
        assert!(lex("[let a 1]\nsay 'oops", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.message, "Mismatching quotes");
        assert_eq!(raised.line, 2);
    }

    #[test]
    fn mismatched_quotes_raise_syntax_error() {
        let cursor = Cursor::new();
        assert!(lex("say 'oops", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.message, "Mismatching quotes");
    }

    #[test]
    fn brackets_inside_strings_do_not_count() {
        let cursor = Cursor::new();
        assert!(lex("say '[['", &cursor).is_some());
        assert!(!cursor.error());
    }

    #[test]
    fn empty_program_is_an_error() {
        let cursor = Cursor::new();
        assert!(lex("  # only a comment #  ", &cursor).is_none());
        let raised = cursor.raised().unwrap();
        assert_eq!(raised.message, "This program has no instructions");
    }

    #[test]
    fn namer_payload_stays_one_token() {
        let cursor = Cursor::new();
        let root = lex("~a[+ 1 2] ~b", &cursor).unwrap();
        assert_eq!(texts(&root.children), vec!["~a[+ 1 2]", "~b"]);
        assert!(root.children[0].is_solved());
    }

    #[test]
    fn line_numbers_track_newlines() {
        let cursor = Cursor::new();
        let root = lex("[let a 5]\n[let b 6]\n[+ a b]", &cursor).unwrap();
        let lines: Vec<u32> = root.children.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn unescape_resolves_known_sequences() {
        assert_eq!(unescape("a\\nb"), "a\nb");
        assert_eq!(unescape("it\\'s"), "it's");
        assert_eq!(unescape("x\\qy"), "x\\qy");
    }
}
