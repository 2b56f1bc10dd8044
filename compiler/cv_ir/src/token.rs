//! The surface token tree.
//!
//! The lexer produces flat tokens; the hierarchy builder re-lexes any token
//! whose text is itself a bracketed expression and attaches the result as
//! `children`, leaving the parent a pure grouping node.

use std::fmt;

/// One surface token: its raw text, the line it started on, and any child
/// tokens attached by the hierarchy builder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub line: u32,
    pub children: Vec<Token>,
}

impl Token {
    pub fn new(text: impl Into<String>, line: u32) -> Self {
        Token {
            text: text.into(),
            line,
            children: Vec::new(),
        }
    }

    /// A token is solved when its text is not itself a bracketed expression
    /// still awaiting re-lexing.
    pub fn is_solved(&self) -> bool {
        let t = self.text.as_bytes();
        !(t.len() >= 3 && t[0] == b'[' && t[t.len() - 1] == b']')
    }

    /// Whether the hierarchy builder attached sub-tokens.
    pub fn is_complex(&self) -> bool {
        !self.children.is_empty()
    }

    /// Reconstruct a readable form of the token for diagnostics.
    pub fn render(&self) -> String {
        if self.children.is_empty() {
            return self.text.clone();
        }
        let inner: Vec<String> = self
            .children
            .iter()
            .map(|c| {
                if c.is_complex() {
                    format!("[{}]", c.render())
                } else {
                    c.render()
                }
            })
            .collect();
        inner.join(" ")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bracketed_text_is_unsolved() {
        assert!(!Token::new("[+ 1 2]", 1).is_solved());
        assert!(Token::new("name", 1).is_solved());
        assert!(Token::new("[]", 1).is_solved()); // too short to re-lex
    }

    #[test]
    fn render_rebuilds_nested_shape() {
        let mut root = Token::new(String::new(), 1);
        root.children.push(Token::new("+", 1));
        let mut nested = Token::new(String::new(), 1);
        nested.children.push(Token::new("a", 1));
        nested.children.push(Token::new("b", 1));
        root.children.push(nested);
        assert_eq!(root.render(), "+ [a b]");
    }
}
