//! Lexical analysis and `$name` expansion.
//!
//! The grammar is deliberately flat: a line is split on runs of whitespace
//! and each resulting slice is classified by its exact text. There is no
//! quoting or escaping, so an argument can never contain whitespace, and
//! operators only count when they stand alone (`a|b` is a single word).

use crate::vars::VariableStore;
use std::borrow::Cow;

/// Classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Anything that is not an operator.
    Word,
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection, `<`. The next token names the file.
    RedirectIn,
    /// Output redirection, `>`. The next token names the file.
    RedirectOut,
    /// Background marker, `&`. Valid anywhere in the line.
    Background,
}

/// A token borrowed from the input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl<'a> Token<'a> {
    fn classify(text: &'a str) -> Self {
        let kind = match text {
            "|" => TokenKind::Pipe,
            "<" => TokenKind::RedirectIn,
            ">" => TokenKind::RedirectOut,
            "&" => TokenKind::Background,
            _ => TokenKind::Word,
        };
        Token { kind, text }
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

/// Split a line into tokens.
///
/// Runs of whitespace collapse, leading and trailing whitespace is dropped,
/// and a blank line produces no tokens.
pub fn tokenize(line: &str) -> Vec<Token<'_>> {
    line.split_whitespace().map(Token::classify).collect()
}

/// Expand a `$name` reference.
///
/// Only a `$` at the start of the word triggers a lookup, and the name runs
/// to the end of the word. An unbound name, a bare `$`, or a `$` elsewhere in
/// the word leaves the word untouched.
pub fn expand_word<'a>(word: &'a str, vars: &'a VariableStore) -> Cow<'a, str> {
    match word.strip_prefix('$') {
        Some(name) if !name.is_empty() => match vars.get(name) {
            Some(value) => Cow::Borrowed(value),
            None => Cow::Borrowed(word),
        },
        _ => Cow::Borrowed(word),
    }
}
