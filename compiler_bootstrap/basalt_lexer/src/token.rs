//! Token definitions for the Basalt language

use basalt_common::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural token kinds in the Basalt language.
///
/// Keywords (`let`, `ret`, `until`, ...) are not token kinds of their own:
/// they arrive as [`TokenKind::Identifier`] and are recognized by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals and names
    Identifier,
    Integer,
    Float,
    Char,
    String,
    /// A `$name` decorator such as `$public`.
    Rune,

    // Punctuation
    Path,       // ::
    OpenParen,  // (
    CloseParen, // )
    OpenBrace,  // {
    CloseBrace, // }
    OpenBrack,  // [
    CloseBrack, // ]
    Comma,      // ,
    Semicolon,  // ;
    Colon,      // :
    Dot,        // .
    Arrow,      // ->

    // Operators
    Eq,        // =
    EqEq,      // ==
    BangEq,    // !=
    Lt,        // <
    LtEq,      // <=
    Gt,        // >
    GtEq,      // >=
    LtLt,      // <<
    GtGt,      // >>
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Amp,       // &
    AmpAmp,    // &&
    Pipe,      // |
    PipePipe,  // ||
    Caret,     // ^
    Tilde,     // ~
    Bang,      // !

    Eof,
}

impl TokenKind {
    /// The surface spelling of a punctuation or operator kind, used in
    /// diagnostics. Value-carrying kinds return a descriptive name instead.
    pub fn spelling(self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Integer => "integer literal",
            TokenKind::Float => "float literal",
            TokenKind::Char => "character literal",
            TokenKind::String => "string literal",
            TokenKind::Rune => "rune",
            TokenKind::Path => "::",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBrace => "{",
            TokenKind::CloseBrace => "}",
            TokenKind::OpenBrack => "[",
            TokenKind::CloseBrack => "]",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Amp => "&",
            TokenKind::AmpAmp => "&&",
            TokenKind::Pipe => "|",
            TokenKind::PipePipe => "||",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spelling())
    }
}

/// A lexed token: a kind, its raw text value, and where it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub loc: Position,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>, loc: Position) -> Self {
        Self { kind, value: value.into(), loc }
    }

    pub fn eof(loc: Position) -> Self {
        Self::new(TokenKind::Eof, "", loc)
    }

    /// Test if this token is an identifier with the given value.
    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Identifier && self.value == kw
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Identifier
            | TokenKind::Integer
            | TokenKind::Float => write!(f, "{}", self.value),
            TokenKind::String => write!(f, "\"{}\"", self.value),
            TokenKind::Char => write!(f, "'{}'", self.value),
            TokenKind::Rune => write!(f, "${}", self.value),
            _ => write!(f, "{}", self.kind),
        }
    }
}
