//! Lexical analysis for the Basalt language
//!
//! Turns UTF-8 source text into a stream of [`Token`]s. Keywords are spelled
//! as identifiers and recognized by value in the parser; the lexer only
//! distinguishes structural token kinds.

pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};
