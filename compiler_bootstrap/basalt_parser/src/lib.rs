//! Syntax analysis for the Basalt language
//!
//! This crate owns the per-translation-unit type interning context, the
//! abstract syntax tree and its lexical scope tree, and the recursive-descent
//! parser that builds all three from a token stream.

pub mod ast;
pub mod parser;
pub mod precedence;
pub mod scope;
pub mod types;

pub use ast::*;
pub use parser::Parser;
pub use precedence::Precedence;
pub use scope::{Scope, ScopeId, Scopes};
pub use types::*;
