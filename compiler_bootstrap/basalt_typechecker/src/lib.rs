//! Semantic passes for the Basalt language
//!
//! Two visitors run over a parsed translation unit in order:
//!
//! 1. [`SymbolAnalysis`] links every named reference and field access to its
//!    defining node and replaces every reachable deferred type handle with
//!    the resolved interned type.
//! 2. [`SemanticAnalysis`] type-checks the unit, inserts implicit cast
//!    nodes, enforces mutability, and validates control-flow context.

pub mod sema;
pub mod symbols;

pub use sema::{SemanticAnalysis, TypeCheckMode, TypeCheckResult};
pub use symbols::{has_deferred_types, SymbolAnalysis};
