//! The Basalt mid-level IR
//!
//! A typed, block-structured SSA control-flow graph. Basic blocks take typed
//! block arguments instead of phi nodes; predecessors supply a matching
//! value on every edge. The crate also contains the builder used to emit
//! instructions, the target layout model, and the AST-to-MIR lowering pass.

pub mod builder;
pub mod codegen;
pub mod constant;
pub mod graph;
pub mod machine;
pub mod types;

pub use builder::Builder;
pub use codegen::Codegen;
pub use constant::{Const, ConstId, ConstPool};
pub use graph::*;
pub use machine::Machine;
pub use types::{MirType, MirTypeId, TypePool};
