//! Driver library for the Basalt compiler
//!
//! The binary is a thin argument-parsing shell around [`driver`], which
//! runs the full pipeline: parse, symbol analysis, semantic analysis, MIR
//! lowering, instruction selection, register analysis, and assembly
//! emission.

pub mod driver;

pub use driver::{compile, compile_to_string, Options};
