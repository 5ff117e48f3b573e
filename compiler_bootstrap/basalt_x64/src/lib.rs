//! x86-64 backend for the Basalt compiler
//!
//! Lowers the MIR control-flow graph into parametric x86-64 machine
//! instructions over virtual registers, allocates physical registers by
//! linear scan, inserts caller-saved spills around calls, and writes
//! AT&T-syntax GNU assembler text.

pub mod asm;
pub mod isel;
pub mod mach;
pub mod regalloc;
pub mod register;

pub use asm::AsmWriter;
pub use isel::InstSelector;
pub use mach::*;
pub use regalloc::{LiveRange, RegisterAnalysis};
pub use register::{Register, RegisterClass, X64Register};
