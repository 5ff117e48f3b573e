//! Shared utilities for the Basalt compiler
//!
//! This crate provides functionality used across all compiler stages:
//! - Source location tracking
//! - Diagnostic messages and severity levels
//! - Error types and handling utilities

pub mod diagnostics;
pub mod error;
pub mod span;

pub use diagnostics::*;
pub use error::*;
pub use span::*;
