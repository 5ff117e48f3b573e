//! Error handling utilities for the Basalt compiler

use thiserror::Error;

/// The main error type for the Basalt compiler.
///
/// One variant exists per diagnostic class; every fatal diagnostic raised by
/// a compiler stage is carried through this type.
#[derive(Error, Debug, Clone)]
pub enum BasaltError {
    #[error("lexical error: {message}")]
    Lex { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("name error: {message}")]
    Name { message: String },

    #[error("type error: {message}")]
    Type { message: String },

    #[error("control flow error: {message}")]
    Control { message: String },

    #[error("code generation error: {message}")]
    Codegen { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Result type alias for Basalt compiler operations.
pub type BasaltResult<T> = Result<T, BasaltError>;

impl BasaltError {
    pub fn lex(message: impl Into<String>) -> Self {
        Self::Lex { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::Name { message: message.into() }
    }

    pub fn ty(message: impl Into<String>) -> Self {
        Self::Type { message: message.into() }
    }

    pub fn control(message: impl Into<String>) -> Self {
        Self::Control { message: message.into() }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::Codegen { message: message.into() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }

    /// The message carried by this error, without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Lex { message }
            | Self::Parse { message }
            | Self::Name { message }
            | Self::Type { message }
            | Self::Control { message }
            | Self::Codegen { message }
            | Self::Io { message } => message,
        }
    }
}
