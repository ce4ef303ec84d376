//! Error types used at the boundaries of the data model, the DSL parser and
//! the scheme runtime.
//!
//! Low-level tensor operations never return [`Result`]: an invalid shape is a
//! programmer error, not a recoverable condition (spec.md §7).

use thiserror::Error as ThisError;

/// Errors raised by the particle data model (groups, models, field
/// managers).
#[non_exhaustive]
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum DataError {
    /// A provided name is not a valid identifier (`[A-Za-z][A-Za-z0-9_]*`).
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
    /// A field add conflicts with an existing field of a different
    /// `TensorType`.
    #[error("field {0:?} already exists with a different type")]
    FieldOfDifferentTypeAlreadyExists(String),
    /// A group add conflicts with an existing group of a different type
    /// string.
    #[error("group {0:?} already exists with a different type")]
    GroupOfDifferentTypeAlreadyExists(String),
    /// A requested dynamic-dispatch path is not implemented.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// A location in a `.prtcl` source file, attached to every AST node and to
/// [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Raised when `.prtcl` source fails to parse.
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
#[error("parse error at {span}: {message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// Errors raised by the scheme runtime and registry.
#[non_exhaustive]
#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
pub enum SchemeError {
    /// [`crate::scheme::SchemeRegistry::instantiate`] was called with a name
    /// that was never registered.
    #[error("scheme not registered: {0:?}")]
    SchemeNotRegistered(String),
    /// [`crate::scheme::Scheme::run_procedure`] was called with a name the
    /// scheme does not expose.
    #[error("procedure not found: {0:?}")]
    UnknownProcedure(String),
    /// A `.prtcl` program referenced an unresolvable name during the
    /// compile prepass (duplicate alias, unknown group, etc).
    #[error("compile error: {0}")]
    CompileError(String),
}
