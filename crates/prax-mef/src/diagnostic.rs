//! Structured diagnostics for model construction and analysis
//!
//! The core never exits the process; every failure is reported as a
//! `Diagnostic` carrying an error kind, the offending identifier when one
//! is known, and the source line of the declarative element it came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of everything that can go wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Structurally malformed input element.
    #[error("invalid format")]
    InvalidFormat,
    /// The same id bound to incompatible entity kinds.
    #[error("identifier conflict")]
    IdentifierConflict,
    /// The same id defined twice within its kind.
    #[error("duplicate definition")]
    DuplicateDefinition,
    /// Reference to an id that is never defined.
    #[error("missing definition")]
    MissingDefinition,
    /// Gate cycle or parameter cycle.
    #[error("cyclic reference")]
    CyclicReference,
    /// Operator arity, vote-number, or INHIBIT flavor violation.
    #[error("gate structure")]
    GateStructure,
    /// Numeric constraint violated (probability outside [0, 1], EF <= 1, ...).
    #[error("expression domain")]
    ExpressionDomain,
    /// The order limit was exhausted before any product was found.
    #[error("analysis limit")]
    AnalysisLimit,
    /// Impossible internal state; always a bug.
    #[error("logic error")]
    Logic,
}

/// Source coordinate of a declarative element.
///
/// The core consumes already-parsed elements; the parser forwards the
/// line number so diagnostics can point back into the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Line number in the input document (1-indexed), if known.
    pub line: Option<u32>,
}

impl SourceRef {
    /// Reference to a known line.
    pub fn at(line: u32) -> Self {
        Self { line: Some(line) }
    }

    /// Reference with no source information.
    pub fn unknown() -> Self {
        Self { line: None }
    }
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The entity this is about, in display form.
    pub id: Option<String>,
    /// Source line of the element, if known.
    pub line: Option<u32>,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic with just a kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            id: None,
            line: None,
            message: message.into(),
        }
    }

    /// Attach the identifier the diagnostic is about.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a source coordinate.
    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.line = source.line;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(line) = self.line {
            write!(f, " at line {}", line)?;
        }
        if let Some(id) = &self.id {
            write!(f, " [{}]", id)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// Render a batch of diagnostics, one per line.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    for diagnostic in diagnostics {
        out.push_str(&diagnostic.to_string());
        out.push('\n');
    }
    out
}
