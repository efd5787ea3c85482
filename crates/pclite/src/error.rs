//! Fatal compile errors.
//!
//! Every error the core raises carries a [`Category`], a primary
//! [`Segment`], a human-readable message, and zero or more
//! secondary notes. There is no recovery: the first error aborts the
//! compilation. Rendering an error against the source buffer (carets,
//! colors, file/line headers) is left to the external diagnostics
//! collaborator — this type only carries what that collaborator needs.

use std::fmt;

use crate::ast::Segment;

/// Coarse-grained error kind, used by callers to map to exit codes or to
/// filter which stage produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Category {
    Tokenization,
    Structural,
    Parse,
    Type,
    Semantic,
    Io,
}

/// A secondary span attached to an error, e.g. "declared here".
#[derive(Debug, Clone, serde::Serialize)]
pub struct Note {
    pub message: String,
    pub span: Option<Segment>,
}

impl Note {
    #[must_use]
    pub fn new(message: impl Into<String>, span: Segment) -> Self {
        Self { message: message.into(), span: Some(span) }
    }

    #[must_use]
    pub fn without_span(message: impl Into<String>) -> Self {
        Self { message: message.into(), span: None }
    }
}

/// Serializable so a host can hand structured diagnostics to an external
/// renderer instead of the plain-text [`fmt::Display`] form.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CompileError {
    pub category: Category,
    pub message: String,
    pub span: Segment,
    pub notes: Vec<Note>,
}

impl CompileError {
    #[must_use]
    pub fn new(category: Category, span: Segment, message: impl Into<String>) -> Self {
        Self { category, message: message.into(), span, notes: Vec::new() }
    }

    #[must_use]
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} error at {}:{}: {}",
            self.category, self.span.line1 + 1, self.span.column1 + 1, self.message
        )?;
        for note in &self.notes {
            write!(f, "\n  note: {}", note.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

pub type CResult<T> = std::result::Result<T, CompileError>;
