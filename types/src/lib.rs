//! Core domain types for flowide.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Editor-side primitives live here next to the serde shapes of the checker's JSON
//! output so that every layer (checker, providers, CLI) speaks the same vocabulary.

mod response;
pub use response::{
    AutocompleteEntry, AutocompleteResponse, CoverageExpressions, CoverageLoc, CoverageResponse,
    DefinitionResponse, FuncDetails, FuncParam, LocPoint, MessagePart, StatusError,
    StatusResponse, TypeAtPosResponse,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Positions & Ranges
// ============================================================================

/// A 0-based line/character position in a text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("1-based position must have line and column >= 1 (got {line}:{column})")]
pub struct InvalidPosition {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Build a position from the checker's / editor's 1-based line and column.
    pub fn from_one_based(line: u32, column: u32) -> Result<Self, InvalidPosition> {
        if line == 0 || column == 0 {
            return Err(InvalidPosition { line, column });
        }
        Ok(Self::new(line - 1, column - 1))
    }

    /// 1-based line as the checker expects it on the command line.
    #[must_use]
    pub const fn one_based_line(self) -> u32 {
        self.line + 1
    }

    /// 1-based column as the checker expects it on the command line.
    #[must_use]
    pub const fn one_based_column(self) -> u32 {
        self.character + 1
    }

    /// Position built from 1-based checker coordinates, saturating at the
    /// buffer origin instead of underflowing.
    #[must_use]
    pub const fn saturating_from_checker(line: u32, column: u32) -> Self {
        Self::new(line.saturating_sub(1), column.saturating_sub(1))
    }
}

/// A half-open range between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A range inside a specific file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub range: Range,
}

// ============================================================================
// Completion
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Function,
    Class,
    Variable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    /// Text inserted on accept. Contains `{{placeholder}}` tab stops when
    /// function snippets are enabled.
    pub insert_text: String,
    pub detail: String,
}

// ============================================================================
// Hover & Signature Help
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hover {
    /// Header shown above the code block.
    pub title: String,
    /// Language tag for the code block.
    pub language: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInformation {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInformation {
    pub label: String,
    pub parameters: Vec<ParameterInformation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureHelp {
    pub signatures: Vec<SignatureInformation>,
    pub active_signature: u32,
    /// `None` when the call has no parameters to highlight.
    pub active_parameter: Option<u32>,
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

impl DiagnosticSeverity {
    /// Map the checker's `level` field. Only `error` is an error.
    #[must_use]
    pub fn from_level(level: &str) -> Self {
        if level == "error" {
            DiagnosticSeverity::Error
        } else {
            DiagnosticSeverity::Warning
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, DiagnosticSeverity::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub message: String,
    pub severity: DiagnosticSeverity,
    pub source: String,
}

/// Diagnostics grouped by the file they point at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    files: Vec<(PathBuf, Vec<Diagnostic>)>,
}

impl DiagnosticsReport {
    #[must_use]
    pub fn new(files: Vec<(PathBuf, Vec<Diagnostic>)>) -> Self {
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[(PathBuf, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn for_file(&self, path: &std::path::Path) -> Option<&[Diagnostic]> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, items)| items.as_slice())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity.is_error())
            .count()
    }
}

// ============================================================================
// Coverage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub covered: u32,
    pub uncovered: u32,
    /// Whole-number percentage of covered expressions.
    pub percent: u32,
    /// Uncovered ranges, empty when decorations are turned off.
    pub uncovered_ranges: Vec<Range>,
}

impl CoverageReport {
    /// Status bar text, e.g. `Flow coverage 87%`.
    #[must_use]
    pub fn status_text(&self) -> String {
        format!("Flow coverage {}%", self.percent)
    }
}
