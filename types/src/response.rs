//! Serde shapes of the checker's `--json` output.
//!
//! Only the fields flowide consumes are modelled; everything else the checker
//! prints is ignored. Numeric coordinates are 1-based, exactly as the checker
//! reports them.

use serde::{Deserialize, Serialize};

/// `autocomplete --json`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutocompleteResponse {
    #[serde(default)]
    pub result: Vec<AutocompleteEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutocompleteEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
    /// `null` for anything that is not callable.
    #[serde(default)]
    pub func_details: Option<FuncDetails>,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDetails {
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub params: Vec<FuncParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncParam {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: String,
}

/// `type-at-pos --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAtPosResponse {
    #[serde(rename = "type", default)]
    pub type_: String,
}

/// `get-def --json`. An empty `path` means "no definition".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DefinitionResponse {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub endline: u32,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

/// `coverage --json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageResponse {
    pub expressions: CoverageExpressions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageExpressions {
    pub covered_count: u32,
    pub uncovered_count: u32,
    #[serde(default)]
    pub uncovered_locs: Vec<CoverageLoc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageLoc {
    pub start: LocPoint,
    pub end: LocPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocPoint {
    pub line: u32,
    pub column: u32,
}

/// `status --json`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<StatusError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: Vec<MessagePart>,
    #[serde(default)]
    pub operation: Option<MessagePart>,
}

impl StatusError {
    /// The operation part, if it points at a source location.
    #[must_use]
    pub fn blamed_operation(&self) -> Option<&MessagePart> {
        self.operation.as_ref().filter(|op| op.is_blame())
    }

    #[must_use]
    pub fn first_blame(&self) -> Option<&MessagePart> {
        self.message.iter().find(|m| m.is_blame())
    }
}

/// One piece of a status error message. `Blame` parts carry a location,
/// `Comment` parts are plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(default)]
    pub descr: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub endline: u32,
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub end: u32,
}

impl MessagePart {
    #[must_use]
    pub fn is_blame(&self) -> bool {
        self.kind == "Blame"
    }
}
