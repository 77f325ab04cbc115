use crate::coverage::CoverageSample;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Location of a value inside a JSON document.
///
/// Segments are object member names; list indices never appear. The empty
/// path is the document root and is only used as a grouping key.
///
/// The dotted form cannot tell `{"a.b": 1}` from `{"a": {"b": 1}}`, so paths
/// with a `.` inside a segment serialize as a segment array instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "KeyPathRepr", try_from = "KeyPathRepr")]
pub struct KeyPath(Vec<String>);

/// Wire form of [`KeyPath`]
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum KeyPathRepr {
    Dotted(String),
    Segments(Vec<String>),
}

impl KeyPath {
    /// The document root (no segments)
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments, rejecting empty segments
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(String::is_empty) {
            return Err(AnalysisError::InvalidKeyPath(segments.join(".")));
        }
        Ok(Self(segments))
    }

    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        debug_assert!(segments.iter().all(|s| !s.is_empty()));
        Self(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Final segment
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Immediate parent; `None` for the root and for top-level members
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.0.len() >= 2).then(|| self.prefix(self.0.len() - 1))
    }

    /// Immediate parent, treating top-level members as children of the root
    #[must_use]
    pub fn parent_or_root(&self) -> Self {
        self.prefix(self.0.len().saturating_sub(1))
    }

    /// First `len` segments
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// Dotted textual form, e.g. `user.profile.id`
    #[must_use]
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

impl FromStr for KeyPath {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        Self::new(s.split('.'))
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.dotted()
    }
}

impl From<KeyPath> for KeyPathRepr {
    fn from(path: KeyPath) -> Self {
        if path.0.iter().any(|segment| segment.contains('.')) {
            Self::Segments(path.0)
        } else {
            Self::Dotted(path.dotted())
        }
    }
}

impl TryFrom<KeyPathRepr> for KeyPath {
    type Error = AnalysisError;

    fn try_from(value: KeyPathRepr) -> Result<Self> {
        match value {
            KeyPathRepr::Dotted(dotted) => dotted.parse(),
            KeyPathRepr::Segments(segments) => Self::new(segments),
        }
    }
}

/// Array-index-like names (ASCII digits only) carry no path information.
#[must_use]
pub fn is_numeric_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_digit())
}

/// One unit of JavaScript source handed to the matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Stable identifier (relative file path, `inline/1`, ...)
    pub id: String,

    /// Full source text
    pub source: String,

    /// Execution coverage in UTF-16 code-unit offsets, if collected
    #[serde(default)]
    pub coverage: Option<Vec<CoverageSample>>,
}

impl SourceUnit {
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            coverage: None,
        }
    }

    /// Builder: attach coverage samples
    #[must_use]
    pub fn with_coverage(mut self, coverage: Vec<CoverageSample>) -> Self {
        self.coverage = Some(coverage);
        self
    }
}

/// Syntactic form of a matched access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    /// `receiver.key`
    Member,
    /// `receiver["key"]`
    StringIndex,
    /// `receiver[key]`, matched on the identifier's name rather than its value
    IdentifierIndex,
}

/// A code location whose property or index text matches a JSON key name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSite {
    pub matched_key: String,

    /// Verbatim text of the object expression left of the access
    pub receiver: Option<String>,

    /// Verbatim text of the whole access expression
    pub snippet: String,

    pub unit_id: String,

    pub kind: AccessKind,

    /// Line of the access (1-indexed)
    pub line: usize,
}

impl AccessSite {
    /// Receiver text usable as voting evidence (non-empty)
    #[must_use]
    pub fn voting_receiver(&self) -> Option<&str> {
        self.receiver.as_deref().filter(|r| !r.is_empty())
    }
}

/// Pipeline stage that resolved a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStage {
    Scripts,
    InlineScripts,
    Template,
}

/// Why a path was judged used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Evidence {
    Code(Vec<AccessSite>),
    Template(Vec<String>),
}

impl Evidence {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Code(sites) => sites.len(),
            Self::Template(snippets) => snippets.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A key path judged used, with its evidence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub path: KeyPath,
    pub stage: ResolutionStage,
    pub evidence: Evidence,
}

/// Category of a per-unit failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    Encoding,
}

/// A failure isolated to one source unit; the run continues without it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub kind: FailureKind,
    pub message: String,
}
