//! # Key Usage Core
//!
//! Static detection of which keys of a JSON document are read by the
//! JavaScript (and templates) of a web page.
//!
//! ## Philosophy
//!
//! The analysis never executes code and never tracks data flow. It relies on
//! two observations:
//! - A property access whose name equals a JSON key is evidence for every
//!   path ending in that key
//! - Accesses that share a receiver expression usually read the same object,
//!   which tells apart paths that share key names
//!
//! ## Architecture
//!
//! ```text
//! JSON document
//!     │
//!     ├──> Path Model (paths, vocabulary, sibling shapes, leaf collisions)
//!     │
//! Script units ──> Coverage slicing (optional) ──> Code Matcher (tree-sitter)
//!     │                                                │
//!     │                                         Source grouping
//!     │                                                │
//!     └──────────────────────────────> Reconciler (candidates → receiver vote)
//!                                                      │
//! Inline scripts ──> Code Matcher ──> Reconciler (earlier results excluded)
//!                                                      │
//! Script-free markup ──> Template Scanner ─────────────┴──> AnalysisReport
//! ```
//!
//! ## Example
//!
//! ```rust
//! use keyusage_core::{AnalysisInput, Analyzer, AnalyzerConfig, SourceUnit};
//! use serde_json::json;
//!
//! let input = AnalysisInput {
//!     document: json!({"user": {"name": "Ada", "id": 1}}),
//!     scripts: vec![SourceUnit::new("app.js", "greet(obj.name);")],
//!     ..AnalysisInput::default()
//! };
//!
//! let analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
//! let report = analyzer.analyze(&input).unwrap();
//! assert_eq!(report.used_paths().to_text(), "user.name\n");
//! ```

mod analyzer;
mod config;
pub mod coverage;
mod error;
mod grouping;
pub mod markup;
mod matcher;
mod path_model;
mod reconcile;
mod result_set;
mod template;
mod types;

pub use analyzer::{AnalysisInput, AnalysisReport, Analyzer};
pub use config::{AnalyzerConfig, CoverageMode};
pub use coverage::{CoverageRange, CoverageReport, CoverageSample, RangeSet};
pub use error::{AnalysisError, Result};
pub use grouping::primary_group;
pub use matcher::{CodeMatcher, MatchReport};
pub use path_model::{LeafOccurrence, PathModel, SiblingShape};
pub use reconcile::{Reconciler, Reconciliation};
pub use result_set::ResultSet;
pub use template::TemplateScanner;
pub use types::{
    is_numeric_key, AccessKind, AccessSite, Evidence, FailureKind, KeyPath, ResolutionStage,
    ResolvedPath, SourceUnit, UnitFailure,
};
