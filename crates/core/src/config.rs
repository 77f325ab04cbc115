use serde::{Deserialize, Serialize};

/// Upper bound for template evidence context on each side of a match
const MAX_SNIPPET_CONTEXT_CHARS: usize = 1000;

/// Configuration for an analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Characters of markup kept on each side of a template match
    pub snippet_context_chars: usize,

    /// Match units that contain syntax errors instead of skipping them
    pub tolerate_syntax_errors: bool,

    /// Restrict the script stage to the folder of the busiest unit
    pub group_by_source_folder: bool,

    /// Leading path components that define a source folder
    pub source_group_depth: usize,

    /// Scan script-free markup for `{{ key }}` references
    pub template_fallback: bool,

    /// Which part of each script unit is matched
    pub coverage_mode: CoverageMode,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            snippet_context_chars: 30,
            tolerate_syntax_errors: false,
            group_by_source_folder: true,
            source_group_depth: 2,
            template_fallback: true,
            coverage_mode: CoverageMode::Full,
        }
    }
}

impl AnalyzerConfig {
    /// Create config for whole script files
    pub fn for_full_source() -> Self {
        Self::default()
    }

    /// Create config for executed slices of covered scripts.
    ///
    /// Slices are rarely complete programs, so parsing is tolerant.
    pub fn for_coverage() -> Self {
        Self {
            tolerate_syntax_errors: true,
            coverage_mode: CoverageMode::Executed,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.group_by_source_folder && self.source_group_depth == 0 {
            return Err("source_group_depth must be > 0 when grouping by source folder".to_string());
        }

        if self.snippet_context_chars > MAX_SNIPPET_CONTEXT_CHARS {
            return Err(format!(
                "snippet_context_chars ({}) cannot exceed {MAX_SNIPPET_CONTEXT_CHARS}",
                self.snippet_context_chars
            ));
        }

        Ok(())
    }
}

/// Portion of a script unit handed to the matcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMode {
    /// The whole source, coverage ignored
    #[default]
    Full,

    /// Only executed ranges; units without coverage are skipped
    Executed,
}
