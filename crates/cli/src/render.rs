use anyhow::{Context as AnyhowContext, Result};
use clap::ValueEnum;
use keyusage_core::{AnalysisReport, PathModel};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One dotted path per line
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Used paths as text, or the full report as JSON
pub fn render_report(report: &AnalysisReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(report.used_paths().to_text()),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
            Ok(json + "\n")
        }
    }
}

#[derive(Debug, Serialize)]
struct PathEntry {
    path: String,
    ambiguous: bool,
}

/// Every key path of the document, ambiguous ones marked
pub fn render_paths(model: &PathModel, format: OutputFormat) -> Result<String> {
    let entries: Vec<PathEntry> = model
        .paths()
        .iter()
        .map(|path| PathEntry {
            path: path.dotted(),
            ambiguous: model.is_ambiguous_path(path),
        })
        .collect();

    match format {
        OutputFormat::Text => {
            let mut text = String::new();
            for entry in &entries {
                text.push_str(&entry.path);
                if entry.ambiguous {
                    text.push_str("\t(ambiguous)");
                }
                text.push('\n');
            }
            Ok(text)
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&entries).context("Failed to serialize paths")?;
            Ok(json + "\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths_text_marks_ambiguity() {
        let model = PathModel::build(&json!({"a": {"id": 1}, "b": {"id": 2}, "c": {"x": 1}}));
        let text = render_paths(&model, OutputFormat::Text).unwrap();
        assert_eq!(text, "a.id\t(ambiguous)\nb.id\t(ambiguous)\nc.x\n");
    }

    #[test]
    fn test_paths_json() {
        let model = PathModel::build(&json!({"a": {"id": 1}}));
        let text = render_paths(&model, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!([{"path": "a.id", "ambiguous": false}]));
    }
}
