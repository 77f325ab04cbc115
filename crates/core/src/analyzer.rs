use crate::config::{AnalyzerConfig, CoverageMode};
use crate::coverage::executed_source;
use crate::error::{AnalysisError, Result};
use crate::grouping::primary_group;
use crate::markup::{inline_units, strip_scripts};
use crate::matcher::CodeMatcher;
use crate::path_model::PathModel;
use crate::reconcile::Reconciler;
use crate::result_set::ResultSet;
use crate::template::TemplateScanner;
use crate::types::{
    FailureKind, KeyPath, ResolutionStage, ResolvedPath, SourceUnit, UnitFailure,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Everything one analysis run looks at
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    /// The JSON document whose keys are checked
    pub document: Value,

    /// Top-level script units (files)
    pub scripts: Vec<SourceUnit>,

    /// Page markup holding inline scripts and templates
    pub markup: Option<String>,

    /// Inline script units, one per `<script>` block; taken from `markup`
    /// when empty
    pub inline_scripts: Vec<SourceUnit>,

    /// Paths resolved by an earlier run; never reported again
    pub excluded: ResultSet,
}

impl AnalysisInput {
    /// Inline units the inline stage looks at
    #[must_use]
    pub fn inline_units(&self) -> Vec<SourceUnit> {
        if !self.inline_scripts.is_empty() {
            return self.inline_scripts.clone();
        }
        self.markup.as_deref().map(inline_units).unwrap_or_default()
    }
}

/// Outcome of one analysis run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Paths judged used, in stage order
    pub resolved: Vec<ResolvedPath>,

    /// Candidates left out because no receiver vote supported them
    pub ambiguous: BTreeSet<KeyPath>,

    /// Paths neither resolved nor excluded
    pub unused: BTreeSet<KeyPath>,

    /// Units skipped or degraded
    pub failures: Vec<UnitFailure>,

    /// Script units that reached the engine when grouping is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_group: Option<BTreeSet<String>>,
}

impl AnalysisReport {
    /// Dotted paths of every resolved entry
    #[must_use]
    pub fn used_paths(&self) -> ResultSet {
        self.resolved.iter().map(|r| &r.path).collect()
    }

    /// Resolved entries of one stage
    pub fn resolved_in(&self, stage: ResolutionStage) -> impl Iterator<Item = &ResolvedPath> {
        self.resolved.iter().filter(move |r| r.stage == stage)
    }
}

/// Runs the script, inline-script and template stages over one input
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    /// Create an analyzer, rejecting invalid configuration
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate().map_err(AnalysisError::invalid_config)?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze one input
    pub fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisReport> {
        let model = PathModel::build(&input.document);
        let reconciler = Reconciler::new(&model);
        let mut matcher = CodeMatcher::new(self.config.tolerate_syntax_errors)?;
        let mut report = AnalysisReport::default();

        // Script files
        let units = self.prepare_units(&input.scripts, &mut report.failures);
        let matched = matcher.match_units(&units, model.vocabulary());
        report.failures.extend(matched.failures.iter().cloned());

        let script_sites = if self.config.group_by_source_folder {
            match primary_group(&matched.keys_by_unit, self.config.source_group_depth) {
                Some(group) => {
                    let ids: BTreeSet<&str> = group.iter().map(String::as_str).collect();
                    let sites = matched.restricted_to(&ids).sites;
                    report.primary_group = Some(group);
                    sites
                }
                None => {
                    log::info!("No script unit references any document key");
                    Vec::new()
                }
            }
        } else {
            matched.sites
        };

        let scripts = reconciler.reconcile(&script_sites, &input.excluded);
        let mut excluded = input.excluded.union(&scripts.result_set());
        report.ambiguous.extend(scripts.unresolved.iter().cloned());
        report
            .resolved
            .extend(scripts.into_resolved_paths(ResolutionStage::Scripts));

        // Inline scripts
        let inline_units = input.inline_units();
        if !inline_units.is_empty() {
            let units = self.prepare_units(&inline_units, &mut report.failures);
            let matched = matcher.match_units(&units, model.vocabulary());
            report.failures.extend(matched.failures);

            let inline = reconciler.reconcile(&matched.sites, &excluded);
            excluded = excluded.union(&inline.result_set());
            report.ambiguous.extend(inline.unresolved.iter().cloned());
            report
                .resolved
                .extend(inline.into_resolved_paths(ResolutionStage::InlineScripts));
        }

        // Templates
        if self.config.template_fallback {
            if let Some(markup) = input.markup.as_deref() {
                let stripped = strip_scripts(markup);
                let by_code = report.used_paths();
                let scanner = TemplateScanner::new(&model, self.config.snippet_context_chars);
                report
                    .resolved
                    .extend(scanner.scan_resolved(&stripped, &excluded, &by_code));
            }
        }

        let used = report.used_paths();
        report
            .ambiguous
            .retain(|path| !used.contains_path(path) && !input.excluded.contains_path(path));
        report.unused = model
            .paths()
            .iter()
            .filter(|path| !used.contains_path(path) && !input.excluded.contains_path(path))
            .cloned()
            .collect();

        log::info!(
            "Resolved {} of {} paths ({} ambiguous, {} unused, {} unit failures)",
            report.resolved.len(),
            model.paths().len(),
            report.ambiguous.len(),
            report.unused.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Units as the matcher should see them under the configured coverage mode
    fn prepare_units(
        &self,
        scripts: &[SourceUnit],
        failures: &mut Vec<UnitFailure>,
    ) -> Vec<SourceUnit> {
        match self.config.coverage_mode {
            CoverageMode::Full => scripts.to_vec(),
            CoverageMode::Executed => scripts
                .iter()
                .filter_map(|unit| executed_unit(unit, failures))
                .collect(),
        }
    }
}

/// The executed part of `unit`, or `None` when nothing of it ran
fn executed_unit(unit: &SourceUnit, failures: &mut Vec<UnitFailure>) -> Option<SourceUnit> {
    let Some(samples) = unit.coverage.as_deref() else {
        log::debug!("Skipping {}: no coverage", unit.id);
        return None;
    };

    let total_units = unit.source.encode_utf16().count();
    if let Some(overflow) = samples
        .iter()
        .filter(|s| s.executed)
        .map(|s| s.start.max(s.end))
        .filter(|&end| end > total_units)
        .max()
    {
        log::warn!(
            "{}: coverage reaches offset {overflow} but source has {total_units} code units",
            unit.id
        );
        failures.push(UnitFailure {
            unit_id: unit.id.clone(),
            kind: FailureKind::Encoding,
            message: format!(
                "coverage offset {overflow} beyond {total_units} code units; ranges clamped"
            ),
        });
    }

    let source = executed_source(&unit.source, samples);
    if source.trim().is_empty() {
        log::debug!("Skipping {}: no executed code", unit.id);
        return None;
    }
    Some(SourceUnit::new(unit.id.clone(), source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageSample;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dotted(set: &ResultSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalyzerConfig {
            source_group_depth: 0,
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            Analyzer::new(config),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stages_run_in_order() {
        let input = AnalysisInput {
            document: json!({
                "user": {"name": "x", "email": "y"},
                "order": {"total": 3, "currency": "EUR"}
            }),
            scripts: vec![SourceUnit::new("site/app.js", "render(data.user.name);")],
            markup: Some(
                "<script>show(o.total);</script><p>{{ currency }} {{ name }}</p>".to_string(),
            ),
            ..AnalysisInput::default()
        };

        let report = Analyzer::new(AnalyzerConfig::default())
            .unwrap()
            .analyze(&input)
            .unwrap();

        let stages: Vec<(String, ResolutionStage)> = report
            .resolved
            .iter()
            .map(|r| (r.path.dotted(), r.stage))
            .collect();
        assert_eq!(
            stages,
            vec![
                ("user.name".to_string(), ResolutionStage::Scripts),
                ("order.total".to_string(), ResolutionStage::InlineScripts),
                ("order.currency".to_string(), ResolutionStage::Template),
            ]
        );
        assert_eq!(
            report.unused.iter().map(KeyPath::dotted).collect::<Vec<_>>(),
            vec!["user.email"]
        );
        assert_eq!(
            report.primary_group,
            Some(BTreeSet::from(["site/app.js".to_string()]))
        );
    }

    #[test]
    fn test_excluded_paths_not_reported() {
        let input = AnalysisInput {
            document: json!({"user": {"name": "x", "id": 1}}),
            scripts: vec![SourceUnit::new("app.js", "a.name; a.id;")],
            excluded: ResultSet::parse("user.name\n"),
            ..AnalysisInput::default()
        };
        let report = Analyzer::new(AnalyzerConfig::default())
            .unwrap()
            .analyze(&input)
            .unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["user.id"]);
        assert!(report.unused.is_empty());
    }

    #[test]
    fn test_grouping_drops_other_folders() {
        let input = AnalysisInput {
            document: json!({"user": {"name": "x", "email": "y"}, "ad": {"slot": 1}}),
            scripts: vec![
                SourceUnit::new("site/js/app.js", "u.name; u.email;"),
                SourceUnit::new("ads/js/ad.js", "x.slot;"),
            ],
            ..AnalysisInput::default()
        };

        let grouped = Analyzer::new(AnalyzerConfig::default())
            .unwrap()
            .analyze(&input)
            .unwrap();
        assert_eq!(dotted(&grouped.used_paths()), vec!["user.email", "user.name"]);

        let config = AnalyzerConfig {
            group_by_source_folder: false,
            ..AnalyzerConfig::default()
        };
        let pooled = Analyzer::new(config).unwrap().analyze(&input).unwrap();
        assert_eq!(
            dotted(&pooled.used_paths()),
            vec!["ad.slot", "user.email", "user.name"]
        );
        assert!(pooled.primary_group.is_none());
    }

    #[test]
    fn test_parse_failure_is_reported_not_fatal() {
        let input = AnalysisInput {
            document: json!({"user": {"name": "x"}}),
            scripts: vec![
                SourceUnit::new("a.js", "function ( {"),
                SourceUnit::new("b.js", "u.name;"),
            ],
            ..AnalysisInput::default()
        };
        let report = Analyzer::new(AnalyzerConfig::default())
            .unwrap()
            .analyze(&input)
            .unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["user.name"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit_id, "a.js");
    }

    #[test]
    fn test_executed_mode_ignores_unexecuted_code() {
        let source = "function a() { return d.name; }\nfunction b() { return d.email; }\na();";
        let name_fn_end = source.find('\n').unwrap();
        let call_start = source.rfind("a();").unwrap();
        let unit = SourceUnit::new("app.js", source).with_coverage(vec![
            CoverageSample {
                start: 0,
                end: name_fn_end,
                executed: true,
            },
            CoverageSample {
                start: name_fn_end + 1,
                end: call_start - 1,
                executed: false,
            },
            CoverageSample {
                start: call_start,
                end: source.len(),
                executed: true,
            },
        ]);
        let input = AnalysisInput {
            document: json!({"user": {"name": "x", "email": "y"}}),
            scripts: vec![unit, SourceUnit::new("uncovered.js", "d.email;")],
            ..AnalysisInput::default()
        };

        let report = Analyzer::new(AnalyzerConfig::for_coverage())
            .unwrap()
            .analyze(&input)
            .unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["user.name"]);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_coverage_beyond_source_is_encoding_failure() {
        let unit = SourceUnit::new("app.js", "d.name;").with_coverage(vec![CoverageSample {
            start: 0,
            end: 500,
            executed: true,
        }]);
        let input = AnalysisInput {
            document: json!({"user": {"name": "x"}}),
            scripts: vec![unit],
            ..AnalysisInput::default()
        };
        let report = Analyzer::new(AnalyzerConfig::for_coverage())
            .unwrap()
            .analyze(&input)
            .unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["user.name"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Encoding);
    }

    #[test]
    fn test_template_fallback_can_be_disabled() {
        let input = AnalysisInput {
            document: json!({"user": {"name": "x"}}),
            markup: Some("<p>{{ name }}</p>".to_string()),
            ..AnalysisInput::default()
        };
        let config = AnalyzerConfig {
            template_fallback: false,
            ..AnalyzerConfig::default()
        };
        let report = Analyzer::new(config).unwrap().analyze(&input).unwrap();
        assert!(report.resolved.is_empty());
        assert_eq!(report.unused.len(), 1);
    }

    #[test]
    fn test_template_block_does_not_hide_inline_accesses() {
        let input = AnalysisInput {
            document: json!({"order": {"total": 1, "note": 2}}),
            markup: Some(
                concat!(
                    r#"<script type="text/template"><% if (ok) { %><b><%= name %></b><% } %></script>"#,
                    "<script>render(o.total);</script>",
                )
                .to_string(),
            ),
            ..AnalysisInput::default()
        };
        let config = AnalyzerConfig {
            template_fallback: false,
            ..AnalyzerConfig::default()
        };
        let report = Analyzer::new(config).unwrap().analyze(&input).unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["order.total"]);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_broken_inline_block_fails_alone() {
        let input = AnalysisInput {
            document: json!({"order": {"total": 1, "note": 2}}),
            markup: Some(
                "<script>function ( {</script><script>render(o.total);</script>".to_string(),
            ),
            ..AnalysisInput::default()
        };
        let report = Analyzer::new(AnalyzerConfig::default())
            .unwrap()
            .analyze(&input)
            .unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["order.total"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit_id, "inline/1");
    }

    #[test]
    fn test_executed_mode_skips_inline_without_coverage() {
        let source = "show(d.name);";
        let unit = SourceUnit::new("app.js", source).with_coverage(vec![CoverageSample {
            start: 0,
            end: source.len(),
            executed: true,
        }]);
        let input = AnalysisInput {
            document: json!({"user": {"name": "x", "email": "y"}}),
            scripts: vec![unit],
            markup: Some("<script>function never() { return d.email; }</script>".to_string()),
            ..AnalysisInput::default()
        };
        let config = AnalyzerConfig {
            template_fallback: false,
            ..AnalyzerConfig::for_coverage()
        };
        let report = Analyzer::new(config).unwrap().analyze(&input).unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["user.name"]);
    }

    #[test]
    fn test_executed_mode_slices_inline_units() {
        let source = "function never() { return d.email; }\nshow(d.name);";
        let show_start = source.find("show").unwrap();
        let input = AnalysisInput {
            document: json!({"user": {"name": "x", "email": "y"}}),
            inline_scripts: vec![SourceUnit::new("inline/1", source).with_coverage(vec![
                CoverageSample {
                    start: show_start,
                    end: source.len(),
                    executed: true,
                },
            ])],
            ..AnalysisInput::default()
        };
        let report = Analyzer::new(AnalyzerConfig::for_coverage())
            .unwrap()
            .analyze(&input)
            .unwrap();
        let inline: Vec<String> = report
            .resolved_in(ResolutionStage::InlineScripts)
            .map(|r| r.path.dotted())
            .collect();
        assert_eq!(inline, vec!["user.name"]);
    }

    #[test]
    fn test_given_inline_units_take_precedence_over_markup() {
        let input = AnalysisInput {
            document: json!({"a": {"x": 1}, "b": {"y": 2}}),
            markup: Some("<script>q.x;</script>".to_string()),
            inline_scripts: vec![SourceUnit::new("inline/2", "q.y;")],
            ..AnalysisInput::default()
        };
        assert_eq!(input.inline_units().len(), 1);
        let config = AnalyzerConfig {
            template_fallback: false,
            ..AnalyzerConfig::default()
        };
        let report = Analyzer::new(config).unwrap().analyze(&input).unwrap();
        assert_eq!(dotted(&report.used_paths()), vec!["b.y"]);
    }
}
