use crate::error::{AnalysisError, Result};
use crate::types::{AccessKind, AccessSite, FailureKind, SourceUnit, UnitFailure};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tree_sitter::{Node, Parser, Tree};

/// Access sites collected from a batch of source units
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    /// Sites in unit order, then document order
    pub sites: Vec<AccessSite>,

    /// Distinct matched keys per unit (units without matches are absent)
    pub keys_by_unit: BTreeMap<String, BTreeSet<String>>,

    /// Units that could not be parsed
    pub failures: Vec<UnitFailure>,
}

impl MatchReport {
    /// Keep only the sites (and key sets) of the given units
    #[must_use]
    pub fn restricted_to(&self, units: &BTreeSet<&str>) -> Self {
        Self {
            sites: self
                .sites
                .iter()
                .filter(|s| units.contains(s.unit_id.as_str()))
                .cloned()
                .collect(),
            keys_by_unit: self
                .keys_by_unit
                .iter()
                .filter(|(unit, _)| units.contains(unit.as_str()))
                .map(|(unit, keys)| (unit.clone(), keys.clone()))
                .collect(),
            failures: self.failures.clone(),
        }
    }
}

/// Finds property and index accesses whose key text is a JSON key name
pub struct CodeMatcher {
    parser: Parser,
    tolerate_syntax_errors: bool,
}

impl CodeMatcher {
    /// Create a matcher for JavaScript source
    pub fn new(tolerate_syntax_errors: bool) -> Result<Self> {
        let ts_language: tree_sitter::Language = tree_sitter_javascript::LANGUAGE.into();
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| AnalysisError::tree_sitter(format!("Failed to set language: {e}")))?;

        Ok(Self {
            parser,
            tolerate_syntax_errors,
        })
    }

    /// Match every unit; a unit that fails to parse contributes no sites
    pub fn match_units<'a>(
        &mut self,
        units: impl IntoIterator<Item = &'a SourceUnit>,
        vocabulary: &BTreeSet<String>,
    ) -> MatchReport {
        let mut report = MatchReport::default();

        for unit in units {
            match self.match_source(&unit.id, &unit.source, vocabulary) {
                Ok(sites) => {
                    log::debug!("{}: {} access sites", unit.id, sites.len());
                    if !sites.is_empty() {
                        let keys = report.keys_by_unit.entry(unit.id.clone()).or_default();
                        keys.extend(sites.iter().map(|s| s.matched_key.clone()));
                    }
                    report.sites.extend(sites);
                }
                Err(e) => {
                    log::warn!("Skipping {}: {e}", unit.id);
                    report.failures.push(UnitFailure {
                        unit_id: unit.id.clone(),
                        kind: FailureKind::Parse,
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Parse one unit and collect its access sites in document order
    pub fn match_source(
        &mut self,
        unit_id: &str,
        source: &str,
        vocabulary: &BTreeSet<String>,
    ) -> Result<Vec<AccessSite>> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| AnalysisError::parse(unit_id, "Failed to parse source code"))?;

        let root = tree.root_node();
        if root.has_error() && !self.tolerate_syntax_errors {
            let line = first_error_line(&tree).unwrap_or(1);
            return Err(AnalysisError::parse(
                unit_id,
                format!("syntax error near line {line}"),
            ));
        }

        let mut sites = Vec::new();
        let mut cursor = tree.walk();
        loop {
            if let Some(site) = Self::inspect(cursor.node(), source, unit_id, vocabulary) {
                sites.push(site);
            }
            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Ok(sites);
                }
            }
        }
    }

    /// Turn a member/subscript node into a site if its key is known
    fn inspect(
        node: Node,
        source: &str,
        unit_id: &str,
        vocabulary: &BTreeSet<String>,
    ) -> Option<AccessSite> {
        let (key, kind) = match node.kind() {
            "member_expression" => {
                let property = node.child_by_field_name("property")?;
                match property.kind() {
                    "property_identifier" | "identifier" => {
                        (node_text(property, source)?, AccessKind::Member)
                    }
                    _ => return None,
                }
            }
            "subscript_expression" => {
                let index = node.child_by_field_name("index")?;
                match index.kind() {
                    "string" => (
                        node_text(index, source)?.trim_matches(|c: char| c == '"' || c == '\''),
                        AccessKind::StringIndex,
                    ),
                    // Matches the variable's name, not its run-time value.
                    "identifier" => (node_text(index, source)?, AccessKind::IdentifierIndex),
                    _ => return None,
                }
            }
            _ => return None,
        };

        if !vocabulary.contains(key) {
            return None;
        }

        let receiver = node
            .child_by_field_name("object")
            .and_then(|object| node_text(object, source))
            .map(str::to_string);

        Some(AccessSite {
            matched_key: key.to_string(),
            receiver,
            snippet: node_text(node, source)?.to_string(),
            unit_id: unit_id.to_string(),
            kind,
            line: node.start_position().row + 1,
        })
    }
}

fn node_text<'s>(node: Node, source: &'s str) -> Option<&'s str> {
    source.get(node.start_byte()..node.end_byte())
}

fn first_error_line(tree: &Tree) -> Option<usize> {
    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        // Only descend into subtrees that contain the error.
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}
