use crate::path_model::PathModel;
use crate::result_set::ResultSet;
use crate::types::{is_numeric_key, Evidence, KeyPath, ResolutionStage, ResolvedPath};
use regex::Regex;
use std::collections::BTreeMap;

/// Low-confidence matcher for `{{ ... key ... }}` references in markup.
///
/// Does not parse any templating language; a leaf key counts as referenced
/// when it appears as a whole word inside a pair of double braces.
pub struct TemplateScanner<'m> {
    model: &'m PathModel,
    context_chars: usize,
}

impl<'m> TemplateScanner<'m> {
    #[must_use]
    pub const fn new(model: &'m PathModel, context_chars: usize) -> Self {
        Self {
            model,
            context_chars,
        }
    }

    /// Resolve leaf paths referenced from templates in script-free markup.
    ///
    /// Paths in `excluded` or in `resolved_by_code` are skipped.
    #[must_use]
    pub fn scan(
        &self,
        markup: &str,
        excluded: &ResultSet,
        resolved_by_code: &ResultSet,
    ) -> BTreeMap<KeyPath, Vec<String>> {
        let mut found = BTreeMap::new();
        if markup.is_empty() {
            return found;
        }

        for (leaf, occurrences) in self.model.leaves() {
            if is_numeric_key(leaf) {
                continue;
            }
            let pattern = match template_pattern(leaf) {
                Ok(pattern) => pattern,
                Err(e) => {
                    log::warn!("Skipping template search for {leaf:?}: {e}");
                    continue;
                }
            };

            let snippets: Vec<String> = pattern
                .find_iter(markup)
                .map(|m| context_window(markup, m.start(), m.end(), self.context_chars))
                .collect();
            if snippets.is_empty() {
                continue;
            }

            for occ in occurrences {
                if excluded.contains_path(&occ.path) || resolved_by_code.contains_path(&occ.path) {
                    continue;
                }
                found.insert(occ.path.clone(), snippets.clone());
            }
        }

        log::debug!("Template scan resolved {} paths", found.len());
        found
    }

    /// Same as [`Self::scan`], wrapped as resolved paths
    #[must_use]
    pub fn scan_resolved(
        &self,
        markup: &str,
        excluded: &ResultSet,
        resolved_by_code: &ResultSet,
    ) -> Vec<ResolvedPath> {
        self.scan(markup, excluded, resolved_by_code)
            .into_iter()
            .map(|(path, snippets)| ResolvedPath {
                path,
                stage: ResolutionStage::Template,
                evidence: Evidence::Template(snippets),
            })
            .collect()
    }
}

fn template_pattern(key: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from(r"\{\{[^{}]*\b");
    pattern.push_str(&regex::escape(key));
    pattern.push_str(r"\b[^{}]*\}\}");
    Regex::new(&pattern)
}

/// `text[start..end]` widened by up to `chars` characters on each side
fn context_window(text: &str, start: usize, end: usize, chars: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(chars)
        .last()
        .map_or(start, |(idx, _)| idx);
    let to = text[end..]
        .char_indices()
        .nth(chars)
        .map_or(text.len(), |(idx, _)| end + idx);
    text[from..to].to_string()
}
