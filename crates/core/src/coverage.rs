//! Coverage interval algebra and offset-exact slicing.
//!
//! Instrumentation reports offsets in UTF-16 code units, so every slice of
//! source text goes through the UTF-16 encoding before it is cut.

use crate::error::{AnalysisError, Result};
use crate::markup::INLINE_UNIT_PREFIX;
use crate::types::SourceUnit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Half-open `[start, end)` interval in UTF-16 code-unit offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoverageRange {
    pub start: usize,
    pub end: usize,
}

impl CoverageRange {
    /// Create a range; bounds are swapped if given in reverse
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub const fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// One instrumentation record: a range and whether it ran at least once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSample {
    pub start: usize,
    pub end: usize,
    pub executed: bool,
}

impl CoverageSample {
    #[must_use]
    pub fn range(&self) -> CoverageRange {
        CoverageRange::new(self.start, self.end)
    }
}

/// Merge overlapping or touching ranges into the minimal sorted cover.
pub fn merge_ranges(ranges: impl IntoIterator<Item = CoverageRange>) -> Vec<CoverageRange> {
    let mut sorted: Vec<CoverageRange> = ranges.into_iter().collect();
    sorted.sort_unstable();

    let mut merged: Vec<CoverageRange> = Vec::with_capacity(sorted.len());
    for current in sorted {
        match merged.last_mut() {
            Some(prev) if current.start <= prev.end => {
                prev.end = prev.end.max(current.end);
            }
            _ => merged.push(current),
        }
    }
    merged
}

/// Sorted, merged set of ranges for one source unit.
///
/// No two stored ranges overlap or touch after any insertion batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RangeSet {
    ranges: Vec<CoverageRange>,
}

impl RangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch of ranges and restore the merged invariant
    pub fn extend(&mut self, batch: impl IntoIterator<Item = CoverageRange>) {
        let existing = std::mem::take(&mut self.ranges);
        self.ranges = merge_ranges(existing.into_iter().chain(batch));
    }

    #[must_use]
    pub fn as_slice(&self) -> &[CoverageRange] {
        &self.ranges
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoverageRange> {
        self.ranges.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of covered offsets
    #[must_use]
    pub fn covered_len(&self) -> usize {
        self.ranges.iter().map(CoverageRange::len).sum()
    }

    #[must_use]
    pub fn contains(&self, offset: usize) -> bool {
        let idx = self.ranges.partition_point(|r| r.end <= offset);
        self.ranges.get(idx).is_some_and(|r| r.contains(offset))
    }
}

impl FromIterator<CoverageRange> for RangeSet {
    fn from_iter<T: IntoIterator<Item = CoverageRange>>(iter: T) -> Self {
        Self {
            ranges: merge_ranges(iter),
        }
    }
}

/// Slice `code` by UTF-16 code-unit offsets.
///
/// Falls back to char indexing when the code-unit slice is impossible, and
/// to an empty string when that fails too. Never panics.
#[must_use]
pub fn slice_utf16(code: &str, start: usize, end: usize) -> String {
    match try_slice_utf16(code, start, end) {
        Ok(text) => text,
        Err(err) => {
            log::debug!("UTF-16 slice [{start}, {end}) failed, using char offsets: {err}");
            slice_chars(code, start, end).unwrap_or_default()
        }
    }
}

fn try_slice_utf16(code: &str, start: usize, end: usize) -> Result<String> {
    if start > end {
        return Err(AnalysisError::encoding(format!(
            "inverted range {start}..{end}"
        )));
    }
    let units: Vec<u16> = code.encode_utf16().collect();
    if start > units.len() {
        return Err(AnalysisError::encoding(format!(
            "start {start} beyond {} code units",
            units.len()
        )));
    }
    let end = end.min(units.len());

    // Halves of a surrogate pair cut by the range bounds are dropped.
    Ok(char::decode_utf16(units[start..end].iter().copied())
        .filter_map(std::result::Result::ok)
        .collect())
}

fn slice_chars(code: &str, start: usize, end: usize) -> Option<String> {
    if start > end || start > code.chars().count() {
        return None;
    }
    Some(code.chars().skip(start).take(end - start).collect())
}

/// Keep only the executed parts of `code`, joined by newlines.
///
/// Executed samples are merged and clamped to the source length before
/// slicing; empty slices are skipped.
#[must_use]
pub fn executed_source(code: &str, samples: &[CoverageSample]) -> String {
    let total_units = code.encode_utf16().count();
    let executed: RangeSet = samples
        .iter()
        .filter(|s| s.executed)
        .map(CoverageSample::range)
        .collect();

    let mut parts = Vec::with_capacity(executed.len());
    for range in executed.iter() {
        let start = range.start.min(total_units);
        let end = range.end.min(total_units);
        if end <= start {
            continue;
        }
        let part = slice_utf16(code, start, end);
        if !part.is_empty() {
            parts.push(part);
        }
    }
    parts.join("\n")
}

#[derive(Debug, Deserialize)]
struct PreciseCoverage {
    #[serde(default)]
    result: Vec<ScriptCoverage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptCoverage {
    #[serde(default)]
    script_id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    functions: Vec<FunctionCoverage>,
    /// Script text as returned by `Debugger.getScriptSource`, when recorded
    #[serde(default, alias = "scriptSource")]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FunctionCoverage {
    #[serde(default)]
    ranges: Vec<BlockCoverage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockCoverage {
    #[serde(default)]
    start_offset: usize,
    #[serde(default)]
    end_offset: usize,
    #[serde(default)]
    count: u64,
}

fn executed_samples(set: &RangeSet) -> Vec<CoverageSample> {
    set.iter()
        .map(|r| CoverageSample {
            start: r.start,
            end: r.end,
            executed: true,
        })
        .collect()
}

/// Executed ranges of a script loaded without a URL (inline `<script>`
/// bodies, evaluated code), keyed by its `scriptId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnonymousScript {
    pub script_id: String,
    /// Script text, needed to tie the ranges to a source unit
    pub source: Option<String>,
    pub ranges: RangeSet,
}

impl AnonymousScript {
    #[must_use]
    pub fn samples(&self) -> Vec<CoverageSample> {
        executed_samples(&self.ranges)
    }
}

/// Executed ranges per script URL, read from a V8 precise-coverage snapshot
/// (the payload of `Profiler.takePreciseCoverage`).
///
/// Entries without a URL are kept apart by `scriptId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    scripts: BTreeMap<String, RangeSet>,
    anonymous: BTreeMap<String, AnonymousScript>,
}

impl CoverageReport {
    /// Parse a snapshot; scripts without any executed block, URL scripts
    /// not ending in `.js` and URL-less scripts without a `scriptId` are
    /// left out.
    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: PreciseCoverage = serde_json::from_str(text)?;
        let mut scripts: BTreeMap<String, RangeSet> = BTreeMap::new();
        let mut anonymous: BTreeMap<String, AnonymousScript> = BTreeMap::new();

        for script in snapshot.result {
            if !script.url.is_empty() && !script.url.ends_with(".js") {
                continue;
            }
            if script.url.is_empty() && script.script_id.is_empty() {
                continue;
            }
            let executed: Vec<CoverageRange> = script
                .functions
                .iter()
                .flat_map(|f| f.ranges.iter())
                .filter(|block| block.count > 0)
                .map(|block| CoverageRange::new(block.start_offset, block.end_offset))
                .collect();
            if executed.is_empty() {
                continue;
            }

            if script.url.is_empty() {
                let entry = anonymous
                    .entry(script.script_id.clone())
                    .or_insert_with(|| AnonymousScript {
                        script_id: script.script_id,
                        source: None,
                        ranges: RangeSet::new(),
                    });
                if entry.source.is_none() {
                    entry.source = script.source;
                }
                entry.ranges.extend(executed);
            } else {
                scripts.entry(script.url).or_default().extend(executed);
            }
        }

        log::debug!(
            "Coverage snapshot lists {} executed scripts and {} without URL",
            scripts.len(),
            anonymous.len()
        );
        Ok(Self { scripts, anonymous })
    }

    #[must_use]
    pub fn ranges(&self, url: &str) -> Option<&RangeSet> {
        self.scripts.get(url)
    }

    /// Executed ranges of `url` as matcher input samples
    #[must_use]
    pub fn samples(&self, url: &str) -> Option<Vec<CoverageSample>> {
        self.scripts.get(url).map(executed_samples)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    pub fn anonymous_scripts(&self) -> impl Iterator<Item = &AnonymousScript> {
        self.anonymous.values()
    }

    /// Give inline units the coverage of the URL-less script with the same
    /// text. Scripts matching no unit are added as `inline/script-<id>`;
    /// scripts recorded without their text are skipped. Returns the number
    /// of scripts attached.
    pub fn attach_inline(&self, units: &mut Vec<SourceUnit>) -> usize {
        let mut attached = 0;
        for script in self.anonymous.values() {
            let Some(source) = script.source.as_deref().filter(|s| !s.trim().is_empty()) else {
                log::debug!("Coverage of script {} has no source text", script.script_id);
                continue;
            };
            let samples = script.samples();
            match units
                .iter_mut()
                .find(|unit| unit.coverage.is_none() && unit.source == source)
            {
                Some(unit) => unit.coverage = Some(samples),
                None => units.push(
                    SourceUnit::new(
                        format!("{INLINE_UNIT_PREFIX}/script-{}", script.script_id),
                        source,
                    )
                    .with_coverage(samples),
                ),
            }
            attached += 1;
        }
        attached
    }

    /// Number of URL scripts with executed code
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.anonymous.is_empty()
    }
}
