//! Loading of analysis inputs from disk.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use keyusage_core::{AnalyzerConfig, CoverageReport, ResultSet, SourceUnit};
use std::fs;
use std::path::{Component, Path};
use url::Url;

/// Read and parse the JSON document
pub fn load_document(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON document {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid JSON document {}", path.display()))
}

/// Read an exclusion list in the line format
pub fn load_exclusions(path: &Path) -> Result<ResultSet> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read exclusion list {}", path.display()))?;
    Ok(ResultSet::parse(&text))
}

/// Read the page markup
pub fn load_markup(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read markup {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a config file written as JSON or TOML
pub fn load_config(path: &Path) -> Result<AnalyzerConfig> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&bytes).with_context(|| format!("Invalid config {}", path.display()))
}

fn parse_config(bytes: &[u8]) -> Result<AnalyzerConfig> {
    let value: serde_json::Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                anyhow!("Config is not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}")
            })?;
            serde_json::to_value(toml_value)
                .map_err(|err| anyhow!("Failed to convert TOML config to JSON: {err}"))?
        }
    };
    serde_json::from_value(value).map_err(|err| anyhow!("Config parse error: {err}"))
}

/// Every `.js` file under `dir`, identified by its `/`-separated relative path
pub fn discover_scripts(dir: &Path) -> Result<Vec<SourceUnit>> {
    if !dir.is_dir() {
        return Err(anyhow!("Script directory {} does not exist", dir.display()));
    }
    let pattern = format!("{}/**/*.js", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob(&pattern).context("Invalid script glob")?;

    let mut units = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                log::warn!("Skipping unreadable script path: {err}");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(id) = relative_id(dir, &path) else {
            continue;
        };
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        units.push(SourceUnit::new(id, String::from_utf8_lossy(&bytes)));
    }

    units.sort_by(|a, b| a.id.cmp(&b.id));
    log::info!("Found {} script files under {}", units.len(), dir.display());
    Ok(units)
}

fn relative_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Read a V8 precise-coverage snapshot
pub fn load_coverage(path: &Path) -> Result<CoverageReport> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read coverage {}", path.display()))?;
    CoverageReport::from_json(&text)
        .with_context(|| format!("Invalid coverage snapshot {}", path.display()))
}

/// Script id a coverage URL maps to: host (and explicit port) followed by
/// path, with `index.js` appended when the path does not name a `.js` file.
pub fn unit_id_for_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let mut id = match parsed.port() {
        Some(port) => format!("{host}:{port}{}", parsed.path()),
        None => format!("{host}{}", parsed.path()),
    };
    if id.ends_with('/') || !id.ends_with(".js") {
        id.push_str("index.js");
    }
    Some(id)
}

/// Attach executed ranges from `coverage` to the units they describe.
///
/// Returns the number of units that received coverage.
pub fn attach_coverage(units: &mut [SourceUnit], coverage: &CoverageReport) -> usize {
    let mut attached = 0;
    for url in coverage.urls() {
        let Some(id) = unit_id_for_url(url) else {
            log::debug!("Coverage URL without host: {url}");
            continue;
        };
        let Some(unit) = units.iter_mut().find(|u| u.id == id) else {
            log::debug!("No script file for covered URL {url} ({id})");
            continue;
        };
        if let Some(samples) = coverage.samples(url) {
            unit.coverage = Some(samples);
            attached += 1;
        }
    }
    log::info!("Attached coverage to {attached} of {} scripts", units.len());
    attached
}
