//! Script extraction from HTML markup.
//!
//! Markup is handled with regular expressions only; no DOM is built.

use crate::types::SourceUnit;
use once_cell::sync::Lazy;
use regex::Regex;

/// Prefix of the unit ids given to inline scripts (`inline/1`, `inline/2`, ...)
pub const INLINE_UNIT_PREFIX: &str = "inline";

static SCRIPT_REGEX: Lazy<Regex> =
    Lazy::new(|| compile_regex(r"(?is)<script([^>]*)>(.*?)</script\s*>"));
static SRC_ATTR_REGEX: Lazy<Regex> = Lazy::new(|| compile_regex(r"(?i)(?:^|\s)src\s*="));
static TYPE_ATTR_REGEX: Lazy<Regex> =
    Lazy::new(|| compile_regex(r#"(?i)(?:^|\s)type\s*=\s*["']?([^"'\s>]*)"#));

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

/// One `<script>` element without a `src` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineScript<'a> {
    /// 1-based position among the inline scripts of the page
    pub index: usize,
    /// Value of the `type` attribute, if any
    pub script_type: Option<&'a str>,
    pub body: &'a str,
}

impl InlineScript<'_> {
    /// Whether the browser would run the body as JavaScript
    #[must_use]
    pub fn is_javascript(&self) -> bool {
        self.script_type.is_none_or(is_javascript_type)
    }

    #[must_use]
    pub fn unit_id(&self) -> String {
        format!("{INLINE_UNIT_PREFIX}/{}", self.index)
    }
}

fn is_javascript_type(script_type: &str) -> bool {
    let essence = script_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    matches!(
        essence.as_str(),
        "" | "module"
            | "text/javascript"
            | "application/javascript"
            | "application/x-javascript"
            | "text/ecmascript"
            | "application/ecmascript"
            | "text/jscript"
            | "text/livescript"
    ) || essence.starts_with("text/javascript1.")
}

/// Every `<script>` element without a `src` attribute, in document order
#[must_use]
pub fn inline_scripts(html: &str) -> Vec<InlineScript<'_>> {
    SCRIPT_REGEX
        .captures_iter(html)
        .filter(|caps| {
            caps.get(1)
                .is_none_or(|attrs| !SRC_ATTR_REGEX.is_match(attrs.as_str()))
        })
        .enumerate()
        .map(|(idx, caps)| InlineScript {
            index: idx + 1,
            script_type: caps
                .get(1)
                .and_then(|attrs| TYPE_ATTR_REGEX.captures(attrs.as_str()))
                .and_then(|t| t.get(1))
                .map(|t| t.as_str()),
            body: caps.get(2).map_or("", |body| body.as_str()),
        })
        .collect()
}

/// One source unit per non-empty inline JavaScript block.
///
/// Blocks of another type (templates, JSON data, ...) are left out.
#[must_use]
pub fn inline_units(html: &str) -> Vec<SourceUnit> {
    inline_scripts(html)
        .into_iter()
        .filter(|script| {
            if script.is_javascript() {
                return true;
            }
            log::debug!(
                "Skipping inline script {} of type {:?}",
                script.index,
                script.script_type.unwrap_or_default()
            );
            false
        })
        .filter(|script| !script.body.trim().is_empty())
        .map(|script| SourceUnit::new(script.unit_id(), script.body))
        .collect()
}

/// The markup with every script element removed
#[must_use]
pub fn strip_scripts(html: &str) -> String {
    SCRIPT_REGEX.replace_all(html, "").into_owned()
}
