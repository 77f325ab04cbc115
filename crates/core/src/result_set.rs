use crate::types::KeyPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of dotted key paths, as exchanged between analysis stages and runs.
///
/// Compared by dotted text so that names containing `.` still match the
/// form they were written in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet(BTreeSet<String>);

impl ResultSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the line format: one path per line, blank lines ignored, spaces
    /// and quotes around each path trimmed.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(|line| line.trim().trim_matches(|c: char| c == ' ' || c == '"' || c == '\''))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Write the line format, sorted
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for path in &self.0 {
            text.push_str(path);
            text.push('\n');
        }
        text
    }

    pub fn insert(&mut self, path: &KeyPath) -> bool {
        self.0.insert(path.dotted())
    }

    #[must_use]
    pub fn contains(&self, dotted: &str) -> bool {
        self.0.contains(dotted)
    }

    #[must_use]
    pub fn contains_path(&self, path: &KeyPath) -> bool {
        self.0.contains(&path.dotted())
    }

    /// Union of both sets
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for ResultSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a KeyPath> for ResultSet {
    fn from_iter<T: IntoIterator<Item = &'a KeyPath>>(iter: T) -> Self {
        Self(iter.into_iter().map(KeyPath::dotted).collect())
    }
}

impl<'a> Extend<&'a KeyPath> for ResultSet {
    fn extend<T: IntoIterator<Item = &'a KeyPath>>(&mut self, iter: T) {
        self.0.extend(iter.into_iter().map(KeyPath::dotted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_format() {
        let set = ResultSet::parse("user.name\n\n  \"items.id\"  \n'meta.page'\n");
        let paths: Vec<&str> = set.iter().collect();
        assert_eq!(paths, vec!["items.id", "meta.page", "user.name"]);
    }

    #[test]
    fn test_text_round_trip() {
        let set = ResultSet::parse("b.c\na\n");
        assert_eq!(set.to_text(), "a\nb.c\n");
        assert_eq!(ResultSet::parse(&set.to_text()), set);
    }

    #[test]
    fn test_contains_path() {
        let mut set = ResultSet::new();
        let path: KeyPath = "user.id".parse().unwrap();
        assert!(set.insert(&path));
        assert!(!set.insert(&path));
        assert!(set.contains_path(&path));
        assert!(set.contains("user.id"));
    }
}
