//! Flattening of a JSON document into key paths, plus the sibling-shape and
//! leaf-collision tables used to tell apart paths sharing a key name.

use crate::error::Result;
use crate::types::KeyPath;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Sorted child names of one parent
pub type SiblingShape = Vec<String>;

/// One place a leaf name occurs
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LeafOccurrence {
    /// Final segment of the parent path
    pub parent_name: String,
    pub path: KeyPath,
}

/// Key paths of one JSON document and the tables derived from them.
///
/// Built once per analysis run and read by every later stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathModel {
    paths: BTreeSet<KeyPath>,
    vocabulary: BTreeSet<String>,
    children: BTreeMap<KeyPath, BTreeSet<String>>,
    shape_counts: BTreeMap<SiblingShape, usize>,
    leaf_occurrences: BTreeMap<String, Vec<LeafOccurrence>>,
    /// Ambiguous paths, indexed by the name of their parent
    ambiguous_by_parent: BTreeMap<String, BTreeSet<KeyPath>>,
    ambiguous_paths: BTreeSet<KeyPath>,
}

impl PathModel {
    /// Flatten a parsed document
    #[must_use]
    pub fn build(document: &Value) -> Self {
        let mut paths = BTreeSet::new();
        let mut prefix = Vec::new();
        collect_paths(document, &mut prefix, &mut paths);
        Self::from_paths(paths)
    }

    /// Parse and flatten a JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        Ok(Self::build(&document))
    }

    /// Derive every table from a complete key path set
    #[must_use]
    pub fn from_paths(paths: BTreeSet<KeyPath>) -> Self {
        let vocabulary: BTreeSet<String> = paths
            .iter()
            .flat_map(|p| p.segments().iter().cloned())
            .collect();

        let mut children: BTreeMap<KeyPath, BTreeSet<String>> = BTreeMap::new();
        let mut leaf_occurrences: BTreeMap<String, Vec<LeafOccurrence>> = BTreeMap::new();
        for path in &paths {
            let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
                continue;
            };
            children
                .entry(parent.clone())
                .or_default()
                .insert(leaf.to_string());
            leaf_occurrences
                .entry(leaf.to_string())
                .or_default()
                .push(LeafOccurrence {
                    parent_name: parent.leaf().unwrap_or_default().to_string(),
                    path: path.clone(),
                });
        }

        let mut shape_counts: BTreeMap<SiblingShape, usize> = BTreeMap::new();
        for names in children.values() {
            *shape_counts.entry(names.iter().cloned().collect()).or_default() += 1;
        }

        let mut ambiguous_by_parent: BTreeMap<String, BTreeSet<KeyPath>> = BTreeMap::new();

        // Parents whose child shape repeats elsewhere (uniform records).
        for (parent, names) in &children {
            let shape: SiblingShape = names.iter().cloned().collect();
            if shape_counts.get(&shape).copied().unwrap_or(0) > 1 {
                let parent_name = parent.leaf().unwrap_or_default().to_string();
                let entry = ambiguous_by_parent.entry(parent_name).or_default();
                entry.extend(names.iter().map(|name| parent.child(name)));
            }
        }

        // Leaf names that occur under more than one parent.
        for occurrences in leaf_occurrences.values() {
            if occurrences.len() > 1 {
                for occ in occurrences {
                    ambiguous_by_parent
                        .entry(occ.parent_name.clone())
                        .or_default()
                        .insert(occ.path.clone());
                }
            }
        }

        let ambiguous_paths = ambiguous_by_parent.values().flatten().cloned().collect();

        log::debug!(
            "Path model: {} paths, {} names, {} parents, {} ambiguous paths",
            paths.len(),
            vocabulary.len(),
            children.len(),
            ambiguous_by_parent.values().map(BTreeSet::len).sum::<usize>()
        );

        Self {
            paths,
            vocabulary,
            children,
            shape_counts,
            leaf_occurrences,
            ambiguous_by_parent,
            ambiguous_paths,
        }
    }

    /// Every terminal key path of the document
    #[must_use]
    pub fn paths(&self) -> &BTreeSet<KeyPath> {
        &self.paths
    }

    /// Every distinct segment name
    #[must_use]
    pub fn vocabulary(&self) -> &BTreeSet<String> {
        &self.vocabulary
    }

    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.vocabulary.contains(name)
    }

    /// Parent paths with their child names
    pub fn parents(&self) -> impl Iterator<Item = (&KeyPath, &BTreeSet<String>)> {
        self.children.iter()
    }

    /// Parent paths whose own final segment equals `name`
    pub fn parents_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a KeyPath, &'a BTreeSet<String>)> + 'a {
        self.children
            .iter()
            .filter(move |(parent, _)| parent.leaf() == Some(name))
    }

    #[must_use]
    pub fn children_of(&self, parent: &KeyPath) -> Option<&BTreeSet<String>> {
        self.children.get(parent)
    }

    #[must_use]
    pub fn sibling_shape(&self, parent: &KeyPath) -> Option<SiblingShape> {
        self.children
            .get(parent)
            .map(|names| names.iter().cloned().collect())
    }

    /// Number of parents sharing `shape`
    #[must_use]
    pub fn shape_count(&self, shape: &[String]) -> usize {
        self.shape_counts.get(shape).copied().unwrap_or(0)
    }

    /// Terminal paths ending in `leaf`
    pub fn paths_ending_in<'a>(&'a self, leaf: &'a str) -> impl Iterator<Item = &'a KeyPath> + 'a {
        self.paths.iter().filter(move |p| p.leaf() == Some(leaf))
    }

    /// Occurrences of `leaf` under a parent
    #[must_use]
    pub fn leaf_occurrences(&self, leaf: &str) -> &[LeafOccurrence] {
        self.leaf_occurrences
            .get(leaf)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Leaf names with their occurrences
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &[LeafOccurrence])> {
        self.leaf_occurrences
            .iter()
            .map(|(leaf, occ)| (leaf.as_str(), occ.as_slice()))
    }

    /// Whether `name` is the name of a parent holding ambiguous children
    #[must_use]
    pub fn is_ambiguous_parent(&self, name: &str) -> bool {
        self.ambiguous_by_parent.contains_key(name)
    }

    /// Ambiguous children of parents named `name`
    #[must_use]
    pub fn ambiguous_children(&self, name: &str) -> Option<&BTreeSet<KeyPath>> {
        self.ambiguous_by_parent.get(name)
    }

    /// Whether `path` appears anywhere in the ambiguity table
    #[must_use]
    pub fn is_ambiguous_path(&self, path: &KeyPath) -> bool {
        self.ambiguous_paths.contains(path)
    }

    #[must_use]
    pub fn is_ambiguous_leaf(&self, leaf: &str) -> bool {
        !self.ambiguous_leaf_parents(leaf).is_empty()
    }

    /// Parent names under which `leaf` is ambiguous; empty when it is not
    #[must_use]
    pub fn ambiguous_leaf_parents(&self, leaf: &str) -> BTreeSet<&str> {
        self.leaf_occurrences(leaf)
            .iter()
            .filter(|occ| self.ambiguous_paths.contains(&occ.path))
            .map(|occ| occ.parent_name.as_str())
            .collect()
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn collect_paths(value: &Value, prefix: &mut Vec<String>, out: &mut BTreeSet<KeyPath>) {
    match value {
        Value::Object(members) => {
            for (name, member) in members {
                if name.is_empty() {
                    log::debug!("Skipping empty member name under {:?}", prefix.join("."));
                    continue;
                }
                prefix.push(name.clone());
                if is_container(member) {
                    collect_paths(member, prefix, out);
                } else {
                    out.insert(KeyPath::from_segments(prefix.clone()));
                }
                prefix.pop();
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return;
            }
            if items.iter().all(|item| !is_container(item)) {
                if !prefix.is_empty() {
                    out.insert(KeyPath::from_segments(prefix.clone()));
                }
            } else {
                for item in items {
                    collect_paths(item, prefix, out);
                }
            }
        }
        // Scalars are recorded by their containing object; a bare scalar
        // (top level or mixed into a list of containers) has no name.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dotted(model: &PathModel) -> Vec<String> {
        model.paths().iter().map(KeyPath::dotted).collect()
    }

    #[test]
    fn test_flattening_rules() {
        let model = PathModel::build(&json!({
            "title": "x",
            "tags": ["a", "b"],
            "items": [{"id": 1, "name": "a"}, {"id": 2, "price": 3}],
            "matrix": [[1, 2], [3]],
            "meta": {"page": {"size": 10}},
            "empty_obj": {},
            "empty_list": []
        }));

        let mut expected = vec![
            "items.id",
            "items.name",
            "items.price",
            "matrix",
            "meta.page.size",
            "tags",
            "title",
        ];
        expected.sort();
        let mut actual = dotted(&model);
        actual.sort();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_vocabulary_covers_every_segment() {
        let model = PathModel::build(&json!({"meta": {"page": {"size": 10}}}));
        let vocab: Vec<&str> = model.vocabulary().iter().map(String::as_str).collect();
        assert_eq!(vocab, vec!["meta", "page", "size"]);
    }

    #[test]
    fn test_top_level_scalar_list_and_empty_names() {
        assert!(PathModel::build(&json!([1, 2, 3])).paths().is_empty());
        assert!(PathModel::build(&json!("text")).paths().is_empty());

        let model = PathModel::build(&json!({"": 1, "ok": {"": 2, "v": 3}}));
        assert_eq!(dotted(&model), vec!["ok.v"]);
    }

    #[test]
    fn test_sibling_id_is_ambiguous() {
        let model = PathModel::build(&json!({"a": {"id": 1}, "b": {"id": 2}}));

        assert!(model.is_ambiguous_leaf("id"));
        let parents: Vec<&str> = model.ambiguous_leaf_parents("id").into_iter().collect();
        assert_eq!(parents, vec!["a", "b"]);
        assert!(model.is_ambiguous_parent("a"));
        assert!(model.is_ambiguous_parent("b"));
    }

    #[test]
    fn test_repeated_shape_marks_all_children() {
        let model = PathModel::build(&json!({
            "home": {"lat": 1, "lng": 2},
            "work": {"lat": 3, "lng": 4},
            "user": {"name": "x"}
        }));

        assert_eq!(model.shape_count(&["lat".to_string(), "lng".to_string()]), 2);
        let home = model.ambiguous_children("home").unwrap();
        assert!(home.contains(&"home.lat".parse::<KeyPath>().unwrap()));
        assert!(home.contains(&"home.lng".parse::<KeyPath>().unwrap()));
        assert!(!model.is_ambiguous_parent("user"));
        assert!(!model.is_ambiguous_leaf("name"));
    }

    #[test]
    fn test_leaf_collision_without_shape_repeat() {
        let model = PathModel::build(&json!({
            "user": {"id": 1, "name": "x"},
            "order": {"id": 2, "total": 3}
        }));

        assert_eq!(model.leaf_occurrences("id").len(), 2);
        assert!(model.is_ambiguous_path(&"user.id".parse().unwrap()));
        assert!(model.is_ambiguous_path(&"order.id".parse().unwrap()));
        assert!(!model.is_ambiguous_path(&"user.name".parse().unwrap()));
    }

    #[test]
    fn test_build_is_idempotent() {
        let doc = json!({
            "list": [{"id": 1, "v": {"x": 1}}, {"id": 2, "v": {"x": 2}}],
            "a": {"id": 1},
            "b": {"id": 2, "tags": ["t"]}
        });
        assert_eq!(PathModel::build(&doc), PathModel::build(&doc));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(PathModel::from_json_str("{not json").is_err());
    }
}
