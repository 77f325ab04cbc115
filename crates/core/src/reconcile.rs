//! Mapping of matched key names back to concrete key paths.
//!
//! Candidates come from the path model: names of parents with ambiguous
//! children resolve through the children the code also touches; any other
//! name resolves to every unambiguous path ending in it. Roots with more than
//! one candidate key then vote by receiver text: the receiver that co-occurs
//! with the most distinct keys of a root decides which keys survive. This is
//! a heuristic, not a proof; ties keep every tied receiver.

use crate::path_model::PathModel;
use crate::result_set::ResultSet;
use crate::types::{is_numeric_key, AccessSite, Evidence, KeyPath, ResolutionStage, ResolvedPath};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of one engine invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Newly resolved paths with the sites that justified them
    pub resolved: BTreeMap<KeyPath, Vec<AccessSite>>,

    /// Candidates with competing evidence and no winning receiver
    pub unresolved: BTreeSet<KeyPath>,

    /// Candidates already resolved by an earlier invocation
    pub excluded: BTreeSet<KeyPath>,
}

impl Reconciliation {
    #[must_use]
    pub fn result_set(&self) -> ResultSet {
        self.resolved.keys().collect()
    }

    #[must_use]
    pub fn into_resolved_paths(self, stage: ResolutionStage) -> Vec<ResolvedPath> {
        self.resolved
            .into_iter()
            .map(|(path, sites)| ResolvedPath {
                path,
                stage,
                evidence: Evidence::Code(sites),
            })
            .collect()
    }
}

/// Receiver tally for one root with competing keys
struct ReceiverVote<'a> {
    keys_by_receiver: BTreeMap<&'a str, BTreeSet<&'a str>>,
    winners: BTreeSet<&'a str>,
}

impl<'a> ReceiverVote<'a> {
    fn tally(keys: &BTreeSet<&'a str>, receivers: &BTreeMap<&'a str, BTreeSet<&'a str>>) -> Self {
        let mut keys_by_receiver: BTreeMap<&'a str, BTreeSet<&'a str>> = BTreeMap::new();
        for &key in keys {
            for &receiver in receivers.get(key).into_iter().flatten() {
                keys_by_receiver.entry(receiver).or_default().insert(key);
            }
        }

        let best = keys_by_receiver.values().map(BTreeSet::len).max().unwrap_or(0);
        let winners = keys_by_receiver
            .iter()
            .filter(|(_, keys)| keys.len() == best)
            .map(|(receiver, _)| *receiver)
            .collect();

        Self {
            keys_by_receiver,
            winners,
        }
    }

    fn supports(&self, key: &str) -> bool {
        self.winners.iter().any(|receiver| {
            self.keys_by_receiver
                .get(receiver)
                .is_some_and(|keys| keys.contains(key))
        })
    }
}

/// Resolves access sites against one path model
pub struct Reconciler<'m> {
    model: &'m PathModel,
}

impl<'m> Reconciler<'m> {
    #[must_use]
    pub const fn new(model: &'m PathModel) -> Self {
        Self { model }
    }

    /// Resolve a pool of access sites, skipping paths in `excluded`
    #[must_use]
    pub fn reconcile(&self, sites: &[AccessSite], excluded: &ResultSet) -> Reconciliation {
        let matched: BTreeSet<&str> = sites
            .iter()
            .map(|s| s.matched_key.as_str())
            .filter(|key| !is_numeric_key(key))
            .collect();

        let candidates = self.candidates(&matched);
        let receivers = receivers_by_key(sites);
        let (kept, unresolved) = arbitrate(&candidates, &receivers);

        let mut outcome = Reconciliation {
            unresolved,
            ..Reconciliation::default()
        };
        for path in kept {
            if excluded.contains_path(&path) {
                outcome.excluded.insert(path);
                continue;
            }
            let leaf = path.leaf().unwrap_or_default();
            let evidence = sites
                .iter()
                .filter(|s| s.matched_key == leaf)
                .cloned()
                .collect();
            outcome.resolved.insert(path, evidence);
        }

        log::debug!(
            "Reconciled {} keys: {} candidates, {} resolved, {} unresolved, {} excluded",
            matched.len(),
            candidates.len(),
            outcome.resolved.len(),
            outcome.unresolved.len(),
            outcome.excluded.len()
        );
        outcome
    }

    /// Candidate paths for a set of matched key names
    #[must_use]
    pub fn candidates(&self, matched: &BTreeSet<&str>) -> BTreeSet<KeyPath> {
        let mut candidates = BTreeSet::new();

        for &key in matched {
            if self.model.is_ambiguous_parent(key) {
                for (parent, children) in self.model.parents_named(key) {
                    candidates.extend(
                        children
                            .iter()
                            .filter(|child| matched.contains(child.as_str()))
                            .map(|child| parent.child(child)),
                    );
                }
            } else {
                candidates.extend(
                    self.model
                        .paths_ending_in(key)
                        .filter(|path| !self.model.is_ambiguous_path(path))
                        .cloned(),
                );
            }
        }

        candidates
    }
}

fn receivers_by_key(sites: &[AccessSite]) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut receivers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for site in sites {
        if let Some(receiver) = site.voting_receiver() {
            receivers
                .entry(site.matched_key.as_str())
                .or_default()
                .insert(receiver);
        }
    }
    receivers
}

/// Split candidates into kept and unresolved by per-root receiver voting.
///
/// Every prefix of a candidate registers its next segment as a key of that
/// prefix's group, so intermediate segments compete with sibling leaves.
fn arbitrate<'a>(
    candidates: &'a BTreeSet<KeyPath>,
    receivers: &BTreeMap<&'a str, BTreeSet<&'a str>>,
) -> (BTreeSet<KeyPath>, BTreeSet<KeyPath>) {
    let mut groups: BTreeMap<KeyPath, BTreeSet<&'a str>> = BTreeMap::new();
    for path in candidates {
        let segments = path.segments();
        if let Some(leaf) = segments.last() {
            groups
                .entry(path.parent_or_root())
                .or_default()
                .insert(leaf.as_str());
        }
        for depth in 1..segments.len() {
            groups
                .entry(path.prefix(depth))
                .or_default()
                .insert(segments[depth].as_str());
        }
    }

    let votes: BTreeMap<&KeyPath, ReceiverVote<'a>> = groups
        .iter()
        .filter(|(_, keys)| keys.len() > 1)
        .map(|(root, keys)| (root, ReceiverVote::tally(keys, receivers)))
        .collect();

    let mut kept = BTreeSet::new();
    let mut unresolved = BTreeSet::new();
    for path in candidates {
        let root = path.parent_or_root();
        let leaf = path.leaf().unwrap_or_default();
        let supported = votes.get(&root).map_or(true, |vote| vote.supports(leaf));
        if supported {
            kept.insert(path.clone());
        } else {
            log::debug!("No winning receiver for {path}");
            unresolved.insert(path.clone());
        }
    }

    (kept, unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn site(key: &str, receiver: Option<&str>) -> AccessSite {
        AccessSite {
            matched_key: key.to_string(),
            receiver: receiver.map(str::to_string),
            snippet: match receiver {
                Some(r) => format!("{r}.{key}"),
                None => key.to_string(),
            },
            unit_id: "test.js".to_string(),
            kind: AccessKind::Member,
            line: 1,
        }
    }

    fn resolved(outcome: &Reconciliation) -> Vec<String> {
        outcome.resolved.keys().map(KeyPath::dotted).collect()
    }

    #[test]
    fn test_unambiguous_leaf_resolves() {
        let model = PathModel::build(&json!({"user": {"name": "x", "id": 1}}));
        let outcome = Reconciler::new(&model)
            .reconcile(&[site("name", Some("obj"))], &ResultSet::new());

        assert_eq!(resolved(&outcome), vec!["user.name"]);
        assert_eq!(outcome.resolved[&"user.name".parse::<KeyPath>().unwrap()].len(), 1);
    }

    #[test]
    fn test_ambiguous_leaf_needs_parent_name() {
        let model = PathModel::build(&json!({"a": {"id": 1}, "b": {"id": 2}}));
        let reconciler = Reconciler::new(&model);

        let alone = reconciler.reconcile(&[site("id", Some("x"))], &ResultSet::new());
        assert!(alone.resolved.is_empty());

        let with_parent = reconciler.reconcile(
            &[site("a", Some("data")), site("id", Some("data.a"))],
            &ResultSet::new(),
        );
        assert_eq!(resolved(&with_parent), vec!["a.id"]);
    }

    #[test]
    fn test_ambiguous_parent_without_matching_child_emits_nothing() {
        let model = PathModel::build(&json!({"a": {"id": 1}, "b": {"id": 2}}));
        let outcome = Reconciler::new(&model).reconcile(&[site("a", Some("x"))], &ResultSet::new());
        assert!(outcome.resolved.is_empty());
    }

    #[test]
    fn test_every_parent_with_the_name_is_considered() {
        let model = PathModel::build(&json!({
            "left": {"node": {"id": 1}},
            "right": {"node": {"id": 2}}
        }));
        let candidates = Reconciler::new(&model).candidates(&["node", "id"].into_iter().collect());
        let dotted: Vec<String> = candidates.iter().map(KeyPath::dotted).collect();
        assert_eq!(dotted, vec!["left.node.id", "right.node.id"]);
    }

    #[test]
    fn test_receiver_vote_picks_majority_receiver() {
        let model = PathModel::build(&json!({"user": {"id": 1, "name": "x", "extra": 2}}));
        let sites = vec![
            site("id", Some("rec")),
            site("name", Some("rec")),
            site("id", Some("other")),
            site("extra", Some("third")),
        ];

        let outcome = Reconciler::new(&model).reconcile(&sites, &ResultSet::new());
        assert_eq!(resolved(&outcome), vec!["user.id", "user.name"]);
        let unresolved: Vec<String> = outcome.unresolved.iter().map(KeyPath::dotted).collect();
        assert_eq!(unresolved, vec!["user.extra"]);
    }

    #[test]
    fn test_receiver_tie_keeps_all_winners() {
        let model = PathModel::build(&json!({"user": {"id": 1, "name": "x"}}));
        let sites = vec![site("id", Some("a")), site("name", Some("b"))];

        let outcome = Reconciler::new(&model).reconcile(&sites, &ResultSet::new());
        assert_eq!(resolved(&outcome), vec!["user.id", "user.name"]);
    }

    #[test]
    fn test_key_without_receiver_loses_to_competitors() {
        let model = PathModel::build(&json!({"user": {"id": 1, "name": "x"}}));
        let sites = vec![site("id", Some("u")), site("name", None)];

        let outcome = Reconciler::new(&model).reconcile(&sites, &ResultSet::new());
        assert_eq!(resolved(&outcome), vec!["user.id"]);
        assert!(outcome.unresolved.contains(&"user.name".parse::<KeyPath>().unwrap()));
    }

    #[test]
    fn test_intermediate_segment_competes_in_its_group() {
        let model = PathModel::build(&json!({"page": {"title": "t", "meta": {"size": 1}}}));
        let sites = vec![site("title", Some("p")), site("size", Some("m"))];

        let outcome = Reconciler::new(&model).reconcile(&sites, &ResultSet::new());
        assert_eq!(resolved(&outcome), vec!["page.meta.size", "page.title"]);
    }

    #[test]
    fn test_numeric_keys_are_ignored() {
        let model = PathModel::build(&json!({"codes": {"200": "ok", "404": "missing"}}));
        let outcome = Reconciler::new(&model).reconcile(&[site("200", Some("c"))], &ResultSet::new());
        assert!(outcome.resolved.is_empty());
    }

    #[test]
    fn test_second_run_with_first_output_excluded_is_empty() {
        let model = PathModel::build(&json!({
            "user": {"name": "x", "id": 1},
            "items": [{"sku": "a", "qty": 1}]
        }));
        let sites = vec![
            site("name", Some("u")),
            site("sku", Some("item")),
            site("qty", Some("item")),
        ];
        let reconciler = Reconciler::new(&model);

        let first = reconciler.reconcile(&sites, &ResultSet::new());
        assert!(!first.resolved.is_empty());

        let second = reconciler.reconcile(&sites, &first.result_set());
        assert!(second.resolved.is_empty());
        assert_eq!(second.excluded.len(), first.resolved.len());
    }
}
