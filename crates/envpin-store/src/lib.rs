//! The Version Store (spec.md §4.A): two read-through caches in front of
//! the knowledge graph, keyed by package name.

use std::cell::RefCell;
use std::collections::HashMap;

use envpin_kg::{KnowledgeGraph, Timestamp};
use envpin_normalize::PackageName;
use envpin_version::{InterpreterVersion, Version};

/// Resident-size bound past which the candidate cache is cleared wholesale
/// rather than evicted entry-by-entry (spec.md §4.A: "simplicity over
/// hit-rate").
const CANDIDATE_CACHE_LIMIT: usize = 200;

/// One resolvable candidate, as handed to the resolver and the generator:
/// a version plus the KG-supplied timestamp used for the deadline filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub version: Version,
    pub upload_timestamp: Option<Timestamp>,
}

/// Read-through cache in front of a [`KnowledgeGraph`]. Not `Sync`: spec.md
/// §5 runs one store per worker, never shared across threads.
pub struct VersionStore<'g, G: KnowledgeGraph> {
    graph: &'g G,
    versions: RefCell<HashMap<PackageName, Vec<Version>>>,
    candidates: RefCell<HashMap<(PackageName, InterpreterVersion), Vec<Candidate>>>,
}

impl<'g, G: KnowledgeGraph> VersionStore<'g, G> {
    pub fn new(graph: &'g G) -> Self {
        Self {
            graph,
            versions: RefCell::new(HashMap::new()),
            candidates: RefCell::new(HashMap::new()),
        }
    }

    /// The backing knowledge graph, for reads this cache doesn't cover
    /// (dependency edges: the resolver reads those directly, once per
    /// candidate it actually attempts to pin, so caching them here would
    /// just add bookkeeping for entries used once).
    pub fn graph(&self) -> &'g G {
        self.graph
    }

    /// Ordered version strings for a package, ascending by version order.
    /// A missing package is "no candidate", never an error: returns `[]`.
    pub fn versions(&self, pkg: &PackageName) -> Vec<Version> {
        if let Some(hit) = self.versions.borrow().get(pkg) {
            return hit.clone();
        }
        let mut fetched: Vec<Version> = self
            .graph
            .package_versions(pkg)
            .into_iter()
            .map(|record| record.version)
            .collect();
        fetched.sort();
        self.versions.borrow_mut().insert(pkg.clone(), fetched.clone());
        fetched
    }

    /// Candidates for a package admissible under `interpreter`, optionally
    /// filtered to those uploaded no later than `deadline`. Descending by
    /// version, per spec.md §4.A.
    pub fn candidates(
        &self,
        pkg: &PackageName,
        interpreter: &InterpreterVersion,
        deadline: Option<Timestamp>,
    ) -> Vec<Candidate> {
        let key = (pkg.clone(), interpreter.clone());
        if let Some(hit) = self.candidates.borrow().get(&key) {
            return Self::apply_deadline(hit, deadline);
        }

        if self.candidates.borrow().len() >= CANDIDATE_CACHE_LIMIT {
            tracing::debug!(limit = CANDIDATE_CACHE_LIMIT, "candidate cache limit reached, clearing");
            self.candidates.borrow_mut().clear();
        }

        let mut fetched: Vec<Candidate> = self
            .graph
            .package_versions(pkg)
            .into_iter()
            .filter(|record| record.interpreter_constraint.admits(interpreter))
            .map(|record| Candidate {
                version: record.version,
                upload_timestamp: record.upload_timestamp,
            })
            .collect();
        fetched.sort_by(|a, b| b.version.cmp(&a.version));

        self.candidates.borrow_mut().insert(key, fetched.clone());
        Self::apply_deadline(&fetched, deadline)
    }

    fn apply_deadline(candidates: &[Candidate], deadline: Option<Timestamp>) -> Vec<Candidate> {
        let Some(deadline) = deadline else {
            return candidates.to_vec();
        };
        candidates
            .iter()
            .filter(|c| c.upload_timestamp.map_or(true, |ts| ts <= deadline))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envpin_kg::{MemoryKnowledgeGraph, VersionRecord};
    use envpin_version::InterpreterConstraint;

    fn record(version: &str, ts: i64) -> VersionRecord {
        VersionRecord {
            version: version.parse().unwrap(),
            interpreter_constraint: InterpreterConstraint::any(),
            upload_timestamp: Some(Timestamp(ts)),
        }
    }

    #[test]
    fn versions_are_ascending_and_cached() {
        let graph = MemoryKnowledgeGraph::new().with_package_versions(
            "flask".into(),
            vec![record("2.0", 10), record("1.0", 5)],
        );
        let store = VersionStore::new(&graph);
        let first = store.versions(&"flask".into());
        assert_eq!(first, vec!["1.0".parse().unwrap(), "2.0".parse().unwrap()]);
        // second call hits the cache; same result
        assert_eq!(store.versions(&"flask".into()), first);
    }

    #[test]
    fn missing_package_yields_empty_not_error() {
        let graph = MemoryKnowledgeGraph::new();
        let store = VersionStore::new(&graph);
        assert!(store.versions(&"nonexistent".into()).is_empty());
        assert!(store
            .candidates(&"nonexistent".into(), &"3.11".parse().unwrap(), None)
            .is_empty());
    }

    #[test]
    fn deadline_filters_by_upload_timestamp() {
        let graph = MemoryKnowledgeGraph::new().with_package_versions(
            "flask".into(),
            vec![record("2.0", 20), record("1.0", 5)],
        );
        let store = VersionStore::new(&graph);
        let filtered = store.candidates(&"flask".into(), &"3.11".parse().unwrap(), Some(Timestamp(10)));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].version, "1.0".parse().unwrap());
    }

    #[test]
    fn candidates_descend_by_version() {
        let graph = MemoryKnowledgeGraph::new().with_package_versions(
            "flask".into(),
            vec![record("1.0", 1), record("3.0", 1), record("2.0", 1)],
        );
        let store = VersionStore::new(&graph);
        let got = store.candidates(&"flask".into(), &"3.11".parse().unwrap(), None);
        let versions: Vec<Version> = got.into_iter().map(|c| c.version).collect();
        assert_eq!(
            versions,
            vec!["3.0".parse().unwrap(), "2.0".parse().unwrap(), "1.0".parse().unwrap()]
        );
    }
}
