//! The concrete stand-in for candidate discovery (spec.md §1's second
//! external collaborator): turns a knowledge-graph module lookup into the
//! `DiscoveredCandidates` shape the Environment Generator and Adjustment
//! Controller consume. The *scoring* half of real candidate discovery
//! (ranking a package's relevance to a module by name or usage similarity)
//! is explicitly out of scope here — every candidate this binary discovers
//! gets a uniform matching degree of `1.0`, since KG module-index membership
//! is the only coverage signal available without a real discovery backend.

use std::collections::BTreeMap;

use envpin_kg::{sort_candidates, CandidateDiscovery, CandidateVersion, DiscoveredCandidates, KnowledgeGraph};
use envpin_normalize::{PackageName, TopModule};
use envpin_version::VersionSpecifiers;

pub(crate) struct KgCandidateDiscovery<'g, G> {
    graph: &'g G,
}

impl<'g, G: KnowledgeGraph> KgCandidateDiscovery<'g, G> {
    pub(crate) fn new(graph: &'g G) -> Self {
        Self { graph }
    }

    /// Discovers candidates for every module a parsed program imports, for
    /// `Generator::set_candidates`'s initial `(pv_candidates, similarity)`
    /// argument.
    pub(crate) fn discover_program(&self, modules: &[TopModule]) -> DiscoveredCandidates {
        let mut out = DiscoveredCandidates::default();
        for module in modules {
            let found = self.discover_module(module);
            out.pv_candidates.extend(found.pv_candidates);
        }
        out
    }
}

impl<G: KnowledgeGraph> CandidateDiscovery for KgCandidateDiscovery<'_, G> {
    fn discover_module(&self, module: &TopModule) -> DiscoveredCandidates {
        let mut out = DiscoveredCandidates::default();

        let mut by_pkg: BTreeMap<PackageName, Vec<CandidateVersion>> = BTreeMap::new();
        for (pkg, offered_versions) in self.graph.packages_for_module(module) {
            let offered: std::collections::BTreeSet<_> = offered_versions.into_iter().collect();
            let mut candidates: Vec<CandidateVersion> = self
                .graph
                .package_versions(&pkg)
                .into_iter()
                .filter(|record| offered.contains(&record.version))
                .map(|record| CandidateVersion {
                    version: record.version,
                    interpreter_constraint: record.interpreter_constraint,
                    repos_constraint: VersionSpecifiers::empty(),
                    matching_degree: 1.0,
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }
            sort_candidates(&mut candidates);
            by_pkg.insert(pkg, candidates);
        }

        if !by_pkg.is_empty() {
            out.pv_candidates.insert(module.clone(), by_pkg);
        }
        out
    }

    /// No language-syntax-feature table backs this binary (that, too, is
    /// part of the out-of-scope discovery system); an empty specifier
    /// admits every interpreter, so `add_python_constraint` correctly
    /// reports "no progress" rather than narrowing on guessed data.
    fn discover_syntax_feature(&self, _feature: &str) -> VersionSpecifiers {
        VersionSpecifiers::empty()
    }
}
