//! Candidate discovery is an external collaborator by contract (spec.md §1):
//! it queries the KG, scores matching degrees, and produces per-module
//! candidate maps. This module states the two shapes the core actually
//! consumes — the initial discovery output, and the name-similarity fallback
//! used to resolve an "unknown module" (spec.md §4.D step 4, grounded on
//! `utils/handle_unknown.get_similar_packages` in the distilled system) —
//! plus an in-memory fake for tests.

use std::collections::{BTreeMap, HashSet};

use envpin_normalize::{PackageName, TopModule};
use envpin_version::VersionSpecifiers;

use crate::graph::CandidateVersion;

/// `(pv_candidates, similarity)` from spec.md §4.D's `set_candidates`
/// signature: for each top module, a map of package to its ranked
/// candidate versions, and a map of package to its similarity score.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredCandidates {
    pub pv_candidates: BTreeMap<TopModule, BTreeMap<PackageName, Vec<CandidateVersion>>>,
    pub similarity: BTreeMap<TopModule, BTreeMap<PackageName, f64>>,
}

/// Resolves an "unknown module" (spec.md glossary: a top module with no
/// candidates found by KG lookup) by name similarity, excluding packages
/// already offered for that module.
pub trait SimilarityDiscovery {
    fn discover_similar(
        &self,
        module: &TopModule,
        already_used: &HashSet<PackageName>,
    ) -> DiscoveredCandidates;
}

/// A fake that returns nothing: every module stays unknown. Useful for
/// tests of the paths that must terminate gracefully when similarity search
/// finds nothing (spec.md property 9).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSimilarityDiscovery;

impl SimilarityDiscovery for NoSimilarityDiscovery {
    fn discover_similar(
        &self,
        _module: &TopModule,
        _already_used: &HashSet<PackageName>,
    ) -> DiscoveredCandidates {
        DiscoveredCandidates::default()
    }
}

/// A fixed-table fake for tests: returns whatever was registered for a
/// module, once, regardless of `already_used` (tests filter themselves).
#[derive(Debug, Default, Clone)]
pub struct FixedSimilarityDiscovery {
    table: BTreeMap<TopModule, DiscoveredCandidates>,
}

impl FixedSimilarityDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, module: TopModule, candidates: DiscoveredCandidates) -> Self {
        self.table.insert(module, candidates);
        self
    }
}

impl SimilarityDiscovery for FixedSimilarityDiscovery {
    fn discover_similar(
        &self,
        module: &TopModule,
        already_used: &HashSet<PackageName>,
    ) -> DiscoveredCandidates {
        let Some(found) = self.table.get(module) else {
            return DiscoveredCandidates::default();
        };

        let mut out = found.clone();
        if let Some(pkgs) = out.pv_candidates.get_mut(module) {
            pkgs.retain(|pkg, _| !already_used.contains(pkg));
        }
        if let Some(sims) = out.similarity.get_mut(module) {
            sims.retain(|pkg, _| !already_used.contains(pkg));
        }
        out
    }
}

/// The ad-hoc half of candidate discovery the Adjustment Controller needs
/// (spec.md §4.E "run third-party discovery on the synthetic snippet"):
/// look up a specific module the error log named, and look up which
/// interpreter releases recognize a specific language-syntax feature. Same
/// external collaborator as [`DiscoveredCandidates`]'s producer — this is
/// just the on-demand query shape rather than the whole-program upfront one.
pub trait CandidateDiscovery {
    fn discover_module(&self, module: &TopModule) -> DiscoveredCandidates;

    /// Which interpreter releases accept the syntax feature named in a
    /// `SyntaxError` template match, as an admission specifier suitable for
    /// `add_python_constraint`.
    fn discover_syntax_feature(&self, feature: &str) -> VersionSpecifiers;
}

/// A fake that finds nothing for any module or syntax feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCandidateDiscovery;

impl CandidateDiscovery for NoCandidateDiscovery {
    fn discover_module(&self, _module: &TopModule) -> DiscoveredCandidates {
        DiscoveredCandidates::default()
    }

    fn discover_syntax_feature(&self, _feature: &str) -> VersionSpecifiers {
        VersionSpecifiers::empty()
    }
}

/// A fixed-table fake for tests: registered modules return their
/// candidates once; registered syntax features return their specifier;
/// anything unregistered behaves like [`NoCandidateDiscovery`].
#[derive(Debug, Default, Clone)]
pub struct FixedCandidateDiscovery {
    modules: BTreeMap<TopModule, DiscoveredCandidates>,
    syntax_features: BTreeMap<String, VersionSpecifiers>,
}

impl FixedCandidateDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(mut self, module: TopModule, candidates: DiscoveredCandidates) -> Self {
        self.modules.insert(module, candidates);
        self
    }

    pub fn register_syntax_feature(mut self, feature: impl Into<String>, specifier: VersionSpecifiers) -> Self {
        self.syntax_features.insert(feature.into(), specifier);
        self
    }
}

impl CandidateDiscovery for FixedCandidateDiscovery {
    fn discover_module(&self, module: &TopModule) -> DiscoveredCandidates {
        self.modules.get(module).cloned().unwrap_or_default()
    }

    fn discover_syntax_feature(&self, feature: &str) -> VersionSpecifiers {
        self.syntax_features.get(feature).cloned().unwrap_or_else(VersionSpecifiers::empty)
    }
}
