//! The read-only knowledge-graph query surface from spec.md §6: "all
//! packages; all interpreter releases; modules/attributes per interpreter
//! release; packages-and-versions matching a module node id; all non-removed
//! versions of a package with their interpreter constraints; all non-removed
//! versions of a package; dependency edges of a version (with marker,
//! specifier, extras, ordering integer, upload timestamp)."
//!
//! This crate states the contract only — it is an external collaborator per
//! spec.md §1 — and ships an in-memory fake so the core crates can be tested
//! without a real graph database.

use std::collections::BTreeSet;

use envpin_normalize::{ExtraName, PackageName, TopModule};
use envpin_version::{InterpreterConstraint, InterpreterVersion, Marker, Version, VersionSpecifiers};

/// Seconds since the Unix epoch, as stored by the KG's `upload_time`
/// property. A plain newtype rather than a full datetime type: the only
/// operation the core ever performs on it is `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

/// One non-removed version of a package, as returned by
/// `KnowledgeGraph::versions`.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub version: Version,
    pub interpreter_constraint: InterpreterConstraint,
    pub upload_timestamp: Option<Timestamp>,
}

/// One dependency edge of a version, as returned by
/// `KnowledgeGraph::dependency_edges`.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub name: PackageName,
    pub specifier: VersionSpecifiers,
    pub marker: Option<Marker>,
    pub extras: BTreeSet<ExtraName>,
    /// The ordering integer the original dependency declaration carried
    /// (e.g. position in `install_requires`); edges are walked in this
    /// order so marker evaluation short-circuits deterministically.
    pub order: u32,
}

/// `CandidateVersion` from the data model (spec.md §3): a candidate
/// package-version for a top module, with its matching degree. This is the
/// shape candidate discovery hands to the Environment Generator.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateVersion {
    pub version: Version,
    pub interpreter_constraint: InterpreterConstraint,
    pub repos_constraint: VersionSpecifiers,
    pub matching_degree: f64,
}

impl CandidateVersion {
    /// Ordering key: `(matching_degree desc, version desc)`, per spec.md §3.
    fn sort_key(&self) -> (std::cmp::Reverse<OrderedF64>, std::cmp::Reverse<Version>) {
        (
            std::cmp::Reverse(OrderedF64(self.matching_degree)),
            std::cmp::Reverse(self.version.clone()),
        )
    }
}

/// Sorts a batch of candidate versions for the same package in the order
/// the data model requires: descending matching degree, then descending
/// version.
pub fn sort_candidates(candidates: &mut [CandidateVersion]) {
    candidates.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OrderedF64(f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// The read-only KG access layer. Every method is a blocking call by
/// contract (spec.md §5): there are no async suspension points in the core.
pub trait KnowledgeGraph {
    fn all_packages(&self) -> Vec<PackageName>;

    fn all_interpreter_releases(&self) -> Vec<InterpreterVersion>;

    /// Standard-library modules and builtin attributes exposed by an
    /// interpreter release, keyed for the source parser's stdlib filter.
    fn stdlib_modules(&self, interpreter: &InterpreterVersion) -> Vec<String>;

    /// Packages (and the versions that export it) matching a module id,
    /// i.e. `query_pvs4module` in the original knowledge-graph driver.
    fn packages_for_module(&self, module: &TopModule) -> Vec<(PackageName, Vec<Version>)>;

    /// All non-removed versions of a package with interpreter constraints,
    /// descending by version — `versions(pkg)` from spec.md §4.A's contract
    /// statement, except ordering is the caller's job there; here we return
    /// the raw records and let `envpin-store` sort and filter them.
    fn package_versions(&self, pkg: &PackageName) -> Vec<VersionRecord>;

    /// Dependency edges of a version, unsorted (the resolver sorts by
    /// `order` itself, per spec.md §4.C).
    fn dependency_edges(&self, pkg: &PackageName, version: &Version) -> Vec<DependencyEdge>;
}

/// An in-memory [`KnowledgeGraph`] for tests and for running the pipeline
/// without a real graph database. Not a cache — `envpin-store` provides the
/// caching layer described in spec.md §4.A; this is the data source it
/// caches reads from.
#[derive(Debug, Default, Clone)]
pub struct MemoryKnowledgeGraph {
    packages: Vec<PackageName>,
    interpreters: Vec<InterpreterVersion>,
    stdlib: Vec<String>,
    module_index: Vec<(TopModule, Vec<(PackageName, Vec<Version>)>)>,
    versions: Vec<(PackageName, Vec<VersionRecord>)>,
    edges: Vec<((PackageName, Version), Vec<DependencyEdge>)>,
}

impl MemoryKnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreters(mut self, interpreters: Vec<InterpreterVersion>) -> Self {
        self.interpreters = interpreters;
        self
    }

    pub fn with_stdlib_modules(mut self, modules: Vec<String>) -> Self {
        self.stdlib = modules;
        self
    }

    pub fn with_package_versions(mut self, pkg: PackageName, versions: Vec<VersionRecord>) -> Self {
        if !self.packages.contains(&pkg) {
            self.packages.push(pkg.clone());
        }
        self.versions.push((pkg, versions));
        self
    }

    pub fn with_dependency_edges(
        mut self,
        pkg: PackageName,
        version: Version,
        edges: Vec<DependencyEdge>,
    ) -> Self {
        self.edges.push(((pkg, version), edges));
        self
    }

    pub fn with_module_packages(
        mut self,
        module: TopModule,
        packages: Vec<(PackageName, Vec<Version>)>,
    ) -> Self {
        self.module_index.push((module, packages));
        self
    }
}

impl KnowledgeGraph for MemoryKnowledgeGraph {
    fn all_packages(&self) -> Vec<PackageName> {
        self.packages.clone()
    }

    fn all_interpreter_releases(&self) -> Vec<InterpreterVersion> {
        self.interpreters.clone()
    }

    fn stdlib_modules(&self, _interpreter: &InterpreterVersion) -> Vec<String> {
        self.stdlib.clone()
    }

    fn packages_for_module(&self, module: &TopModule) -> Vec<(PackageName, Vec<Version>)> {
        self.module_index
            .iter()
            .find(|(m, _)| m == module)
            .map(|(_, pkgs)| pkgs.clone())
            .unwrap_or_default()
    }

    fn package_versions(&self, pkg: &PackageName) -> Vec<VersionRecord> {
        self.versions
            .iter()
            .find(|(name, _)| name == pkg)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    fn dependency_edges(&self, pkg: &PackageName, version: &Version) -> Vec<DependencyEdge> {
        self.edges
            .iter()
            .find(|((name, v), _)| name == pkg && v == version)
            .map(|(_, e)| e.clone())
            .unwrap_or_default()
    }
}
