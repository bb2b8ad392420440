//! Value types for one resolution: requirements, candidates, criteria and
//! resolution state. Grounded on `structs.py` of the distilled resolver —
//! sum types replacing its duck-typed records, per the design note on
//! preferring explicit records over ad-hoc dictionaries.

use std::collections::BTreeSet;

use envpin_normalize::{ExtraName, PackageName};
use envpin_version::{Version, VersionSpecifiers};
use indexmap::IndexMap;

/// A single dependency requirement: a package name, the version constraint
/// it places, and the extras it requests.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: PackageName,
    pub specifier: VersionSpecifiers,
    pub extra: BTreeSet<ExtraName>,
}

impl Requirement {
    pub fn new(name: PackageName, specifier: VersionSpecifiers, extra: BTreeSet<ExtraName>) -> Self {
        Self { name, specifier, extra }
    }
}

/// A concrete, resolvable version of a package, with the extras requested
/// of it at the point it was pinned.
///
/// Equality mirrors the distilled `Candidate.__eq__`: name and version only
/// — two `Candidate`s requesting different extras of the same version are
/// still "the same candidate" for incompatibility-list membership checks.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: PackageName,
    pub version: Version,
    pub extra: BTreeSet<ExtraName>,
}

impl Candidate {
    pub fn new(name: PackageName, version: Version) -> Self {
        Self { name, version, extra: BTreeSet::new() }
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Candidate {}

/// A requirement together with the candidate that introduced it (⊥ for a
/// root, user-supplied requirement).
#[derive(Debug, Clone)]
pub struct RequirementInformation {
    pub requirement: Requirement,
    pub parent: Option<Candidate>,
}

/// The resolver's summary of one package name: requirements that apply to
/// it, candidates that remain admissible, and candidates ruled out by a
/// prior backtrack.
///
/// Externally immutable by convention: methods that would "change" a
/// criterion build and return a new one rather than mutating in place.
#[derive(Debug, Clone, Default)]
pub struct Criterion {
    pub candidates: Vec<Candidate>,
    pub information: Vec<RequirementInformation>,
    pub incompatibilities: Vec<Candidate>,
}

impl Criterion {
    pub fn iter_requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.information.iter().map(|i| &i.requirement)
    }

    /// The union of extras requested across every contributing requirement.
    pub fn requested_extras(&self) -> BTreeSet<ExtraName> {
        let mut out = BTreeSet::new();
        for info in &self.information {
            out.extend(info.requirement.extra.iter().cloned());
        }
        out
    }
}

/// One round's resolution state: which names are pinned to what, the
/// per-name criteria, and the causes of the most recent backtrack (used to
/// bias the next preference computation).
///
/// `mapping` is an [`IndexMap`] rather than a `HashMap`: its insertion order
/// *is* the backtrack stack (spec.md §4.C — "the insertion order is the
/// backtrack stack").
#[derive(Debug, Clone, Default)]
pub struct State {
    pub mapping: IndexMap<PackageName, Candidate>,
    pub criteria: IndexMap<PackageName, Criterion>,
    pub backtrack_causes: Vec<RequirementInformation>,
}

/// Whether `candidate` satisfies `requirement`: its version is admitted by
/// the specifier, and it carries every extra the requirement asks for.
pub fn is_satisfied_by(requirement: &Requirement, candidate: &Candidate) -> bool {
    requirement.specifier.contains(&candidate.version)
        && requirement.extra.is_subset(&candidate.extra)
}
