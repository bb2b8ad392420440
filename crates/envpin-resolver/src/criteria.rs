//! `add_to_criteria` and pin-satisfaction, spec.md §4.C's "Adding a
//! requirement to criteria" and "Pin satisfaction" paragraphs.

use std::collections::BTreeSet;

use envpin_kg::{KnowledgeGraph, Timestamp};
use envpin_normalize::{ExtraName, PackageName};
use envpin_version::{InterpreterVersion, Marker, MarkerEnvironment};
use indexmap::IndexMap;

use envpin_store::VersionStore;

use crate::errors::ResolutionError;
use crate::types::{is_satisfied_by, Candidate, Criterion, Requirement, RequirementInformation};

/// Adds `requirement` (placed by `parent`, or `None` for a root requirement)
/// to `criteria`'s entry for `requirement.name`, returning the updated
/// `(name, Criterion)` pair.
///
/// If an entry already exists, its `candidates` are narrowed in place
/// (intersected with the new specifier) rather than re-fetched from the
/// store — spec.md §4.C is explicit that this is the non-refetching path.
/// A fresh entry fetches from the store and filters by the specifier and
/// the existing incompatibility list.
pub(crate) fn add_to_criteria<G: KnowledgeGraph>(
    store: &VersionStore<'_, G>,
    criteria: &IndexMap<PackageName, Criterion>,
    interpreter: &InterpreterVersion,
    deadline: Option<Timestamp>,
    requirement: Requirement,
    parent: Option<Candidate>,
) -> Result<(PackageName, Criterion), ResolutionError> {
    let name = requirement.name.clone();
    let info = RequirementInformation {
        requirement: requirement.clone(),
        parent,
    };

    let criterion = if let Some(existing) = criteria.get(&name) {
        let mut information = existing.information.clone();
        information.push(info);
        let candidates: Vec<Candidate> = existing
            .candidates
            .iter()
            .filter(|c| requirement.specifier.contains(&c.version))
            .cloned()
            .collect();
        Criterion {
            candidates,
            information,
            incompatibilities: existing.incompatibilities.clone(),
        }
    } else {
        let incompatibilities: Vec<Candidate> = Vec::new();
        let candidates: Vec<Candidate> = store
            .candidates(&name, interpreter, deadline)
            .into_iter()
            .filter(|c| requirement.specifier.contains(&c.version))
            .map(|c| Candidate::new(name.clone(), c.version))
            .collect();
        Criterion {
            candidates,
            information: vec![info],
            incompatibilities,
        }
    };

    if criterion.candidates.is_empty() {
        tracing::debug!(package = %name, "requirement conflicted: no admissible candidate remains");
        return Err(ResolutionError::RequirementsConflicted { name, criterion });
    }

    Ok((name, criterion))
}

/// Name `n` is satisfying iff its criterion is vacuous (no information —
/// anything goes) or `n` is pinned in `mapping` and the pin satisfies every
/// requirement in the criterion's information.
pub(crate) fn is_satisfying(
    criterion: &Criterion,
    name: &PackageName,
    mapping: &IndexMap<PackageName, Candidate>,
) -> bool {
    if criterion.information.is_empty() {
        return true;
    }
    match mapping.get(name) {
        None => false,
        Some(candidate) => criterion
            .information
            .iter()
            .all(|info| is_satisfied_by(&info.requirement, candidate)),
    }
}

/// Whether a dependency edge's marker admits `interpreter` under the
/// accumulated extras a criterion has had requested of it — spec.md §4.C:
/// "marker evaluation against `{python_version: interpreter, extra: e}` for
/// each `e` in the accumulated request extras, or `""` if none".
pub(crate) fn marker_admits(
    marker: Option<&Marker>,
    interpreter: &InterpreterVersion,
    extras: &BTreeSet<ExtraName>,
) -> bool {
    let Some(marker) = marker else {
        return true;
    };
    if extras.is_empty() {
        let env = MarkerEnvironment {
            python_version: interpreter.clone(),
            extra: None,
        };
        return marker.evaluate(&env);
    }
    extras.iter().any(|extra| {
        let env = MarkerEnvironment {
            python_version: interpreter.clone(),
            extra: Some(extra.clone()),
        };
        marker.evaluate(&env)
    })
}
