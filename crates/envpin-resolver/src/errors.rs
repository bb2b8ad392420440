//! The four internal error kinds from spec.md §7. Only `ImpossibleResolution`,
//! `TooDeep` and the wall-clock timeout ever escape [`crate::resolve`] to a
//! caller; `RequirementsConflicted` is caught locally and folded into a
//! backtrack cause, and `InconsistentCandidate` is a fatal-bug assertion that
//! should never fire if the rest of the resolver is correct.

use thiserror::Error;

use crate::types::{Candidate, Criterion, RequirementInformation};
use envpin_normalize::PackageName;
use envpin_version::Version;

#[derive(Debug, Error)]
pub enum ResolutionError {
    /// A requirement could not be reconciled with the candidates already on
    /// file for `name`: the offending [`Criterion`] is attached so the
    /// caller can fold it into a backtrack cause.
    #[error("no candidate of `{name}` satisfies every requirement placed on it")]
    RequirementsConflicted { name: PackageName, criterion: Criterion },

    /// A pinned candidate failed to satisfy its own criterion. This is a
    /// resolver bug, not a user-facing failure mode: the round loop must
    /// never install a candidate it hasn't already checked.
    #[error("candidate `{name}=={version}` was pinned but does not satisfy its own criterion")]
    InconsistentCandidate { name: PackageName, version: Version },

    /// Backtracking exhausted the state stack without finding a consistent
    /// assignment.
    #[error("no set of versions satisfies every requirement")]
    ImpossibleResolution { causes: Vec<RequirementInformation> },

    /// The round budget (`max_rounds`) was exhausted.
    #[error("resolution did not converge within the round budget")]
    TooDeep,

    /// The wall-clock deadline passed before a resolution was found.
    #[error("resolution exceeded its wall-clock deadline")]
    Timeout,
}

impl ResolutionError {
    /// The incompatibility this error implies should be recorded against
    /// `name`, when backtracking off a failed candidate attempt.
    pub(crate) fn as_conflict(&self) -> Option<(&PackageName, &Criterion)> {
        match self {
            Self::RequirementsConflicted { name, criterion } => Some((name, criterion)),
            _ => None,
        }
    }
}

pub(crate) fn inconsistent(candidate: &Candidate) -> ResolutionError {
    ResolutionError::InconsistentCandidate {
        name: candidate.name.clone(),
        version: candidate.version.clone(),
    }
}
