//! The preference tuple from spec.md §4.C: which unsatisfied name the round
//! loop should attempt to pin next. Lower tuples sort first / are more
//! preferred; ties break on canonical name so two resolves over identical
//! input produce an identical pick.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use envpin_normalize::PackageName;
use indexmap::IndexMap;

use crate::types::{Criterion, RequirementInformation, State};

#[derive(Debug, Clone)]
struct Preference {
    delay_setuptools: bool,
    not_pinned: bool,
    not_backtrack_cause: bool,
    inferred_depth: f64,
    requested_order: usize,
    not_unfree: bool,
    canonical_name: String,
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl Preference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.delay_setuptools
            .cmp(&other.delay_setuptools)
            .then_with(|| self.not_pinned.cmp(&other.not_pinned))
            .then_with(|| self.not_backtrack_cause.cmp(&other.not_backtrack_cause))
            .then_with(|| cmp_f64(self.inferred_depth, other.inferred_depth))
            .then_with(|| self.requested_order.cmp(&other.requested_order))
            .then_with(|| self.not_unfree.cmp(&other.not_unfree))
            .then_with(|| self.canonical_name.cmp(&other.canonical_name))
    }
}

fn is_pinned(criterion: &Criterion) -> bool {
    criterion.iter_requirements().any(|r| r.specifier.is_pinned())
}

fn is_unfree(criterion: &Criterion) -> bool {
    criterion.iter_requirements().any(|r| !r.specifier.clauses().is_empty())
}

fn is_backtrack_cause(name: &PackageName, causes: &[RequirementInformation]) -> bool {
    causes.iter().any(|cause| {
        cause.requirement.name == *name || cause.parent.as_ref().map(|p| &p.name) == Some(name)
    })
}

/// `inferred_depth`: 1.0 for a user-requested name, else `1 + min(depth of
/// each parent)`, memoized per resolve and guarded against cycles (a name
/// that depends on itself transitively gets the depth of its shallowest
/// non-cyclic parent, or 1.0 if every path cycles).
fn depth_of(
    name: &PackageName,
    criteria: &IndexMap<PackageName, Criterion>,
    user_requested: &IndexMap<PackageName, usize>,
    memo: &mut HashMap<PackageName, f64>,
    visiting: &mut HashSet<PackageName>,
) -> f64 {
    if user_requested.contains_key(name) {
        return 1.0;
    }
    if let Some(d) = memo.get(name) {
        return *d;
    }
    if !visiting.insert(name.clone()) {
        // Cyclic dependency graph: don't recurse forever, treat as shallow.
        return 1.0;
    }

    let parents: Vec<PackageName> = criteria
        .get(name)
        .map(|crit| {
            crit.information
                .iter()
                .filter_map(|info| info.parent.as_ref().map(|p| p.name.clone()))
                .collect()
        })
        .unwrap_or_default();

    let depth = if parents.is_empty() {
        1.0
    } else {
        1.0 + parents
            .iter()
            .map(|p| depth_of(p, criteria, user_requested, memo, visiting))
            .fold(f64::INFINITY, f64::min)
    };

    visiting.remove(name);
    memo.insert(name.clone(), depth);
    depth
}

/// Picks `argmin_preference(unsatisfied)`, per spec.md §4.C.
pub(crate) fn select_preferred(
    unsatisfied: &[PackageName],
    state: &State,
    user_requested: &IndexMap<PackageName, usize>,
) -> PackageName {
    let mut memo = HashMap::new();
    let mut best: Option<(Preference, PackageName)> = None;

    for name in unsatisfied {
        let criterion = &state.criteria[name];
        let mut visiting = HashSet::new();
        let pref = Preference {
            delay_setuptools: name.as_str() == "setuptools",
            not_pinned: !is_pinned(criterion),
            not_backtrack_cause: !is_backtrack_cause(name, &state.backtrack_causes),
            inferred_depth: depth_of(name, &state.criteria, user_requested, &mut memo, &mut visiting),
            requested_order: user_requested.get(name).copied().unwrap_or(usize::MAX),
            not_unfree: !is_unfree(criterion),
            canonical_name: name.as_str().to_string(),
        };

        match &best {
            None => best = Some((pref, name.clone())),
            Some((current, _)) if pref.cmp(current) == Ordering::Less => {
                best = Some((pref, name.clone()));
            }
            Some(_) => {}
        }
    }

    best.expect("select_preferred called with a non-empty unsatisfied set").1
}
