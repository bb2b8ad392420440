//! The Transitive Resolver (spec.md §4.C): a round-based backtracking
//! pinner analogous in shape to the reference resolver used by the
//! scripting language's official package installer (`pip`'s `resolvelib`),
//! grounded on `dependency_solving/pip_solver/resolver.py` in the distilled
//! system rather than on this workspace's vendored PubGrub solver — see
//! `DESIGN.md` for why the two are not interchangeable here.

mod criteria;
mod errors;
mod install_order;
mod preference;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use envpin_kg::{KnowledgeGraph, Timestamp};
use envpin_normalize::PackageName;
use envpin_store::VersionStore;
use envpin_version::{InterpreterVersion, Version};
use indexmap::IndexMap;

pub use errors::ResolutionError;
pub use types::{is_satisfied_by, Candidate, Criterion, Requirement, RequirementInformation, State};

use criteria::{add_to_criteria, is_satisfying, marker_admits};
use preference::select_preferred;

/// Default round budget from `main`'s public entry point (spec.md §4.C).
pub const DEFAULT_MAX_ROUNDS: u64 = 10_000;
/// Round budget for the internal `resolve` loop when called without an
/// explicit cap (spec.md §4.C: "default 2,000,000 for internal resolve").
pub const INTERNAL_MAX_ROUNDS: u64 = 2_000_000;
/// Default wall-clock cap for `main` (spec.md §4.C: "default 300 s").
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// `resolve(requirements, interpreter_version, deadline?, max_rounds)` from
/// spec.md §4.C. `wall_clock_deadline` is checked once per round, the
/// cooperative substitute for a signal-based timeout spec.md §9 notes isn't
/// available in safe Rust.
#[allow(clippy::too_many_lines)]
pub fn resolve<G: KnowledgeGraph>(
    store: &VersionStore<'_, G>,
    requirements: Vec<Requirement>,
    interpreter: &InterpreterVersion,
    kg_deadline: Option<Timestamp>,
    max_rounds: u64,
    wall_clock_deadline: Option<Instant>,
) -> Result<State, ResolutionError> {
    let mut user_requested: IndexMap<PackageName, usize> = IndexMap::new();
    let mut root_criteria: IndexMap<PackageName, Criterion> = IndexMap::new();

    for requirement in requirements {
        let next_order = user_requested.len();
        user_requested.entry(requirement.name.clone()).or_insert(next_order);
        let (name, criterion) =
            add_to_criteria(store, &root_criteria, interpreter, kg_deadline, requirement, None)
                .map_err(rethrow_as_impossible)?;
        root_criteria.insert(name, criterion);
    }

    let mut states: Vec<State> = vec![State {
        mapping: IndexMap::new(),
        criteria: root_criteria,
        backtrack_causes: Vec::new(),
    }];

    let mut round: u64 = 0;
    loop {
        round += 1;
        if round > max_rounds {
            return Err(ResolutionError::TooDeep);
        }
        if wall_clock_deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ResolutionError::Timeout);
        }

        let state = states.last().expect("state stack is never empty mid-resolve").clone();

        let unsatisfied: Vec<PackageName> = state
            .criteria
            .iter()
            .filter(|(name, criterion)| !is_satisfying(criterion, name, &state.mapping))
            .map(|(name, _)| name.clone())
            .collect();

        if unsatisfied.is_empty() {
            tracing::debug!(rounds = round, pinned = state.mapping.len(), "resolution converged");
            return Ok(state);
        }

        let name = select_preferred(&unsatisfied, &state, &user_requested);
        let criterion = state.criteria[&name].clone();
        let extras = criterion.requested_extras();

        let mut pinned: Option<(Candidate, IndexMap<PackageName, Criterion>)> = None;
        let mut attempt_causes: Vec<RequirementInformation> = Vec::new();

        for candidate in &criterion.candidates {
            let mut next_criteria = state.criteria.clone();
            let parent = Candidate {
                name: candidate.name.clone(),
                version: candidate.version.clone(),
                extra: extras.clone(),
            };

            let mut edges = store.graph().dependency_edges(&candidate.name, &candidate.version);
            edges.sort_by_key(|e| e.order);

            let mut ok = true;
            for edge in &edges {
                if !marker_admits(edge.marker.as_ref(), interpreter, &extras) {
                    continue;
                }
                let dependency = Requirement::new(edge.name.clone(), edge.specifier.clone(), edge.extras.clone());
                match add_to_criteria(store, &next_criteria, interpreter, kg_deadline, dependency, Some(parent.clone())) {
                    Ok((dep_name, dep_criterion)) => {
                        next_criteria.insert(dep_name, dep_criterion);
                    }
                    Err(err) => {
                        if let Some((_, conflict)) = err.as_conflict() {
                            attempt_causes.extend(conflict.information.clone());
                        }
                        ok = false;
                        break;
                    }
                }
            }

            if ok {
                pinned = Some((parent, next_criteria));
                break;
            }
        }

        match pinned {
            Some((candidate, next_criteria)) => {
                // Spec.md §8 property 2: a candidate drawn from
                // `criterion.candidates` must already satisfy everything on
                // file for its own name. This should be a tautology of how
                // `add_to_criteria` builds `candidates` in the first
                // place — surfacing it as `InconsistentCandidate` rather
                // than an `assert!` keeps a resolver bug a reported error
                // instead of a panic (spec.md §7).
                if let Some(own_criterion) = next_criteria.get(&name) {
                    if !is_satisfying(own_criterion, &name, &{
                        let mut probe = state.mapping.clone();
                        probe.insert(name.clone(), candidate.clone());
                        probe
                    }) {
                        return Err(errors::inconsistent(&candidate));
                    }
                }

                let mut mapping = state.mapping.clone();
                mapping.shift_remove(&name);
                mapping.insert(name.clone(), candidate);
                states.push(State {
                    mapping,
                    criteria: next_criteria,
                    backtrack_causes: state.backtrack_causes.clone(),
                });
            }
            None => {
                tracing::debug!(package = %name, round, "no candidate satisfied dependents, backtracking");
                if !backtrack(&mut states, &mut attempt_causes) {
                    return Err(ResolutionError::ImpossibleResolution { causes: attempt_causes });
                }
            }
        }
    }
}

fn rethrow_as_impossible(err: ResolutionError) -> ResolutionError {
    match err {
        ResolutionError::RequirementsConflicted { criterion, .. } => {
            ResolutionError::ImpossibleResolution { causes: criterion.information }
        }
        other => other,
    }
}

/// Spec.md §4.C "Backtracking": drop the failing state, drop the state
/// before it (recording its most recent pin as a cause and an
/// incompatibility), and retry from the state beneath that — narrowing
/// every name the failure or the dropped pin touched. If the narrowed state
/// still has an empty-candidate name, keep unwinding. Fails once the stack
/// would shrink below three frames.
fn backtrack(states: &mut Vec<State>, causes: &mut Vec<RequirementInformation>) -> bool {
    loop {
        if states.len() < 3 {
            return false;
        }
        let failing = states.pop().expect("checked len above");
        let last_pin_state = states.pop().expect("checked len above");
        let (last_name, last_candidate) = last_pin_state
            .mapping
            .last()
            .map(|(n, c)| (n.clone(), c.clone()))
            .expect("a state past the root always has at least one pin");

        causes.push(RequirementInformation {
            requirement: Requirement::new(
                last_name.clone(),
                envpin_version::VersionSpecifiers::empty(),
                BTreeSet::new(),
            ),
            parent: None,
        });

        let mut accumulated: BTreeMap<PackageName, Vec<Candidate>> = BTreeMap::new();
        for (name, criterion) in &failing.criteria {
            if !criterion.incompatibilities.is_empty() {
                accumulated
                    .entry(name.clone())
                    .or_default()
                    .extend(criterion.incompatibilities.iter().cloned());
            }
        }
        accumulated.entry(last_name).or_default().push(last_candidate);

        let base = states.last().expect("checked len above");
        let mut narrowed_criteria = base.criteria.clone();
        let mut all_non_empty = true;

        for (name, new_incompatibilities) in &accumulated {
            let Some(criterion) = narrowed_criteria.get_mut(name) else {
                continue;
            };
            for incompatible in new_incompatibilities {
                if !criterion.incompatibilities.contains(incompatible) {
                    criterion.incompatibilities.push(incompatible.clone());
                }
            }
            let incompatibilities = criterion.incompatibilities.clone();
            criterion.candidates.retain(|c| !incompatibilities.contains(c));
            if criterion.candidates.is_empty() {
                all_non_empty = false;
            }
        }

        let narrowed = State {
            mapping: base.mapping.clone(),
            criteria: narrowed_criteria,
            backtrack_causes: causes.clone(),
        };

        if all_non_empty {
            states.push(narrowed);
            return true;
        }
        // The narrowed state is itself unresolvable; push it back so the
        // next loop iteration treats it as the new failing state and keeps
        // unwinding the stack.
        states.push(narrowed);
    }
}

/// `generate_install_pairs(extra_deps)` from spec.md §4.C: a topologically
/// ordered list of `(name, version)` for everything pinned in `state`,
/// given the dependency edges implicit in its criteria plus any
/// caller-registered `extra_deps` edges (already projected onto installed
/// package names by the Environment Generator).
pub fn generate_install_pairs(
    state: &State,
    extra_deps: &BTreeMap<PackageName, BTreeSet<PackageName>>,
) -> Vec<(PackageName, Version)> {
    let nodes: BTreeSet<PackageName> = state.mapping.keys().cloned().collect();
    let mut edges: Vec<(PackageName, PackageName)> = Vec::new();

    for criterion in state.criteria.values() {
        for info in &criterion.information {
            if let Some(parent) = &info.parent {
                edges.push((parent.name.clone(), info.requirement.name.clone()));
            }
        }
    }
    for (parent, children) in extra_deps {
        for child in children {
            edges.push((parent.clone(), child.clone()));
        }
    }

    install_order::topo_order(&nodes, &edges)
        .into_iter()
        .filter_map(|name| state.mapping.get(&name).map(|c| (name, c.version.clone())))
        .collect()
}

/// `main(requirements, interpreter, extra_deps, deadline?, max_rounds=10000)`
/// from spec.md §4.C: enforces the wall-clock cap (`timeout` defaults to
/// [`DEFAULT_TIMEOUT`]) and converts every resolver exception, including a
/// timeout, into "no result" — the orchestrator's signal to fall back to
/// top candidates rather than treat a resolver hiccup as fatal.
pub fn main<G: KnowledgeGraph>(
    store: &VersionStore<'_, G>,
    requirements: Vec<Requirement>,
    interpreter: &InterpreterVersion,
    extra_deps: BTreeMap<PackageName, BTreeSet<PackageName>>,
    kg_deadline: Option<Timestamp>,
    timeout: Duration,
    max_rounds: u64,
) -> Option<Vec<(PackageName, Version)>> {
    let deadline = Instant::now() + timeout;
    match resolve(store, requirements, interpreter, kg_deadline, max_rounds, Some(deadline)) {
        Ok(state) => Some(generate_install_pairs(&state, &extra_deps)),
        Err(err) => {
            tracing::warn!(error = %err, "resolver produced no result");
            None
        }
    }
}
