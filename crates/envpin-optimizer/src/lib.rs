//! The Package Optimizer (spec.md §4.B): selects the smallest, highest-
//! similarity package set that covers every requested top module.
//!
//! `minimize 2*|S| - sum(similarity[m][p] for p in S, m covered by p)`,
//! subject to every module having at least one of its candidates in `S`.
//! Modeled as a weighted 0/1 set-cover problem and solved by exact
//! branch-and-bound within a node budget, falling back to per-module
//! highest-similarity selection when the budget is exhausted or a module
//! has no candidates left after pruning.

use std::collections::{BTreeMap, BTreeSet};

use envpin_normalize::{PackageName, TopModule};

/// Modules with at least this many candidates are pruned to a single
/// highest-similarity candidate before the solver ever sees them
/// (spec.md §4.B: "hard cap to keep the search tractable").
const PRUNE_THRESHOLD: usize = 20;

/// Upper bound on branch-and-bound nodes explored before the search is
/// abandoned in favor of the argmax fallback. Not part of the contract's
/// text; chosen so typical module counts resolve exactly while pathological
/// ones still terminate promptly.
const SEARCH_NODE_BUDGET: usize = 200_000;

#[derive(Debug, Clone, Default)]
pub struct OptimizerInput {
    pub pkg_dict: BTreeMap<TopModule, Vec<PackageName>>,
    pub similarity: BTreeMap<TopModule, BTreeMap<PackageName, f64>>,
}

impl OptimizerInput {
    fn similarity_of(&self, module: &TopModule, pkg: &PackageName) -> f64 {
        self.similarity
            .get(module)
            .and_then(|m| m.get(pkg))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Raised when a requested module has no candidates at all: distinct from
/// an empty selection, per spec.md §4.B.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no candidate package covers module `{module}`")]
pub struct NoSolution {
    pub module: TopModule,
}

/// Selects a package set covering every module in `input.pkg_dict`.
///
/// Returns `Ok(∅)` for an empty `pkg_dict`. Returns `Err` iff some module's
/// candidate list is empty (before pruning — pruning never empties a
/// non-empty list).
pub fn optimize(input: &OptimizerInput) -> Result<BTreeSet<PackageName>, NoSolution> {
    if input.pkg_dict.is_empty() {
        return Ok(BTreeSet::new());
    }

    for (module, candidates) in &input.pkg_dict {
        if candidates.is_empty() {
            return Err(NoSolution { module: module.clone() });
        }
    }

    let pruned = prune(input);

    if let Some(selection) = exact_search(&pruned) {
        return Ok(selection);
    }

    tracing::debug!("optimizer search budget exhausted, falling back to per-module argmax");
    Ok(fallback_argmax(&pruned))
}

fn prune(input: &OptimizerInput) -> OptimizerInput {
    let mut pkg_dict = BTreeMap::new();
    for (module, candidates) in &input.pkg_dict {
        if candidates.len() < PRUNE_THRESHOLD {
            pkg_dict.insert(module.clone(), candidates.clone());
            continue;
        }
        let best = candidates
            .iter()
            .max_by(|a, b| {
                let sa = input.similarity_of(module, a);
                let sb = input.similarity_of(module, b);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.cmp(a))
            })
            .expect("non-empty candidate list")
            .clone();
        pkg_dict.insert(module.clone(), vec![best]);
    }
    OptimizerInput {
        pkg_dict,
        similarity: input.similarity.clone(),
    }
}

/// `argmax_p similarity[m][p]` per module, unioned. Always feasible given
/// every module has at least one candidate; used both as the fallback and
/// as the admissible-but-not-necessarily-optimal starting bound for the
/// exact search.
fn fallback_argmax(input: &OptimizerInput) -> BTreeSet<PackageName> {
    let mut out = BTreeSet::new();
    for (module, candidates) in &input.pkg_dict {
        let best = candidates
            .iter()
            .max_by(|a, b| {
                let sa = input.similarity_of(module, a);
                let sb = input.similarity_of(module, b);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.cmp(a))
            })
            .expect("non-empty candidate list")
            .clone();
        out.insert(best);
    }
    out
}

fn objective(input: &OptimizerInput, selection: &BTreeSet<PackageName>) -> f64 {
    let mut score = 2.0 * selection.len() as f64;
    for (module, candidates) in &input.pkg_dict {
        for pkg in candidates {
            if selection.contains(pkg) {
                score -= input.similarity_of(module, pkg);
            }
        }
    }
    score
}

/// Exact branch-and-bound over modules in canonical order: for the first
/// uncovered module, branch on each of its candidates (plus "already
/// covered by a prior pick"), pruning branches whose partial cost already
/// exceeds the best complete solution found. Returns `None` if the node
/// budget is exhausted before the search completes.
fn exact_search(input: &OptimizerInput) -> Option<BTreeSet<PackageName>> {
    let modules: Vec<&TopModule> = input.pkg_dict.keys().collect();
    let mut best = fallback_argmax(input);
    let mut best_cost = objective(input, &best);
    let mut nodes = 0usize;
    let mut chosen = BTreeSet::new();

    if search_module(input, &modules, 0, &mut chosen, &mut best, &mut best_cost, &mut nodes) {
        Some(best)
    } else {
        None
    }
}

#[allow(clippy::too_many_arguments)]
fn search_module(
    input: &OptimizerInput,
    modules: &[&TopModule],
    index: usize,
    chosen: &mut BTreeSet<PackageName>,
    best: &mut BTreeSet<PackageName>,
    best_cost: &mut f64,
    nodes: &mut usize,
) -> bool {
    *nodes += 1;
    if *nodes > SEARCH_NODE_BUDGET {
        return false;
    }

    if index == modules.len() {
        let cost = objective(input, chosen);
        if cost < *best_cost {
            *best_cost = cost;
            *best = chosen.clone();
        }
        return true;
    }

    let module = modules[index];
    if chosen
        .iter()
        .any(|p| input.pkg_dict[module].contains(p))
    {
        return search_module(input, modules, index + 1, chosen, best, best_cost, nodes);
    }

    let partial_cost = 2.0 * chosen.len() as f64;
    if partial_cost >= *best_cost {
        return true;
    }

    for candidate in &input.pkg_dict[module] {
        let inserted = chosen.insert(candidate.clone());
        if !search_module(input, modules, index + 1, chosen, best, best_cost, nodes) {
            if inserted {
                chosen.remove(candidate);
            }
            return false;
        }
        if inserted {
            chosen.remove(candidate);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str) -> TopModule {
        TopModule::from(name)
    }

    fn pkg(name: &str) -> PackageName {
        PackageName::from(name)
    }

    #[test]
    fn empty_pkg_dict_yields_empty_selection() {
        let input = OptimizerInput::default();
        assert_eq!(optimize(&input).unwrap(), BTreeSet::new());
    }

    #[test]
    fn module_with_no_candidates_is_an_error() {
        let mut input = OptimizerInput::default();
        input.pkg_dict.insert(module("ghost"), vec![]);
        let err = optimize(&input).unwrap_err();
        assert_eq!(err.module, module("ghost"));
    }

    #[test]
    fn one_package_covering_two_modules_beats_two_separate_packages() {
        let mut input = OptimizerInput::default();
        input
            .pkg_dict
            .insert(module("a"), vec![pkg("shared"), pkg("only-a")]);
        input
            .pkg_dict
            .insert(module("b"), vec![pkg("shared"), pkg("only-b")]);
        input.similarity.insert(
            module("a"),
            BTreeMap::from([(pkg("shared"), 0.5), (pkg("only-a"), 0.9)]),
        );
        input.similarity.insert(
            module("b"),
            BTreeMap::from([(pkg("shared"), 0.5), (pkg("only-b"), 0.9)]),
        );

        let selection = optimize(&input).unwrap();
        assert_eq!(selection, BTreeSet::from([pkg("shared")]));
    }

    #[test]
    fn ties_break_by_canonical_name_ascending_in_fallback() {
        let mut input = OptimizerInput::default();
        input.pkg_dict.insert(module("a"), vec![pkg("zeta"), pkg("alpha")]);
        input.similarity.insert(
            module("a"),
            BTreeMap::from([(pkg("zeta"), 0.5), (pkg("alpha"), 0.5)]),
        );
        let selection = fallback_argmax(&input);
        assert_eq!(selection, BTreeSet::from([pkg("alpha")]));
    }

    #[test]
    fn module_with_many_candidates_is_pruned_to_one() {
        let mut input = OptimizerInput::default();
        let candidates: Vec<PackageName> = (0..25).map(|i| pkg(&format!("pkg{i}"))).collect();
        let sims: BTreeMap<PackageName, f64> = candidates
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i as f64 / 100.0))
            .collect();
        input.pkg_dict.insert(module("a"), candidates);
        input.similarity.insert(module("a"), sims);

        let pruned = prune(&input);
        assert_eq!(pruned.pkg_dict[&module("a")].len(), 1);
        assert_eq!(pruned.pkg_dict[&module("a")][0], pkg("pkg24"));
    }
}
