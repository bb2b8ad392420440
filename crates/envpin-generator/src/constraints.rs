//! `set_candidates`, `add_python_constraint`, `add_pv_constraint` — spec.md
//! §4.D's "set" phase and the two narrowing mutators the Adjustment
//! Controller drives between iterations.

use std::collections::{BTreeMap, BTreeSet};

use envpin_kg::{CandidateVersion, DiscoveredCandidates, SimilarityDiscovery};
use envpin_normalize::{PackageName, TopModule};
use envpin_version::{InterpreterVersion, Version, VersionSpecifiers};

use crate::state::Generator;

impl<D: SimilarityDiscovery> Generator<D> {
    /// Spec.md §4.D `set_candidates`. Returns `false` iff an `existing_env`
    /// was given whose pinned interpreter isn't among `interpreter_candidates`
    /// — the one rejection this phase defines.
    pub fn set_candidates(
        &mut self,
        interpreter_candidates: Vec<InterpreterVersion>,
        discovered: DiscoveredCandidates,
        existing_env: Option<(InterpreterVersion, BTreeMap<PackageName, Version>)>,
    ) -> bool {
        self.state.selected_pvs.clear();
        self.state.available_interpreters.clear();
        self.state.selected_interpreters.clear();
        self.state.installed_module_pkgs.clear();
        self.state.extra_deps.clear();
        self.state.unknown_modules.clear();
        self.state.existing_interpreter = None;
        self.state.existing_pvs.clear();

        self.state.used_pkgs = discovered
            .pv_candidates
            .iter()
            .map(|(module, pkgs)| (module.clone(), pkgs.keys().cloned().collect()))
            .collect();
        self.state.pv_candidates = discovered.pv_candidates;
        for versions_by_pkg in self.state.pv_candidates.values_mut() {
            for versions in versions_by_pkg.values_mut() {
                envpin_kg::sort_candidates(versions);
            }
        }
        self.state.similarity = discovered.similarity;
        self.state.interpreter_candidates = interpreter_candidates;

        let Some((pinned_interpreter, pinned_pvs)) = existing_env else {
            return true;
        };

        if !self.state.interpreter_candidates.contains(&pinned_interpreter) {
            tracing::debug!(interpreter = %pinned_interpreter, "existing env's interpreter is not among the candidates");
            return false;
        }
        self.state.interpreter_candidates = vec![pinned_interpreter.clone()];
        self.state.existing_interpreter = Some(pinned_interpreter);
        self.state.existing_pvs = pinned_pvs.clone();

        for (module, pkgs) in &mut self.state.pv_candidates {
            let protected: BTreeSet<PackageName> =
                pkgs.keys().filter(|pkg| pinned_pvs.contains_key(*pkg)).cloned().collect();
            if protected.is_empty() {
                continue;
            }
            self.state.unknown_modules.insert(module.clone());
            pkgs.retain(|pkg, _| protected.contains(pkg));
            for (pkg, versions) in pkgs.iter_mut() {
                // Open question 1 (spec.md §9): retain only the exact pinned
                // version, not a trailing slice of the original list.
                let pinned_version = &pinned_pvs[pkg];
                versions.retain(|candidate| &candidate.version == pinned_version);
            }
        }

        true
    }

    /// Spec.md §4.D `add_python_constraint(spec)`. Rejected (returns
    /// `false`, no mutation) when an interpreter is pre-pinned, or when the
    /// narrower candidate set doesn't actually change the top choice.
    pub fn add_python_constraint(&mut self, spec: &VersionSpecifiers) -> bool {
        if self.state.existing_interpreter.is_some() {
            return false;
        }

        let snapshot = self.backup_state();
        let previous_top = self.state.selected_interpreters.first().cloned();

        self.state.interpreter_candidates.retain(|v| spec.contains(v));

        let affected: Vec<TopModule> = self
            .state
            .available_interpreters
            .iter()
            .filter(|(_, admitted)| {
                !admitted
                    .iter()
                    .any(|v| self.state.interpreter_candidates.contains(v))
            })
            .map(|(module, _)| module.clone())
            .collect();
        for module in affected {
            self.select_pvs_for_module(&module);
        }

        self.cal_selected_interpreters(false);

        if self.state.selected_interpreters.first() == previous_top.as_ref() {
            self.restore_state(snapshot);
            return false;
        }
        true
    }

    /// Spec.md §4.D `add_pv_constraint(new_candidate_pvs, new_similarity,
    /// parent?)`. Resolves the open question about the source only
    /// processing the first touched module (spec.md §9, item 2): every
    /// module in `new_candidate_pvs` is processed.
    pub fn add_pv_constraint(
        &mut self,
        new_candidate_pvs: BTreeMap<TopModule, BTreeMap<PackageName, Vec<CandidateVersion>>>,
        new_similarity: BTreeMap<TopModule, BTreeMap<PackageName, f64>>,
        parent: Option<PackageName>,
    ) {
        for (module, new_pkgs) in new_candidate_pvs {
            if let Some(sims) = new_similarity.get(&module) {
                self.state.similarity.entry(module.clone()).or_default().extend(sims.clone());
            }

            let new_versions_by_pkg: BTreeMap<PackageName, BTreeSet<Version>> = new_pkgs
                .iter()
                .map(|(pkg, versions)| (pkg.clone(), versions.iter().map(|cv| cv.version.clone()).collect()))
                .collect();

            // A module whose candidate map is present but empty (every
            // package it once offered was consumed by `select_pvs_for_module`
            // or ruled out) is observably the same as a module that was
            // never looked up: either way it currently has no known
            // candidates, so a fresh discovery result should be adopted
            // wholesale rather than intersected against nothing.
            let previously_known = self
                .state
                .pv_candidates
                .get(&module)
                .is_some_and(|pkgs| !pkgs.is_empty())
                && !self.state.unknown_modules.contains(&module);

            if previously_known {
                narrow_by_version(&mut self.state.pv_candidates, &module, &new_versions_by_pkg);
                narrow_by_version(&mut self.state.selected_pvs, &module, &new_versions_by_pkg);
            } else {
                let mut adopted = new_pkgs;
                for versions in adopted.values_mut() {
                    envpin_kg::sort_candidates(versions);
                }
                self.state
                    .used_pkgs
                    .entry(module.clone())
                    .or_default()
                    .extend(adopted.keys().cloned());
                self.state.pv_candidates.insert(module.clone(), adopted);
                self.state.unknown_modules.remove(&module);
                // The old selection (if any) was drawn from a candidate set
                // we just replaced; `select_pvs_for_module` otherwise
                // short-circuits on a non-empty, still-admissible stale
                // batch and never looks at the replacement at all.
                self.state.selected_pvs.remove(&module);
            }

            if let Some(parent) = &parent {
                self.state.extra_deps.entry(parent.clone()).or_default().insert(module.clone());
            }

            self.select_pvs_for_module(&module);
        }
    }
}

fn narrow_by_version(
    maps: &mut BTreeMap<TopModule, BTreeMap<PackageName, Vec<CandidateVersion>>>,
    module: &TopModule,
    keep: &BTreeMap<PackageName, BTreeSet<Version>>,
) {
    let Some(existing) = maps.get_mut(module) else {
        return;
    };
    existing.retain(|pkg, _| keep.contains_key(pkg));
    for (pkg, versions) in existing.iter_mut() {
        let keep_versions = &keep[pkg];
        versions.retain(|cv| keep_versions.contains(&cv.version));
    }
    existing.retain(|_, versions| !versions.is_empty());
}
