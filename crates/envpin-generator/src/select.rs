//! `select_pvs_for_module` and `_cal_selected_interpreters`, spec.md §4.D.

use std::collections::{BTreeMap, BTreeSet};

use envpin_kg::{sort_candidates, CandidateVersion, SimilarityDiscovery};
use envpin_normalize::{PackageName, TopModule};
use envpin_version::InterpreterVersion;

use crate::state::Generator;

/// Two floating-point matching degrees are "the same tier" within this
/// tolerance — spec.md §4.D step 3's "slice off the prefix of versions
/// whose matching degree equals `max_score`" assumes exact floating
/// equality only because its scores are hand-authored constants; comparing
/// with a small epsilon is the safe generalization.
const SCORE_EPSILON: f64 = 1e-9;

impl<D: SimilarityDiscovery> Generator<D> {
    /// Interpreters every package in `batch` (union across packages — any
    /// one of them would cover the module) admits, drawn from the current
    /// `interpreter_candidates`.
    fn admissible_interpreters(
        &self,
        batch: &BTreeMap<PackageName, Vec<CandidateVersion>>,
    ) -> BTreeSet<InterpreterVersion> {
        let mut out = BTreeSet::new();
        for versions in batch.values() {
            for candidate in versions {
                for interpreter in &self.state.interpreter_candidates {
                    if candidate.interpreter_constraint.admits(interpreter) {
                        out.insert(interpreter.clone());
                    }
                }
            }
        }
        out
    }

    /// Spec.md §4.D `select_pvs_for_module`.
    pub fn select_pvs_for_module(&mut self, module: &TopModule) {
        self.state.available_interpreters.remove(module);

        if let Some(batch) = self.state.selected_pvs.get(module) {
            if !batch.is_empty() {
                let admissible = self.admissible_interpreters(batch);
                if !admissible.is_empty() {
                    self.state.available_interpreters.insert(module.clone(), admissible);
                    return;
                }
            }
        }

        loop {
            let has_candidates = self
                .state
                .pv_candidates
                .get(module)
                .is_some_and(|pkgs| !pkgs.is_empty());

            if !has_candidates {
                if self.state.unknown_modules.contains(module) {
                    tracing::debug!(module = %module, "no candidates remain even after similarity discovery");
                    self.state.selected_pvs.remove(module);
                    return;
                }

                self.state.unknown_modules.insert(module.clone());
                let already_used = self.state.used_pkgs.get(module).cloned().unwrap_or_default();
                let discovered = self.discovery.discover_similar(module, &already_used);

                let Some(mut found) = discovered.pv_candidates.get(module).cloned() else {
                    tracing::debug!(module = %module, "similarity discovery found nothing");
                    self.state.selected_pvs.remove(module);
                    return;
                };
                if found.is_empty() {
                    self.state.selected_pvs.remove(module);
                    return;
                }

                for versions in found.values_mut() {
                    sort_candidates(versions);
                }
                self.state
                    .used_pkgs
                    .entry(module.clone())
                    .or_default()
                    .extend(found.keys().cloned());
                if let Some(sims) = discovered.similarity.get(module) {
                    self.state
                        .similarity
                        .entry(module.clone())
                        .or_default()
                        .extend(sims.clone());
                }
                self.state.pv_candidates.insert(module.clone(), found);
                continue;
            }

            let pkgs_for_module = self.state.pv_candidates[module].clone();
            let max_score = pkgs_for_module
                .values()
                .filter_map(|versions| versions.first())
                .map(|cv| cv.matching_degree)
                .fold(f64::MIN, f64::max);

            let mut batch: BTreeMap<PackageName, Vec<CandidateVersion>> = BTreeMap::new();
            for pkg in pkgs_for_module.keys() {
                let versions = self
                    .state
                    .pv_candidates
                    .get_mut(module)
                    .expect("checked has_candidates above")
                    .get_mut(pkg)
                    .expect("pkg drawn from this module's own candidate map");
                let cut = versions
                    .iter()
                    .take_while(|cv| (cv.matching_degree - max_score).abs() < SCORE_EPSILON)
                    .count();
                if cut == 0 {
                    continue;
                }
                let prefix: Vec<CandidateVersion> = versions.drain(..cut).collect();
                batch.insert(pkg.clone(), prefix);
            }
            self.state
                .pv_candidates
                .get_mut(module)
                .expect("checked has_candidates above")
                .retain(|_, versions| !versions.is_empty());

            let admissible = self.admissible_interpreters(&batch);
            if !admissible.is_empty() {
                self.state.selected_pvs.insert(module.clone(), batch);
                self.state.available_interpreters.insert(module.clone(), admissible);
                return;
            }
            // This tier admitted no interpreter; loop back around, either to
            // the next tier or to the "no candidates at all" similarity path.
        }
    }

    /// Spec.md §4.D `_cal_selected_interpreters(allow_old_major?)`.
    pub fn cal_selected_interpreters(&mut self, allow_old_major: bool) {
        let mut selected: Vec<InterpreterVersion> = self
            .state
            .interpreter_candidates
            .iter()
            .filter(|interpreter| {
                self.state
                    .available_interpreters
                    .values()
                    .all(|admitted| admitted.contains(interpreter))
            })
            .cloned()
            .collect();

        if allow_old_major {
            if let Some(min_major) = selected.iter().map(|v| major(v)).min() {
                selected.retain(|v| major(v) == min_major);
            }
        }

        if selected.is_empty() {
            selected = self.state.interpreter_candidates.first().cloned().into_iter().collect();
        }

        self.state.selected_interpreters = selected;
    }
}

fn major(version: &InterpreterVersion) -> u64 {
    version.release_segments().first().copied().unwrap_or(0)
}
