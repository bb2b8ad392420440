//! `generate_candidate_environment`, spec.md §4.D's last phase: pick a
//! package set via the Package Optimizer, derive a version range per
//! installed package, hand those off to the Transitive Resolver, and render
//! whichever of its outcomes applies as an [`EnvironmentDescriptor`].

use std::collections::{BTreeMap, BTreeSet};

use envpin_kg::{EnvironmentDescriptor, KnowledgeGraph, SimilarityDiscovery};
use envpin_normalize::PackageName;
use envpin_optimizer::{optimize, OptimizerInput};
use envpin_resolver::Requirement;
use envpin_store::VersionStore;
use envpin_version::{Version, VersionSpecifiers};

use crate::state::Generator;

impl<D: SimilarityDiscovery> Generator<D> {
    /// Spec.md §4.D `generate_candidate_environment(allow_old_major?)`.
    /// Returns `None` iff no interpreter can be selected or the optimizer
    /// finds some module uncoverable — the generator-level failure contract
    /// of spec.md §7 ("no interpreter, no candidates for a module").
    pub fn generate_candidate_environment<G: KnowledgeGraph>(
        &mut self,
        allow_old_major: bool,
        store: &VersionStore<'_, G>,
    ) -> Option<EnvironmentDescriptor> {
        self.cal_selected_interpreters(allow_old_major);
        let interpreter = self.state.selected_interpreters.first()?.clone();

        let pkg_dict = self
            .state
            .selected_pvs
            .iter()
            .map(|(module, batch)| (module.clone(), batch.keys().cloned().collect()))
            .collect();
        let optimizer_input = OptimizerInput {
            pkg_dict,
            similarity: self.state.similarity.clone(),
        };
        let selection = optimize(&optimizer_input).ok()?;

        self.state.installed_module_pkgs = self
            .state
            .selected_pvs
            .iter()
            .map(|(module, batch)| {
                let installed: BTreeSet<PackageName> =
                    batch.keys().filter(|pkg| selection.contains(*pkg)).cloned().collect();
                (module.clone(), installed)
            })
            .collect();

        let requirements: Vec<Requirement> = selection
            .iter()
            .map(|pkg| self.requirement_for(pkg, store))
            .collect();

        let extra_deps = self.project_extra_deps();

        let plan = envpin_resolver::main(
            store,
            requirements,
            &interpreter,
            extra_deps,
            None,
            envpin_resolver::DEFAULT_TIMEOUT,
            envpin_resolver::DEFAULT_MAX_ROUNDS,
        );

        let requirement_lines: Vec<String> = match plan {
            Some(pairs) => {
                // `existing_pvs` pins are emitted directly from the caller's
                // protected set rather than from the resolver's own pin for
                // them, so a protected package always reads back exactly the
                // version the caller supplied.
                let mut lines: Vec<String> = self
                    .state
                    .existing_pvs
                    .iter()
                    .filter(|(name, _)| selection.contains(*name))
                    .map(|(name, version)| format!("{name}=={version}"))
                    .collect();
                lines.extend(
                    pairs
                        .into_iter()
                        .filter(|(name, _)| !self.state.existing_pvs.contains_key(name))
                        .map(|(name, version)| format!("{name}=={version}")),
                );
                lines
            }
            None => {
                tracing::debug!("resolver produced no result, falling back to best-effort pins");
                selection
                    .iter()
                    .filter_map(|pkg| self.best_effort_pin(pkg))
                    .collect()
            }
        };

        Some(EnvironmentDescriptor {
            interpreter,
            requirements: requirement_lines,
        })
    }

    /// The resolver input for one installed package: intersect its
    /// candidate-version sets across every top module that names it,
    /// falling back to a union when the intersection is empty (spec.md
    /// §4.D: "we accept a looser range rather than no range"), then render
    /// the version-range grammar from spec.md §6 against the Version
    /// Store's full list. `existing_pvs` pins take priority over the
    /// derived range.
    fn requirement_for<G: KnowledgeGraph>(&self, pkg: &PackageName, store: &VersionStore<'_, G>) -> Requirement {
        if let Some(pinned) = self.state.existing_pvs.get(pkg) {
            return Requirement::new(
                pkg.clone(),
                format!("=={pinned}").parse().expect("a Version's Display always round-trips"),
                BTreeSet::new(),
            );
        }

        let version_sets: Vec<BTreeSet<Version>> = self
            .state
            .selected_pvs
            .values()
            .filter_map(|batch| batch.get(pkg))
            .map(|versions| versions.iter().map(|cv| cv.version.clone()).collect())
            .collect();
        let batch = merge_version_sets(&version_sets);
        let full_list = store.versions(pkg);
        let specifier = range_specifier(&batch, &full_list);
        Requirement::new(pkg.clone(), specifier, BTreeSet::new())
    }

    fn best_effort_pin(&self, pkg: &PackageName) -> Option<String> {
        let mut best: Option<&envpin_kg::CandidateVersion> = None;
        for batch in self.state.selected_pvs.values() {
            let Some(versions) = batch.get(pkg) else { continue };
            for candidate in versions {
                let better = match best {
                    None => true,
                    Some(current) => {
                        (candidate.matching_degree, &candidate.version) > (current.matching_degree, &current.version)
                    }
                };
                if better {
                    best = Some(candidate);
                }
            }
        }
        best.map(|candidate| format!("{pkg}=={}", candidate.version))
    }

    /// Projects `extra_deps` (package → set of top modules, spec.md §3) onto
    /// the packages actually installed for each of those modules, the shape
    /// the Transitive Resolver's `generate_install_pairs` consumes.
    pub(crate) fn project_extra_deps(&self) -> BTreeMap<PackageName, BTreeSet<PackageName>> {
        let mut out = BTreeMap::new();
        for (parent, modules) in &self.state.extra_deps {
            let mut children = BTreeSet::new();
            for module in modules {
                if let Some(installed) = self.state.installed_module_pkgs.get(module) {
                    children.extend(installed.iter().cloned());
                }
            }
            if !children.is_empty() {
                out.insert(parent.clone(), children);
            }
        }
        out
    }
}

fn merge_version_sets(sets: &[BTreeSet<Version>]) -> BTreeSet<Version> {
    let mut sets = sets.iter();
    let Some(first) = sets.next() else {
        return BTreeSet::new();
    };
    let intersection = sets.fold(first.clone(), |acc, next| acc.intersection(next).cloned().collect());
    if !intersection.is_empty() {
        return intersection;
    }
    std::iter::once(first)
        .chain(sets)
        .flat_map(|s| s.iter().cloned())
        .collect()
}

/// The version-range requirement grammar from spec.md §6: a bare name for
/// an empty batch, `name==v` for a singleton, else `name>=min,<=max` plus a
/// `!=` clause for every store-known version in `[min, max]` the batch
/// excludes.
fn range_specifier(batch: &BTreeSet<Version>, full_list: &[Version]) -> VersionSpecifiers {
    match batch.len() {
        0 => VersionSpecifiers::empty(),
        1 => format!("=={}", batch.iter().next().unwrap())
            .parse()
            .expect("a Version's Display always round-trips"),
        _ => {
            let min = batch.iter().next().unwrap();
            let max = batch.iter().last().unwrap();
            let mut rendered = format!(">={min},<={max}");
            for v in full_list {
                if v >= min && v <= max && !batch.contains(v) {
                    rendered.push_str(&format!(",!={v}"));
                }
            }
            rendered.parse().expect("every clause above round-trips through Display")
        }
    }
}

/// Renders the same grammar as a string, for callers (and tests) that need
/// the literal requirement text rather than a parsed [`VersionSpecifiers`] —
/// spec.md §8 property 8 checks this string re-parses to accept exactly the
/// batch versions.
pub fn render_requirement_string(pkg: &PackageName, batch: &BTreeSet<Version>, full_list: &[Version]) -> String {
    match batch.len() {
        0 => pkg.to_string(),
        1 => format!("{pkg}=={}", batch.iter().next().unwrap()),
        _ => {
            let min = batch.iter().next().unwrap();
            let max = batch.iter().last().unwrap();
            let mut rendered = format!("{pkg}>={min},<={max}");
            for v in full_list {
                if v >= min && v <= max && !batch.contains(v) {
                    rendered.push_str(&format!(",!={v}"));
                }
            }
            rendered
        }
    }
}
