//! `GeneratorState`, spec.md §3: exactly the fields the data model
//! enumerates, owned exclusively by [`crate::Generator`]. Every field is a
//! plain value type (`BTreeMap`/`BTreeSet`/`Vec` of `Clone` leaves), so a
//! whole-struct `.clone()` already satisfies spec.md §9's "deep-copy
//! snapshot" note — `backup_state`/`restore_state` are named wrappers
//! around that, not a hand-rolled deep copy.

use std::collections::{BTreeMap, BTreeSet};

use envpin_kg::CandidateVersion;
use envpin_normalize::{PackageName, TopModule};
use envpin_version::{InterpreterVersion, Version};

#[derive(Debug, Clone, Default)]
pub struct GeneratorState {
    pub interpreter_candidates: Vec<InterpreterVersion>,
    pub pv_candidates: BTreeMap<TopModule, BTreeMap<PackageName, Vec<CandidateVersion>>>,
    pub similarity: BTreeMap<TopModule, BTreeMap<PackageName, f64>>,
    pub selected_pvs: BTreeMap<TopModule, BTreeMap<PackageName, Vec<CandidateVersion>>>,
    pub available_interpreters: BTreeMap<TopModule, BTreeSet<InterpreterVersion>>,
    pub selected_interpreters: Vec<InterpreterVersion>,
    pub installed_module_pkgs: BTreeMap<TopModule, BTreeSet<PackageName>>,
    pub extra_deps: BTreeMap<PackageName, BTreeSet<TopModule>>,
    pub used_pkgs: BTreeMap<TopModule, BTreeSet<PackageName>>,
    pub unknown_modules: BTreeSet<TopModule>,
    pub existing_interpreter: Option<InterpreterVersion>,
    pub existing_pvs: BTreeMap<PackageName, Version>,
}

/// The Environment Generator (spec.md §4.D): a stateful façade over
/// [`GeneratorState`] plus the similarity-discovery collaborator it needs
/// to resolve unknown modules (spec.md §4.D step 4). Holding `discovery`
/// on the façade rather than threading it through every call keeps the
/// mutator signatures exactly the ones spec.md §4.D names.
pub struct Generator<D> {
    pub(crate) state: GeneratorState,
    pub(crate) discovery: D,
}

impl<D> Generator<D> {
    pub fn new(discovery: D) -> Self {
        Self {
            state: GeneratorState::default(),
            discovery,
        }
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    /// Spec.md §8 property 6: duplicate the nested maps now, so a failed
    /// mutation can be undone with [`Self::restore_state`].
    pub fn backup_state(&self) -> GeneratorState {
        self.state.clone()
    }

    pub fn restore_state(&mut self, snapshot: GeneratorState) {
        self.state = snapshot;
    }
}
