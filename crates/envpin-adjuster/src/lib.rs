//! The Adjustment Controller (spec.md §4.E): a bounded
//! validate → classify-error → narrow-constraints → regenerate loop, driven
//! from outside the Environment Generator's own mutators so the Generator
//! itself stays a pure state machine with no notion of "validation" or
//! "error log".
//!
//! Grounded on the orchestration shape of `env_validation/adjust.py` in the
//! distilled system, expressed here against the three external-collaborator
//! traits `envpin-kg` already states a contract for: [`SandboxValidator`],
//! [`ErrorTemplateMatcher`], and [`CandidateDiscovery`] (the same discovery
//! collaborator `envpin-generator` uses for unknown-module resolution, used
//! here for its on-demand, error-log-driven half).

use std::collections::BTreeMap;

use envpin_generator::Generator;
use envpin_kg::{
    classify_log, sort_candidates, CandidateDiscovery, EnvironmentDescriptor, ErrorTemplateMatcher, KnowledgeGraph,
    MatchedTemplate, SandboxValidator, SimilarityDiscovery, ValidationSettings,
};
use envpin_normalize::TopModule;
use envpin_store::VersionStore;

/// Spec.md §4.E: "A bounded loop (cap `VALIDATION_NUM` iterations)". The cap
/// itself is not a number spec.md names; five rounds is enough for the loop
/// to try an interpreter narrowing, a module swap, and the older-major probe
/// in sequence without letting an oscillating adjustment run unbounded.
pub const VALIDATION_NUM: u32 = 5;

/// Two matching-degree scores are "the same tier" within this tolerance —
/// mirrors `envpin_generator`'s own epsilon for the same comparison; kept as
/// a separate constant since the two crates don't share internals.
const SCORE_EPSILON: f64 = 1e-9;

/// The result of running [`adjust`]: whether the final environment
/// validated clean, the last environment generated (even on failure, so a
/// caller can still emit a best-effort descriptor), and how many rounds ran
/// — spec.md §7's `(success: bool, final_env, iteration_count)` contract.
#[derive(Debug, Clone)]
pub struct AdjustOutcome {
    pub success: bool,
    pub final_env: Option<EnvironmentDescriptor>,
    pub iterations: u32,
}

/// Runs the generate → validate → classify → narrow loop until the
/// environment validates clean, the round cap is spent, or no mutation can
/// be applied. `allow_old_major` seeds whether the very first generation
/// already probes the older interpreter major (normally `false`; the loop
/// sets it itself once it decides to probe).
pub fn adjust<G, D, C, V, M>(
    generator: &mut Generator<D>,
    store: &VersionStore<'_, G>,
    discovery: &C,
    validator: &V,
    matcher: &M,
    settings: &ValidationSettings,
) -> AdjustOutcome
where
    G: KnowledgeGraph,
    D: SimilarityDiscovery,
    C: CandidateDiscovery,
    V: SandboxValidator,
    M: ErrorTemplateMatcher,
{
    let mut allow_old_major = false;
    let mut last_env = None;

    for iteration in 1..=VALIDATION_NUM {
        let Some(descriptor) = generator.generate_candidate_environment(allow_old_major, store) else {
            tracing::debug!(iteration, "generator produced no candidate environment, stopping");
            return AdjustOutcome { success: false, final_env: last_env, iterations: iteration };
        };
        last_env = Some(descriptor.clone());

        let outcome = validator.validate(&descriptor, settings);
        if outcome.success {
            tracing::debug!(iteration, "environment validated clean");
            return AdjustOutcome { success: true, final_env: last_env, iterations: iteration };
        }
        if !mentions_related_exception(&outcome.log) {
            tracing::debug!(iteration, "validation failed with an unrelated exception, cannot adjust");
            return AdjustOutcome { success: false, final_env: last_env, iterations: iteration };
        }

        let matched = classify_log(matcher, &outcome.log);
        tracing::debug!(iteration, ?matched, "classified validation failure");

        let progressed = narrow_from_match(generator, discovery, &matched);

        if !progressed {
            if !allow_old_major && is_newer_major(&descriptor) {
                let older: envpin_version::VersionSpecifiers =
                    "<3".parse().expect("\"<3\" is a well-formed version specifier");
                if generator.add_python_constraint(&older) {
                    tracing::debug!(iteration, "no progress from error classification, probing the older interpreter major");
                    allow_old_major = true;
                    continue;
                }
            }
            tracing::debug!(iteration, "no mutation applied, stopping");
            return AdjustOutcome { success: false, final_env: last_env, iterations: iteration };
        }
    }

    AdjustOutcome { success: false, final_env: last_env, iterations: VALIDATION_NUM }
}

/// Spec.md §4.E: "absence of 'related' exception classes (`ImportError`,
/// `ModuleNotFoundError`, `SyntaxError`, `AttributeError`)" ends the loop
/// with the validator's own failure, since nothing here can be narrowed
/// from it.
fn mentions_related_exception(log: &str) -> bool {
    const RELATED: [&str; 4] = ["ImportError", "ModuleNotFoundError", "SyntaxError", "AttributeError"];
    RELATED.iter().any(|needle| log.contains(needle))
}

/// Spec.md §4.E's major-version probe condition: only attempt the `"<3"`
/// narrowing when the environment that just failed actually sits in the
/// newer major family (otherwise the probe could never change anything,
/// and `add_python_constraint` would just report "no progress" itself).
fn is_newer_major(descriptor: &EnvironmentDescriptor) -> bool {
    descriptor.interpreter.release_segments().first().copied().unwrap_or(0) >= 3
}

/// Narrows the Generator's state from one classified failure, per spec.md
/// §4.E's three branches (syntax feature / per-package recursion / fresh
/// third-party discovery). Returns whether a mutation was actually applied.
fn narrow_from_match<D, C>(generator: &mut Generator<D>, discovery: &C, matched: &MatchedTemplate) -> bool
where
    D: SimilarityDiscovery,
    C: CandidateDiscovery,
{
    match matched {
        MatchedTemplate::SyntaxError { message } => {
            let admits = discovery.discover_syntax_feature(message);
            if admits.is_empty() {
                return false;
            }
            generator.add_python_constraint(&admits)
        }
        MatchedTemplate::ModuleNotFound { module } | MatchedTemplate::ImportError { module } => {
            discover_and_narrow(generator, discovery, module)
        }
        MatchedTemplate::ModuleAttributeError { module, .. } => discover_and_narrow(generator, discovery, module),
        // An attribute error on a bare object (not traced back to a module
        // by the template matcher) carries no actionable module name —
        // nothing in this crate's contracts can narrow from it.
        MatchedTemplate::ObjectAttributeError { .. } | MatchedTemplate::Unrecognized => false,
    }
}

/// Spec.md §4.E: "examine the build log per failed package: if all
/// installed packages for a top module failed, recurse on the sub-log with
/// that package as `parent`. Else run third-party discovery on the
/// synthetic snippet ... and `add_pv_constraint`."
///
/// The build log's per-package granularity is the sandbox validator's
/// contract, not this crate's (spec.md §1's "structured logs" are opaque
/// text here); the distinguishing signal this crate *does* have is whether
/// the module already has an installed package on file. If it does, that
/// package is the one that just failed — recurse with it as `parent` so
/// `add_pv_constraint`'s `extra_deps` bookkeeping ties the replacement back
/// to what it's replacing. If the module has never been installed, this is
/// the "third-party discovery from scratch" branch instead.
fn discover_and_narrow<D, C>(generator: &mut Generator<D>, discovery: &C, module: &TopModule) -> bool
where
    D: SimilarityDiscovery,
    C: CandidateDiscovery,
{
    let discovered = discovery.discover_module(module);
    let Some(pkgs) = discovered.pv_candidates.get(module).cloned() else {
        return false;
    };
    if pkgs.is_empty() {
        return false;
    }

    let stripped = strip_to_max_degree(pkgs);
    if stripped.is_empty() {
        return false;
    }

    let parent = generator
        .state()
        .installed_module_pkgs
        .get(module)
        .and_then(|pkgs| pkgs.iter().next().cloned());

    let mut pv_map = BTreeMap::new();
    pv_map.insert(module.clone(), stripped);
    let mut sim_map = BTreeMap::new();
    if let Some(sims) = discovered.similarity.get(module) {
        sim_map.insert(module.clone(), sims.clone());
    }

    generator.add_pv_constraint(pv_map, sim_map, parent);
    true
}

/// Spec.md §4.E: "strip all-but-max-degree candidates" before handing fresh
/// discovery results back to the Generator — the same tiering
/// `select_pvs_for_module` itself applies, done here once up front so the
/// Generator only ever sees the top tier for a freshly-discovered module.
fn strip_to_max_degree(
    mut pkgs: BTreeMap<envpin_normalize::PackageName, Vec<envpin_kg::CandidateVersion>>,
) -> BTreeMap<envpin_normalize::PackageName, Vec<envpin_kg::CandidateVersion>> {
    for versions in pkgs.values_mut() {
        sort_candidates(versions);
    }
    let max_score = pkgs
        .values()
        .filter_map(|versions| versions.first())
        .map(|cv| cv.matching_degree)
        .fold(f64::MIN, f64::max);

    for versions in pkgs.values_mut() {
        versions.retain(|cv| (cv.matching_degree - max_score).abs() < SCORE_EPSILON);
    }
    pkgs.retain(|_, versions| !versions.is_empty());
    pkgs
}

#[cfg(test)]
mod tests {
    use super::*;

    use envpin_kg::{
        AlwaysSucceeds, CandidateVersion, DiscoveredCandidates, FixedCandidateDiscovery, MemoryKnowledgeGraph,
        NoSimilarityDiscovery, ScriptedValidator, ValidationOutcome, VersionRecord,
    };
    use envpin_normalize::PackageName;
    use envpin_version::InterpreterConstraint;
    use std::path::PathBuf;

    fn candidate(version: &str, degree: f64) -> CandidateVersion {
        CandidateVersion {
            version: version.parse().unwrap(),
            interpreter_constraint: InterpreterConstraint::any(),
            repos_constraint: Default::default(),
            matching_degree: degree,
        }
    }

    fn record(version: &str) -> VersionRecord {
        VersionRecord {
            version: version.parse().unwrap(),
            interpreter_constraint: InterpreterConstraint::any(),
            upload_timestamp: None,
        }
    }

    fn settings() -> ValidationSettings {
        ValidationSettings {
            dockerfile_dir: PathBuf::from("/tmp/does-not-matter"),
            source_name: "app.py".to_string(),
            cmd: "python app.py".to_string(),
            extra_cmd: None,
        }
    }

    fn discovered(module: &str, pkg: &str, versions: Vec<CandidateVersion>) -> DiscoveredCandidates {
        let mut out = DiscoveredCandidates::default();
        let mut inner = BTreeMap::new();
        inner.insert(PackageName::from(pkg), versions);
        out.pv_candidates.insert(TopModule::from(module), inner);
        out
    }

    /// A validator that always reports success converges on the very first
    /// iteration without ever consulting the discovery or matcher fakes.
    #[test]
    fn converges_immediately_when_validation_already_succeeds() {
        let graph = MemoryKnowledgeGraph::new().with_package_versions(PackageName::from("a"), vec![record("1.0")]);
        let store = VersionStore::new(&graph);

        let pv = discovered("a", "A", vec![candidate("1.0", 1.0)]);
        let mut generator = Generator::new(NoSimilarityDiscovery);
        generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None);
        generator.select_pvs_for_module(&TopModule::from("a"));

        let outcome = adjust(
            &mut generator,
            &store,
            &envpin_kg::NoCandidateDiscovery,
            &AlwaysSucceeds,
            &envpin_kg::DefaultErrorTemplateMatcher,
            &settings(),
        );

        assert!(outcome.success);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.final_env.is_some());
    }

    /// Spec.md §8 scenario S5: an initial pin fails with a module-not-found
    /// error; the Adjustment Controller discovers a replacement package for
    /// that module and regenerates successfully.
    #[test]
    fn swaps_a_failed_module_for_a_discovered_replacement() {
        let graph = MemoryKnowledgeGraph::new()
            .with_package_versions(PackageName::from("bad-pkg"), vec![record("1.0")])
            .with_package_versions(PackageName::from("good-pkg"), vec![record("2.0")]);
        let store = VersionStore::new(&graph);

        let pv = discovered("widgets", "bad-pkg", vec![candidate("1.0", 1.0)]);
        let mut generator = Generator::new(NoSimilarityDiscovery);
        generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None);
        generator.select_pvs_for_module(&TopModule::from("widgets"));

        let validator = ScriptedValidator::new(vec![
            ValidationOutcome::failure("ModuleNotFoundError: No module named 'widgets'"),
            ValidationOutcome::success(),
        ]);
        let discovery = FixedCandidateDiscovery::new().register_module(
            TopModule::from("widgets"),
            discovered("widgets", "good-pkg", vec![candidate("2.0", 1.0)]),
        );

        let outcome = adjust(
            &mut generator,
            &store,
            &discovery,
            &validator,
            &envpin_kg::DefaultErrorTemplateMatcher,
            &settings(),
        );

        assert!(outcome.success);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(validator.call_count(), 2);
        assert_eq!(outcome.final_env.unwrap().requirements, vec!["good-pkg==2.0".to_string()]);
    }

    /// When the failure log names no related exception class, the loop
    /// stops after one iteration rather than spinning the round cap.
    #[test]
    fn stops_immediately_on_an_unrelated_failure() {
        let graph = MemoryKnowledgeGraph::new().with_package_versions(PackageName::from("a"), vec![record("1.0")]);
        let store = VersionStore::new(&graph);

        let pv = discovered("a", "A", vec![candidate("1.0", 1.0)]);
        let mut generator = Generator::new(NoSimilarityDiscovery);
        generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None);
        generator.select_pvs_for_module(&TopModule::from("a"));

        let validator = ScriptedValidator::new(vec![ValidationOutcome::failure("disk full")]);

        let outcome = adjust(
            &mut generator,
            &store,
            &envpin_kg::NoCandidateDiscovery,
            &validator,
            &envpin_kg::DefaultErrorTemplateMatcher,
            &settings(),
        );

        assert!(!outcome.success);
        assert_eq!(outcome.iterations, 1);
    }

    /// A syntax error the discovery collaborator recognizes narrows the
    /// interpreter candidates via `add_python_constraint` rather than
    /// touching package state.
    #[test]
    fn narrows_the_interpreter_from_a_syntax_error() {
        let graph = MemoryKnowledgeGraph::new().with_package_versions(PackageName::from("a"), vec![record("1.0")]);
        let store = VersionStore::new(&graph);

        let pv = discovered("a", "A", vec![candidate("1.0", 1.0)]);
        let mut generator = Generator::new(NoSimilarityDiscovery);
        generator.set_candidates(
            vec!["3.6.0".parse().unwrap(), "3.10.0".parse().unwrap()],
            pv,
            None,
        );
        generator.select_pvs_for_module(&TopModule::from("a"));

        let validator = ScriptedValidator::new(vec![
            ValidationOutcome::failure("SyntaxError: walrus operator"),
            ValidationOutcome::success(),
        ]);
        let discovery = FixedCandidateDiscovery::new()
            .register_syntax_feature("walrus operator", ">=3.8".parse().unwrap());

        let outcome = adjust(
            &mut generator,
            &store,
            &discovery,
            &validator,
            &envpin_kg::DefaultErrorTemplateMatcher,
            &settings(),
        );

        assert!(outcome.success);
        assert_eq!(
            generator.state().selected_interpreters,
            vec!["3.10.0".parse().unwrap()]
        );
    }
}
