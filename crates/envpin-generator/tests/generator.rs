//! End-to-end scenarios from spec.md §8: S1 (no conflicts), S2 (shared
//! package covers two modules), S3 (version-range grammar), S6 (protected
//! existing environment), plus the backup/restore round-trip property.

use std::collections::BTreeMap;

use envpin_generator::{render_requirement_string, Generator};
use envpin_kg::{CandidateVersion, DiscoveredCandidates, MemoryKnowledgeGraph, NoSimilarityDiscovery, VersionRecord};
use envpin_normalize::{PackageName, TopModule};
use envpin_store::VersionStore;
use envpin_version::InterpreterConstraint;

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

fn discovered(pv: &[(&str, &[(&str, Vec<CandidateVersion>)])], sim: &[(&str, &[(&str, f64)])]) -> DiscoveredCandidates {
    let mut out = DiscoveredCandidates::default();
    for (module, pkgs) in pv {
        let map = pkgs.iter().map(|(p, v)| (PackageName::from(*p), v.clone())).collect();
        out.pv_candidates.insert(TopModule::from(*module), map);
    }
    for (module, pkgs) in sim {
        let map = pkgs.iter().map(|(p, s)| (PackageName::from(*p), *s)).collect();
        out.similarity.insert(TopModule::from(*module), map);
    }
    out
}

/// Scenario S1: two modules, no conflicts.
#[test]
fn s1_two_independent_modules_resolve_cleanly() {
    let graph = MemoryKnowledgeGraph::new()
        .with_package_versions(PackageName::from("a"), vec![record("1.0")])
        .with_package_versions(PackageName::from("b"), vec![record("2.0")]);
    let store = VersionStore::new(&graph);

    let pv = discovered(
        &[
            ("a", &[("A", vec![candidate("1.0", 1.0)])]),
            ("b", &[("B", vec![candidate("2.0", 1.0)])]),
        ],
        &[("a", &[("A", 1.0)]), ("b", &[("B", 1.0)])],
    );

    let mut generator = Generator::new(NoSimilarityDiscovery);
    assert!(generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None));
    generator.select_pvs_for_module(&TopModule::from("a"));
    generator.select_pvs_for_module(&TopModule::from("b"));

    let descriptor = generator.generate_candidate_environment(false, &store).unwrap();
    assert_eq!(descriptor.interpreter, "3.8.0".parse().unwrap());
    let mut requirements = descriptor.requirements.clone();
    requirements.sort();
    assert_eq!(requirements, vec!["A==1.0".to_string(), "B==2.0".to_string()]);
}

/// Scenario S2: one shared package covers two modules.
#[test]
fn s2_shared_package_covers_two_modules_with_a_single_pin() {
    let graph = MemoryKnowledgeGraph::new().with_package_versions(PackageName::from("p"), vec![record("1.0")]);
    let store = VersionStore::new(&graph);

    let pv = discovered(
        &[
            ("a", &[("P", vec![candidate("1.0", 1.0)])]),
            ("b", &[("P", vec![candidate("1.0", 0.9)])]),
        ],
        &[("a", &[("P", 1.0)]), ("b", &[("P", 0.9)])],
    );

    let mut generator = Generator::new(NoSimilarityDiscovery);
    assert!(generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None));
    generator.select_pvs_for_module(&TopModule::from("a"));
    generator.select_pvs_for_module(&TopModule::from("b"));

    let descriptor = generator.generate_candidate_environment(false, &store).unwrap();
    assert_eq!(descriptor.requirements, vec!["P==1.0".to_string()]);
}

/// Scenario S3: the version-range grammar excludes store-known versions the
/// batch skips over.
#[test]
fn s3_version_range_grammar_names_the_gaps() {
    let batch = ["1.0", "1.2", "1.4"]
        .into_iter()
        .map(|v| v.parse().unwrap())
        .collect();
    let full_list: Vec<_> = ["1.0", "1.1", "1.2", "1.3", "1.4", "1.5"]
        .into_iter()
        .map(|v| v.parse().unwrap())
        .collect();

    let rendered = render_requirement_string(&PackageName::from("q"), &batch, &full_list);
    assert_eq!(rendered, "q>=1.0,<=1.4,!=1.1,!=1.3");
}

/// Scenario S3, end to end: a module offering `Q` at exactly those three
/// versions (all equally well-matched, so they land in one selection batch)
/// resolves to the batch's highest version.
#[test]
fn s3_end_to_end_resolves_to_the_batchs_highest_version() {
    let graph = MemoryKnowledgeGraph::new().with_package_versions(
        PackageName::from("q"),
        ["1.0", "1.1", "1.2", "1.3", "1.4", "1.5"].into_iter().map(record).collect(),
    );
    let store = VersionStore::new(&graph);

    let pv = discovered(
        &[(
            "m",
            &[(
                "Q",
                vec![candidate("1.0", 1.0), candidate("1.2", 1.0), candidate("1.4", 1.0)],
            )],
        )],
        &[("m", &[("Q", 1.0)])],
    );

    let mut generator = Generator::new(NoSimilarityDiscovery);
    assert!(generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None));
    generator.select_pvs_for_module(&TopModule::from("m"));

    let descriptor = generator.generate_candidate_environment(false, &store).unwrap();
    assert_eq!(descriptor.requirements, vec!["Q==1.4".to_string()]);
}

/// Scenario S6: a protected existing environment keeps its pinned package
/// and excludes every other candidate for that module.
#[test]
fn s6_protected_existing_environment_keeps_its_pin() {
    let graph = MemoryKnowledgeGraph::new().with_package_versions(PackageName::from("x"), vec![record("4.2")]);
    let store = VersionStore::new(&graph);

    let pv = discovered(
        &[("x", &[("X", vec![candidate("4.2", 0.5)]), ("Y", vec![candidate("1.0", 0.9)])])],
        &[("x", &[("X", 0.5), ("Y", 0.9)])],
    );

    let mut generator = Generator::new(NoSimilarityDiscovery);
    let existing_pvs = BTreeMap::from([(PackageName::from("x"), "4.2".parse().unwrap())]);
    let ok = generator.set_candidates(
        vec!["3.8.0".parse().unwrap(), "3.9.0".parse().unwrap()],
        pv,
        Some(("3.9.0".parse().unwrap(), existing_pvs)),
    );
    assert!(ok);
    generator.select_pvs_for_module(&TopModule::from("x"));

    let descriptor = generator.generate_candidate_environment(false, &store).unwrap();
    assert_eq!(descriptor.interpreter, "3.9.0".parse().unwrap());
    assert_eq!(descriptor.requirements, vec!["X==4.2".to_string()]);
}

/// Spec.md §8 property 6: a failed mutation, restored from a backup, leaves
/// the state exactly as it was.
#[test]
fn backup_and_restore_undoes_a_mutation() {
    let pv = discovered(&[("a", &[("A", vec![candidate("1.0", 1.0)])])], &[("a", &[("A", 1.0)])]);
    let mut generator = Generator::new(NoSimilarityDiscovery);
    generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None);
    generator.select_pvs_for_module(&TopModule::from("a"));

    let snapshot = generator.backup_state();
    generator.select_pvs_for_module(&TopModule::from("nonexistent"));
    assert_ne!(generator.state().unknown_modules.len(), snapshot.unknown_modules.len());

    generator.restore_state(snapshot.clone());
    assert_eq!(generator.state().unknown_modules, snapshot.unknown_modules);
    assert_eq!(generator.state().selected_pvs, snapshot.selected_pvs);
}

/// Spec.md §8 property 7: two calls on an unchanged state agree.
#[test]
fn generate_candidate_environment_is_deterministic() {
    let graph = MemoryKnowledgeGraph::new()
        .with_package_versions(PackageName::from("a"), vec![record("1.0")])
        .with_package_versions(PackageName::from("b"), vec![record("2.0")]);
    let store = VersionStore::new(&graph);

    let pv = discovered(
        &[
            ("a", &[("A", vec![candidate("1.0", 1.0)])]),
            ("b", &[("B", vec![candidate("2.0", 1.0)])]),
        ],
        &[("a", &[("A", 1.0)]), ("b", &[("B", 1.0)])],
    );
    let mut generator = Generator::new(NoSimilarityDiscovery);
    generator.set_candidates(vec!["3.8.0".parse().unwrap()], pv, None);
    generator.select_pvs_for_module(&TopModule::from("a"));
    generator.select_pvs_for_module(&TopModule::from("b"));

    let first = generator.generate_candidate_environment(false, &store).unwrap();
    let second = generator.generate_candidate_environment(false, &store).unwrap();
    assert_eq!(first, second);
}
