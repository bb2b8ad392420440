//! Loads a [`MemoryKnowledgeGraph`] from a JSON snapshot on disk: the
//! concrete stand-in this binary uses for the knowledge-graph access layer,
//! which is otherwise only a stated contract (spec.md §1) with an in-memory
//! fake meant for tests. `--langdir` names a directory holding one
//! `graph.json` file in the shape defined here.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use envpin_kg::{DependencyEdge, MemoryKnowledgeGraph, Timestamp, VersionRecord};
use envpin_normalize::{ExtraName, PackageName, TopModule};
use envpin_version::{InterpreterConstraint, InterpreterVersion, Version};

#[derive(Debug, Deserialize)]
struct Snapshot {
    interpreters: Vec<InterpreterVersion>,
    #[serde(default)]
    stdlib_modules: Vec<String>,
    #[serde(default)]
    packages: Vec<PackageEntry>,
    #[serde(default)]
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    name: PackageName,
    #[serde(default)]
    versions: Vec<VersionEntry>,
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    version: Version,
    /// A `VersionSpecifiers` clause string, e.g. `">=3.7"`; empty admits
    /// every interpreter.
    #[serde(default)]
    meta_spec: String,
    /// Semicolon-joined alternative specifier strings, e.g. `"<3.9;>=3.11"`.
    #[serde(default)]
    repos_spec: String,
    #[serde(default)]
    upload_timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DependencyEntry {
    version: Version,
    #[serde(default)]
    edges: Vec<EdgeEntry>,
}

#[derive(Debug, Deserialize)]
struct EdgeEntry {
    name: PackageName,
    #[serde(default)]
    specifier: String,
    #[serde(default)]
    marker: Option<String>,
    #[serde(default)]
    extras: Vec<ExtraName>,
    #[serde(default)]
    order: u32,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    module: TopModule,
    #[serde(default)]
    packages: Vec<ModulePackageEntry>,
}

#[derive(Debug, Deserialize)]
struct ModulePackageEntry {
    name: PackageName,
    versions: Vec<Version>,
}

/// Reads `<langdir>/graph.json` and builds the in-memory knowledge graph it
/// describes.
pub(crate) fn load_snapshot(langdir: &Path) -> Result<MemoryKnowledgeGraph> {
    let path = langdir.join("graph.json");
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading knowledge-graph snapshot at {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&text)
        .with_context(|| format!("parsing knowledge-graph snapshot at {}", path.display()))?;

    let mut graph = MemoryKnowledgeGraph::new()
        .with_interpreters(snapshot.interpreters)
        .with_stdlib_modules(snapshot.stdlib_modules);

    for package in snapshot.packages {
        let records = package
            .versions
            .into_iter()
            .map(|entry| {
                let interpreter_constraint = InterpreterConstraint::parse(&entry.meta_spec, &entry.repos_spec)
                    .with_context(|| format!("interpreter constraint for {}", package.name))?;
                Ok(VersionRecord {
                    version: entry.version,
                    interpreter_constraint,
                    upload_timestamp: entry.upload_timestamp.map(Timestamp),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        graph = graph.with_package_versions(package.name.clone(), records);

        for dependency in package.dependencies {
            let edges = dependency
                .edges
                .into_iter()
                .map(|edge| {
                    Ok(DependencyEdge {
                        name: edge.name,
                        specifier: edge
                            .specifier
                            .parse()
                            .with_context(|| format!("dependency specifier for {}", package.name))?,
                        marker: edge.marker.map(|m| m.parse()).transpose()?,
                        extras: edge.extras.into_iter().collect::<BTreeSet<_>>(),
                        order: edge.order,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            graph = graph.with_dependency_edges(package.name.clone(), dependency.version, edges);
        }
    }

    for module in snapshot.modules {
        let packages = module
            .packages
            .into_iter()
            .map(|entry| (entry.name, entry.versions))
            .collect();
        graph = graph.with_module_packages(module.module, packages);
    }

    Ok(graph)
}
