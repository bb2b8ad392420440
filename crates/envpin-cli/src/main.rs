//! Command-line entry point (spec.md §6): loads a knowledge-graph snapshot
//! and a program's extracted imports, drives the Environment Generator (and,
//! when validation settings are given, the Adjustment Controller), and
//! prints the resulting environment descriptor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anstream::eprintln;
use anyhow::{Context, Result};
use clap::Parser;

use envpin_adjuster::adjust;
use envpin_generator::Generator;
use envpin_kg::{
    AlwaysSucceeds, DefaultErrorTemplateMatcher, KnowledgeGraph, NoSimilarityDiscovery, ParseResult, ValidationSettings,
};
use envpin_normalize::PackageName;
use envpin_store::VersionStore;
use envpin_version::{InterpreterVersion, Version};

use crate::discovery::KgCandidateDiscovery;

mod discovery;
mod kg;
mod logging;

/// spec.md §6's command line: `--langdir` and `--program` are required in
/// spirit (exit `-1` if either is missing) but modeled as `Option` here so
/// that check can be made explicit in `inner` rather than delegated to
/// `clap`'s own (differently-coded) usage-error exit.
#[derive(Parser)]
#[command(author, version, about = "Infers a runnable runtime environment for a program's source tree")]
struct Cli {
    /// Directory holding the knowledge-graph snapshot (`graph.json`).
    #[arg(long)]
    langdir: Option<PathBuf>,

    /// JSON file naming the program's extracted top-level imports.
    #[arg(long)]
    program: Option<PathBuf>,

    /// JSON sandbox-validation settings; omitted disables the adjustment loop.
    #[arg(long)]
    setting: Option<PathBuf>,

    /// Where to write the rendered environment descriptor (default: stdout).
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON existing environment to preserve: `[interpreter_version, {package: version}]`.
    #[arg(long)]
    env: Option<PathBuf>,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Copy, Clone)]
enum ExitStatus {
    Success,
    MissingArguments,
    Failure,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::from(0),
            // spec.md §6: "Exit 0 on success, -1 on missing required arguments."
            // `ExitCode` is a `u8`; `-1_i32 as u8 == 255`.
            ExitStatus::MissingArguments => ExitCode::from(255),
            ExitStatus::Failure => ExitCode::from(1),
        }
    }
}

fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        logging::Level::Quiet
    } else if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    };
    logging::setup_logging(level)?;

    let (Some(langdir), Some(program)) = (cli.langdir.as_deref(), cli.program.as_deref()) else {
        tracing::debug!("--langdir and --program are both required");
        return Ok(ExitStatus::MissingArguments);
    };

    let graph = kg::load_snapshot(langdir)?;
    let store = VersionStore::new(&graph);

    let parse_result = load_parse_result(program)?;
    let existing_env = cli.env.as_deref().map(load_existing_env).transpose()?;
    let settings = cli.setting.as_deref().map(load_settings).transpose()?;

    let discovery = KgCandidateDiscovery::new(&graph);
    let discovered = discovery.discover_program(&parse_result.modules);

    let mut generator = Generator::new(NoSimilarityDiscovery);
    if !generator.set_candidates(graph.all_interpreter_releases(), discovered, existing_env) {
        println!("Fail to infer runtime environment for {}", program.display());
        return Ok(ExitStatus::Failure);
    }
    for module in &parse_result.modules {
        generator.select_pvs_for_module(module);
    }

    // With no validation settings there is nothing to adjust against (spec.md
    // §6: "missing any required key disables validation"), so the pipeline
    // stops at the Environment Generator's first candidate.
    let final_env = match settings {
        Some(settings) => {
            adjust(
                &mut generator,
                &store,
                &discovery,
                &AlwaysSucceeds,
                &DefaultErrorTemplateMatcher,
                &settings,
            )
            .final_env
        }
        None => generator.generate_candidate_environment(false, &store),
    };

    let Some(descriptor) = final_env else {
        println!("Fail to infer runtime environment for {}", program.display());
        return Ok(ExitStatus::Failure);
    };

    let rendered = descriptor.render();
    match cli.output.as_deref() {
        Some(path) => std::fs::write(path, &rendered)
            .with_context(|| format!("writing environment descriptor to {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(ExitStatus::Success)
}

fn load_parse_result(program: &Path) -> Result<ParseResult> {
    let text = std::fs::read_to_string(program)
        .with_context(|| format!("reading program module list at {}", program.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing program module list at {}", program.display()))
}

fn load_existing_env(path: &Path) -> Result<(InterpreterVersion, BTreeMap<PackageName, Version>)> {
    #[derive(serde::Deserialize)]
    struct ExistingEnvFile(InterpreterVersion, BTreeMap<PackageName, Version>);

    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading existing environment at {}", path.display()))?;
    let ExistingEnvFile(interpreter, pvs) = serde_json::from_str(&text)
        .with_context(|| format!("parsing existing environment at {}", path.display()))?;
    Ok((interpreter, pvs))
}

fn load_settings(path: &Path) -> Result<ValidationSettings> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading validation settings at {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing validation settings at {}", path.display()))
}

fn main() -> ExitCode {
    match inner() {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("\x1b[1;31merror\x1b[0m: {err}");
            ExitStatus::Failure.into()
        }
    }
}
