//! The sandbox validator is an external collaborator by contract (spec.md
//! §1): it builds and runs an environment image and returns structured
//! logs. This module states that contract, the environment-descriptor
//! artifact it validates (spec.md §6), and the validation-settings JSON
//! shape (spec.md §6), plus fakes for tests.

use std::fmt::Write as _;
use std::path::PathBuf;

use envpin_version::InterpreterVersion;
use serde::{Deserialize, Serialize};

/// The primary output artifact (spec.md §6): a textual recipe naming the
/// interpreter image, the installer upgrade, one line per requirement in
/// topological order, and a completion marker comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescriptor {
    pub interpreter: InterpreterVersion,
    /// Requirement strings (spec.md §6 grammar), in the topological order
    /// `Resolver::generate_install_pairs` (or the best-effort fallback)
    /// produced them in.
    pub requirements: Vec<String>,
}

impl EnvironmentDescriptor {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "FROM interpreter-image:{}", self.interpreter);
        let _ = writeln!(out, "RUN upgrade-installer");
        for requirement in &self.requirements {
            let _ = writeln!(out, "RUN install-one-requirement {requirement}");
        }
        let _ = write!(out, "# Please complete the execution commands");
        out
    }
}

/// The validation-settings JSON shape from spec.md §6: missing any required
/// key disables validation, so the CLI loads this as an `Option` and only
/// constructs an Adjustment Controller when it is present.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationSettings {
    pub dockerfile_dir: PathBuf,
    pub source_name: String,
    pub cmd: String,
    #[serde(default)]
    pub extra_cmd: Option<Vec<String>>,
}

/// The structured result of one validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub success: bool,
    pub log: String,
}

impl ValidationOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            log: String::new(),
        }
    }

    pub fn failure(log: impl Into<String>) -> Self {
        Self {
            success: false,
            log: log.into(),
        }
    }
}

pub trait SandboxValidator {
    fn validate(
        &self,
        descriptor: &EnvironmentDescriptor,
        settings: &ValidationSettings,
    ) -> ValidationOutcome;
}

/// A fake that always reports success: useful for exercising the "no
/// adjustment needed" path.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSucceeds;

impl SandboxValidator for AlwaysSucceeds {
    fn validate(&self, _: &EnvironmentDescriptor, _: &ValidationSettings) -> ValidationOutcome {
        ValidationOutcome::success()
    }
}

/// A fake that replays a fixed sequence of outcomes, one per call, holding
/// on the last once exhausted. Used to drive the Adjustment Controller
/// through a scripted sequence of failures followed by success (scenario
/// S5 in spec.md §8).
#[derive(Debug, Clone)]
pub struct ScriptedValidator {
    outcomes: Vec<ValidationOutcome>,
    calls: std::cell::Cell<usize>,
}

impl ScriptedValidator {
    pub fn new(outcomes: Vec<ValidationOutcome>) -> Self {
        Self {
            outcomes,
            calls: std::cell::Cell::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.get()
    }
}

impl SandboxValidator for ScriptedValidator {
    fn validate(&self, _: &EnvironmentDescriptor, _: &ValidationSettings) -> ValidationOutcome {
        let i = self.calls.get();
        self.calls.set(i + 1);
        self.outcomes
            .get(i)
            .or_else(|| self.outcomes.last())
            .cloned()
            .unwrap_or_else(ValidationOutcome::success)
    }
}
