//! Source parsing is explicitly out of scope (spec.md Non-goals): the
//! pipeline receives a pre-extracted module list rather than source text.
//! This module states the contract the out-of-scope parser would satisfy,
//! so the CLI's input boundary and the in-memory fakes used in tests share
//! one shape, grounded on `utils/calculator.get_import_modules`'s output in
//! the distilled system.

use serde::Deserialize;

use envpin_normalize::TopModule;

/// What a parsed program handed the rest of the pipeline: the top modules
/// it imports, already deduplicated, in first-use order. Deserializable
/// directly, since the CLI's `--program` input *is* this shape rather than
/// source text (see the module doc above).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ParseResult {
    pub modules: Vec<TopModule>,
}

pub trait SourceParser {
    fn parse(&self, program_dir: &str) -> ParseResult;
}

/// A fake returning a fixed module list regardless of the directory given.
#[derive(Debug, Clone, Default)]
pub struct FixedSourceParser {
    pub modules: Vec<TopModule>,
}

impl FixedSourceParser {
    pub fn new(modules: Vec<TopModule>) -> Self {
        Self { modules }
    }
}

impl SourceParser for FixedSourceParser {
    fn parse(&self, _program_dir: &str) -> ParseResult {
        ParseResult {
            modules: self.modules.clone(),
        }
    }
}
