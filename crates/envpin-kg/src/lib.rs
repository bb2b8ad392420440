//! The external-collaborator boundary named in spec.md §1: the read-only
//! knowledge-graph query surface, candidate discovery, sandbox validation,
//! error-template matching, and source parsing. Every trait here has a real
//! backing system in production and an in-memory fake for tests; nothing in
//! this crate talks to a network or a filesystem itself.

mod discovery;
mod graph;
mod parser;
mod template;
mod validator;

pub use discovery::{
    CandidateDiscovery, DiscoveredCandidates, FixedCandidateDiscovery, FixedSimilarityDiscovery,
    NoCandidateDiscovery, NoSimilarityDiscovery, SimilarityDiscovery,
};
pub use graph::{
    sort_candidates, CandidateVersion, DependencyEdge, KnowledgeGraph, MemoryKnowledgeGraph, Timestamp,
    VersionRecord,
};
pub use parser::{FixedSourceParser, ParseResult, SourceParser};
pub use template::{classify_log, DefaultErrorTemplateMatcher, ErrorTemplateMatcher, MatchedTemplate};
pub use validator::{
    AlwaysSucceeds, EnvironmentDescriptor, ScriptedValidator, SandboxValidator, ValidationOutcome,
    ValidationSettings,
};
