//! Version numbers, version specifiers, interpreter constraints and marker
//! evaluation — the data model primitives spec.md §3 names as opaque,
//! totally-ordered values.

mod marker;
mod specifier;
mod version;

pub use marker::{Marker, MarkerEnvironment, MarkerParseError};
pub use specifier::{
    InterpreterConstraint, Operator, SpecifierParseError, VersionSpecifier, VersionSpecifiers,
};
pub use version::{Version, VersionParseError};

/// The interpreter version the system is choosing among: a dotted numeric
/// string with a total order, per spec.md §3. Distinguished from `Version`
/// by name only — the underlying representation and ordering rules are
/// identical — so that `envpin-generator` and `envpin-resolver` signatures
/// read as the spec describes them.
pub type InterpreterVersion = Version;
