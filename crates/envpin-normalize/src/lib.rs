//! Canonical names for packages, extras and top-level modules.
//!
//! Two packages are the same package iff their canonical names match: PyPI
//! (and every knowledge graph modeled on it) treats `-`, `_` and `.` as
//! interchangeable separators and is case-insensitive. See
//! <https://peps.python.org/pep-0503/#normalized-names>.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").unwrap());

fn canonicalize(name: &str) -> String {
    SEPARATORS.replace_all(name, "-").to_lowercase()
}

/// A canonicalized package name: lowercase, with runs of `-`, `_`, `.`
/// collapsed to a single `-`.
///
/// Equality and hashing operate on the canonical form only; the original
/// spelling is not retained (unlike `Version`, which keeps its display
/// string, a package name's surface spelling carries no information the
/// resolver needs).
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageName(Arc<str>);

impl PackageName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(canonicalize(name.as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A canonicalized PEP 508 extra name. Normalization is the same as
/// [`PackageName`]'s.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraName(Arc<str>);

impl ExtraName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(canonicalize(name.as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtraName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExtraName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ExtraName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The first dotted segment of an import name, e.g. `numpy` in
/// `numpy.linalg.info`. Top modules are *not* canonicalized the way package
/// names are: `numpy` and `NumPy` are the same top module only if the source
/// parser already normalized import casing, which is outside this crate's
/// contract, so `TopModule` preserves whatever the parser handed over.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopModule(Arc<str>);

impl TopModule {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first dotted segment of a full import path, e.g.
    /// `TopModule::from_import("numpy.linalg.info")` is `numpy`.
    pub fn from_import(path: &str) -> Self {
        let first = path.split('.').next().unwrap_or(path);
        Self::new(first)
    }
}

impl fmt::Display for TopModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TopModule {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("NumPy", "numpy")]
    #[test_case("zope.interface", "zope-interface")]
    #[test_case("Zope_Interface", "zope-interface")]
    #[test_case("foo--bar..baz", "foo-bar-baz")]
    #[test_case("a", "a")]
    fn canonicalizes(input: &str, expected: &str) {
        assert_eq!(PackageName::new(input).as_str(), expected);
    }

    #[test]
    fn equality_ignores_separators() {
        assert_eq!(PackageName::new("zope.interface"), PackageName::new("Zope-Interface"));
    }

    #[test]
    fn top_module_takes_first_segment() {
        assert_eq!(TopModule::from_import("numpy.linalg.info").as_str(), "numpy");
        assert_eq!(TopModule::from_import("os").as_str(), "os");
    }
}
