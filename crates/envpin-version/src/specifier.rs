//! Version specifiers (`>=1.0,<2.0`) and specifier sets, mirroring the
//! semantics of `packaging.specifiers.SpecifierSet`: a specifier set is the
//! conjunction ("and") of its clauses, and contains a version iff every
//! clause does and (unless `prereleases` is forced on) the version is not a
//! pre-release while the set contains no clause that is itself pinned to a
//! pre-release.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{Version, VersionParseError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecifierParseError {
    #[error("`{0}` is not a valid version specifier")]
    Malformed(String),
    #[error(transparent)]
    Version(#[from] VersionParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    ExactEqual,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Compatible,
}

impl Operator {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "==" => Self::Equal,
            "===" => Self::ExactEqual,
            "!=" => Self::NotEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanEqual,
            "~=" => Self::Compatible,
            _ => return None,
        })
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::ExactEqual => "===",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::Compatible => "~=",
        }
    }
}

/// A single clause, e.g. `>=1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSpecifier {
    operator: Operator,
    version: Version,
}

impl VersionSpecifier {
    pub fn new(operator: Operator, version: Version) -> Self {
        Self { operator, version }
    }

    /// Whether this clause pins to a single exact version (`==` or `===`),
    /// the "pinned" test the resolver's preference tuple needs (spec.md
    /// §4.C: "`pinned = ∃ requirement whose specifier begins with "==" or
    /// "==="`").
    pub fn is_pin(&self) -> bool {
        matches!(self.operator, Operator::Equal | Operator::ExactEqual)
    }

    pub fn contains(&self, version: &Version) -> bool {
        match self.operator {
            Operator::Equal | Operator::ExactEqual => version == &self.version,
            Operator::NotEqual => version != &self.version,
            Operator::LessThan => version < &self.version,
            Operator::LessThanEqual => version <= &self.version,
            Operator::GreaterThan => version > &self.version,
            Operator::GreaterThanEqual => version >= &self.version,
            // `~=1.4.2` means `>=1.4.2, ==1.4.*`: same major.minor-prefix,
            // not older than the pinned release.
            Operator::Compatible => {
                version >= &self.version && shares_compatible_prefix(&self.version, version)
            }
        }
    }
}

fn shares_compatible_prefix(pinned: &Version, candidate: &Version) -> bool {
    let prefix_len = pinned.release_segments().len().saturating_sub(1).max(1);
    let a = pinned.release_segments();
    let b = candidate.release_segments();
    a.iter().take(prefix_len).eq(b.iter().take(prefix_len))
}

impl fmt::Display for VersionSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)
    }
}

impl FromStr for VersionSpecifier {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let op_len = if s.starts_with("===") {
            3
        } else if s.len() >= 2 && Operator::parse(&s[..2]).is_some() {
            2
        } else {
            return Err(SpecifierParseError::Malformed(s.to_string()));
        };
        let operator =
            Operator::parse(&s[..op_len]).ok_or_else(|| SpecifierParseError::Malformed(s.to_string()))?;
        let version = Version::parse(s[op_len..].trim())?;
        Ok(Self::new(operator, version))
    }
}

/// A conjunction ("and") of [`VersionSpecifier`] clauses, e.g.
/// `>=1.0,<2.0,!=1.5`. An empty set contains every version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSpecifiers {
    clauses: Vec<VersionSpecifier>,
    /// Mirrors `SpecifierSet(..., prereleases=True)`: the resolver always
    /// constructs requirement specifiers with prereleases allowed (per the
    /// data model's `Requirement` contract), so by default this is `true`.
    prereleases: bool,
}

impl VersionSpecifiers {
    pub fn empty() -> Self {
        Self {
            clauses: Vec::new(),
            prereleases: true,
        }
    }

    pub fn contains(&self, version: &Version) -> bool {
        if !self.prereleases && version.is_prerelease() {
            return false;
        }
        self.clauses.iter().all(|c| c.contains(version))
    }

    /// Intersection: a version satisfies the result iff it satisfies both
    /// operands. Used by `Criterion` recomputation (§4.C "Adding a
    /// requirement to criteria").
    pub fn intersect(&self, other: &Self) -> Self {
        let mut clauses = self.clauses.clone();
        clauses.extend(other.clauses.iter().cloned());
        Self {
            clauses,
            prereleases: self.prereleases && other.prereleases,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[VersionSpecifier] {
        &self.clauses
    }

    /// Whether any clause in this set is an exact pin (`==`/`===`).
    pub fn is_pinned(&self) -> bool {
        self.clauses.iter().any(VersionSpecifier::is_pin)
    }
}

impl fmt::Display for VersionSpecifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(","))
    }
}

impl FromStr for VersionSpecifiers {
    type Err = SpecifierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::empty());
        }
        let clauses = s
            .split(',')
            .map(|part| VersionSpecifier::from_str(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            clauses,
            prereleases: true,
        })
    }
}

impl Serialize for VersionSpecifiers {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionSpecifiers {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// `InterpreterConstraint` from the data model: `v` satisfies iff it is in
/// `meta_spec` *and* in some alternative of `repos_spec` (semicolon-joined).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpreterConstraint {
    pub meta_spec: VersionSpecifiers,
    pub repos_spec: Vec<VersionSpecifiers>,
}

impl InterpreterConstraint {
    pub fn any() -> Self {
        Self {
            meta_spec: VersionSpecifiers::empty(),
            repos_spec: Vec::new(),
        }
    }

    pub fn admits(&self, version: &Version) -> bool {
        if !self.meta_spec.contains(version) {
            return false;
        }
        self.repos_spec.is_empty() || self.repos_spec.iter().any(|alt| alt.contains(version))
    }

    pub fn parse(meta_spec: &str, repos_spec: &str) -> Result<Self, SpecifierParseError> {
        let meta_spec = VersionSpecifiers::from_str(meta_spec)?;
        let repos_spec = if repos_spec.trim().is_empty() {
            Vec::new()
        } else {
            repos_spec
                .split(';')
                .map(VersionSpecifiers::from_str)
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self {
            meta_spec,
            repos_spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_matches_exact_version() {
        let spec = VersionSpecifier::from_str("==1.2.3").unwrap();
        assert!(spec.contains(&Version::parse("1.2.3").unwrap()));
        assert!(!spec.contains(&Version::parse("1.2.4").unwrap()));
    }

    #[test]
    fn range_intersection() {
        let a = VersionSpecifiers::from_str(">=1.0").unwrap();
        let b = VersionSpecifiers::from_str("<2.0").unwrap();
        let both = a.intersect(&b);
        assert!(both.contains(&Version::parse("1.5").unwrap()));
        assert!(!both.contains(&Version::parse("2.0").unwrap()));
        assert!(!both.contains(&Version::parse("0.9").unwrap()));
    }

    #[test]
    fn empty_set_contains_everything() {
        let empty = VersionSpecifiers::empty();
        assert!(empty.contains(&Version::parse("9.9.9").unwrap()));
    }

    #[test]
    fn compatible_release_prefix() {
        let spec = VersionSpecifier::from_str("~=1.4.2").unwrap();
        assert!(spec.contains(&Version::parse("1.4.5").unwrap()));
        assert!(!spec.contains(&Version::parse("1.5.0").unwrap()));
        assert!(!spec.contains(&Version::parse("1.4.1").unwrap()));
    }

    #[test]
    fn interpreter_constraint_needs_both_meta_and_one_repo_alt() {
        let c = InterpreterConstraint::parse(">=3.0", "<3.9;>=3.11").unwrap();
        assert!(c.admits(&Version::parse("3.8").unwrap()));
        assert!(!c.admits(&Version::parse("3.10").unwrap()));
        assert!(c.admits(&Version::parse("3.12").unwrap()));
        assert!(!c.admits(&Version::parse("2.7").unwrap()));
    }
}
