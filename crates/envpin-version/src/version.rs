//! A simplified PEP 440-shaped version: enough structure for a correct total
//! order and a round-trippable display form, not every PEP 440 edge case
//! (no epoch-less local-version wildcard matching, no legacy version
//! fallback). The knowledge graph is assumed to hand back versions that
//! already parse; a version that doesn't is treated the way an empty
//! candidate list is treated elsewhere in this workspace — as "no
//! information", not as a hard error that should abort a resolve.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("`{0}` is not a valid version")]
pub struct VersionParseError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum PreKind {
    A,
    B,
    Rc,
}

impl PreKind {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "a" | "alpha" => Some(Self::A),
            "b" | "beta" => Some(Self::B),
            "rc" | "c" | "pre" | "preview" => Some(Self::Rc),
            _ => None,
        }
    }
}

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
        ^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?:(?P<pre_kind>a|b|c|rc|alpha|beta|pre|preview)[-_.]?(?P<pre_num>[0-9]*))?
        (?:(?:-|_|\.)?(?:post|rev|r)[-_.]?(?P<post>[0-9]*))?
        (?:(?:-|_|\.)?dev[-_.]?(?P<dev>[0-9]*))?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$
        ",
    )
    .unwrap()
});

/// An opaque, totally-ordered version value. The original string form is
/// preserved for display and equality (two differently-spelled but
/// numerically-equal versions, e.g. `1.0` and `1.0.0`, are distinct
/// `Version`s by `==` but compare equal under `Ord`... no: per the data
/// model, `Version` equality *is* numeric-value equality, so `1.0` and
/// `1.0.0` are equal; `text` is carried only for `Display`).
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<LocalSegment>>,
    text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum LocalSegment {
    Numeric(u64),
    Alpha(String),
}

impl Version {
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| VersionParseError(s.to_string()))?;

        let epoch = caps
            .name("epoch")
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);

        let release = caps["release"]
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect();

        let pre = caps.name("pre_kind").map(|kind| {
            let kind = PreKind::from_str(&kind.as_str().to_lowercase()).unwrap_or(PreKind::Rc);
            let num = caps
                .name("pre_num")
                .and_then(|n| n.as_str().parse().ok())
                .unwrap_or(0);
            (kind, num)
        });

        let post = caps
            .name("post")
            .map(|m| m.as_str().parse().unwrap_or(0));

        let dev = caps.name("dev").map(|m| m.as_str().parse().unwrap_or(0));

        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) => LocalSegment::Numeric(n),
                    Err(_) => LocalSegment::Alpha(seg.to_lowercase()),
                })
                .collect()
        });

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
            text: Arc::from(s),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn release_segments(&self) -> &[u64] {
        &self.release
    }

    /// The `release` segment padded to a common length for comparison.
    fn padded_release(&self, len: usize) -> Vec<u64> {
        let mut r = self.release.clone();
        r.resize(len, 0);
        r
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());

        // `pre` absence sorts after presence; `dev` absence sorts after
        // presence. We encode that by mapping `None` to a key that is
        // `Greater` than any `Some`, which requires a manual tuple compare
        // since a bare `Option<T>: Ord` treats `None < Some`.
        let pre_key = |p: Option<(PreKind, u64)>| match p {
            Some(v) => (0u8, Some(v)),
            None => (1u8, None),
        };
        let dev_key = |d: Option<u64>| match d {
            Some(v) => (0u8, Some(v)),
            None => (1u8, None),
        };

        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.padded_release(len).cmp(&other.padded_release(len)))
            .then_with(|| pre_key(self.pre).cmp(&pre_key(other.pre)))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| dev_key(self.dev).cmp(&dev_key(other.dev)))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.release.hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("1.0", "1.0.0", Ordering::Equal)]
    #[test_case("1.0", "1.1", Ordering::Less)]
    #[test_case("2.0", "1.9", Ordering::Greater)]
    #[test_case("1.0rc1", "1.0", Ordering::Less)]
    #[test_case("1.0.dev1", "1.0", Ordering::Less)]
    #[test_case("1.0.dev1", "1.0rc1", Ordering::Less)]
    #[test_case("1.0.post1", "1.0", Ordering::Greater)]
    #[test_case("1!1.0", "2.0", Ordering::Greater)]
    fn orders(a: &str, b: &str, expected: Ordering) {
        let a = Version::parse(a).unwrap();
        let b = Version::parse(b).unwrap();
        assert_eq!(a.cmp(&b), expected, "{a} vs {b}");
    }

    #[test]
    fn display_round_trips_original_spelling() {
        let v = Version::parse("1.0.0").unwrap();
        assert_eq!(v.to_string(), "1.0.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("not-a-version!!!").is_err());
    }
}
