//! Schema version numbers (`major.minor`) and ranges of them.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FleurError;

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\.(\d+)\s*$").expect("valid version regex"))
}

/// A Fleur schema version such as `0.34`
///
/// Versions compare numerically per component, so `0.4 < 0.31` does not hold by
/// accident of string ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for SchemaVersion {
    type Err = FleurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = version_regex()
            .captures(s)
            .ok_or_else(|| FleurError::SchemaVersion {
                details: format!("'{}' is not a version of the form major.minor", s),
            })?;
        let parse = |index: usize| -> Result<u32, FleurError> {
            captures[index]
                .parse::<u32>()
                .map_err(|e| FleurError::SchemaVersion {
                    details: format!("'{}': {}", s, e),
                })
        };
        Ok(SchemaVersion {
            major: parse(1)?,
            minor: parse(2)?,
        })
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = FleurError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Inclusive range of schema versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: SchemaVersion,
    pub max: SchemaVersion,
}

impl VersionRange {
    pub const fn new(min: SchemaVersion, max: SchemaVersion) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, version: SchemaVersion) -> bool {
        self.min <= version && version <= self.max
    }

    pub fn overlaps(&self, other: &VersionRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Oldest input version handled by this crate
pub const OLDEST_SUPPORTED: SchemaVersion = SchemaVersion::new(0, 27);
/// Newest input version handled by this crate
pub const NEWEST_SUPPORTED: SchemaVersion = SchemaVersion::new(0, 37);

/// Every version between the oldest and newest supported one
pub fn supported_versions() -> Vec<SchemaVersion> {
    (OLDEST_SUPPORTED.minor..=NEWEST_SUPPORTED.minor)
        .map(|minor| SchemaVersion::new(0, minor))
        .collect()
}

/// Pick the requested version if available, else the nearest newer one
///
/// Returns the chosen version and whether it is a fallback.
pub fn select_version(
    requested: SchemaVersion,
    available: &[SchemaVersion],
) -> Option<(SchemaVersion, bool)> {
    if available.contains(&requested) {
        return Some((requested, false));
    }
    available
        .iter()
        .copied()
        .filter(|candidate| *candidate >= requested)
        .min()
        .map(|candidate| (candidate, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let version: SchemaVersion = "0.34".parse().unwrap();
        assert_eq!(version, SchemaVersion::new(0, 34));
        assert_eq!(version.to_string(), "0.34");
        assert!("0.3a".parse::<SchemaVersion>().is_err());
        assert!("34".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_numeric_ordering() {
        let old: SchemaVersion = "0.4".parse().unwrap();
        let new: SchemaVersion = "0.31".parse().unwrap();
        assert!(old < new);
    }

    #[test]
    fn test_select_exact_and_fallback() {
        let available = vec![
            SchemaVersion::new(0, 31),
            SchemaVersion::new(0, 34),
            SchemaVersion::new(0, 37),
        ];
        assert_eq!(
            select_version(SchemaVersion::new(0, 34), &available),
            Some((SchemaVersion::new(0, 34), false))
        );
        assert_eq!(
            select_version(SchemaVersion::new(0, 32), &available),
            Some((SchemaVersion::new(0, 34), true))
        );
        assert_eq!(select_version(SchemaVersion::new(0, 38), &available), None);
    }

    #[test]
    fn test_range() {
        let range = VersionRange::new(SchemaVersion::new(0, 27), SchemaVersion::new(0, 31));
        assert!(range.contains(SchemaVersion::new(0, 30)));
        assert!(!range.contains(SchemaVersion::new(0, 32)));
        assert_eq!(range.to_string(), "0.27..=0.31");
    }

    #[test]
    fn test_serde_as_string() {
        let version = SchemaVersion::new(0, 33);
        assert_eq!(serde_json::to_string(&version).unwrap(), "\"0.33\"");
        let parsed: SchemaVersion = serde_json::from_str("\"0.29\"").unwrap();
        assert_eq!(parsed, SchemaVersion::new(0, 29));
    }
}
