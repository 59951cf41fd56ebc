//! Selection of version specific implementations.

use crate::error::{FleurError, Result};
use crate::schema_dict::version::{OLDEST_SUPPORTED, supported_versions};
use crate::schema_dict::{SchemaVersion, VersionRange};

/// Input versions written by Fleur MaX4 and older
pub const MAX4_VERSIONS: VersionRange =
    VersionRange::new(OLDEST_SUPPORTED, SchemaVersion::new(0, 31));
/// Input versions with the `kPointLists` model
pub const CURRENT_VERSIONS: VersionRange = VersionRange::new(
    SchemaVersion::new(0, 32),
    crate::schema_dict::version::NEWEST_SUPPORTED,
);

/// Implementations of one operation keyed by version range
#[derive(Debug, Clone)]
pub struct Dispatcher<F> {
    name: &'static str,
    entries: Vec<(VersionRange, F)>,
}

impl<F: Copy> Dispatcher<F> {
    pub fn new(name: &'static str) -> Self {
        Dispatcher {
            name,
            entries: Vec::new(),
        }
    }

    /// Add an implementation; ranges of one operation must not overlap
    pub fn register(mut self, range: VersionRange, implementation: F) -> Self {
        debug_assert!(
            self.entries.iter().all(|(existing, _)| !existing.overlaps(&range)),
            "overlapping version ranges for {}",
            self.name
        );
        self.entries.push((range, implementation));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Implementation for `version`
    pub fn select(&self, version: SchemaVersion) -> Result<F> {
        self.entries
            .iter()
            .find(|(range, _)| range.contains(version))
            .map(|(_, implementation)| *implementation)
            .ok_or_else(|| FleurError::UnsupportedOperation {
                operation: self.name.to_string(),
                version: version.to_string(),
                details: "no implementation registered for this version".to_string(),
            })
    }

    /// Supported versions without an implementation
    pub fn uncovered_versions(&self) -> Vec<SchemaVersion> {
        supported_versions()
            .into_iter()
            .filter(|version| !self.entries.iter().any(|(range, _)| range.contains(*version)))
            .collect()
    }
}
