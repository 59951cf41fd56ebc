//! Sharing schema dictionaries between threads

mod common;

use std::sync::Arc;

use rayon::prelude::*;

use common::test_helpers::*;
use fleurio::error::FleurError;
use fleurio::schema_dict::{SchemaCache, SchemaDictionary, SchemaVersion};

#[test]
fn test_concurrent_lookups_share_dictionaries() {
    let cache = schema_cache();
    let versions = ["0.34", "0.31", "0.34", "0.32", "0.31", "0.33", "0.34", "0.31"];

    let dicts: Vec<_> = versions
        .par_iter()
        .map(|version| cache.input(version).unwrap())
        .collect();

    for (version, dict) in versions.iter().zip(&dicts) {
        let requested: SchemaVersion = version.parse().unwrap();
        assert_eq!(dict.fallback(), requested != dict.input_version());
    }
    assert_eq!(dicts[3].input_version(), SchemaVersion::new(0, 34));
    assert!(Arc::ptr_eq(
        &cache.input("0.31").unwrap(),
        &cache.input("0.31").unwrap()
    ));

    let (inputs, outputs) = cache.entry_counts();
    assert_eq!(inputs, 4);
    assert_eq!(outputs, 0);
}

#[test]
fn test_concurrent_output_lookups() {
    let cache = schema_cache();
    let results: Vec<_> = (0..8)
        .into_par_iter()
        .map(|_| cache.output("0.34", Some("0.34")).unwrap())
        .collect();

    assert!(results.iter().all(|dict| !dict.fallback()));
    assert!(
        results
            .iter()
            .all(|dict| dict.output_version() == Some(SchemaVersion::new(0, 34)))
    );
    let first = cache.output("0.34", None).unwrap();
    assert_eq!(first.input_version(), SchemaVersion::new(0, 34));
    assert_eq!(cache.entry_counts().1, 1);
}

#[test]
fn test_newer_versions_are_not_available() {
    let cache = schema_cache();
    let error = cache.input("0.40").unwrap_err();
    assert!(matches!(error, FleurError::SchemaVersion { .. }));
    assert!(cache.input("not a version").is_err());
}

#[test]
fn test_empty_schema_directory() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let cache = SchemaCache::new(temp_dir.path(), 4);
    assert!(cache.input("0.34").is_err());
    assert_eq!(cache.schema_dir(), temp_dir.path());
}
