use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use moka::sync::Cache;

use super::version::{SchemaVersion, select_version};
use super::{InputSchemaDict, OutputSchemaDict};
use crate::config::ConfigManager;
use crate::error::{FleurError, Result};

/// File name of the input schema inside `<schema_dir>/inp/<version>/`
pub const INPUT_SCHEMA_FILE: &str = "FleurInputSchema.xsd";
/// File name of the output schema inside `<schema_dir>/out/<version>/`
pub const OUTPUT_SCHEMA_FILE: &str = "FleurOutputSchema.xsd";

/// Which family of schema files to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Input,
    Output,
}

impl SchemaKind {
    fn subdirectory(&self) -> &'static str {
        match self {
            SchemaKind::Input => "inp",
            SchemaKind::Output => "out",
        }
    }

    fn file_name(&self) -> &'static str {
        match self {
            SchemaKind::Input => INPUT_SCHEMA_FILE,
            SchemaKind::Output => OUTPUT_SCHEMA_FILE,
        }
    }
}

/// In-memory cache of schema dictionaries, one entry per requested version
///
/// Building a dictionary parses the whole XSD, so every version is built at most once
/// per cache. A request for a version without its own schema is answered by the nearest
/// newer schema, stored under the requested key with the fallback flag set.
pub struct SchemaCache {
    schema_dir: PathBuf,
    input: Cache<String, Arc<InputSchemaDict>>,
    output: Cache<String, Arc<OutputSchemaDict>>,
}

impl SchemaCache {
    pub fn new(schema_dir: impl Into<PathBuf>, max_capacity: u64) -> Self {
        Self {
            schema_dir: schema_dir.into(),
            input: Cache::builder().max_capacity(max_capacity).build(),
            output: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Process-wide cache configured from defaults and the `FLEURIO_*` environment
    pub fn global() -> &'static SchemaCache {
        static GLOBAL: OnceLock<SchemaCache> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            let config = ConfigManager::from_environment().unwrap_or_else(|e| {
                log::warn!("Ignoring invalid environment configuration: {}", e);
                Default::default()
            });
            SchemaCache::new(config.schemas.directory, config.schemas.cache_capacity)
        })
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Location of the schema file of one version
    pub fn schema_file(&self, kind: SchemaKind, version: SchemaVersion) -> PathBuf {
        self.schema_dir
            .join(kind.subdirectory())
            .join(version.to_string())
            .join(kind.file_name())
    }

    /// Versions with a schema file present, in ascending order
    pub fn available_versions(&self, kind: SchemaKind) -> Result<Vec<SchemaVersion>> {
        let directory = self.schema_dir.join(kind.subdirectory());
        if !directory.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&directory)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(version) = name.parse::<SchemaVersion>()
                && entry.path().join(kind.file_name()).is_file()
            {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }

    fn resolve(&self, kind: SchemaKind, requested: &str) -> Result<(SchemaVersion, bool)> {
        let version: SchemaVersion = requested.parse()?;
        let available = self.available_versions(kind)?;
        select_version(version, &available).ok_or_else(|| FleurError::SchemaVersion {
            details: format!(
                "no {} schema for version {} or newer in {} (available: {})",
                kind.subdirectory(),
                version,
                self.schema_dir.display(),
                available
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
    }

    /// Input schema dictionary for a version
    pub fn input(&self, version: &str) -> Result<Arc<InputSchemaDict>> {
        let key = version.trim().to_string();
        if let Some(dict) = self.input.get(&key) {
            return Ok(dict);
        }

        let (selected, fallback) = self.resolve(SchemaKind::Input, &key)?;
        let dict = if fallback {
            log::warn!(
                "No input schema for version {}; falling back to {}",
                key,
                selected
            );
            let exact = self.input(&selected.to_string())?;
            Arc::new((*exact).clone().mark_fallback())
        } else {
            log::debug!("Building input schema dictionary for version {}", selected);
            Arc::new(InputSchemaDict::from_file(
                &self.schema_file(SchemaKind::Input, selected),
            )?)
        };

        self.input.insert(key, Arc::clone(&dict));
        Ok(dict)
    }

    /// Output schema dictionary for a version, with the input types of `inp_version`
    /// (defaults to the output version)
    pub fn output(&self, out_version: &str, inp_version: Option<&str>) -> Result<Arc<OutputSchemaDict>> {
        let out_key = out_version.trim().to_string();
        let inp_key = inp_version.map(str::trim).unwrap_or(&out_key).to_string();
        let key = format!("{}/{}", out_key, inp_key);
        if let Some(dict) = self.output.get(&key) {
            return Ok(dict);
        }

        let (out_selected, out_fallback) = self.resolve(SchemaKind::Output, &out_key)?;
        let (inp_selected, inp_fallback) = self.resolve(SchemaKind::Input, &inp_key)?;
        log::debug!(
            "Building output schema dictionary for version {} (input {})",
            out_selected,
            inp_selected
        );
        let mut dict = OutputSchemaDict::from_files(
            &self.schema_file(SchemaKind::Output, out_selected),
            &self.schema_file(SchemaKind::Input, inp_selected),
        )?;
        if out_fallback || inp_fallback {
            log::warn!(
                "No exact schemas for output {} / input {}; using {} / {}",
                out_key,
                inp_key,
                out_selected,
                inp_selected
            );
            dict = dict.mark_fallback();
        }

        let dict = Arc::new(dict);
        self.output.insert(key, Arc::clone(&dict));
        Ok(dict)
    }

    /// Number of cached input and output dictionaries
    pub fn entry_counts(&self) -> (u64, u64) {
        self.input.run_pending_tasks();
        self.output.run_pending_tasks();
        (self.input.entry_count(), self.output.entry_count())
    }

    pub fn invalidate_all(&self) {
        self.input.invalidate_all();
        self.output.invalidate_all();
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("schema_dir", &self.schema_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_dict::SchemaDictionary;
    use std::fs;
    use tempfile::TempDir;

    const TINY_SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" version="0.34">
  <xsd:element name="fleurInput">
    <xsd:complexType>
      <xsd:sequence>
        <xsd:element name="calculationSetup" minOccurs="0">
          <xsd:complexType>
            <xsd:attribute name="jspins" type="xsd:int"/>
          </xsd:complexType>
        </xsd:element>
      </xsd:sequence>
      <xsd:attribute name="fleurInputVersion" type="xsd:string"/>
    </xsd:complexType>
  </xsd:element>
</xsd:schema>
"#;

    fn schema_dir_with(versions: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        for version in versions {
            let directory = temp_dir.path().join("inp").join(version);
            fs::create_dir_all(&directory).unwrap();
            fs::write(
                directory.join(INPUT_SCHEMA_FILE),
                TINY_SCHEMA.replace("0.34", version),
            )
            .unwrap();
        }
        temp_dir
    }

    #[test]
    fn test_available_versions_sorted() {
        let temp_dir = schema_dir_with(&["0.34", "0.31", "0.4"]);
        fs::create_dir_all(temp_dir.path().join("inp").join("notes")).unwrap();
        let cache = SchemaCache::new(temp_dir.path(), 8);

        let versions = cache.available_versions(SchemaKind::Input).unwrap();
        assert_eq!(
            versions,
            vec![
                SchemaVersion::new(0, 4),
                SchemaVersion::new(0, 31),
                SchemaVersion::new(0, 34)
            ]
        );
        assert!(cache.available_versions(SchemaKind::Output).unwrap().is_empty());
    }

    #[test]
    fn test_exact_version_is_cached() {
        let temp_dir = schema_dir_with(&["0.34"]);
        let cache = SchemaCache::new(temp_dir.path(), 8);

        let first = cache.input("0.34").unwrap();
        let second = cache.input("0.34").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.fallback());
        assert_eq!(first.inp_version(), SchemaVersion::new(0, 34));
    }

    #[test]
    fn test_fallback_to_newer_version() {
        let temp_dir = schema_dir_with(&["0.31", "0.34"]);
        let cache = SchemaCache::new(temp_dir.path(), 8);

        let dict = cache.input("0.32").unwrap();
        assert!(dict.fallback());
        assert_eq!(dict.inp_version(), SchemaVersion::new(0, 34));
    }

    #[test]
    fn test_unknown_version_errors() {
        let temp_dir = schema_dir_with(&["0.31"]);
        let cache = SchemaCache::new(temp_dir.path(), 8);

        assert!(matches!(
            cache.input("0.35"),
            Err(FleurError::SchemaVersion { .. })
        ));
        assert!(matches!(
            cache.input("latest"),
            Err(FleurError::SchemaVersion { .. })
        ));
    }
}
