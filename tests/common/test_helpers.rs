#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use fleurio::config::bundled_schema_dir;
use fleurio::libxml2::{XPathVariables, XmlDocument};
use fleurio::schema_dict::SchemaCache;

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    /// Input file of version 0.34 with the species Fe-1 and Pt-1
    pub fn inpxml(&self) -> PathBuf {
        self.fixtures_dir.join("inp.xml")
    }

    /// Input file of version 0.31 with the k-points below `calculationSetup`
    pub fn inpxml_max4(&self) -> PathBuf {
        self.fixtures_dir.join("inp_max4.xml")
    }

    /// Output file of version 0.34 with two iterations and the constant `A`
    pub fn outxml(&self) -> PathBuf {
        self.fixtures_dir.join("out.xml")
    }

    pub fn conversions_dir(&self) -> PathBuf {
        bundled_schema_dir().join("conversions")
    }
}

/// A fresh cache over the schemas shipped with the crate
pub fn schema_cache() -> SchemaCache {
    SchemaCache::new(bundled_schema_dir(), 16)
}

pub fn read_fixture(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}

/// Write `content` to `name` inside a new temporary directory
pub fn write_temp(name: &str, content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    (temp_dir, path)
}

/// Text of every node matched by a plain XPath
pub fn xpath_texts(document: &XmlDocument, xpath: &str) -> Vec<String> {
    document
        .root()
        .xpath_nodes(xpath, &XPathVariables::new())
        .unwrap()
        .into_iter()
        .map(|node| node.content())
        .collect()
}

/// Names of the element children of the first node matched by `xpath`, in document order
pub fn child_names(document: &XmlDocument, xpath: &str) -> Vec<String> {
    let nodes = document
        .root()
        .xpath_nodes(xpath, &XPathVariables::new())
        .unwrap();
    nodes
        .first()
        .unwrap_or_else(|| panic!("nothing found at {}", xpath))
        .children()
        .into_iter()
        .map(|child| child.name())
        .collect()
}
