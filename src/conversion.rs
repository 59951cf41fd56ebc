//! Conversion of input files between schema versions.
//!
//! A conversion is described in JSON by whoever reviewed the differences between two
//! schema versions:
//!
//! ```json
//! {
//!   "from": "0.33",
//!   "to": "0.34",
//!   "tag": {
//!     "remove": ["/fleurInput/calculationSetup/oldTag"],
//!     "create": ["kPointLists"],
//!     "move": [{"name": "bzIntegration",
//!               "old_path": "/fleurInput/calculationSetup/bzIntegration",
//!               "new_path": "/fleurInput/cell/bzIntegration"}]
//!   },
//!   "attrib": {
//!     "remove": ["gamma"],
//!     "create": [{"name": "listName", "path": "/fleurInput/cell/bzIntegration/kPointListSelection", "value": "default"}],
//!     "move": []
//!   }
//! }
//! ```
//!
//! Moves are applied first, then removals, then creations. Names are resolved with the
//! schema they belong to: removals with the `from` schema, creations and the targets of
//! moves with the `to` schema. Entries may also be given as absolute paths, which is
//! needed to remove what was moved to a location only the `to` schema knows.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::converters::Value;
use crate::error::{FleurError, Result};
use crate::libxml2::{ValidationResult, XPathVariables, XmlDocument, XmlNodeMut, outermost_nodes};
use crate::schema_dict::{PathFilter, SchemaCache, SchemaDictionary, SchemaVersion};
use crate::setters::basic::{NewElement, TargetPath, create_child, xml_ensure_tag};
use crate::setters::xpaths::WriteOptions;

/// Reviewer-written description of the differences between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionDescription {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    #[serde(default)]
    pub tag: Changes,
    #[serde(default)]
    pub attrib: Changes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Changes {
    pub remove: Vec<String>,
    pub create: Vec<CreateEntry>,
    #[serde(rename = "move")]
    pub moves: Vec<MoveEntry>,
}

/// A tag or attribute to create, by name or with an explicit location and value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreateEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
}

impl CreateEntry {
    fn name(&self) -> &str {
        match self {
            CreateEntry::Name(name) | CreateEntry::Detailed { name, .. } => name,
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            CreateEntry::Name(_) => None,
            CreateEntry::Detailed { path, .. } => path.as_deref(),
        }
    }

    fn value(&self) -> Option<Value> {
        match self {
            CreateEntry::Name(_) => None,
            CreateEntry::Detailed { value, .. } => value.clone().map(Value::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveEntry {
    pub name: String,
    pub old_path: String,
    pub new_path: String,
}

impl ConversionDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        let description: ConversionDescription = serde_json::from_str(text)?;
        if description.from == description.to {
            return Err(FleurError::invalid(format!(
                "conversion from {} to itself",
                description.from
            )));
        }
        Ok(description)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Summary of an applied conversion
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub removed_tags: usize,
    pub removed_attribs: usize,
    pub moved: usize,
    pub created: usize,
    pub validation: ValidationResult,
}

fn tag_paths(schema: &dyn SchemaDictionary, entry: &str) -> Vec<String> {
    if entry.starts_with('/') {
        vec![entry.to_string()]
    } else {
        schema.dict().tables().all_tag_paths(entry, &PathFilter::new())
    }
}

fn attrib_paths(schema: &dyn SchemaDictionary, entry: &str) -> Vec<String> {
    if entry.starts_with('/') {
        vec![entry.to_string()]
    } else {
        schema.dict().tables().all_attrib_paths(entry, &PathFilter::new())
    }
}

fn split_attrib_path(path: &str) -> Result<(&str, &str)> {
    path.rsplit_once("/@")
        .ok_or_else(|| FleurError::invalid(format!("'{}' is not an attribute path", path)))
}

fn nodes<'d>(root: XmlNodeMut<'d>, path: &str) -> Result<Vec<XmlNodeMut<'d>>> {
    Ok(root.xpath_nodes(path, &XPathVariables::new())?)
}

/// Apply `description` to `document`, which must be an input file of version
/// `description.from`, and validate the result against the `to` schema
///
/// The version attribute of the root is updated. A document that does not validate is
/// still converted; inspect [`ConversionReport::validation`].
pub fn convert_inpxml(
    document: &mut XmlDocument,
    description: &ConversionDescription,
    cache: &SchemaCache,
    write: WriteOptions,
) -> Result<ConversionReport> {
    let declared = document
        .root()
        .attribute("fleurInputVersion")
        .ok_or_else(|| FleurError::SchemaVersion {
            details: "input file has no fleurInputVersion".to_string(),
        })?;
    if declared.parse::<SchemaVersion>()? != description.from {
        return Err(FleurError::SchemaVersion {
            details: format!(
                "conversion starts at {} but the file has version {}",
                description.from, declared
            ),
        });
    }
    let old_schema = cache.input(&description.from.to_string())?;
    let new_schema = cache.input(&description.to.to_string())?;
    log::debug!(
        "Converting {} from {} to {}",
        document.source_name(),
        description.from,
        description.to
    );

    let root = document.root_mut();
    let mut report = ConversionReport {
        removed_tags: 0,
        removed_attribs: 0,
        moved: 0,
        created: 0,
        validation: ValidationResult::Valid,
    };

    for entry in &description.tag.moves {
        report.moved += move_tag(root, new_schema.as_ref(), entry, write)?;
    }
    for entry in &description.attrib.moves {
        report.moved += move_attrib(root, new_schema.as_ref(), entry, write)?;
    }

    for entry in &description.attrib.remove {
        for path in attrib_paths(old_schema.as_ref(), entry) {
            let (tag_path, name) = split_attrib_path(&path)?;
            for node in nodes(root, tag_path)? {
                if node.remove_attribute(name)? {
                    report.removed_attribs += 1;
                }
            }
        }
    }
    for entry in &description.tag.remove {
        for path in tag_paths(old_schema.as_ref(), entry) {
            for node in outermost_nodes(nodes(root, &path)?) {
                node.remove();
                report.removed_tags += 1;
            }
        }
    }

    for entry in &description.tag.create {
        let paths = match entry.path() {
            Some(path) => vec![path.to_string()],
            None => tag_paths(new_schema.as_ref(), entry.name()),
        };
        for path in paths {
            if nodes(root, &path)?.is_empty() {
                xml_ensure_tag(
                    root,
                    new_schema.as_ref(),
                    &TargetPath::simple(&path),
                    true,
                    write.correct_order,
                )?;
                report.created += 1;
            }
        }
    }
    for entry in &description.attrib.create {
        report.created += create_attrib(root, new_schema.as_ref(), entry, write)?;
    }

    root.set_attribute("fleurInputVersion", &description.to.to_string())?;
    if let Some(xml_schema) = new_schema.xml_schema() {
        report.validation = document.validate(xml_schema)?;
    }
    if let ValidationResult::Invalid { errors, .. } = &report.validation {
        log::warn!(
            "Converted document does not validate against {}: {}",
            description.to,
            errors.join("; ")
        );
    }
    Ok(report)
}

fn move_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    entry: &MoveEntry,
    write: WriteOptions,
) -> Result<usize> {
    let (new_parent, new_name) = entry
        .new_path
        .rsplit_once('/')
        .ok_or_else(|| FleurError::invalid(format!("'{}' has no parent", entry.new_path)))?;
    if new_name != entry.name {
        return Err(FleurError::invalid(format!(
            "moving '{}' to {} would rename it",
            entry.name, entry.new_path
        )));
    }
    let sources = nodes(root, &entry.old_path)?;
    if sources.is_empty() {
        return Ok(0);
    }

    let parent_target = TargetPath::simple(new_parent);
    xml_ensure_tag(root, schema, &parent_target, true, write.correct_order)?;
    let parents = nodes(root, new_parent)?;
    let pairs: Vec<_> = match parents.as_slice() {
        [parent] => sources.iter().map(|source| (*parent, *source)).collect(),
        many if many.len() == sources.len() => many.iter().copied().zip(sources.iter().copied()).collect(),
        many => {
            return Err(FleurError::invalid(format!(
                "cannot distribute {} '{}' tags onto {} parents",
                sources.len(),
                entry.name,
                many.len()
            )));
        }
    };
    for (parent, source) in &pairs {
        create_child(
            *parent,
            NewElement::Copy(source.as_node()),
            schema,
            new_parent,
            write.correct_order,
        )?;
        source.remove();
    }
    Ok(pairs.len())
}

fn move_attrib(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    entry: &MoveEntry,
    write: WriteOptions,
) -> Result<usize> {
    let (old_tag, old_name) = split_attrib_path(&entry.old_path)?;
    let (new_tag, new_name) = split_attrib_path(&entry.new_path)?;
    let values: Vec<(XmlNodeMut<'_>, String)> = nodes(root, old_tag)?
        .into_iter()
        .filter_map(|node| node.attribute(old_name).map(|value| (node, value)))
        .collect();
    if values.is_empty() {
        return Ok(0);
    }

    xml_ensure_tag(
        root,
        schema,
        &TargetPath::simple(new_tag),
        true,
        write.correct_order,
    )?;
    let targets = nodes(root, new_tag)?;
    if targets.len() != values.len() && targets.len() != 1 {
        return Err(FleurError::invalid(format!(
            "cannot distribute {} values of '{}' onto {} tags",
            values.len(),
            old_name,
            targets.len()
        )));
    }
    for (node, _) in &values {
        node.remove_attribute(old_name)?;
    }
    for (index, target) in targets.iter().enumerate() {
        let (_, value) = &values[index.min(values.len() - 1)];
        target.set_attribute(new_name, value)?;
    }
    Ok(values.len())
}

fn create_attrib(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    entry: &CreateEntry,
    write: WriteOptions,
) -> Result<usize> {
    let paths = match entry.path() {
        Some(path) if path.contains("/@") => vec![path.to_string()],
        Some(path) => vec![format!("{}/@{}", path, entry.name())],
        None => attrib_paths(schema, entry.name()),
    };
    let mut created = 0;
    for path in paths {
        let (tag_path, name) = split_attrib_path(&path)?;
        let text = match entry.value() {
            Some(value) => crate::converters::convert_to_xml(
                &value,
                schema.dict().attrib_type(name)?,
                name,
                write.float_precision,
            )?,
            None => schema
                .dict()
                .tag_info_at(tag_path)?
                .optional_attribs
                .get(name)
                .cloned()
                .flatten()
                .ok_or_else(|| FleurError::MissingData {
                    details: format!("no value given for new attribute {}", path),
                })?,
        };
        for node in nodes(root, tag_path)? {
            if node.attribute(name).is_none() {
                node.set_attribute(name, &text)?;
                created += 1;
            }
        }
    }
    Ok(created)
}

/// Pick the conversion file for a version pair from a directory of
/// `conversion_<from>_to_<to>.json` files
pub fn conversion_file(directory: &Path, from: SchemaVersion, to: SchemaVersion) -> Result<ConversionDescription> {
    let path = directory.join(format!("conversion_{}_to_{}.json", from, to));
    if !path.is_file() {
        return Err(FleurError::SchemaVersion {
            details: format!("no conversion from {} to {} at {}", from, to, path.display()),
        });
    }
    ConversionDescription::from_file(&path)
}
