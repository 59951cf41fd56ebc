//! Schema dictionaries: a digested, name-indexed form of the Fleur XML schemas.
//!
//! A dictionary answers "where does X live in this document version, and what type is
//! it". Names are looked up case-insensitively; every emitted XPath uses the canonical
//! case of the schema.
//!
//! Lookups share one engine: collect the candidate paths of a name, keep those containing
//! every `contains` phrase and none of the `not_contains` phrases, optionally restrict
//! attributes to a parent tag or drop uniqueness classes, optionally make the paths
//! relative to a tag on the path, and demand exactly one survivor.

pub mod cache;
pub(crate) mod parser;
pub mod version;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::case_insensitive::{CaseInsensitiveMap, CaseInsensitiveSet};
use crate::error::{FleurError, Result};
use crate::libxml2::{ParseOptions, XmlDocument, XmlSchemaPtr};
use parser::{ParsedSchema, TagRecord, parse_schema};

pub use cache::SchemaCache;
pub use version::{SchemaVersion, VersionRange};

/// Base types a value of an attribute or text may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    /// `T` / `F`
    Switch,
    Int,
    Float,
    /// Arithmetic expression over numbers and named constants
    FloatExpression,
    /// String restricted to an enumeration
    StringEnum,
    String,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Switch => "switch",
            BaseType::Int => "int",
            BaseType::Float => "float",
            BaseType::FloatExpression => "float_expression",
            BaseType::StringEnum => "string_enum",
            BaseType::String => "string",
        };
        f.write_str(name)
    }
}

/// Number of whitespace separated items
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Length {
    Single,
    Fixed(usize),
    Unbounded,
}

/// One admissible type of an attribute or text
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TypeDefinition {
    pub base_type: BaseType,
    pub length: Length,
    pub enumeration: Vec<String>,
}

impl TypeDefinition {
    pub fn single(base_type: BaseType) -> Self {
        Self {
            base_type,
            length: Length::Single,
            enumeration: Vec::new(),
        }
    }

    pub fn with_length(mut self, length: Length) -> Self {
        self.length = length;
        self
    }

    pub fn is_list(&self) -> bool {
        self.length != Length::Single
    }
}

impl fmt::Display for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Length::Single => write!(f, "{}", self.base_type),
            Length::Fixed(n) => write!(f, "{}[{}]", self.base_type, n),
            Length::Unbounded => write!(f, "{}[]", self.base_type),
        }
    }
}

/// Ordered admissible types of a name (the union-of-types model)
///
/// The definitions of a name are merged from every path it occurs at, so the schema gives
/// them no single order. The list is kept in the order of [`BaseType`] (`switch`, `int`,
/// `float`, expressions, enumerations, plain strings), and this is the order parsing tries
/// them in. A string alternative therefore never shadows a numeric one, whatever order the
/// tags were declared in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueType {
    definitions: Vec<TypeDefinition>,
}

impl ValueType {
    pub fn new(definitions: impl IntoIterator<Item = TypeDefinition>) -> Self {
        let mut value_type = ValueType::default();
        value_type.extend(definitions);
        value_type
    }

    pub fn extend(&mut self, definitions: impl IntoIterator<Item = TypeDefinition>) {
        for definition in definitions {
            if !self.definitions.contains(&definition) {
                self.definitions.push(definition);
            }
        }
        self.definitions.sort();
    }

    pub fn definitions(&self) -> &[TypeDefinition] {
        &self.definitions
    }

    /// Distinct base types in trial order
    pub fn base_types(&self) -> Vec<BaseType> {
        let mut base_types: Vec<BaseType> = Vec::new();
        for definition in &self.definitions {
            if !base_types.contains(&definition.base_type) {
                base_types.push(definition.base_type);
            }
        }
        base_types
    }

    pub fn allows(&self, base_type: BaseType) -> bool {
        self.definitions.iter().any(|d| d.base_type == base_type)
    }

    pub fn allows_list(&self) -> bool {
        self.definitions.iter().any(TypeDefinition::is_list)
    }

    pub fn allows_single(&self) -> bool {
        self.definitions.iter().any(|d| !d.is_list())
    }

    /// Human readable names of the definitions, for error messages
    pub fn type_names(&self) -> Vec<String> {
        self.definitions.iter().map(ToString::to_string).collect()
    }
}

/// Structural record of one tag at one path
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagInfo {
    pub attribs: CaseInsensitiveSet,
    /// Optional attributes with their schema default
    pub optional_attribs: CaseInsensitiveMap<Option<String>>,
    /// Child tags in schema order
    pub order: Vec<String>,
    pub simple: CaseInsensitiveSet,
    pub complex: CaseInsensitiveSet,
    pub several: CaseInsensitiveSet,
    pub text: CaseInsensitiveSet,
    pub optional: CaseInsensitiveSet,
}

impl TagInfo {
    /// Position of `tag` in the schema order of the children
    pub fn order_index(&self, tag: &str) -> Option<usize> {
        self.order.iter().position(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn has_child(&self, tag: &str) -> bool {
        self.simple.contains(tag) || self.complex.contains(tag)
    }
}

/// Uniqueness classes of attribute paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttribClass {
    /// One path, no repeatable tag on it
    Unique,
    /// One path through a repeatable tag
    UniquePath,
    /// Several paths
    Other,
}

impl FromStr for AttribClass {
    type Err = FleurError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unique" => Ok(AttribClass::Unique),
            "unique_path" => Ok(AttribClass::UniquePath),
            "other" => Ok(AttribClass::Other),
            other => Err(FleurError::invalid(format!(
                "unknown attribute class '{}' (expected unique, unique_path or other)",
                other
            ))),
        }
    }
}

impl fmt::Display for AttribClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttribClass::Unique => "unique",
            AttribClass::UniquePath => "unique_path",
            AttribClass::Other => "other",
        })
    }
}

/// Disambiguators for a name lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathFilter {
    /// Every phrase must occur in the path
    pub contains: Vec<String>,
    /// No phrase may occur in the path
    pub not_contains: Vec<String>,
    /// Attribute classes to ignore
    pub exclude: Vec<AttribClass>,
    /// Only attributes directly on this tag
    pub tag_name: Option<String>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(mut self, phrase: impl Into<String>) -> Self {
        self.contains.push(phrase.into());
        self
    }

    pub fn not_contains(mut self, phrase: impl Into<String>) -> Self {
        self.not_contains.push(phrase.into());
        self
    }

    pub fn exclude(mut self, class: AttribClass) -> Self {
        if !self.exclude.contains(&class) {
            self.exclude.push(class);
        }
        self
    }

    pub fn tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.contains.is_empty()
            && self.not_contains.is_empty()
            && self.exclude.is_empty()
            && self.tag_name.is_none()
    }

    fn matches(&self, path: &str) -> bool {
        self.contains.iter().all(|phrase| path.contains(phrase.as_str()))
            && !self
                .not_contains
                .iter()
                .any(|phrase| path.contains(phrase.as_str()))
    }
}

impl fmt::Display for PathFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut parts = Vec::new();
        if !self.contains.is_empty() {
            parts.push(format!("contains={:?}", self.contains));
        }
        if !self.not_contains.is_empty() {
            parts.push(format!("not_contains={:?}", self.not_contains));
        }
        if !self.exclude.is_empty() {
            let classes: Vec<String> = self.exclude.iter().map(ToString::to_string).collect();
            parts.push(format!("exclude={:?}", classes));
        }
        if let Some(tag) = &self.tag_name {
            parts.push(format!("tag_name={}", tag));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Strip `path` to the part below the first `root_tag` step, prefixed by `.`
pub fn make_relative(path: &str, root_tag: &str) -> Option<String> {
    let marker = format!("/{}/", root_tag);
    if let Some(position) = path.find(&marker) {
        return Some(format!("./{}", &path[position + marker.len()..]));
    }
    if path.ends_with(&format!("/{}", root_tag)) {
        return Some(".".to_string());
    }
    None
}

/// Path of the parent element of a tag or attribute path
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let position = trimmed.rfind('/')?;
    match &trimmed[..position] {
        "" => None,
        parent => Some(parent),
    }
}

fn describe_filters(filter: &PathFilter, relative_to: Option<&str>) -> String {
    match relative_to {
        Some(root_tag) => format!("{}, relative to '{}'", filter, root_tag),
        None => filter.to_string(),
    }
}

fn select_path(
    name: &str,
    candidates: Vec<String>,
    filter: &PathFilter,
    relative_to: Option<&str>,
) -> Result<String> {
    let mut remaining = filter_paths(candidates, filter, relative_to);
    match remaining.len() {
        1 => Ok(remaining.remove(0)),
        0 => Err(FleurError::NoPathFound {
            name: name.to_string(),
            filters: describe_filters(filter, relative_to),
        }),
        _ => Err(FleurError::NoUniquePathFound {
            name: name.to_string(),
            filters: describe_filters(filter, relative_to),
            candidates: remaining,
        }),
    }
}

fn filter_paths(
    candidates: Vec<String>,
    filter: &PathFilter,
    relative_to: Option<&str>,
) -> Vec<String> {
    let mut remaining: Vec<String> = Vec::new();
    for path in candidates.into_iter().filter(|path| filter.matches(path)) {
        let path = match relative_to {
            Some(root_tag) => match make_relative(&path, root_tag) {
                Some(relative) => relative,
                None => continue,
            },
            None => path,
        };
        if !remaining.contains(&path) {
            remaining.push(path);
        }
    }
    remaining
}

/// Name → path tables for one family of paths (absolute, or relative to an iteration)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathTables {
    pub tag_paths: CaseInsensitiveMap<Vec<String>>,
    pub unique_attribs: CaseInsensitiveMap<Vec<String>>,
    pub unique_path_attribs: CaseInsensitiveMap<Vec<String>>,
    pub other_attribs: CaseInsensitiveMap<Vec<String>>,
}

impl PathTables {
    /// Build the tables from `(record, emitted path, repeatable steps)` triples
    fn build<'a>(entries: impl Iterator<Item = (&'a TagRecord, String, &'a [bool])>) -> Self {
        let mut tables = PathTables::default();
        let mut attrib_paths: CaseInsensitiveMap<Vec<(String, bool)>> = CaseInsensitiveMap::new();

        for (record, path, steps) in entries {
            let paths = tables
                .tag_paths
                .get_or_insert_with(&record.name, Vec::new);
            if !paths.contains(&path) {
                paths.push(path.clone());
            }
            let repeatable = steps.iter().any(|several| *several);
            for attrib in record.info.attribs.iter() {
                attrib_paths
                    .get_or_insert_with(attrib, Vec::new)
                    .push((format!("{}/@{}", path, attrib), repeatable));
            }
        }

        for (name, paths) in attrib_paths.iter() {
            let plain: Vec<String> = paths.iter().map(|(path, _)| path.clone()).collect();
            let table = match paths.as_slice() {
                [(_, false)] => &mut tables.unique_attribs,
                [(_, true)] => &mut tables.unique_path_attribs,
                _ => &mut tables.other_attribs,
            };
            table.insert(name, plain);
        }
        tables
    }

    fn tag_candidates(&self, name: &str) -> Vec<String> {
        self.tag_paths.get(name).cloned().unwrap_or_default()
    }

    fn attrib_candidates(&self, name: &str, filter: &PathFilter) -> Vec<String> {
        let mut candidates = Vec::new();
        for (class, table) in [
            (AttribClass::Unique, &self.unique_attribs),
            (AttribClass::UniquePath, &self.unique_path_attribs),
            (AttribClass::Other, &self.other_attribs),
        ] {
            if filter.exclude.contains(&class) {
                continue;
            }
            if let Some(paths) = table.get(name) {
                candidates.extend(paths.iter().cloned());
            }
        }
        if let Some(tag) = &filter.tag_name {
            candidates.retain(|path| {
                parent_path(path)
                    .and_then(|parent| parent.rsplit('/').next())
                    .is_some_and(|step| step.eq_ignore_ascii_case(tag))
            });
        }
        candidates
    }

    pub fn tag_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        select_path(name, self.tag_candidates(name), filter, None)
    }

    pub fn relative_tag_xpath(
        &self,
        name: &str,
        root_tag: &str,
        filter: &PathFilter,
    ) -> Result<String> {
        select_path(name, self.tag_candidates(name), filter, Some(root_tag))
    }

    pub fn attrib_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        select_path(name, self.attrib_candidates(name, filter), filter, None)
    }

    pub fn relative_attrib_xpath(
        &self,
        name: &str,
        root_tag: &str,
        filter: &PathFilter,
    ) -> Result<String> {
        select_path(
            name,
            self.attrib_candidates(name, filter),
            filter,
            Some(root_tag),
        )
    }

    /// All tag paths of `name` surviving the filter, without demanding uniqueness
    pub fn all_tag_paths(&self, name: &str, filter: &PathFilter) -> Vec<String> {
        filter_paths(self.tag_candidates(name), filter, None)
    }

    /// All attribute paths of `name` surviving the filter, without demanding uniqueness
    pub fn all_attrib_paths(&self, name: &str, filter: &PathFilter) -> Vec<String> {
        filter_paths(self.attrib_candidates(name, filter), filter, None)
    }

    /// Uniqueness class of an attribute name, if it is known
    pub fn attrib_class(&self, name: &str) -> Option<AttribClass> {
        if self.unique_attribs.contains_key(name) {
            Some(AttribClass::Unique)
        } else if self.unique_path_attribs.contains_key(name) {
            Some(AttribClass::UniquePath)
        } else if self.other_attribs.contains_key(name) {
            Some(AttribClass::Other)
        } else {
            None
        }
    }
}

/// Tables shared by input and output schema dictionaries
#[derive(Debug, Clone)]
pub struct SchemaDict {
    root_tag: String,
    tables: PathTables,
    attrib_types: CaseInsensitiveMap<ValueType>,
    text_types: CaseInsensitiveMap<ValueType>,
    text_tags: CaseInsensitiveSet,
    tag_info: BTreeMap<String, TagInfo>,
    omitt_contained_tags: CaseInsensitiveSet,
}

impl SchemaDict {
    fn from_parsed<'a>(
        parsed: &'a ParsedSchema,
        records: impl Iterator<Item = &'a TagRecord>,
    ) -> Self {
        let records: Vec<&TagRecord> = records.collect();
        let tables = PathTables::build(
            records
                .iter()
                .map(|record| (*record, record.path.clone(), record.several_steps.as_slice())),
        );

        let mut omitt_contained_tags = CaseInsensitiveSet::new();
        for record in &parsed.tags {
            let info = &record.info;
            if info.order.len() == 1
                && info.several.contains(&info.order[0])
                && info.attribs.is_empty()
                && !parsed.text_tags.contains(&record.name)
            {
                omitt_contained_tags.insert(record.name.clone());
            }
        }

        SchemaDict {
            root_tag: parsed.root_tag.clone(),
            tables,
            attrib_types: parsed.attrib_types.clone(),
            text_types: parsed.text_types.clone(),
            text_tags: parsed.text_tags.clone(),
            tag_info: parsed
                .tags
                .iter()
                .map(|record| (record.path.clone(), record.info.clone()))
                .collect(),
            omitt_contained_tags,
        }
    }

    pub fn root_tag(&self) -> &str {
        &self.root_tag
    }

    pub fn tables(&self) -> &PathTables {
        &self.tables
    }

    pub fn tag_paths(&self) -> &CaseInsensitiveMap<Vec<String>> {
        &self.tables.tag_paths
    }

    pub fn attrib_types(&self) -> &CaseInsensitiveMap<ValueType> {
        &self.attrib_types
    }

    pub fn text_types(&self) -> &CaseInsensitiveMap<ValueType> {
        &self.text_types
    }

    pub fn text_tags(&self) -> &CaseInsensitiveSet {
        &self.text_tags
    }

    /// Wrapper tags that only hold repetitions of a single child tag
    pub fn omitt_contained_tags(&self) -> &CaseInsensitiveSet {
        &self.omitt_contained_tags
    }

    /// All tag records keyed by absolute simple XPath
    pub fn tag_info_table(&self) -> &BTreeMap<String, TagInfo> {
        &self.tag_info
    }

    /// Admissible types of an attribute
    pub fn attrib_type(&self, name: &str) -> Result<&ValueType> {
        self.attrib_types.get(name).ok_or_else(|| FleurError::NoPathFound {
            name: name.to_string(),
            filters: "attribute types".to_string(),
        })
    }

    /// Admissible types of the text of a tag
    pub fn text_type(&self, name: &str) -> Result<&ValueType> {
        self.text_types.get(name).ok_or_else(|| FleurError::NoPathFound {
            name: name.to_string(),
            filters: "text types".to_string(),
        })
    }

    /// Record of the tag at an absolute simple path
    pub fn tag_info_at(&self, path: &str) -> Result<&TagInfo> {
        self.tag_info.get(path).ok_or_else(|| FleurError::NoPathFound {
            name: path.to_string(),
            filters: "tag info".to_string(),
        })
    }

    pub fn tag_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        self.tables.tag_xpath(name, filter)
    }

    pub fn relative_tag_xpath(
        &self,
        name: &str,
        root_tag: &str,
        filter: &PathFilter,
    ) -> Result<String> {
        self.tables.relative_tag_xpath(name, root_tag, filter)
    }

    pub fn attrib_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        self.tables.attrib_xpath(name, filter)
    }

    pub fn relative_attrib_xpath(
        &self,
        name: &str,
        root_tag: &str,
        filter: &PathFilter,
    ) -> Result<String> {
        self.tables.relative_attrib_xpath(name, root_tag, filter)
    }

    /// Record of the tag `name` (or of its parent) together with the resolved path
    ///
    /// With `multiple_paths`, several matching paths are accepted as long as their
    /// records are equal; the first path is returned.
    pub fn tag_info(
        &self,
        name: &str,
        filter: &PathFilter,
        parent: bool,
        multiple_paths: bool,
    ) -> Result<(&TagInfo, String)> {
        let paths = if multiple_paths {
            let paths = self.tables.all_tag_paths(name, filter);
            if paths.is_empty() {
                return Err(FleurError::NoPathFound {
                    name: name.to_string(),
                    filters: filter.to_string(),
                });
            }
            paths
        } else {
            vec![self.tag_xpath(name, filter)?]
        };
        self.common_tag_info(name, filter, paths, parent)
    }

    fn common_tag_info(
        &self,
        name: &str,
        filter: &PathFilter,
        paths: Vec<String>,
        parent: bool,
    ) -> Result<(&TagInfo, String)> {
        let mut selected: Option<(&TagInfo, String)> = None;
        for path in &paths {
            let lookup = if parent {
                parent_path(path)
                    .ok_or_else(|| FleurError::invalid(format!("'{}' has no parent tag", path)))?
            } else {
                path.as_str()
            };
            let info = self.tag_info_at(lookup)?;
            match &selected {
                None => selected = Some((info, lookup.to_string())),
                Some((first, _)) if *first == info => {}
                Some(_) => {
                    return Err(FleurError::NoUniquePathFound {
                        name: name.to_string(),
                        filters: format!("{} (tag records differ)", filter),
                        candidates: paths.clone(),
                    });
                }
            }
        }
        selected.ok_or_else(|| FleurError::NoPathFound {
            name: name.to_string(),
            filters: filter.to_string(),
        })
    }
}

/// Tables of the paths below the `iteration` element of output files
#[derive(Debug, Clone)]
pub struct IterationTables {
    iteration_path: String,
    tables: PathTables,
}

impl IterationTables {
    /// Absolute path of the iteration element
    pub fn iteration_path(&self) -> &str {
        &self.iteration_path
    }

    pub fn tables(&self) -> &PathTables {
        &self.tables
    }

    /// Convert an iteration-relative path into an absolute simple path
    pub fn absolute(&self, relative: &str) -> String {
        match relative.strip_prefix('.') {
            Some(rest) => format!("{}{}", self.iteration_path, rest),
            None => relative.to_string(),
        }
    }

    pub fn iteration_tag_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        self.tables.tag_xpath(name, filter)
    }

    pub fn relative_iteration_tag_xpath(
        &self,
        name: &str,
        root_tag: &str,
        filter: &PathFilter,
    ) -> Result<String> {
        self.tables.relative_tag_xpath(name, root_tag, filter)
    }

    pub fn iteration_attrib_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        self.tables.attrib_xpath(name, filter)
    }

    pub fn relative_iteration_attrib_xpath(
        &self,
        name: &str,
        root_tag: &str,
        filter: &PathFilter,
    ) -> Result<String> {
        self.tables.relative_attrib_xpath(name, root_tag, filter)
    }
}

/// Common interface of input and output schema dictionaries
pub trait SchemaDictionary: Send + Sync + fmt::Debug {
    fn dict(&self) -> &SchemaDict;

    /// Version of the input schema (for output dictionaries: of the embedded input)
    fn input_version(&self) -> SchemaVersion;

    fn output_version(&self) -> Option<SchemaVersion> {
        None
    }

    /// Iteration tables; only output dictionaries have them
    fn iteration(&self) -> Option<&IterationTables> {
        None
    }

    /// Whether a newer schema stands in for the requested version
    fn fallback(&self) -> bool;

    /// Compiled schema for validating documents, if available
    fn xml_schema(&self) -> Option<&XmlSchemaPtr> {
        None
    }

    /// Record of the tag at a simple path, absolute or relative to the iteration element
    fn tag_info_for_path(&self, path: &str) -> Result<&TagInfo> {
        match (path.starts_with('.'), self.iteration()) {
            (true, Some(iteration)) => self.dict().tag_info_at(&iteration.absolute(path)),
            _ => self.dict().tag_info_at(path),
        }
    }
}

fn read_schema_document(path: &Path) -> Result<XmlDocument> {
    XmlDocument::parse_file(path, ParseOptions::plain()).map_err(|e| FleurError::SchemaParsing {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

fn schema_version_of(parsed: &ParsedSchema, path: &Path) -> Result<SchemaVersion> {
    parsed
        .version
        .as_deref()
        .ok_or_else(|| FleurError::SchemaParsing {
            path: path.to_path_buf(),
            details: "schema has no version attribute".to_string(),
        })?
        .parse()
}

/// Schema dictionary of Fleur input files
#[derive(Debug, Clone)]
pub struct InputSchemaDict {
    dict: SchemaDict,
    inp_version: SchemaVersion,
    fallback: bool,
    source: PathBuf,
    xml_schema: XmlSchemaPtr,
}

impl InputSchemaDict {
    /// Build the dictionary from a `FleurInputSchema.xsd` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let document = read_schema_document(path)?;
        let parsed = parse_schema(&document, &[], path)?;
        let inp_version = schema_version_of(&parsed, path)?;
        let xml_schema = XmlSchemaPtr::from_file(path)?;
        Ok(InputSchemaDict {
            dict: SchemaDict::from_parsed(&parsed, parsed.tags.iter()),
            inp_version,
            fallback: false,
            source: path.to_path_buf(),
            xml_schema,
        })
    }

    /// Cached dictionary for a version from the global schema cache
    pub fn from_version(version: &str) -> Result<Arc<Self>> {
        SchemaCache::global().input(version)
    }

    pub fn inp_version(&self) -> SchemaVersion {
        self.inp_version
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub(crate) fn mark_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

impl std::ops::Deref for InputSchemaDict {
    type Target = SchemaDict;

    fn deref(&self) -> &SchemaDict {
        &self.dict
    }
}

impl SchemaDictionary for InputSchemaDict {
    fn dict(&self) -> &SchemaDict {
        &self.dict
    }

    fn input_version(&self) -> SchemaVersion {
        self.inp_version
    }

    fn fallback(&self) -> bool {
        self.fallback
    }

    fn xml_schema(&self) -> Option<&XmlSchemaPtr> {
        Some(&self.xml_schema)
    }
}

/// Schema dictionary of Fleur output files
#[derive(Debug, Clone)]
pub struct OutputSchemaDict {
    dict: SchemaDict,
    out_version: SchemaVersion,
    inp_version: SchemaVersion,
    input_tag: String,
    iteration: IterationTables,
    fallback: bool,
}

const ITERATION_TAG: &str = "iteration";

impl OutputSchemaDict {
    /// Build the dictionary from `FleurOutputSchema.xsd`; types the output schema
    /// borrows from the input schema are looked up in `input_schema`
    pub fn from_files(output_schema: &Path, input_schema: &Path) -> Result<Self> {
        let output_document = read_schema_document(output_schema)?;
        let input_document = read_schema_document(input_schema)?;
        let parsed = parse_schema(&output_document, &[&input_document], output_schema)?;
        let input_parsed = parse_schema(&input_document, &[], input_schema)?;

        let out_version = schema_version_of(&parsed, output_schema)?;
        let inp_version = schema_version_of(&input_parsed, input_schema)?;

        let iteration_records: Vec<&TagRecord> = parsed
            .tags
            .iter()
            .filter(|record| record.name == ITERATION_TAG)
            .collect();
        let iteration_record = match iteration_records.as_slice() {
            [record] => *record,
            _ => {
                return Err(FleurError::SchemaParsing {
                    path: output_schema.to_path_buf(),
                    details: format!(
                        "expected exactly one '{}' element, found {}",
                        ITERATION_TAG,
                        iteration_records.len()
                    ),
                });
            }
        };
        let iteration_path = iteration_record.path.clone();
        let iteration_depth = iteration_record.several_steps.len();
        let below_iteration = format!("{}/", iteration_path);

        let dict = SchemaDict::from_parsed(
            &parsed,
            parsed
                .tags
                .iter()
                .filter(|record| !record.path.starts_with(&below_iteration)),
        );
        let iteration_tables = PathTables::build(
            parsed
                .tags
                .iter()
                .filter(|record| {
                    record.path == iteration_path || record.path.starts_with(&below_iteration)
                })
                .map(|record| {
                    let relative = format!(".{}", &record.path[iteration_path.len()..]);
                    (record, relative, &record.several_steps[iteration_depth..])
                }),
        );

        Ok(OutputSchemaDict {
            dict,
            out_version,
            inp_version,
            input_tag: input_parsed.root_tag,
            iteration: IterationTables {
                iteration_path,
                tables: iteration_tables,
            },
            fallback: false,
        })
    }

    /// Cached dictionary for an output version (and optionally a different input version)
    pub fn from_version(out_version: &str, inp_version: Option<&str>) -> Result<Arc<Self>> {
        SchemaCache::global().output(out_version, inp_version)
    }

    pub fn out_version(&self) -> SchemaVersion {
        self.out_version
    }

    pub fn inp_version(&self) -> SchemaVersion {
        self.inp_version
    }

    /// Name of the element holding the embedded input
    pub fn input_tag(&self) -> &str {
        &self.input_tag
    }

    pub fn iteration_tables(&self) -> &IterationTables {
        &self.iteration
    }

    pub fn iteration_tag_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        self.iteration.iteration_tag_xpath(name, filter)
    }

    pub fn iteration_attrib_xpath(&self, name: &str, filter: &PathFilter) -> Result<String> {
        self.iteration.iteration_attrib_xpath(name, filter)
    }

    pub(crate) fn mark_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

impl std::ops::Deref for OutputSchemaDict {
    type Target = SchemaDict;

    fn deref(&self) -> &SchemaDict {
        &self.dict
    }
}

impl SchemaDictionary for OutputSchemaDict {
    fn dict(&self) -> &SchemaDict {
        &self.dict
    }

    fn input_version(&self) -> SchemaVersion {
        self.inp_version
    }

    fn output_version(&self) -> Option<SchemaVersion> {
        Some(self.out_version)
    }

    fn iteration(&self) -> Option<&IterationTables> {
        Some(&self.iteration)
    }

    fn fallback(&self) -> bool {
        self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_relative() {
        assert_eq!(
            make_relative("/fleurInput/atomSpecies/species/mtSphere/@radius", "species"),
            Some("./mtSphere/@radius".to_string())
        );
        assert_eq!(
            make_relative("/fleurInput/atomSpecies/species", "species"),
            Some(".".to_string())
        );
        assert_eq!(make_relative("/fleurInput/cell", "species"), None);
        assert_eq!(
            make_relative("./densityConvergence/chargeDensity", "densityConvergence"),
            Some("./chargeDensity".to_string())
        );
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b/@c"), Some("/a/b"));
        assert_eq!(parent_path("/a/b"), Some("/a"));
        assert_eq!(parent_path("/a"), None);
    }

    #[test]
    fn test_path_filter_display() {
        assert_eq!(PathFilter::new().to_string(), "none");
        let filter = PathFilter::new()
            .contains("species")
            .exclude(AttribClass::Other);
        let text = filter.to_string();
        assert!(text.contains("species"));
        assert!(text.contains("other"));
    }

    #[test]
    fn test_select_path_outcomes() {
        let candidates = vec![
            "/fleurInput/calculationSetup/ldaU".to_string(),
            "/fleurInput/atomSpecies/species/ldaU".to_string(),
            "/fleurInput/atomGroups/atomGroup/ldaU".to_string(),
        ];
        let found = select_path(
            "ldaU",
            candidates.clone(),
            &PathFilter::new().contains("species"),
            None,
        )
        .unwrap();
        assert_eq!(found, "/fleurInput/atomSpecies/species/ldaU");

        match select_path("ldaU", candidates.clone(), &PathFilter::new(), None) {
            Err(FleurError::NoUniquePathFound { candidates, .. }) => {
                assert_eq!(candidates.len(), 3)
            }
            other => panic!("Expected NoUniquePathFound, got {:?}", other),
        }

        let missing = select_path(
            "ldaU",
            candidates,
            &PathFilter::new().contains("output"),
            None,
        );
        assert!(matches!(missing, Err(FleurError::NoPathFound { .. })));
    }

    #[test]
    fn test_merged_definitions_do_not_depend_on_declaration_order() {
        let declared_first = ValueType::new([
            TypeDefinition::single(BaseType::String),
            TypeDefinition::single(BaseType::Float),
            TypeDefinition::single(BaseType::Switch),
        ]);
        let mut merged_later = ValueType::new([TypeDefinition::single(BaseType::Switch)]);
        merged_later.extend([TypeDefinition::single(BaseType::Float)]);
        merged_later.extend([TypeDefinition::single(BaseType::String)]);

        assert_eq!(declared_first, merged_later);
        assert_eq!(
            declared_first.base_types(),
            vec![BaseType::Switch, BaseType::Float, BaseType::String]
        );
    }

    #[test]
    fn test_value_type_ordering() {
        let value_type = ValueType::new([
            TypeDefinition::single(BaseType::String),
            TypeDefinition::single(BaseType::Int),
            TypeDefinition::single(BaseType::Int),
        ]);
        assert_eq!(value_type.base_types(), vec![BaseType::Int, BaseType::String]);
        assert_eq!(value_type.type_names(), vec!["int", "string"]);
    }
}
