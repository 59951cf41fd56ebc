//! Name-based setters. Each one resolves the short name with the schema dictionary,
//! refines the path with `filters` or a complex XPath, and hands over to the path-bearing
//! setter.

use serde_json::Value as JsonValue;

use crate::converters::Value;
use crate::error::{FleurError, Result};
use crate::libxml2::{XmlNode, XmlNodeMut};
use crate::query::{ComplexXPath, EvalOptions, refine_xpath};
use crate::schema_dict::{AttribClass, PathFilter, SchemaDictionary, parent_path};

use super::basic::{
    NewElement, Occurrences, TargetPath, xml_create_tag, xml_delete_att, xml_delete_tag,
    xml_ensure_tag, xml_replace_tag,
};
use super::xpaths::{
    AddMode, WriteOptions, xml_add_number_to_attrib, xml_set_attrib_value,
    xml_set_complex_tag, xml_set_simple_tag, xml_set_text,
};

/// Disambiguation and behaviour of the name-based setters
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub path_filter: PathFilter,
    /// Refinement of the tag path (for attributes: of the tag holding them)
    pub complex_xpath: Option<ComplexXPath>,
    pub filters: Option<JsonValue>,
    pub occurrences: Occurrences,
    /// Create missing tags
    pub create: bool,
    /// Create missing parents of new tags
    pub create_parents: bool,
    pub write: WriteOptions,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(mut self, phrase: impl Into<String>) -> Self {
        self.path_filter = self.path_filter.contains(phrase);
        self
    }

    pub fn not_contains(mut self, phrase: impl Into<String>) -> Self {
        self.path_filter = self.path_filter.not_contains(phrase);
        self
    }

    pub fn exclude(mut self, class: AttribClass) -> Self {
        self.path_filter = self.path_filter.exclude(class);
        self
    }

    pub fn tag_name(mut self, tag: impl Into<String>) -> Self {
        self.path_filter = self.path_filter.tag_name(tag);
        self
    }

    pub fn complex_xpath(mut self, complex_xpath: ComplexXPath) -> Self {
        self.complex_xpath = Some(complex_xpath);
        self
    }

    pub fn filters(mut self, filters: JsonValue) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn occurrences(mut self, occurrences: impl Into<Occurrences>) -> Self {
        self.occurrences = occurrences.into();
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn create_parents(mut self, create_parents: bool) -> Self {
        self.create_parents = create_parents;
        self
    }

    pub fn correct_order(mut self, correct_order: bool) -> Self {
        self.write.correct_order = correct_order;
        self
    }

    pub fn float_precision(mut self, float_precision: usize) -> Self {
        self.write.float_precision = float_precision;
        self
    }
}

/// Refine a simple tag path with the filters and complex XPath of `options`
fn resolve_target(root: XmlNodeMut<'_>, simple: &str, options: &SetOptions) -> Result<TargetPath> {
    let eval = EvalOptions {
        complex_xpath: options.complex_xpath.clone(),
        filters: options.filters.clone(),
        ..EvalOptions::default()
    };
    let (xpath, variables) = refine_xpath(root.as_node(), simple, &eval)?;
    Ok(TargetPath::new(xpath, variables, simple))
}

fn parent_of(path: &str) -> Result<&str> {
    parent_path(path).ok_or_else(|| FleurError::invalid(format!("'{}' has no parent tag", path)))
}

fn last_step(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Tag path holding the attribute `name` and the canonical attribute name
fn attribute_target(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &SetOptions,
) -> Result<(TargetPath, String)> {
    let attrib_path = schema.dict().attrib_xpath(name, &options.path_filter)?;
    let attrib = last_step(&attrib_path).trim_start_matches('@').to_string();
    let target = resolve_target(root, parent_of(&attrib_path)?, options)?;
    Ok((target, attrib))
}

/// Create a tag below its (possibly filtered) parents
pub fn create_tag<'d>(
    root: XmlNodeMut<'d>,
    schema: &dyn SchemaDictionary,
    element: NewElement<'_>,
    options: &SetOptions,
) -> Result<Vec<XmlNodeMut<'d>>> {
    let tag_path = schema.dict().tag_xpath(&element.name(), &options.path_filter)?;
    let target = resolve_target(root, parent_of(&tag_path)?, options)?;
    if options.create_parents {
        xml_ensure_tag(root, schema, &target, true, options.write.correct_order)?;
    }
    let element = match element {
        NewElement::Tag(_) => NewElement::Tag(last_step(&tag_path)),
        copy => copy,
    };
    xml_create_tag(
        root,
        schema,
        &target,
        element,
        &options.occurrences,
        options.write.correct_order,
    )
}

pub fn delete_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &SetOptions,
) -> Result<usize> {
    let tag_path = schema.dict().tag_xpath(name, &options.path_filter)?;
    let target = resolve_target(root, &tag_path, options)?;
    xml_delete_tag(root, &target, &options.occurrences)
}

pub fn delete_att(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &SetOptions,
) -> Result<usize> {
    let (target, attrib) = attribute_target(root, schema, name, options)?;
    xml_delete_att(root, &target, &attrib, &options.occurrences)
}

pub fn replace_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    element: XmlNode<'_>,
    options: &SetOptions,
) -> Result<usize> {
    let tag_path = schema.dict().tag_xpath(name, &options.path_filter)?;
    let target = resolve_target(root, &tag_path, options)?;
    xml_replace_tag(root, &target, element, &options.occurrences)
}

/// Set the attribute `name`; a list gives one value per selected tag
pub fn set_attrib_value(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    value: &Value,
    options: &SetOptions,
) -> Result<usize> {
    let (target, attrib) = attribute_target(root, schema, name, options)?;
    xml_set_attrib_value(
        root,
        schema,
        &target,
        &attrib,
        value,
        &options.occurrences,
        options.create,
        options.write,
    )
}

pub fn set_first_attrib_value(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    value: &Value,
    options: &SetOptions,
) -> Result<usize> {
    let options = options.clone().occurrences(Occurrences::first());
    set_attrib_value(root, schema, name, value, &options)
}

pub fn set_text(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    value: &Value,
    options: &SetOptions,
) -> Result<usize> {
    let tag_path = schema.dict().tag_xpath(name, &options.path_filter)?;
    let target = resolve_target(root, &tag_path, options)?;
    xml_set_text(
        root,
        schema,
        &target,
        value,
        &options.occurrences,
        options.create,
        options.write,
    )
}

pub fn set_first_text(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    value: &Value,
    options: &SetOptions,
) -> Result<usize> {
    let options = options.clone().occurrences(Occurrences::first());
    set_text(root, schema, name, value, &options)
}

pub fn add_number_to_attrib(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    number: f64,
    mode: AddMode,
    options: &SetOptions,
) -> Result<usize> {
    let (target, attrib) = attribute_target(root, schema, name, options)?;
    xml_add_number_to_attrib(
        root,
        schema,
        &target,
        &attrib,
        number,
        mode,
        &options.occurrences,
        options.write,
    )
}

pub fn add_number_to_first_attrib(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    number: f64,
    mode: AddMode,
    options: &SetOptions,
) -> Result<usize> {
    let options = options.clone().occurrences(Occurrences::first());
    add_number_to_attrib(root, schema, name, number, mode, &options)
}

/// Set a tag holding only attributes; see [`xml_set_simple_tag`]
pub fn set_simple_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    changes: &Value,
    options: &SetOptions,
) -> Result<()> {
    let tag_path = schema.dict().tag_xpath(name, &options.path_filter)?;
    let target = resolve_target(root, parent_of(&tag_path)?, options)?;
    xml_set_simple_tag(
        root,
        schema,
        &target,
        last_step(&tag_path),
        changes,
        options.create_parents,
        options.write,
    )
}

/// Apply nested changes to a tag; see [`xml_set_complex_tag`]
pub fn set_complex_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    changes: &Value,
    options: &SetOptions,
) -> Result<()> {
    let tag_path = schema.dict().tag_xpath(name, &options.path_filter)?;
    let target = resolve_target(root, &tag_path, options)?;
    xml_set_complex_tag(root, schema, &target, changes, options.create, options.write)
}
