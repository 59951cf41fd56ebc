//! Typed setters on explicit XPaths: values are converted with the schema types before
//! they are written.

use std::collections::BTreeMap;

use crate::constants::read_constants;
use crate::converters::{Value, convert_from_xml, convert_to_xml, convert_values_to_xml};
use crate::error::{FleurError, Result};
use crate::libxml2::XmlNodeMut;
use crate::schema_dict::{SchemaDictionary, TagInfo, ValueType};

use super::basic::{
    NewElement, Occurrences, TargetPath, create_child, xml_ensure_tag,
    xml_set_attrib_value_no_create, xml_set_text_no_create,
};

/// How [`xml_add_number_to_attrib`] combines the old value and the number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddMode {
    /// `old + number`
    #[default]
    Abs,
    /// `old * number`
    Rel,
}

impl std::str::FromStr for AddMode {
    type Err = FleurError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abs" => Ok(AddMode::Abs),
            "rel" => Ok(AddMode::Rel),
            other => Err(FleurError::invalid(format!(
                "unknown mode '{}' (expected abs or rel)",
                other
            ))),
        }
    }
}

/// Write options shared by the typed setters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub correct_order: bool,
    pub float_precision: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            correct_order: true,
            float_precision: crate::converters::DEFAULT_FLOAT_PRECISION,
        }
    }
}

fn attrib_type<'s>(schema: &'s dyn SchemaDictionary, name: &str) -> Result<&'s ValueType> {
    schema.dict().attrib_type(name)
}

/// Set the attribute `name` on the tags of `target`
///
/// With `create`, missing tags are created first.
#[allow(clippy::too_many_arguments)]
pub fn xml_set_attrib_value(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    name: &str,
    value: &Value,
    occurrences: &Occurrences,
    create: bool,
    options: WriteOptions,
) -> Result<usize> {
    let texts = convert_values_to_xml(value, attrib_type(schema, name)?, name, options.float_precision)?;
    if create {
        xml_ensure_tag(root, schema, target, true, options.correct_order)?;
    }
    xml_set_attrib_value_no_create(root, target, name, &texts, occurrences)
}

pub fn xml_set_first_attrib_value(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    name: &str,
    value: &Value,
    create: bool,
    options: WriteOptions,
) -> Result<usize> {
    xml_set_attrib_value(
        root,
        schema,
        target,
        name,
        value,
        &Occurrences::first(),
        create,
        options,
    )
}

/// Set the text of the tags of `target`
pub fn xml_set_text(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    value: &Value,
    occurrences: &Occurrences,
    create: bool,
    options: WriteOptions,
) -> Result<usize> {
    let tag = target.tag_name();
    let value_type = schema.dict().text_type(tag)?;
    let texts = convert_values_to_xml(value, value_type, tag, options.float_precision)?;
    if create {
        xml_ensure_tag(root, schema, target, true, options.correct_order)?;
    }
    xml_set_text_no_create(root, target, &texts, occurrences)
}

pub fn xml_set_first_text(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    value: &Value,
    create: bool,
    options: WriteOptions,
) -> Result<usize> {
    xml_set_text(root, schema, target, value, &Occurrences::first(), create, options)
}

/// Add `number` to (or multiply it with) the attribute `name` of the tags of `target`
///
/// Integer attributes stay integers as long as the result is integral.
#[allow(clippy::too_many_arguments)]
pub fn xml_add_number_to_attrib(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    name: &str,
    number: f64,
    mode: AddMode,
    occurrences: &Occurrences,
    options: WriteOptions,
) -> Result<usize> {
    let value_type = attrib_type(schema, name)?;
    let constants = read_constants(root.as_node(), schema, None)?;
    let nodes = occurrences.select(&target.evaluate(root)?)?;
    let mut found = 0;
    for node in nodes {
        let Some(text) = node.attribute(name) else {
            continue;
        };
        let current = convert_from_xml(&text, value_type, &constants, name)?
            .as_f64()
            .ok_or_else(|| FleurError::Conversion {
                name: name.to_string(),
                text: text.clone(),
                types: value_type.type_names(),
                reason: "not a number".to_string(),
            })?;
        let updated = match mode {
            AddMode::Abs => current + number,
            AddMode::Rel => current * number,
        };
        let value = if updated.fract() == 0.0
            && value_type.allows(crate::schema_dict::BaseType::Int)
            && updated.abs() < i64::MAX as f64
        {
            Value::Int(updated as i64)
        } else {
            Value::Float(updated)
        };
        let new_text = convert_to_xml(&value, value_type, name, options.float_precision)?;
        node.set_attribute(name, &new_text)?;
        found += 1;
    }
    if found == 0 {
        return Err(FleurError::MissingData {
            details: format!("no attribute '{}' found at {}", name, target.xpath),
        });
    }
    Ok(found)
}

pub fn xml_add_number_to_first_attrib(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    name: &str,
    number: f64,
    mode: AddMode,
    options: WriteOptions,
) -> Result<usize> {
    xml_add_number_to_attrib(
        root,
        schema,
        target,
        name,
        number,
        mode,
        &Occurrences::first(),
        options,
    )
}

fn changes_as_list<'v>(changes: &'v Value, tag: &str) -> Result<Vec<&'v BTreeMap<String, Value>>> {
    let as_map = |value: &'v Value| {
        value.as_map().ok_or_else(|| {
            FleurError::invalid(format!("changes for '{}' must be mappings, got {}", tag, value))
        })
    };
    match changes {
        Value::List(items) => items.iter().map(as_map).collect(),
        single => Ok(vec![as_map(single)?]),
    }
}

/// Set attributes on one element from a mapping
fn set_attributes(
    node: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    info: &TagInfo,
    changes: &BTreeMap<String, Value>,
    path: &str,
    options: WriteOptions,
) -> Result<()> {
    for (key, value) in changes {
        let Some(attrib) = info.attribs.original_case(key) else {
            return Err(FleurError::invalid(format!(
                "'{}' is not an attribute of {}",
                key, path
            )));
        };
        let text = convert_to_xml(value, attrib_type(schema, attrib)?, attrib, options.float_precision)?;
        node.set_attribute(attrib, &text)?;
    }
    Ok(())
}

/// Set a tag holding only attributes below the tags of `target` (its parents)
///
/// A tag that may repeat is replaced by one new tag per entry of `changes`; a single tag
/// is created if missing and updated in place.
pub fn xml_set_simple_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    tag: &str,
    changes: &Value,
    create_parents: bool,
    options: WriteOptions,
) -> Result<()> {
    if create_parents {
        xml_ensure_tag(root, schema, target, true, options.correct_order)?;
    }
    let parents = target.evaluate(root)?;
    if parents.is_empty() {
        return Err(FleurError::MissingData {
            details: format!("no parent found at {} for '{}'", target.xpath, tag),
        });
    }
    for parent in parents {
        set_simple_on_node(parent, schema, &target.base_xpath, tag, changes, options)?;
    }
    Ok(())
}

fn set_simple_on_node(
    parent: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    parent_base: &str,
    tag: &str,
    changes: &Value,
    options: WriteOptions,
) -> Result<()> {
    let parent_info = schema.tag_info_for_path(parent_base)?;
    let Some(tag) = parent_info.order.iter().find(|name| name.eq_ignore_ascii_case(tag)) else {
        return Err(FleurError::invalid(format!(
            "'{}' is not a child tag of {}",
            tag, parent_base
        )));
    };
    let path = format!("{}/{}", parent_base, tag);
    let info = schema.tag_info_for_path(&path)?;
    let entries = changes_as_list(changes, tag)?;

    if parent_info.several.contains(tag) {
        for existing in parent.children().into_iter().filter(|child| &child.name() == tag) {
            existing.remove();
        }
        for entry in entries {
            let node = create_child(
                parent,
                NewElement::Tag(tag),
                schema,
                parent_base,
                options.correct_order,
            )?;
            set_attributes(node, schema, info, entry, &path, options)?;
        }
        return Ok(());
    }

    let [entry] = entries.as_slice() else {
        return Err(FleurError::invalid(format!(
            "'{}' may only appear once; got {} entries",
            tag,
            entries.len()
        )));
    };
    let node = match parent.children().into_iter().find(|child| &child.name() == tag) {
        Some(node) => node,
        None => create_child(parent, NewElement::Tag(tag), schema, parent_base, options.correct_order)?,
    };
    set_attributes(node, schema, info, entry, &path, options)
}

/// Apply nested `changes` to the tags of `target`
///
/// Keys are attributes, text tags, simple tags or complex tags of the target; repeatable
/// complex tags are replaced by one new tag per list entry.
pub fn xml_set_complex_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    changes: &Value,
    create: bool,
    options: WriteOptions,
) -> Result<()> {
    if create {
        xml_ensure_tag(root, schema, target, true, options.correct_order)?;
    }
    let changes = changes.as_map().ok_or_else(|| {
        FleurError::invalid(format!("changes for '{}' must be a mapping", target.tag_name()))
    })?;
    let nodes = target.evaluate(root)?;
    if nodes.is_empty() {
        return Err(FleurError::MissingData {
            details: format!("no tag found at {}", target.xpath),
        });
    }
    for node in nodes {
        set_complex_on_node(node, schema, &target.base_xpath, changes, options)?;
    }
    Ok(())
}

fn set_complex_on_node(
    node: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    path: &str,
    changes: &BTreeMap<String, Value>,
    options: WriteOptions,
) -> Result<()> {
    let info = schema.tag_info_for_path(path)?;
    for (key, value) in changes {
        if let Some(attrib) = info.attribs.original_case(key) {
            let text = convert_to_xml(value, attrib_type(schema, attrib)?, attrib, options.float_precision)?;
            node.set_attribute(attrib, &text)?;
            continue;
        }

        let Some(child) = info.order.iter().find(|name| name.eq_ignore_ascii_case(key)) else {
            return Err(FleurError::invalid(format!(
                "'{}' is neither an attribute nor a child tag of {}",
                key, path
            )));
        };
        let child_path = format!("{}/{}", path, child);
        let child_info = schema.tag_info_for_path(&child_path)?;

        if info.text.contains(child) && child_info.attribs.is_empty() {
            set_text_children(node, schema, path, child, value, options)?;
        } else if info.simple.contains(child) {
            set_simple_on_node(node, schema, path, child, value, options)?;
        } else if info.several.contains(child) {
            for existing in node.children().into_iter().filter(|c| &c.name() == child) {
                existing.remove();
            }
            for entry in changes_as_list(value, child)? {
                let created =
                    create_child(node, NewElement::Tag(child), schema, path, options.correct_order)?;
                set_complex_on_node(created, schema, &child_path, entry, options)?;
            }
        } else {
            let entry = value.as_map().ok_or_else(|| {
                FleurError::invalid(format!("changes for '{}' must be a mapping", child))
            })?;
            let existing = node.children().into_iter().find(|c| &c.name() == child);
            let child_node = match existing {
                Some(existing) => existing,
                None => create_child(node, NewElement::Tag(child), schema, path, options.correct_order)?,
            };
            set_complex_on_node(child_node, schema, &child_path, entry, options)?;
        }
    }
    Ok(())
}

/// Write text children `tag` below `parent`, one per value for repeatable tags
fn set_text_children(
    parent: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    parent_base: &str,
    tag: &str,
    value: &Value,
    options: WriteOptions,
) -> Result<()> {
    let info = schema.tag_info_for_path(parent_base)?;
    let value_type = schema.dict().text_type(tag)?;
    let texts = if info.several.contains(tag) {
        convert_values_to_xml(value, value_type, tag, options.float_precision)?
    } else {
        vec![convert_to_xml(value, value_type, tag, options.float_precision)?]
    };

    let existing: Vec<XmlNodeMut<'_>> = parent
        .children()
        .into_iter()
        .filter(|child| child.name() == tag)
        .collect();
    if existing.len() == texts.len() {
        for (node, text) in existing.iter().zip(&texts) {
            node.set_text(text)?;
        }
        return Ok(());
    }
    for node in existing {
        node.remove();
    }
    for text in &texts {
        let node = create_child(parent, NewElement::Tag(tag), schema, parent_base, options.correct_order)?;
        node.set_text(text)?;
    }
    Ok(())
}
