//! Name-based reads from Fleur XML documents.
//!
//! Every operation takes the node to start from, the schema dictionary of the document,
//! the short name of a tag or attribute and [`EvalOptions`]. The name is resolved to a
//! simple XPath (absolute from the root element, relative from any other element),
//! optionally refined by filters or a complex XPath, evaluated, and converted with the
//! types of the schema.
//!
//! Without a logger and without `optional` every failure is an error. With either of them,
//! missing data and unparsable values are reported (to the logger, if given) and a
//! sentinel is returned instead: [`Value::Null`] or an empty list.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::constants::{Constants, predefined_constants};
use crate::converters::{Value, convert_from_xml};
use crate::error::{FleurError, Result};
use crate::libxml2::{NodeKind, XPathVariables, XmlNode};
use crate::logger::Logger;
use crate::schema_dict::{AttribClass, PathFilter, SchemaDictionary, TagInfo, ValueType, parent_path};
use crate::xpath_builder::XPathBuilder;

pub use crate::constants::read_constants;

/// A refinement of the simple XPath supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexXPath {
    /// A ready made expression; cannot be combined with `filters`
    Raw(String),
    /// A builder; `filters` are merged into it
    Builder(XPathBuilder),
}

/// Options shared by all query operations
#[derive(Debug, Clone, Default)]
pub struct EvalOptions<'a> {
    pub constants: Option<&'a Constants>,
    pub logger: Option<&'a Logger>,
    pub complex_xpath: Option<ComplexXPath>,
    /// Mapping of tag → condition, see [`XPathBuilder`]
    pub filters: Option<JsonValue>,
    /// Search the paths below the `iteration` element (output files only)
    pub iteration_path: bool,
    pub path_filter: PathFilter,
    /// Missing results are not an error
    pub optional: bool,
    /// Always return a list, even for a single match
    pub list_return: bool,
}

impl<'a> EvalOptions<'a> {
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

    pub fn path_filter(mut self, filter: PathFilter) -> Self {
        self.path_filter = filter;
        self
    }

    pub fn constants(mut self, constants: &'a Constants) -> Self {
        self.constants = Some(constants);
        self
    }

    pub fn logger(mut self, logger: &'a Logger) -> Self {
        self.logger = Some(logger);
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

    pub fn iteration_path(mut self, iteration_path: bool) -> Self {
        self.iteration_path = iteration_path;
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn list_return(mut self, list_return: bool) -> Self {
        self.list_return = list_return;
        self
    }

    fn is_lenient(&self) -> bool {
        self.optional || self.logger.is_some()
    }

    /// Demote a recoverable error to a warning when lenient
    fn recover<T>(&self, error: FleurError, sentinel: T) -> Result<T> {
        if !self.is_lenient() {
            return Err(error);
        }
        match self.logger {
            Some(logger) => logger.warning(error.to_string()),
            None => log::debug!("{}", error),
        }
        Ok(sentinel)
    }

    fn empty_result(&self) -> Value {
        if self.list_return {
            Value::List(Vec::new())
        } else {
            Value::Null
        }
    }
}

/// Selection of the attributes read by [`evaluate_tag`]
#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    /// Skip optional attributes
    pub only_required: bool,
    /// Attribute (and subtag) names not to read
    pub ignore: Vec<String>,
    /// Read child tags recursively
    pub subtags: bool,
    /// Read the text of the tag under its own name
    pub text: bool,
}

impl TagOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only_required(mut self, only_required: bool) -> Self {
        self.only_required = only_required;
        self
    }

    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignore.push(name.into());
        self
    }

    pub fn subtags(mut self, subtags: bool) -> Self {
        self.subtags = subtags;
        self
    }

    pub fn text(mut self, text: bool) -> Self {
        self.text = text;
        self
    }

    fn ignores(&self, name: &str) -> bool {
        self.ignore.iter().any(|ignored| ignored.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Tag,
    Attrib,
}

/// Absolute simple path of an element, e.g. `/fleurInput/atomSpecies/species`
pub fn simple_node_path(node: XmlNode<'_>) -> String {
    let mut names = vec![node.name()];
    let mut current = node;
    while let Some(parent) = current.parent() {
        if parent.kind() != NodeKind::Element {
            break;
        }
        names.push(parent.name());
        current = parent;
    }
    names.reverse();
    format!("/{}", names.join("/"))
}

fn is_root_node(node: XmlNode<'_>, schema: &dyn SchemaDictionary) -> bool {
    node.is_root() || node.name() == schema.dict().root_tag()
}

/// Simple XPath of `name` as seen from `node`
fn simple_path(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    kind: PathKind,
    options: &EvalOptions<'_>,
) -> Result<String> {
    let filter = &options.path_filter;
    if options.iteration_path {
        let iteration = schema.iteration().ok_or_else(|| {
            FleurError::invalid("iteration paths are only available for output schemas")
        })?;
        let iteration_tag = iteration
            .iteration_path()
            .rsplit('/')
            .next()
            .unwrap_or_default();
        let tables = iteration.tables();
        let node_name = node.name();
        return if node_name == iteration_tag {
            match kind {
                PathKind::Tag => tables.tag_xpath(name, filter),
                PathKind::Attrib => tables.attrib_xpath(name, filter),
            }
        } else if is_root_node(node, schema) {
            let relative = match kind {
                PathKind::Tag => tables.tag_xpath(name, filter)?,
                PathKind::Attrib => tables.attrib_xpath(name, filter)?,
            };
            Ok(iteration.absolute(&relative))
        } else {
            match kind {
                PathKind::Tag => tables.relative_tag_xpath(name, &node_name, filter),
                PathKind::Attrib => tables.relative_attrib_xpath(name, &node_name, filter),
            }
        };
    }

    let dict = schema.dict();
    if is_root_node(node, schema) {
        match kind {
            PathKind::Tag => dict.tag_xpath(name, filter),
            PathKind::Attrib => dict.attrib_xpath(name, filter),
        }
    } else {
        let node_name = node.name();
        match kind {
            PathKind::Tag => dict.relative_tag_xpath(name, &node_name, filter),
            PathKind::Attrib => dict.relative_attrib_xpath(name, &node_name, filter),
        }
    }
}

/// Absolute form of a simple path resolved from `node`
fn absolute_simple_path(node: XmlNode<'_>, path: &str) -> String {
    match path.strip_prefix('.') {
        Some(rest) => format!("{}{}", simple_node_path(node), rest),
        None => path.to_string(),
    }
}

/// Evaluate an expression and return the matched nodes
pub fn eval_xpath<'d>(
    node: XmlNode<'d>,
    expression: &str,
    variables: &XPathVariables,
) -> Result<Vec<XmlNode<'d>>> {
    Ok(node.xpath_nodes(expression, variables)?)
}

/// Final expression for a simple path under the complex XPath and filters of `options`
///
/// A caller supplied complex XPath must select a subset of the simple path.
pub(crate) fn refine_xpath(
    node: XmlNode<'_>,
    simple: &str,
    options: &EvalOptions<'_>,
) -> Result<(String, XPathVariables)> {
    let (expression, variables) = match (&options.complex_xpath, &options.filters) {
        (None, None) => return Ok((simple.to_string(), XPathVariables::new())),
        (None, Some(filters)) => {
            let mut builder = XPathBuilder::with_filters(simple, filters)?;
            return builder.path();
        }
        (Some(ComplexXPath::Raw(_)), Some(_)) => {
            return Err(FleurError::invalid(
                "filters cannot be combined with a plain complex XPath; use an XPathBuilder",
            ));
        }
        (Some(ComplexXPath::Raw(expression)), None) => (expression.clone(), XPathVariables::new()),
        (Some(ComplexXPath::Builder(builder)), filters) => {
            let mut builder = builder.clone();
            if let Some(filters) = filters {
                builder.add_filters_json(filters)?;
            }
            builder.path()?
        }
    };

    let allowed = eval_xpath(node, simple, &XPathVariables::new())?;
    let selected = eval_xpath(node, &expression, &variables)?;
    if selected.iter().any(|found| !allowed.contains(found)) {
        return Err(FleurError::InvalidPath {
            complex: expression,
            simple: simple.to_string(),
        });
    }
    Ok((expression, variables))
}

fn with_constants<T>(options: &EvalOptions<'_>, f: impl FnOnce(&Constants) -> T) -> T {
    match options.constants {
        Some(constants) => f(constants),
        None => f(&predefined_constants()),
    }
}

fn type_or_default<'s>(types: Option<&'s ValueType>, default: &'s ValueType) -> &'s ValueType {
    types.unwrap_or(default)
}

/// Convert the texts found for `name`, demoting failures when lenient
fn convert_texts(
    texts: Vec<String>,
    value_type: &ValueType,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<Value> {
    let mut values = Vec::with_capacity(texts.len());
    with_constants(options, |constants| -> Result<()> {
        for text in texts {
            match convert_from_xml(&text, value_type, constants, name) {
                Ok(value) => values.push(value),
                Err(error) => values.push(options.recover(error, Value::Str(text))?),
            }
        }
        Ok(())
    })?;

    if values.len() == 1 && !options.list_return {
        Ok(values.remove(0))
    } else {
        Ok(Value::List(values))
    }
}

/// Value(s) of the attribute `name`
pub fn evaluate_attribute(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<Value> {
    let simple = simple_path(node, schema, name, PathKind::Attrib, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    let texts: Vec<String> = eval_xpath(node, &expression, &variables)?
        .into_iter()
        .map(|found| found.content())
        .collect();

    if texts.is_empty() {
        return options.recover(
            FleurError::MissingData {
                details: format!("no values found for attribute '{}' ({})", name, expression),
            },
            options.empty_result(),
        );
    }

    let default = ValueType::default();
    let value_type = type_or_default(schema.dict().attrib_types().get(name), &default);
    convert_texts(texts, value_type, name, options)
}

/// Text of the tag `name`; whitespace-only texts are skipped
pub fn evaluate_text(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<Value> {
    let simple = simple_path(node, schema, name, PathKind::Tag, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    let texts: Vec<String> = eval_xpath(node, &expression, &variables)?
        .into_iter()
        .filter_map(|found| found.text())
        .filter(|text| !text.trim().is_empty())
        .collect();

    if texts.is_empty() {
        return options.recover(
            FleurError::MissingData {
                details: format!("no text found for tag '{}' ({})", name, expression),
            },
            options.empty_result(),
        );
    }

    let default = ValueType::default();
    let value_type = type_or_default(schema.dict().text_types().get(name), &default);
    convert_texts(texts, value_type, name, options)
}

/// Read the attributes (and optionally text and children) of one element
fn read_tag_node(
    node: XmlNode<'_>,
    path: &str,
    schema: &dyn SchemaDictionary,
    options: &EvalOptions<'_>,
    tag_options: &TagOptions,
) -> Result<BTreeMap<String, Value>> {
    let dict = schema.dict();
    let info: &TagInfo = dict.tag_info_at(path)?;
    let mut out = BTreeMap::new();
    let default = ValueType::default();

    for attrib in info.attribs.iter() {
        if tag_options.ignores(attrib) {
            continue;
        }
        let optional = info.optional_attribs.contains_key(attrib);
        if tag_options.only_required && optional {
            continue;
        }
        let Some(text) = node.attribute(attrib) else {
            if !optional {
                let error = FleurError::MissingData {
                    details: format!(
                        "required attribute '{}' missing on {}",
                        attrib,
                        node.node_path()
                    ),
                };
                out.insert(attrib.to_string(), options.recover(error, Value::Null)?);
            }
            continue;
        };
        let value_type = type_or_default(dict.attrib_types().get(attrib), &default);
        let value = with_constants(options, |constants| {
            convert_from_xml(&text, value_type, constants, attrib)
        });
        let value = match value {
            Ok(value) => value,
            Err(error) => options.recover(error, Value::Str(text))?,
        };
        out.insert(attrib.to_string(), value);
    }

    let tag_name = node.name();
    if tag_options.text
        && dict.text_tags().contains(&tag_name)
        && let Some(text) = node.text().filter(|text| !text.trim().is_empty())
    {
        let value_type = type_or_default(dict.text_types().get(&tag_name), &default);
        let value = with_constants(options, |constants| {
            convert_from_xml(&text, value_type, constants, &tag_name)
        });
        let value = match value {
            Ok(value) => value,
            Err(error) => options.recover(error, Value::Str(text))?,
        };
        out.insert(tag_name.clone(), value);
    }

    if tag_options.subtags {
        let child_options = TagOptions {
            text: true,
            ..tag_options.clone()
        };
        for child_tag in &info.order {
            if tag_options.ignores(child_tag) {
                continue;
            }
            let child_path = format!("{}/{}", path, child_tag);
            let children: Vec<XmlNode<'_>> = node
                .children()
                .into_iter()
                .filter(|child| &child.name() == child_tag)
                .collect();
            if children.is_empty() {
                continue;
            }

            let mut values = Vec::with_capacity(children.len());
            for child in &children {
                values.push(read_subtag(*child, &child_path, schema, options, &child_options)?);
            }
            let value = if info.several.contains(child_tag) {
                Value::List(values)
            } else {
                values.remove(0)
            };
            out.insert(child_tag.clone(), value);
        }
    }

    Ok(out)
}

fn read_subtag(
    node: XmlNode<'_>,
    path: &str,
    schema: &dyn SchemaDictionary,
    options: &EvalOptions<'_>,
    tag_options: &TagOptions,
) -> Result<Value> {
    let dict = schema.dict();
    let name = node.name();

    // Wrappers of a single repeated tag are flattened into the list of their children
    if dict.omitt_contained_tags().contains(&name) {
        let info = dict.tag_info_at(path)?;
        if let [inner] = info.order.as_slice() {
            let inner_path = format!("{}/{}", path, inner);
            let mut values = Vec::new();
            for child in node.children().into_iter().filter(|child| &child.name() == inner) {
                values.push(read_subtag(child, &inner_path, schema, options, tag_options)?);
            }
            return Ok(Value::List(values));
        }
    }

    let mut map = read_tag_node(node, path, schema, options, tag_options)?;
    // Pure text tags are represented by their value
    if map.len() == 1
        && dict.tag_info_at(path)?.attribs.is_empty()
        && let Some(value) = map.remove(&name)
    {
        return Ok(value);
    }
    Ok(Value::Map(map))
}

/// Combine the records of several matches into a mapping of lists
fn combine_records(records: Vec<BTreeMap<String, Value>>, list_return: bool) -> Value {
    if records.len() == 1 && !list_return {
        return records.into_iter().next().map(Value::Map).unwrap_or(Value::Null);
    }
    let mut keys: Vec<String> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    let mut combined = BTreeMap::new();
    for key in keys {
        let values = records
            .iter()
            .map(|record| record.get(&key).cloned().unwrap_or(Value::Null))
            .collect();
        combined.insert(key, Value::List(values));
    }
    Value::Map(combined)
}

/// All attributes of the tag `name` as a mapping (of lists, for several matches)
pub fn evaluate_tag(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
    tag_options: &TagOptions,
) -> Result<Value> {
    let simple = simple_path(node, schema, name, PathKind::Tag, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    let found = eval_xpath(node, &expression, &variables)?;
    if found.is_empty() {
        return options.recover(
            FleurError::MissingData {
                details: format!("no tag found for '{}' ({})", name, expression),
            },
            Value::Map(BTreeMap::new()),
        );
    }

    let path = resolve_absolute(node, schema, &simple, options);
    let records = found
        .into_iter()
        .map(|tag| read_tag_node(tag, &path, schema, options, tag_options))
        .collect::<Result<Vec<_>>>()?;
    Ok(combine_records(records, options.list_return))
}

fn resolve_absolute(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    simple: &str,
    options: &EvalOptions<'_>,
) -> String {
    if options.iteration_path
        && let Some(iteration) = schema.iteration()
        && is_root_node(node, schema)
    {
        return iteration.absolute(simple);
    }
    absolute_simple_path(node, simple)
}

/// Missing in the record, or in any of the combined matches
fn attribute_missing(record: &BTreeMap<String, Value>, key: &str) -> bool {
    match record.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::List(values)) => values.iter().any(Value::is_null),
        Some(_) => false,
    }
}

/// `value` and `units` of a tag holding a single quantity
pub fn evaluate_single_value_tag(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
    tag_options: &TagOptions,
) -> Result<Value> {
    let mut selection = tag_options.clone();
    selection.subtags = false;
    selection.text = false;
    let value = evaluate_tag(node, schema, name, options, &selection)?;

    let records: Vec<&BTreeMap<String, Value>> = match &value {
        Value::Map(map) => vec![map],
        _ => Vec::new(),
    };
    for record in records {
        if attribute_missing(record, "value") {
            options.recover(
                FleurError::MissingData {
                    details: format!("tag '{}' has no value attribute", name),
                },
                (),
            )?;
        }
        let units_wanted = !selection.only_required && !selection.ignores("units");
        if units_wanted && attribute_missing(record, "units") {
            options.recover(
                FleurError::MissingData {
                    details: format!("tag '{}' has no units attribute", name),
                },
                (),
            )?;
        }
    }
    Ok(value)
}

/// Attributes of the parents of the tags found for `name`
pub fn evaluate_parent_tag(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
    tag_options: &TagOptions,
) -> Result<Value> {
    let simple = simple_path(node, schema, name, PathKind::Tag, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    let found = eval_xpath(node, &expression, &variables)?;
    if found.is_empty() {
        return options.recover(
            FleurError::MissingData {
                details: format!("no tag found for '{}' ({})", name, expression),
            },
            Value::Map(BTreeMap::new()),
        );
    }

    let path = resolve_absolute(node, schema, &simple, options);
    let parent = parent_path(&path)
        .ok_or_else(|| FleurError::invalid(format!("'{}' has no parent tag", path)))?
        .to_string();
    let mut records = Vec::with_capacity(found.len());
    for tag in found {
        let parent_node = tag
            .parent()
            .ok_or_else(|| FleurError::invalid(format!("{} has no parent", tag.node_path())))?;
        records.push(read_tag_node(parent_node, &parent, schema, options, tag_options)?);
    }
    Ok(combine_records(records, options.list_return))
}

/// Nodes of the tag `name`
pub fn eval_simple_xpath<'d>(
    node: XmlNode<'d>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<Vec<XmlNode<'d>>> {
    let simple = simple_path(node, schema, name, PathKind::Tag, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    let found = eval_xpath(node, &expression, &variables)?;
    if found.is_empty() {
        return options.recover(
            FleurError::MissingData {
                details: format!("no tag found for '{}' ({})", name, expression),
            },
            Vec::new(),
        );
    }
    Ok(found)
}

/// Number of tags found for `name`
pub fn get_number_of_nodes(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<usize> {
    let simple = simple_path(node, schema, name, PathKind::Tag, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    Ok(eval_xpath(node, &expression, &variables)?.len())
}

/// Whether at least one tag exists for `name`
pub fn tag_exists(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<bool> {
    Ok(get_number_of_nodes(node, schema, name, options)? > 0)
}

/// Whether at least one attribute exists for `name`
pub fn attrib_exists(
    node: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    name: &str,
    options: &EvalOptions<'_>,
) -> Result<bool> {
    let simple = simple_path(node, schema, name, PathKind::Attrib, options)?;
    let (expression, variables) = refine_xpath(node, &simple, options)?;
    Ok(!eval_xpath(node, &expression, &variables)?.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_records_lists_per_key() {
        let first: BTreeMap<String, Value> =
            [("name".to_string(), Value::from("Fe-1"))].into_iter().collect();
        let second: BTreeMap<String, Value> = [
            ("name".to_string(), Value::from("Pt-1")),
            ("element".to_string(), Value::from("Pt")),
        ]
        .into_iter()
        .collect();

        let combined = combine_records(vec![first.clone(), second], false);
        let map = combined.as_map().unwrap();
        assert_eq!(
            map["name"],
            Value::List(vec![Value::from("Fe-1"), Value::from("Pt-1")])
        );
        assert_eq!(map["element"], Value::List(vec![Value::Null, Value::from("Pt")]));

        assert_eq!(combine_records(vec![first.clone()], false), Value::Map(first));
    }

    #[test]
    fn test_single_record_with_list_return_is_a_mapping_of_lists() {
        let record: BTreeMap<String, Value> = [
            ("value".to_string(), Value::Float(-0.25)),
            ("units".to_string(), Value::from("Htr")),
        ]
        .into_iter()
        .collect();
        let combined = combine_records(vec![record.clone()], true);
        let map = combined.as_map().unwrap();
        assert_eq!(map["value"], Value::List(vec![Value::Float(-0.25)]));
        assert!(!attribute_missing(map, "value"));

        let partial: BTreeMap<String, Value> =
            [("value".to_string(), Value::Float(1.0))].into_iter().collect();
        let combined = combine_records(vec![record, partial], true);
        let map = combined.as_map().unwrap();
        assert!(!attribute_missing(map, "value"));
        assert!(attribute_missing(map, "units"));
        assert!(attribute_missing(map, "comment"));
    }

    #[test]
    fn test_options_builder() {
        let options = EvalOptions::new()
            .contains("species")
            .not_contains("Group")
            .optional(true);
        assert_eq!(options.path_filter.contains, vec!["species"]);
        assert_eq!(options.path_filter.not_contains, vec!["Group"]);
        assert!(options.is_lenient());
        assert_eq!(options.empty_result(), Value::Null);
        assert_eq!(
            options.list_return(true).empty_result(),
            Value::List(Vec::new())
        );
    }
}
