//! Walks an XML Schema document and extracts the tables of the schema dictionary.
//!
//! Only the XSD constructs used by the Fleur schemas are interpreted: named and inline
//! complex/simple types, `sequence`/`choice`/`all` compositors, element and group
//! references, attribute groups, simple content (text tags) and complex content
//! extensions. Simple types are reduced to the base types of [`TypeDefinition`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use super::{BaseType, Length, TagInfo, TypeDefinition, ValueType};
use crate::case_insensitive::{CaseInsensitiveMap, CaseInsensitiveSet};
use crate::error::{FleurError, Result};
use crate::libxml2::{XmlDocument, XmlNode};

const MAX_DEPTH: usize = 64;

const STRING_TYPES: &[&str] = &[
    "string",
    "normalizedString",
    "token",
    "anyURI",
    "NCName",
    "Name",
    "ID",
    "IDREF",
    "QName",
    "boolean",
];

const INT_TYPES: &[&str] = &[
    "integer",
    "int",
    "long",
    "short",
    "byte",
    "positiveInteger",
    "nonNegativeInteger",
    "negativeInteger",
    "nonPositiveInteger",
    "unsignedInt",
    "unsignedLong",
    "unsignedShort",
    "unsignedByte",
];

const FLOAT_TYPES: &[&str] = &["double", "float", "decimal"];

/// Fleur type names with a fixed interpretation
const NAMED_BASE_TYPES: &[(&str, BaseType)] = &[
    ("FleurBool", BaseType::Switch),
    ("FleurDouble", BaseType::FloatExpression),
];

/// One tag of the schema at one absolute path
#[derive(Debug, Clone)]
pub(crate) struct TagRecord {
    pub name: String,
    pub path: String,
    /// For every step of `path`, whether that element may occur several times
    pub several_steps: Vec<bool>,
    pub info: TagInfo,
}

/// Everything extracted from a schema document
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedSchema {
    pub root_tag: String,
    pub version: Option<String>,
    pub tags: Vec<TagRecord>,
    pub attrib_types: CaseInsensitiveMap<ValueType>,
    pub text_types: CaseInsensitiveMap<ValueType>,
    pub text_tags: CaseInsensitiveSet,
}

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn is_xsd_qualified(qname: &str) -> bool {
    qname.starts_with("xsd:") || qname.starts_with("xs:")
}

fn builtin_base_type(name: &str) -> Option<BaseType> {
    let name = local_name(name);
    if STRING_TYPES.contains(&name) {
        Some(BaseType::String)
    } else if INT_TYPES.contains(&name) {
        Some(BaseType::Int)
    } else if FLOAT_TYPES.contains(&name) {
        Some(BaseType::Float)
    } else {
        None
    }
}

fn occurs(node: XmlNode<'_>) -> (bool, bool) {
    let optional = node.attribute("minOccurs").as_deref() == Some("0");
    let several = match node.attribute("maxOccurs") {
        Some(max) if max == "unbounded" => true,
        Some(max) => max.parse::<u64>().map(|n| n > 1).unwrap_or(false),
        None => false,
    };
    (optional, several)
}

struct ChildDecl<'d> {
    name: String,
    element: XmlNode<'d>,
    optional: bool,
    several: bool,
}

struct AttribDecl {
    name: String,
    types: Vec<TypeDefinition>,
    optional: bool,
    default: Option<String>,
}

#[derive(Default)]
struct ContentModel<'d> {
    children: Vec<ChildDecl<'d>>,
    attributes: Vec<AttribDecl>,
    text: Option<Vec<TypeDefinition>>,
    type_key: Option<String>,
}

/// Named global definitions of all participating schema documents
struct TypeIndex<'d> {
    source: PathBuf,
    complex_types: HashMap<String, XmlNode<'d>>,
    simple_types: HashMap<String, XmlNode<'d>>,
    elements: HashMap<String, XmlNode<'d>>,
    groups: HashMap<String, XmlNode<'d>>,
    attribute_groups: HashMap<String, XmlNode<'d>>,
}

impl<'d> TypeIndex<'d> {
    fn build(documents: &[&'d XmlDocument], source: &Path) -> Self {
        let mut index = TypeIndex {
            source: source.to_path_buf(),
            complex_types: HashMap::new(),
            simple_types: HashMap::new(),
            elements: HashMap::new(),
            groups: HashMap::new(),
            attribute_groups: HashMap::new(),
        };
        // Earlier documents take precedence
        for document in documents {
            for node in document.root().children() {
                let Some(name) = node.attribute("name") else {
                    continue;
                };
                let table = match node.name().as_str() {
                    "complexType" => &mut index.complex_types,
                    "simpleType" => &mut index.simple_types,
                    "element" => &mut index.elements,
                    "group" => &mut index.groups,
                    "attributeGroup" => &mut index.attribute_groups,
                    _ => continue,
                };
                table.entry(name).or_insert(node);
            }
        }
        index
    }

    fn error(&self, details: impl Into<String>) -> FleurError {
        FleurError::SchemaParsing {
            path: self.source.clone(),
            details: details.into(),
        }
    }

    fn resolve_simple_type(&self, qname: &str, depth: usize) -> Result<Vec<TypeDefinition>> {
        let name = local_name(qname);
        if let Some((_, base)) = NAMED_BASE_TYPES.iter().find(|(known, _)| *known == name) {
            return Ok(vec![TypeDefinition::single(*base)]);
        }
        if !is_xsd_qualified(qname) {
            if let Some(node) = self.simple_types.get(name) {
                return self.resolve_simple_node(*node, depth + 1);
            }
        }
        builtin_base_type(qname)
            .map(|base| vec![TypeDefinition::single(base)])
            .ok_or_else(|| self.error(format!("unknown simple type '{}'", qname)))
    }

    fn resolve_simple_node(&self, node: XmlNode<'d>, depth: usize) -> Result<Vec<TypeDefinition>> {
        if depth > MAX_DEPTH {
            return Err(self.error("simple type definitions nest too deeply"));
        }
        for child in node.children() {
            match child.name().as_str() {
                "restriction" => return self.resolve_restriction(child, depth),
                "list" => {
                    let items = match child.attribute("itemType") {
                        Some(item_type) => self.resolve_simple_type(&item_type, depth)?,
                        None => self.inline_simple_type(child, depth)?,
                    };
                    return Ok(items
                        .into_iter()
                        .map(|definition| definition.with_length(Length::Unbounded))
                        .collect());
                }
                "union" => {
                    let mut members = Vec::new();
                    if let Some(member_types) = child.attribute("memberTypes") {
                        for member in member_types.split_whitespace() {
                            members.extend(self.resolve_simple_type(member, depth)?);
                        }
                    }
                    for inline in child.children() {
                        if inline.name() == "simpleType" {
                            members.extend(self.resolve_simple_node(inline, depth + 1)?);
                        }
                    }
                    return Ok(members);
                }
                _ => {}
            }
        }
        Err(self.error(format!(
            "simple type at {} has no restriction, list or union",
            node.node_path()
        )))
    }

    fn inline_simple_type(&self, node: XmlNode<'d>, depth: usize) -> Result<Vec<TypeDefinition>> {
        node.children()
            .into_iter()
            .find(|child| child.name() == "simpleType")
            .map(|inline| self.resolve_simple_node(inline, depth + 1))
            .unwrap_or_else(|| Ok(vec![TypeDefinition::single(BaseType::String)]))
    }

    fn resolve_restriction(
        &self,
        restriction: XmlNode<'d>,
        depth: usize,
    ) -> Result<Vec<TypeDefinition>> {
        let mut definitions = match restriction.attribute("base") {
            Some(base) => self.resolve_simple_type(&base, depth)?,
            None => self.inline_simple_type(restriction, depth)?,
        };

        let mut enumeration = Vec::new();
        let mut length = None;
        for facet in restriction.children() {
            let value = facet.attribute("value");
            match (facet.name().as_str(), value) {
                ("enumeration", Some(value)) => enumeration.push(value),
                ("length", Some(value)) => {
                    length = value.parse::<usize>().ok().map(Length::Fixed);
                }
                ("maxLength", Some(_)) | ("minLength", Some(_)) => {
                    length = length.or(Some(Length::Unbounded));
                }
                _ => {}
            }
        }

        for definition in &mut definitions {
            if let Some(length) = length {
                if definition.length != Length::Single {
                    definition.length = length;
                }
            }
            if !enumeration.is_empty() && definition.base_type == BaseType::String {
                let is_switch = enumeration
                    .iter()
                    .all(|value| matches!(value.as_str(), "T" | "F" | "t" | "f"));
                if is_switch {
                    definition.base_type = BaseType::Switch;
                } else {
                    definition.base_type = BaseType::StringEnum;
                    definition.enumeration = enumeration.clone();
                }
            }
        }
        Ok(definitions)
    }

    fn collect_particles(
        &self,
        node: XmlNode<'d>,
        optional: bool,
        several: bool,
        out: &mut Vec<ChildDecl<'d>>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(self.error("content model nests too deeply"));
        }
        for child in node.children() {
            let (child_optional, child_several) = occurs(child);
            match child.name().as_str() {
                "element" => {
                    let (name, element) = match child.attribute("ref") {
                        Some(reference) => {
                            let name = local_name(&reference).to_string();
                            let element = self.elements.get(&name).copied().ok_or_else(|| {
                                self.error(format!("unknown element reference '{}'", reference))
                            })?;
                            (name, element)
                        }
                        None => {
                            let name = child.attribute("name").ok_or_else(|| {
                                self.error(format!("element without name at {}", child.node_path()))
                            })?;
                            (name, child)
                        }
                    };
                    out.push(ChildDecl {
                        name,
                        element,
                        optional: optional || child_optional,
                        several: several || child_several,
                    });
                }
                "sequence" | "all" => self.collect_particles(
                    child,
                    optional || child_optional,
                    several || child_several,
                    out,
                    depth + 1,
                )?,
                "choice" => {
                    let branches = child.children().len();
                    self.collect_particles(
                        child,
                        optional || child_optional || branches > 1,
                        several || child_several,
                        out,
                        depth + 1,
                    )?
                }
                "group" => {
                    if let Some(reference) = child.attribute("ref") {
                        let group = self.groups.get(local_name(&reference)).copied().ok_or_else(
                            || self.error(format!("unknown group reference '{}'", reference)),
                        )?;
                        self.collect_particles(
                            group,
                            optional || child_optional,
                            several || child_several,
                            out,
                            depth + 1,
                        )?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_attributes(
        &self,
        node: XmlNode<'d>,
        out: &mut Vec<AttribDecl>,
        depth: usize,
    ) -> Result<()> {
        for child in node.children() {
            match child.name().as_str() {
                "attribute" => {
                    let Some(name) = child.attribute("name") else {
                        continue;
                    };
                    let types = match child.attribute("type") {
                        Some(type_name) => self.resolve_simple_type(&type_name, depth)?,
                        None => self.inline_simple_type(child, depth)?,
                    };
                    out.push(AttribDecl {
                        name,
                        types,
                        optional: child.attribute("use").as_deref() != Some("required"),
                        default: child.attribute("default"),
                    });
                }
                "attributeGroup" => {
                    if let Some(reference) = child.attribute("ref") {
                        let group = self
                            .attribute_groups
                            .get(local_name(&reference))
                            .copied()
                            .ok_or_else(|| {
                                self.error(format!(
                                    "unknown attribute group reference '{}'",
                                    reference
                                ))
                            })?;
                        self.collect_attributes(group, out, depth + 1)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn complex_model(&self, complex: XmlNode<'d>, depth: usize) -> Result<ContentModel<'d>> {
        if depth > MAX_DEPTH {
            return Err(self.error("complex type extensions nest too deeply"));
        }
        let mut model = ContentModel::default();
        for child in complex.children() {
            match child.name().as_str() {
                "simpleContent" => {
                    for derivation in child.children() {
                        if let Some(base) = derivation.attribute("base") {
                            model.text = Some(self.resolve_simple_type(&base, depth)?);
                        }
                        self.collect_attributes(derivation, &mut model.attributes, depth)?;
                    }
                }
                "complexContent" => {
                    for derivation in child.children() {
                        if let Some(base) = derivation.attribute("base") {
                            if let Some(base_node) = self.complex_types.get(local_name(&base)) {
                                let base_model = self.complex_model(*base_node, depth + 1)?;
                                model.children.extend(base_model.children);
                                model.attributes.extend(base_model.attributes);
                                model.text = model.text.or(base_model.text);
                            }
                        }
                        self.collect_particles(
                            derivation,
                            false,
                            false,
                            &mut model.children,
                            depth,
                        )?;
                        self.collect_attributes(derivation, &mut model.attributes, depth)?;
                    }
                }
                _ => {}
            }
        }
        self.collect_particles(complex, false, false, &mut model.children, depth)?;
        self.collect_attributes(complex, &mut model.attributes, depth)?;
        Ok(model)
    }

    fn element_model(&self, element: XmlNode<'d>) -> Result<ContentModel<'d>> {
        if let Some(type_name) = element.attribute("type") {
            if !is_xsd_qualified(&type_name) {
                if let Some(complex) = self.complex_types.get(local_name(&type_name)) {
                    let mut model = self.complex_model(*complex, 0)?;
                    model.type_key = Some(type_name);
                    return Ok(model);
                }
            }
            return Ok(ContentModel {
                text: Some(self.resolve_simple_type(&type_name, 0)?),
                ..ContentModel::default()
            });
        }
        for child in element.children() {
            match child.name().as_str() {
                "complexType" => return self.complex_model(child, 0),
                "simpleType" => {
                    return Ok(ContentModel {
                        text: Some(self.resolve_simple_node(child, 0)?),
                        ..ContentModel::default()
                    });
                }
                _ => {}
            }
        }
        Ok(ContentModel::default())
    }
}

struct Walker<'i, 'd> {
    index: &'i TypeIndex<'d>,
    output: ParsedSchema,
    type_stack: Vec<String>,
}

impl<'d> Walker<'_, 'd> {
    fn walk(
        &mut self,
        name: &str,
        path: String,
        model: ContentModel<'d>,
        several_steps: Vec<bool>,
    ) -> Result<()> {
        if several_steps.len() > MAX_DEPTH {
            return Err(self.index.error(format!("element nesting too deep at {}", path)));
        }

        let mut info = TagInfo::default();
        for attribute in &model.attributes {
            info.attribs.insert(attribute.name.clone());
            if attribute.optional {
                info.optional_attribs
                    .insert(attribute.name.clone(), attribute.default.clone());
            }
            self.output
                .attrib_types
                .get_or_insert_with(&attribute.name, ValueType::default)
                .extend(attribute.types.iter().cloned());
        }

        if let Some(text) = &model.text {
            self.output
                .text_types
                .get_or_insert_with(name, ValueType::default)
                .extend(text.iter().cloned());
            self.output.text_tags.insert(name);
        }

        let mut child_models = Vec::new();
        for child in &model.children {
            let child_model = self.index.element_model(child.element)?;
            if !info.order.iter().any(|known| known == &child.name) {
                info.order.push(child.name.clone());
            }
            if child_model.children.is_empty() {
                info.simple.insert(child.name.clone());
            } else {
                info.complex.insert(child.name.clone());
            }
            if child_model.text.is_some() {
                info.text.insert(child.name.clone());
            }
            if child.several {
                info.several.insert(child.name.clone());
            }
            if child.optional {
                info.optional.insert(child.name.clone());
            }
            child_models.push((child.name.clone(), child.several, child_model));
        }

        self.output.tags.push(TagRecord {
            name: name.to_string(),
            path: path.clone(),
            several_steps: several_steps.clone(),
            info,
        });

        let mut seen = Vec::new();
        for (child_name, several, child_model) in child_models {
            // A tag listed twice in one content model (choice branches) is walked once
            if seen.contains(&child_name) {
                continue;
            }
            seen.push(child_name.clone());

            if let Some(type_key) = &child_model.type_key {
                if self.type_stack.contains(type_key) {
                    debug!("Not descending into recursive type {} at {}", type_key, path);
                    continue;
                }
            }
            let pushed = child_model.type_key.clone();
            if let Some(type_key) = &pushed {
                self.type_stack.push(type_key.clone());
            }
            let mut child_steps = several_steps.clone();
            child_steps.push(several);
            let child_path = format!("{}/{}", path, child_name);
            self.walk(&child_name, child_path, child_model, child_steps)?;
            if pushed.is_some() {
                self.type_stack.pop();
            }
        }
        Ok(())
    }
}

/// Parse the schema in `primary`; `extra` documents only contribute named definitions
pub(crate) fn parse_schema(
    primary: &XmlDocument,
    extra: &[&XmlDocument],
    source: &Path,
) -> Result<ParsedSchema> {
    let mut documents = vec![primary];
    documents.extend_from_slice(extra);
    let index = TypeIndex::build(&documents, source);

    let root_element = primary
        .root()
        .children()
        .into_iter()
        .find(|node| node.name() == "element" && node.attribute("name").is_some())
        .ok_or_else(|| index.error("schema declares no top-level element"))?;
    let root_tag = root_element
        .attribute("name")
        .ok_or_else(|| index.error("root element has no name"))?;

    let root_model = index.element_model(root_element)?;
    let mut walker = Walker {
        index: &index,
        output: ParsedSchema {
            root_tag: root_tag.clone(),
            version: primary.root().attribute("version"),
            ..ParsedSchema::default()
        },
        type_stack: root_model.type_key.iter().cloned().collect(),
    };
    walker.walk(&root_tag, format!("/{}", root_tag), root_model, vec![false])?;

    debug!(
        "Parsed schema {} with root '{}' and {} tag paths",
        source.display(),
        root_tag,
        walker.output.tags.len()
    );
    Ok(walker.output)
}
