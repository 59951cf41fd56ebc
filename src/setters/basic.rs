//! Path-bearing primitives: create, delete and replace tags, set raw attribute and text
//! values. Every primitive takes an explicit XPath and the simple path it refines.

use crate::error::{FleurError, Result};
use crate::libxml2::{XPathVariables, XmlNode, XmlNodeMut, outermost_nodes};
use crate::schema_dict::{SchemaDictionary, TagInfo, parent_path};
use crate::xpath_builder::XPathBuilder;

/// Selection among the nodes matched by a path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Occurrences {
    #[default]
    All,
    /// Indices into the matches; negative values count from the end
    Indices(Vec<i64>),
}

impl Occurrences {
    pub fn first() -> Self {
        Occurrences::Indices(vec![0])
    }

    pub fn select<T: Copy>(&self, nodes: &[T]) -> Result<Vec<T>> {
        let Occurrences::Indices(indices) = self else {
            return Ok(nodes.to_vec());
        };
        let count = nodes.len() as i64;
        indices
            .iter()
            .map(|&index| {
                let resolved = if index < 0 { count + index } else { index };
                if resolved < 0 || resolved >= count {
                    return Err(FleurError::invalid(format!(
                        "occurrence {} out of range for {} matches",
                        index, count
                    )));
                }
                Ok(nodes[resolved as usize])
            })
            .collect()
    }
}

impl From<i64> for Occurrences {
    fn from(index: i64) -> Self {
        Occurrences::Indices(vec![index])
    }
}

impl From<Vec<i64>> for Occurrences {
    fn from(indices: Vec<i64>) -> Self {
        Occurrences::Indices(indices)
    }
}

/// XPath to act on together with the simple path it refines
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPath {
    pub xpath: String,
    pub variables: XPathVariables,
    pub base_xpath: String,
}

impl TargetPath {
    /// Target a simple path as is
    pub fn simple(path: &str) -> Self {
        TargetPath {
            xpath: path.to_string(),
            variables: XPathVariables::new(),
            base_xpath: path.to_string(),
        }
    }

    pub fn new(xpath: impl Into<String>, variables: XPathVariables, base_xpath: &str) -> Self {
        TargetPath {
            xpath: xpath.into(),
            variables,
            base_xpath: base_xpath.to_string(),
        }
    }

    pub fn from_builder(builder: &mut XPathBuilder) -> Result<Self> {
        let (xpath, variables) = builder.path()?;
        Ok(TargetPath {
            xpath,
            variables,
            base_xpath: builder.simple_path(),
        })
    }

    /// Name of the last step of the simple path
    pub fn tag_name(&self) -> &str {
        self.base_xpath.rsplit('/').next().unwrap_or_default()
    }

    /// Target of the parent elements
    pub fn parent(&self) -> Result<TargetPath> {
        let base = parent_path(&self.base_xpath).ok_or_else(|| {
            FleurError::invalid(format!("'{}' has no parent tag", self.base_xpath))
        })?;
        let (xpath, _) = split_last_step(&self.xpath).ok_or_else(|| {
            FleurError::invalid(format!("'{}' has no parent tag", self.xpath))
        })?;
        Ok(TargetPath::new(xpath, self.variables.clone(), base))
    }

    /// Target of the child tag `tag` below this one
    pub fn child(&self, tag: &str) -> TargetPath {
        TargetPath::new(
            format!("{}/{}", self.xpath, tag),
            self.variables.clone(),
            &format!("{}/{}", self.base_xpath, tag),
        )
    }

    pub(crate) fn evaluate<'d>(&self, root: XmlNodeMut<'d>) -> Result<Vec<XmlNodeMut<'d>>> {
        Ok(root.xpath_nodes(&self.xpath, &self.variables)?)
    }
}

/// Split an XPath at its last step, ignoring `/` inside predicates and literals
pub fn split_last_step(xpath: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut split = None;
    for (position, ch) in xpath.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => split = Some(position),
            _ => {}
        }
    }
    match split? {
        0 => None,
        position => Some((&xpath[..position], &xpath[position + 1..])),
    }
}

/// Element to insert: a new empty tag or a copy of an existing node
#[derive(Debug, Clone, Copy)]
pub enum NewElement<'x> {
    Tag(&'x str),
    Copy(XmlNode<'x>),
}

impl NewElement<'_> {
    pub fn name(&self) -> String {
        match self {
            NewElement::Tag(name) => name.to_string(),
            NewElement::Copy(node) => node.name(),
        }
    }

    fn materialize<'d>(&self, parent: XmlNodeMut<'d>) -> Result<XmlNodeMut<'d>> {
        Ok(match self {
            NewElement::Tag(name) => parent.new_element(name)?,
            NewElement::Copy(node) => parent.import_copy(*node)?,
        })
    }
}

impl<'x> From<&'x str> for NewElement<'x> {
    fn from(name: &'x str) -> Self {
        NewElement::Tag(name)
    }
}

/// Collapse consecutive repeats: `[ldaU, lo, lo]` → `[ldaU, lo]`
fn collapsed_names(children: &[XmlNodeMut<'_>]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(children.len());
    for child in children {
        let name = child.name();
        if names.last() != Some(&name) {
            names.push(name);
        }
    }
    names
}

/// Bring the children of `parent` into the order of `info`
///
/// Fails for children unknown to the schema, and for out of order children unless
/// `correct_order` is set, in which case they are sorted (stable) into schema order.
pub(crate) fn check_order(
    parent: XmlNodeMut<'_>,
    info: &TagInfo,
    base_xpath: &str,
    correct_order: bool,
) -> Result<()> {
    let children = parent.children();
    let mut previous = None;
    let mut ordered = true;
    for name in collapsed_names(&children) {
        let index = info.order_index(&name).ok_or_else(|| FleurError::Ordering {
            parent: base_xpath.to_string(),
            details: format!("unknown child tag '{}'", name),
        })?;
        if previous.is_some_and(|previous| index <= previous) {
            ordered = false;
        }
        previous = Some(index);
    }
    if ordered {
        return Ok(());
    }
    if !correct_order {
        return Err(FleurError::Ordering {
            parent: base_xpath.to_string(),
            details: format!(
                "children {:?} are not in schema order {:?}",
                collapsed_names(&children),
                info.order
            ),
        });
    }

    log::debug!("Reordering children of {}", base_xpath);
    let mut sorted: Vec<(usize, XmlNodeMut<'_>)> = children
        .into_iter()
        .map(|child| (info.order_index(&child.name()).unwrap_or(usize::MAX), child))
        .collect();
    sorted.sort_by_key(|(index, _)| *index);
    for (_, child) in sorted {
        parent.append_child(child);
    }
    Ok(())
}

/// Insert `child` below `parent` at its schema position
pub(crate) fn insert_ordered<'d>(
    parent: XmlNodeMut<'d>,
    child: XmlNodeMut<'d>,
    info: &TagInfo,
    base_xpath: &str,
    correct_order: bool,
) -> Result<()> {
    let name = child.name();
    let new_index = info.order_index(&name).ok_or_else(|| FleurError::Ordering {
        parent: base_xpath.to_string(),
        details: format!("'{}' is not a child tag", name),
    })?;
    check_order(parent, info, base_xpath, correct_order)?;

    let anchor = parent
        .children()
        .into_iter()
        .filter(|sibling| {
            info.order_index(&sibling.name())
                .is_some_and(|index| index <= new_index)
        })
        .last();
    match anchor {
        Some(sibling) => sibling.insert_after(child),
        None => parent.prepend_child(child),
    }
    Ok(())
}

/// Create `element` below one parent, respecting the schema order
pub(crate) fn create_child<'d>(
    parent: XmlNodeMut<'d>,
    element: NewElement<'_>,
    schema: &dyn SchemaDictionary,
    parent_base: &str,
    correct_order: bool,
) -> Result<XmlNodeMut<'d>> {
    let info = schema.tag_info_for_path(parent_base)?;
    let name = element.name();
    if !info.has_child(&name) {
        return Err(FleurError::invalid(format!(
            "'{}' is not a valid child tag of {}",
            name, parent_base
        )));
    }
    if !info.several.contains(&name) && parent.children().iter().any(|child| child.name() == name) {
        return Err(FleurError::invalid(format!(
            "'{}' may only appear once below {}",
            name, parent_base
        )));
    }
    let child = element.materialize(parent)?;
    if let Err(error) = insert_ordered(parent, child, info, parent_base, correct_order) {
        child.remove();
        return Err(error);
    }
    Ok(child)
}

/// Create `element` below every selected node matched by `target`
///
/// `target` points at the parents. Returns the created nodes.
pub fn xml_create_tag<'d>(
    root: XmlNodeMut<'d>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    element: NewElement<'_>,
    occurrences: &Occurrences,
    correct_order: bool,
) -> Result<Vec<XmlNodeMut<'d>>> {
    let parents = target.evaluate(root)?;
    if parents.is_empty() {
        return Err(FleurError::MissingData {
            details: format!(
                "could not create tag '{}': no parent found at {}",
                element.name(),
                target.xpath
            ),
        });
    }
    occurrences
        .select(&parents)?
        .into_iter()
        .map(|parent| create_child(parent, element, schema, &target.base_xpath, correct_order))
        .collect()
}

/// Delete the selected tags; returns how many were removed
pub fn xml_delete_tag(
    root: XmlNodeMut<'_>,
    target: &TargetPath,
    occurrences: &Occurrences,
) -> Result<usize> {
    let nodes = target.evaluate(root)?;
    let selected = outermost_nodes(occurrences.select(&nodes)?);
    let count = selected.len();
    for node in selected {
        node.remove();
    }
    Ok(count)
}

/// Delete the attribute `name` of the selected tags
pub fn xml_delete_att(
    root: XmlNodeMut<'_>,
    target: &TargetPath,
    name: &str,
    occurrences: &Occurrences,
) -> Result<usize> {
    let nodes = target.evaluate(root)?;
    let mut count = 0;
    for node in occurrences.select(&nodes)? {
        if node.remove_attribute(name)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Replace the selected tags by copies of `element`
pub fn xml_replace_tag(
    root: XmlNodeMut<'_>,
    target: &TargetPath,
    element: XmlNode<'_>,
    occurrences: &Occurrences,
) -> Result<usize> {
    let nodes = target.evaluate(root)?;
    let selected = outermost_nodes(occurrences.select(&nodes)?);
    let count = selected.len();
    for node in selected {
        let replacement = node.import_copy(element)?;
        node.replace_with(replacement);
    }
    Ok(count)
}

/// Distribute `values` over `nodes`: one value per node, or one value for all
fn distribute<'v>(values: &'v [String], count: usize, what: &str) -> Result<Vec<&'v str>> {
    match values.len() {
        1 => Ok(vec![values[0].as_str(); count]),
        n if n == count => Ok(values.iter().map(String::as_str).collect()),
        n => Err(FleurError::invalid(format!(
            "{} values given for {} but {} nodes are selected",
            n, what, count
        ))),
    }
}

/// Set an attribute on existing tags; fails if no tag is selected
pub fn xml_set_attrib_value_no_create(
    root: XmlNodeMut<'_>,
    target: &TargetPath,
    name: &str,
    values: &[String],
    occurrences: &Occurrences,
) -> Result<usize> {
    let nodes = occurrences.select(&target.evaluate(root)?)?;
    if nodes.is_empty() {
        return Err(FleurError::MissingData {
            details: format!("no tag found at {} to set attribute '{}'", target.xpath, name),
        });
    }
    let values = distribute(values, nodes.len(), name)?;
    for (node, value) in nodes.iter().zip(values) {
        node.set_attribute(name, value)?;
    }
    Ok(nodes.len())
}

/// Set the text of existing tags; fails if no tag is selected
pub fn xml_set_text_no_create(
    root: XmlNodeMut<'_>,
    target: &TargetPath,
    texts: &[String],
    occurrences: &Occurrences,
) -> Result<usize> {
    let nodes = occurrences.select(&target.evaluate(root)?)?;
    if nodes.is_empty() {
        return Err(FleurError::MissingData {
            details: format!("no tag found at {} to set text", target.xpath),
        });
    }
    let texts = distribute(texts, nodes.len(), target.tag_name())?;
    for (node, text) in nodes.iter().zip(texts) {
        node.set_text(text)?;
    }
    Ok(nodes.len())
}

/// Make sure the tags at `target` exist, creating them (and with `create_parents` their
/// missing ancestors) otherwise
pub fn xml_ensure_tag(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    target: &TargetPath,
    create_parents: bool,
    correct_order: bool,
) -> Result<()> {
    if !target.evaluate(root)?.is_empty() {
        return Ok(());
    }
    let parent = target.parent()?;
    if create_parents {
        xml_ensure_tag(root, schema, &parent, true, correct_order)?;
    }
    xml_create_tag(
        root,
        schema,
        &parent,
        NewElement::Tag(target.tag_name()),
        &Occurrences::All,
        correct_order,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libxml2::XmlDocument;

    const SPECIES: &str = "/fleurInput/atomSpecies/species";

    fn inpxml() -> XmlDocument {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/inp.xml");
        let content = std::fs::read_to_string(path).unwrap();
        XmlDocument::parse_str(&content).unwrap()
    }

    fn count(document: &XmlDocument, xpath: &str) -> usize {
        document
            .root()
            .xpath_nodes(xpath, &XPathVariables::new())
            .unwrap()
            .len()
    }

    #[test]
    fn test_delete_nested_selection() {
        let mut document = inpxml();
        let target = TargetPath::simple(&format!("{0} | {0}/lo", SPECIES));
        let removed = xml_delete_tag(document.root_mut(), &target, &Occurrences::All).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(count(&document, SPECIES), 0);
        assert_eq!(count(&document, "//lo"), 0);
        let xml = document.to_xml_string();
        assert!(xml.contains("<atomSpecies"));
        assert!(!xml.contains("Fe-1\" element"));
    }

    #[test]
    fn test_delete_same_node_twice() {
        let mut document = inpxml();
        let target = TargetPath::simple(SPECIES);
        let occurrences = Occurrences::Indices(vec![0, -2]);
        let removed = xml_delete_tag(document.root_mut(), &target, &occurrences).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(count(&document, SPECIES), 1);
        assert_eq!(count(&document, "//lo"), 1);
        assert!(document.to_xml_string().contains("Pt-1"));
    }

    #[test]
    fn test_replace_nested_selection() {
        let mut document = inpxml();
        let replacement = XmlDocument::parse_str(r#"<species name="X-1" element="X"/>"#).unwrap();
        let target = TargetPath::simple(&format!("{0}/lo | {0} | {0}", SPECIES));
        let replaced = xml_replace_tag(
            document.root_mut(),
            &target,
            replacement.root(),
            &Occurrences::All,
        )
        .unwrap();

        assert_eq!(replaced, 2);
        assert_eq!(count(&document, &format!("{}[@name='X-1']", SPECIES)), 2);
        assert_eq!(count(&document, "//lo"), 0);
        assert!(document.to_xml_string().contains("X-1"));
    }
}
