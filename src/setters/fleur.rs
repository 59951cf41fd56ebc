//! Fleur specific helpers for modifying input files: species, atom groups, k-points and
//! the flat `inpchanges` mapping.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde_json::{Value as JsonValue, json};

use crate::converters::{Value, convert_to_xml};
use crate::error::{FleurError, Result};
use crate::libxml2::{XPathVariables, XmlNodeMut};
use crate::schema_dict::{AttribClass, PathFilter, SchemaDictionary, SchemaVersion};

use super::basic::{NewElement, Occurrences, TargetPath, create_child, xml_create_tag};
use super::dispatch::{CURRENT_VERSIONS, Dispatcher, MAX4_VERSIONS};
use super::names::{
    SetOptions, add_number_to_attrib, add_number_to_first_attrib, set_complex_tag,
    set_first_attrib_value, set_first_text,
};
use super::xpaths::{AddMode, WriteOptions};

const POSITION_TAGS: [&str; 3] = ["relPos", "absPos", "filmPos"];

fn species_filters(tag: &str, attribute: &str, species_name: &str) -> Option<JsonValue> {
    if species_name == "all" {
        return None;
    }
    let condition = match species_name.strip_prefix("all-") {
        Some(prefix) => json!({"contains": prefix}),
        None => json!({"=": species_name}),
    };
    Some(json!({ tag: { attribute: condition } }))
}

fn with_filters(options: SetOptions, filters: Option<JsonValue>) -> SetOptions {
    match filters {
        Some(filters) => options.filters(filters),
        None => options,
    }
}

/// An atom found by its label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledAtom {
    /// Label as written in the file (right aligned to 20 characters by Fleur)
    pub label: String,
    pub species: String,
}

/// Find the atom labeled `label` and the species of its atom group
pub fn find_atom_label(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    label: &str,
) -> Result<LabeledAtom> {
    let filter = PathFilter::new().contains("atomGroup");
    for path in schema.dict().tables().all_attrib_paths("label", &filter) {
        for attribute in root.as_node().xpath_nodes(&path, &XPathVariables::new())? {
            let raw = attribute.content();
            if raw.trim() != label.trim() {
                continue;
            }
            let species = attribute
                .parent()
                .and_then(|position| position.parent())
                .and_then(|group| group.attribute("species"))
                .ok_or_else(|| FleurError::MissingData {
                    details: format!("atom '{}' has no atom group with a species", label),
                })?;
            return Ok(LabeledAtom {
                label: raw,
                species,
            });
        }
    }
    Err(FleurError::MissingData {
        details: format!("no atom with label '{}' found", label),
    })
}

/// Apply nested `changes` to the species `species_name`
///
/// `all` selects every species, `all-<text>` those whose name contains `<text>`.
pub fn set_species(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    species_name: &str,
    changes: &Value,
    create: bool,
    write: WriteOptions,
) -> Result<()> {
    let options = SetOptions {
        create,
        write,
        ..SetOptions::default()
    };
    let options = with_filters(options, species_filters("species", "name", species_name));
    set_complex_tag(root, schema, "species", changes, &options)
}

/// [`set_species`] for the species of the atom labeled `atom_label`
pub fn set_species_label(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    atom_label: &str,
    changes: &Value,
    create: bool,
    write: WriteOptions,
) -> Result<()> {
    if atom_label == "all" {
        return set_species(root, schema, "all", changes, create, write);
    }
    let atom = find_atom_label(root, schema, atom_label)?;
    set_species(root, schema, &atom.species, changes, create, write)
}

/// Copy the species `species_name` under the name `new_name`, then apply `changes`
pub fn clone_species(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    species_name: &str,
    new_name: &str,
    changes: &Value,
    write: WriteOptions,
) -> Result<()> {
    let species_path = schema.dict().tag_xpath("species", &PathFilter::new())?;
    let name_of = |node: &XmlNodeMut<'_>| node.attribute("name").unwrap_or_default();
    let all_species = root.xpath_nodes(&species_path, &XPathVariables::new())?;
    if all_species.iter().any(|node| name_of(node) == new_name) {
        return Err(FleurError::invalid(format!("species '{}' already exists", new_name)));
    }
    let original = match all_species
        .iter()
        .filter(|node| name_of(node) == species_name)
        .collect::<Vec<_>>()
        .as_slice()
    {
        [original] => **original,
        found => {
            return Err(FleurError::invalid(format!(
                "expected one species '{}', found {}",
                species_name,
                found.len()
            )));
        }
    };

    let parent = TargetPath::simple(
        crate::schema_dict::parent_path(&species_path)
            .ok_or_else(|| FleurError::invalid("species tag has no parent"))?,
    );
    let created = xml_create_tag(
        root,
        schema,
        &parent,
        NewElement::Copy(original.as_node()),
        &Occurrences::All,
        write.correct_order,
    )?;
    for node in created {
        node.set_attribute("name", new_name)?;
    }

    if changes.as_map().is_some_and(|map| !map.is_empty()) {
        set_species(root, schema, new_name, changes, false, write)?;
    }
    Ok(())
}

/// Atom groups targeted by [`set_atomgroup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomGroupSelection<'s> {
    All,
    /// Index among the atom groups, negative values count from the end
    Position(i64),
    /// Groups of a species (`all-<text>` matches by substring)
    Species(&'s str),
    /// Groups holding the atom with this label
    Label(&'s str),
}

fn atomgroup_filters(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    selection: AtomGroupSelection<'_>,
) -> Result<Option<JsonValue>> {
    Ok(match selection {
        AtomGroupSelection::All => None,
        AtomGroupSelection::Position(index) => Some(json!({"atomGroup": {"index": index}})),
        AtomGroupSelection::Species(species) => species_filters("atomGroup", "species", species),
        AtomGroupSelection::Label(label) => {
            let atom = find_atom_label(root, schema, label)?;
            let positions = POSITION_TAGS
                .iter()
                .map(|tag| format!("./{}/@label", tag))
                .collect::<Vec<_>>()
                .join(" | ");
            Some(json!({"atomGroup": { positions: {"=": atom.label} }}))
        }
    })
}

/// Apply nested `changes` to the selected atom groups
pub fn set_atomgroup(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    changes: &Value,
    selection: AtomGroupSelection<'_>,
    write: WriteOptions,
) -> Result<()> {
    let options = SetOptions {
        write,
        ..SetOptions::default()
    };
    let options = with_filters(options, atomgroup_filters(root, schema, selection)?);
    set_complex_tag(root, schema, "atomGroup", changes, &options)
}

/// [`set_atomgroup`] for every group of the species of the atom labeled `atom_label`
pub fn set_atomgroup_label(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    atom_label: &str,
    changes: &Value,
    write: WriteOptions,
) -> Result<()> {
    if atom_label == "all" {
        return set_atomgroup(root, schema, changes, AtomGroupSelection::All, write);
    }
    let atom = find_atom_label(root, schema, atom_label)?;
    set_atomgroup(
        root,
        schema,
        changes,
        AtomGroupSelection::Species(&atom.species),
        write,
    )
}

/// Point the selected atom groups to `new_species_name`
///
/// With `clone`, the species currently used by the groups is copied first and `changes`
/// are applied to the copy.
pub fn switch_species(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    new_species_name: &str,
    selection: AtomGroupSelection<'_>,
    clone: bool,
    changes: &Value,
    write: WriteOptions,
) -> Result<()> {
    if clone {
        let filters = atomgroup_filters(root, schema, selection)?;
        let group_path = schema.dict().tag_xpath("atomGroup", &PathFilter::new())?;
        let eval = crate::query::EvalOptions {
            filters,
            ..Default::default()
        };
        let (xpath, variables) = crate::query::refine_xpath(root.as_node(), &group_path, &eval)?;
        let mut old_names: Vec<String> = root
            .as_node()
            .xpath_nodes(&xpath, &variables)?
            .into_iter()
            .filter_map(|group| group.attribute("species"))
            .collect();
        old_names.dedup();
        let [old_name] = old_names.as_slice() else {
            return Err(FleurError::invalid(format!(
                "cloning needs exactly one species in the selected atom groups, found {:?}",
                old_names
            )));
        };
        clone_species(root, schema, old_name, new_species_name, changes, write)?;
    }
    let species_change = Value::Map(
        [("species".to_string(), Value::from(new_species_name))]
            .into_iter()
            .collect(),
    );
    set_atomgroup(root, schema, &species_change, selection, write)
}

/// [`switch_species`] for the atom groups holding the atom labeled `atom_label`
pub fn switch_species_label(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    atom_label: &str,
    new_species_name: &str,
    clone: bool,
    changes: &Value,
    write: WriteOptions,
) -> Result<()> {
    let selection = if atom_label == "all" {
        AtomGroupSelection::All
    } else {
        AtomGroupSelection::Label(atom_label)
    };
    switch_species(root, schema, new_species_name, selection, clone, changes, write)
}

/// Set unique attributes and texts from a flat mapping
///
/// `xcFunctional` is accepted as alias for the name of the exchange-correlation
/// functional.
pub fn set_inpchanges(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    changes: &BTreeMap<String, Value>,
    write: WriteOptions,
) -> Result<()> {
    for (key, value) in changes {
        let options = SetOptions {
            write,
            ..SetOptions::default()
        };
        if key.eq_ignore_ascii_case("xcFunctional") {
            set_first_attrib_value(root, schema, "name", value, &options.tag_name("xcFunctional"))?;
        } else if schema.dict().text_tags().contains(key) {
            set_first_text(root, schema, key, value, &options)?;
        } else {
            set_first_attrib_value(root, schema, key, value, &options.exclude(AttribClass::Other))?;
        }
    }
    Ok(())
}

/// Shift (or scale) the first occurrence of each attribute in `changes`
pub fn shift_value(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    changes: &BTreeMap<String, f64>,
    mode: AddMode,
    options: &SetOptions,
) -> Result<()> {
    for (name, number) in changes {
        add_number_to_first_attrib(root, schema, name, *number, mode, options)?;
    }
    Ok(())
}

/// Shift (or scale) an attribute of the species of the atom labeled `atom_label`
pub fn shift_value_species_label(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    atom_label: &str,
    attribute: &str,
    number: f64,
    mode: AddMode,
    write: WriteOptions,
) -> Result<usize> {
    let species = if atom_label == "all" {
        "all".to_string()
    } else {
        find_atom_label(root, schema, atom_label)?.species
    };
    let options = SetOptions {
        write,
        ..SetOptions::default()
    }
    .contains("species");
    let options = with_filters(options, species_filters("species", "name", &species));
    add_number_to_attrib(root, schema, attribute, number, mode, &options)
}

/// Explicit k-point list for [`set_kpointlist`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KPointList {
    pub kpoints: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
    /// Name of the list; `default-<n>` if not given
    pub name: Option<String>,
    /// `path`, `mesh`, `tria-bulk` or `SPEX-mesh`
    pub kpoint_type: String,
    /// Labels of special points by index into `kpoints`
    pub special_labels: BTreeMap<usize, String>,
    /// Select the new list for the calculation
    pub switch: bool,
    /// Replace an existing list of the same name
    pub overwrite: bool,
}

impl KPointList {
    pub fn new(kpoints: Vec<[f64; 3]>, weights: Vec<f64>) -> Self {
        KPointList {
            kpoints,
            weights,
            kpoint_type: "path".to_string(),
            ..KPointList::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.kpoints.len() != self.weights.len() {
            return Err(FleurError::invalid(format!(
                "{} k-points but {} weights",
                self.kpoints.len(),
                self.weights.len()
            )));
        }
        Ok(())
    }
}

type SetKpointListFn =
    fn(XmlNodeMut<'_>, &dyn SchemaDictionary, &KPointList, WriteOptions) -> Result<()>;
type SetNkptsFn = fn(XmlNodeMut<'_>, &dyn SchemaDictionary, usize, bool, WriteOptions) -> Result<()>;
type SetKpathFn = fn(
    XmlNodeMut<'_>,
    &dyn SchemaDictionary,
    &BTreeMap<String, [f64; 3]>,
    usize,
    bool,
    WriteOptions,
) -> Result<()>;
type SwitchKpointsetFn = fn(XmlNodeMut<'_>, &dyn SchemaDictionary, &str, WriteOptions) -> Result<()>;

static SET_KPOINTLIST: LazyLock<Dispatcher<SetKpointListFn>> = LazyLock::new(|| {
    Dispatcher::<SetKpointListFn>::new("set_kpointlist")
        .register(MAX4_VERSIONS, set_kpointlist_max4)
        .register(CURRENT_VERSIONS, set_kpointlist_current)
});

static SET_NKPTS: LazyLock<Dispatcher<SetNkptsFn>> = LazyLock::new(|| {
    Dispatcher::<SetNkptsFn>::new("set_nkpts")
        .register(MAX4_VERSIONS, set_nkpts_max4)
        .register(CURRENT_VERSIONS, set_nkpts_current)
});

static SET_KPATH: LazyLock<Dispatcher<SetKpathFn>> = LazyLock::new(|| {
    Dispatcher::<SetKpathFn>::new("set_kpath")
        .register(MAX4_VERSIONS, set_kpath_max4)
        .register(CURRENT_VERSIONS, set_kpath_current)
});

static SWITCH_KPOINTSET: LazyLock<Dispatcher<SwitchKpointsetFn>> = LazyLock::new(|| {
    Dispatcher::<SwitchKpointsetFn>::new("switch_kpointset")
        .register(MAX4_VERSIONS, switch_kpointset_max4)
        .register(CURRENT_VERSIONS, switch_kpointset_current)
});

/// Versions without an implementation, per version dependent operation
pub fn uncovered_versions() -> Vec<(&'static str, Vec<SchemaVersion>)> {
    vec![
        (SET_KPOINTLIST.name(), SET_KPOINTLIST.uncovered_versions()),
        (SET_NKPTS.name(), SET_NKPTS.uncovered_versions()),
        (SET_KPATH.name(), SET_KPATH.uncovered_versions()),
        (SWITCH_KPOINTSET.name(), SWITCH_KPOINTSET.uncovered_versions()),
    ]
}

fn unsupported(operation: &str, schema: &dyn SchemaDictionary, details: &str) -> FleurError {
    FleurError::UnsupportedOperation {
        operation: operation.to_string(),
        version: schema.input_version().to_string(),
        details: details.to_string(),
    }
}

/// Write an explicit list of k-points
pub fn set_kpointlist(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    list: &KPointList,
    write: WriteOptions,
) -> Result<()> {
    list.check()?;
    SET_KPOINTLIST.select(schema.input_version())?(root, schema, list, write)
}

/// Use a k-point mesh of `count` points
pub fn set_nkpts(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    count: usize,
    gamma: bool,
    write: WriteOptions,
) -> Result<()> {
    SET_NKPTS.select(schema.input_version())?(root, schema, count, gamma, write)
}

/// Use a band structure path through the named special points
pub fn set_kpath(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    kpath: &BTreeMap<String, [f64; 3]>,
    count: usize,
    gamma: bool,
    write: WriteOptions,
) -> Result<()> {
    SET_KPATH.select(schema.input_version())?(root, schema, kpath, count, gamma, write)
}

/// Select the k-point list named `list_name` for the calculation
pub fn switch_kpointset(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    list_name: &str,
    write: WriteOptions,
) -> Result<()> {
    SWITCH_KPOINTSET.select(schema.input_version())?(root, schema, list_name, write)
}

fn attribute_text(
    schema: &dyn SchemaDictionary,
    name: &str,
    value: impl Into<Value>,
    write: WriteOptions,
) -> Result<String> {
    convert_to_xml(
        &value.into(),
        schema.dict().attrib_type(name)?,
        name,
        write.float_precision,
    )
}

fn kpoint_text(schema: &dyn SchemaDictionary, kpoint: &[f64; 3], write: WriteOptions) -> Result<String> {
    let coordinates = Value::List(kpoint.iter().map(|&x| Value::Float(x)).collect());
    convert_to_xml(
        &coordinates,
        schema.dict().text_type("kPoint")?,
        "kPoint",
        write.float_precision,
    )
}

/// Create `kPoint` children below `list_node`
fn write_kpoints(
    list_node: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    list_path: &str,
    list: &KPointList,
    write: WriteOptions,
) -> Result<()> {
    for (index, (kpoint, weight)) in list.kpoints.iter().zip(&list.weights).enumerate() {
        let node = create_child(
            list_node,
            NewElement::Tag("kPoint"),
            schema,
            list_path,
            write.correct_order,
        )?;
        node.set_attribute("weight", &attribute_text(schema, "weight", *weight, write)?)?;
        if let Some(label) = list.special_labels.get(&index) {
            node.set_attribute("label", label)?;
        }
        node.set_text(&kpoint_text(schema, kpoint, write)?)?;
    }
    Ok(())
}

fn single_node<'d>(root: XmlNodeMut<'d>, path: &str) -> Result<XmlNodeMut<'d>> {
    match root.xpath_nodes(path, &XPathVariables::new())?.as_slice() {
        [node] => Ok(*node),
        found => Err(FleurError::MissingData {
            details: format!("expected one tag at {}, found {}", path, found.len()),
        }),
    }
}

fn set_kpointlist_current(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    list: &KPointList,
    write: WriteOptions,
) -> Result<()> {
    let lists_path = schema.dict().tag_xpath("kPointLists", &PathFilter::new())?;
    let list_path = format!("{}/kPointList", lists_path);
    let lists = single_node(root, &lists_path)?;
    let existing: Vec<XmlNodeMut<'_>> = lists
        .children()
        .into_iter()
        .filter(|node| node.name() == "kPointList")
        .collect();

    let name = list
        .name
        .clone()
        .unwrap_or_else(|| format!("default-{}", existing.len() + 1));
    if let Some(previous) = existing
        .iter()
        .find(|node| node.attribute("name").as_deref() == Some(name.as_str()))
    {
        if !list.overwrite {
            return Err(FleurError::invalid(format!(
                "k-point list '{}' already exists",
                name
            )));
        }
        previous.remove();
    }

    let node = create_child(
        lists,
        NewElement::Tag("kPointList"),
        schema,
        &lists_path,
        write.correct_order,
    )?;
    node.set_attribute("name", &name)?;
    node.set_attribute("count", &list.kpoints.len().to_string())?;
    node.set_attribute("type", &list.kpoint_type)?;
    write_kpoints(node, schema, &list_path, list, write)?;

    if list.switch {
        switch_kpointset_current(root, schema, &name, write)?;
    }
    Ok(())
}

/// Remove the k-point specification of `bzIntegration` (not the alternative sets)
fn clear_kpoints_max4(bz_integration: XmlNodeMut<'_>) {
    for child in bz_integration.children() {
        if matches!(child.name().as_str(), "kPointCount" | "kPointList" | "kPointMesh") {
            child.remove();
        }
    }
}

fn set_kpointlist_max4(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    list: &KPointList,
    write: WriteOptions,
) -> Result<()> {
    if list.switch || list.name.is_some() {
        return Err(unsupported(
            "set_kpointlist",
            schema,
            "named k-point lists need input version 0.32 or newer",
        ));
    }
    let bz_path = schema.dict().tag_xpath("bzIntegration", &PathFilter::new())?;
    let bz_integration = single_node(root, &bz_path)?;
    clear_kpoints_max4(bz_integration);

    let list_path = format!("{}/kPointList", bz_path);
    let node = create_child(
        bz_integration,
        NewElement::Tag("kPointList"),
        schema,
        &bz_path,
        write.correct_order,
    )?;
    node.set_attribute("posScale", &attribute_text(schema, "posScale", 1.0, write)?)?;
    node.set_attribute("weightScale", &attribute_text(schema, "weightScale", 1.0, write)?)?;
    node.set_attribute("count", &list.kpoints.len().to_string())?;
    write_kpoints(node, schema, &list_path, list, write)
}

fn set_nkpts_max4(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    count: usize,
    gamma: bool,
    write: WriteOptions,
) -> Result<()> {
    let bz_path = schema.dict().tag_xpath("bzIntegration", &PathFilter::new())?;
    let bz_integration = single_node(root, &bz_path)?;
    clear_kpoints_max4(bz_integration);

    let node = create_child(
        bz_integration,
        NewElement::Tag("kPointCount"),
        schema,
        &bz_path,
        write.correct_order,
    )?;
    node.set_attribute("count", &count.to_string())?;
    node.set_attribute("gamma", &attribute_text(schema, "gamma", gamma, write)?)?;
    Ok(())
}

fn set_nkpts_current(
    _root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    _count: usize,
    _gamma: bool,
    _write: WriteOptions,
) -> Result<()> {
    Err(unsupported(
        "set_nkpts",
        schema,
        "k-point counts were replaced by named k-point lists; use set_kpointlist",
    ))
}

fn set_kpath_max4(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    kpath: &BTreeMap<String, [f64; 3]>,
    count: usize,
    gamma: bool,
    write: WriteOptions,
) -> Result<()> {
    let bz_path = schema.dict().tag_xpath("bzIntegration", &PathFilter::new())?;
    let bz_integration = single_node(root, &bz_path)?;
    for child in bz_integration.children() {
        if child.name() == "altKPointSet" && child.attribute("purpose").as_deref() == Some("bands") {
            child.remove();
        }
    }

    let set_path = format!("{}/altKPointSet", bz_path);
    let count_path = format!("{}/kPointCount", set_path);
    let alt_set = create_child(
        bz_integration,
        NewElement::Tag("altKPointSet"),
        schema,
        &bz_path,
        write.correct_order,
    )?;
    alt_set.set_attribute("purpose", "bands")?;
    let count_node = create_child(
        alt_set,
        NewElement::Tag("kPointCount"),
        schema,
        &set_path,
        write.correct_order,
    )?;
    count_node.set_attribute("count", &count.to_string())?;
    count_node.set_attribute("gamma", &attribute_text(schema, "gamma", gamma, write)?)?;

    let point_type = schema.dict().text_type("specialPoint")?;
    for (label, point) in kpath {
        let node = create_child(
            count_node,
            NewElement::Tag("specialPoint"),
            schema,
            &count_path,
            write.correct_order,
        )?;
        node.set_attribute("name", label)?;
        let coordinates = Value::List(point.iter().map(|&x| Value::Float(x)).collect());
        node.set_text(&convert_to_xml(
            &coordinates,
            point_type,
            "specialPoint",
            write.float_precision,
        )?)?;
    }
    Ok(())
}

fn set_kpath_current(
    _root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    _kpath: &BTreeMap<String, [f64; 3]>,
    _count: usize,
    _gamma: bool,
    _write: WriteOptions,
) -> Result<()> {
    Err(unsupported(
        "set_kpath",
        schema,
        "band paths are given as k-point lists of type 'path'; use set_kpointlist",
    ))
}

fn switch_kpointset_current(
    root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    list_name: &str,
    write: WriteOptions,
) -> Result<()> {
    let names_path = schema
        .dict()
        .attrib_xpath("name", &PathFilter::new().tag_name("kPointList"))?;
    let known: Vec<String> = root
        .as_node()
        .xpath_nodes(&names_path, &XPathVariables::new())?
        .into_iter()
        .map(|attribute| attribute.content())
        .collect();
    if !known.iter().any(|name| name == list_name) {
        return Err(FleurError::invalid(format!(
            "no k-point list named '{}' (available: {:?})",
            list_name, known
        )));
    }
    let options = SetOptions {
        write,
        ..SetOptions::default()
    };
    set_first_attrib_value(root, schema, "listName", &Value::from(list_name), &options)?;
    Ok(())
}

fn switch_kpointset_max4(
    _root: XmlNodeMut<'_>,
    schema: &dyn SchemaDictionary,
    _list_name: &str,
    _write: WriteOptions,
) -> Result<()> {
    Err(unsupported(
        "switch_kpointset",
        schema,
        "input versions before 0.32 have a single k-point set",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_version_is_dispatched() {
        for (operation, missing) in uncovered_versions() {
            assert!(missing.is_empty(), "{} misses {:?}", operation, missing);
        }
    }

    #[test]
    fn test_species_filters() {
        assert_eq!(species_filters("species", "name", "all"), None);
        assert_eq!(
            species_filters("species", "name", "all-Fe"),
            Some(json!({"species": {"name": {"contains": "Fe"}}}))
        );
        assert_eq!(
            species_filters("atomGroup", "species", "Pt-1"),
            Some(json!({"atomGroup": {"species": {"=": "Pt-1"}}}))
        );
    }
}
