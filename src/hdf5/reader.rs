//! Recipe-driven reading of HDF5 files.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use ::hdf5::File;
use serde_json::Value as JsonValue;
use tempfile::NamedTempFile;

use super::transforms::TransformRegistry;
use super::value::H5Value;
use crate::error::{FleurError, Result};

/// Function applied to the whole value by `apply_lambda`
pub type Lambda = fn(H5Value) -> std::result::Result<H5Value, String>;

/// Positional argument of a transformation
#[derive(Clone)]
pub enum Arg {
    Json(JsonValue),
    Lambda(Lambda),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Json(value) => write!(f, "{}", value),
            Arg::Lambda(_) => f.write_str("<lambda>"),
        }
    }
}

pub type Kwargs = BTreeMap<String, JsonValue>;

/// A registered transformation with its arguments
#[derive(Debug, Clone)]
pub struct Transformation {
    pub name: String,
    pub args: Vec<Arg>,
    pub kwargs: Kwargs,
}

/// One element of a pipeline
#[derive(Debug, Clone)]
pub enum Step {
    Transformation(Transformation),
    /// Receives the value of a previously computed attribute before its own arguments
    AttribTransformation {
        attrib_name: String,
        transformation: Transformation,
    },
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Step::Transformation(Transformation {
            name: name.into(),
            args: Vec::new(),
            kwargs: Kwargs::new(),
        })
    }

    pub fn with_attribute(name: impl Into<String>, attrib_name: impl Into<String>) -> Self {
        Step::AttribTransformation {
            attrib_name: attrib_name.into(),
            transformation: Transformation {
                name: name.into(),
                args: Vec::new(),
                kwargs: Kwargs::new(),
            },
        }
    }

    pub fn transformation(&self) -> &Transformation {
        match self {
            Step::Transformation(transformation)
            | Step::AttribTransformation { transformation, .. } => transformation,
        }
    }

    fn transformation_mut(&mut self) -> &mut Transformation {
        match self {
            Step::Transformation(transformation)
            | Step::AttribTransformation { transformation, .. } => transformation,
        }
    }

    pub fn attrib_name(&self) -> Option<&str> {
        match self {
            Step::Transformation(_) => None,
            Step::AttribTransformation { attrib_name, .. } => Some(attrib_name),
        }
    }

    pub fn arg(mut self, value: impl Into<JsonValue>) -> Self {
        self.transformation_mut().args.push(Arg::Json(value.into()));
        self
    }

    pub fn lambda(mut self, function: Lambda) -> Self {
        self.transformation_mut().args.push(Arg::Lambda(function));
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.transformation_mut()
            .kwargs
            .insert(key.into(), value.into());
        self
    }
}

/// What to read from one path and how to transform it
#[derive(Debug, Clone)]
pub struct RecipeEntry {
    pub h5path: String,
    pub transforms: Vec<Step>,
    /// Merge the keys of a mapping result into the section output
    pub unpack_dict: bool,
    pub description: Option<String>,
    /// Skip the entry when the path is missing
    pub optional: bool,
}

impl RecipeEntry {
    pub fn new(h5path: impl Into<String>) -> Self {
        RecipeEntry {
            h5path: h5path.into(),
            transforms: Vec::new(),
            unpack_dict: false,
            description: None,
            optional: false,
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.transforms.push(step);
        self
    }

    pub fn unpack_dict(mut self) -> Self {
        self.unpack_dict = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Declarative description of what to read from a file
///
/// Entries keep their insertion order; all attributes are computed before any dataset.
#[derive(Debug, Clone, Default)]
pub struct Recipe {
    pub name: String,
    pub datasets: Vec<(String, RecipeEntry)>,
    pub attributes: Vec<(String, RecipeEntry)>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Recipe {
            name: name.into(),
            ..Recipe::default()
        }
    }

    pub fn dataset(mut self, key: impl Into<String>, entry: RecipeEntry) -> Self {
        self.datasets.push((key.into(), entry));
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, entry: RecipeEntry) -> Self {
        self.attributes.push((key.into(), entry));
        self
    }

    /// Check transformation names and attribute references against `registry`
    pub fn validate(&self, registry: &TransformRegistry) -> Result<()> {
        let attribute_keys: Vec<&str> = self.attributes.iter().map(|(key, _)| key.as_str()).collect();
        let sections = [("attributes", &self.attributes), ("datasets", &self.datasets)];
        for (section, entries) in sections {
            for (key, entry) in entries.iter() {
                for step in &entry.transforms {
                    let name = step.transformation().name.as_str();
                    if !registry.contains(name) {
                        return Err(FleurError::Recipe(format!(
                            "{}: unknown transformation '{}' in {} entry '{}'",
                            self.name, name, section, key
                        )));
                    }
                    match step.attrib_name() {
                        Some(attrib_name) => {
                            if section == "attributes" {
                                return Err(FleurError::Recipe(format!(
                                    "{}: attribute entry '{}' cannot use attribute transformation '{}'",
                                    self.name, key, name
                                )));
                            }
                            if !registry.needs_attribute(name) {
                                return Err(FleurError::Recipe(format!(
                                    "{}: '{}' does not take an attribute",
                                    self.name, name
                                )));
                            }
                            if !attribute_keys.contains(&attrib_name) {
                                return Err(FleurError::Recipe(format!(
                                    "{}: dataset entry '{}' refers to unknown attribute '{}'",
                                    self.name, key, attrib_name
                                )));
                            }
                        }
                        None if registry.needs_attribute(name) => {
                            return Err(FleurError::Recipe(format!(
                                "{}: '{}' needs an attribute",
                                self.name, name
                            )));
                        }
                        None => {}
                    }
                }
            }
        }
        Ok(())
    }
}

/// Result of reading a recipe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeOutput {
    pub datasets: BTreeMap<String, H5Value>,
    pub attributes: BTreeMap<String, H5Value>,
}

/// An open HDF5 file; a scratch copy made for streams is removed together with it
pub struct Hdf5Reader {
    file: File,
    source: PathBuf,
    _scratch: Option<NamedTempFile>,
}

impl fmt::Debug for Hdf5Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hdf5Reader")
            .field("source", &self.source)
            .field("scratch", &self._scratch.is_some())
            .finish()
    }
}

impl Hdf5Reader {
    pub fn open(path: &Path) -> Result<Self> {
        log::debug!("Opening HDF5 file {}", path.display());
        Ok(Hdf5Reader {
            file: File::open(path)?,
            source: path.to_path_buf(),
            _scratch: None,
        })
    }

    /// Copy a (possibly non-seekable) stream into a temporary file and open that
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let mut scratch = NamedTempFile::new()?;
        let copied = std::io::copy(&mut reader, scratch.as_file_mut())?;
        log::debug!(
            "Copied {} bytes of HDF5 data to {}",
            copied,
            scratch.path().display()
        );
        Ok(Hdf5Reader {
            file: File::open(scratch.path())?,
            source: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    fn fetch(&self, h5path: &str) -> Result<H5Value> {
        match self.file.dataset(h5path) {
            Ok(dataset) => Ok(H5Value::Dataset(dataset)),
            Err(_) => self
                .file
                .group(h5path)
                .map(H5Value::Group)
                .map_err(|e| FleurError::MissingData {
                    details: format!("{} not found in {}: {}", h5path, self.source.display(), e),
                }),
        }
    }

    /// Execute `recipe`; with `move_to_memory` no value refers to the file afterwards
    pub fn read(&self, recipe: &Recipe, move_to_memory: bool) -> Result<RecipeOutput> {
        let registry = TransformRegistry::global();
        recipe.validate(registry)?;

        let mut handles: BTreeMap<&str, H5Value> = BTreeMap::new();
        for (key, entry) in recipe.attributes.iter().chain(&recipe.datasets) {
            if handles.contains_key(entry.h5path.as_str()) {
                continue;
            }
            match self.fetch(&entry.h5path) {
                Ok(handle) => {
                    handles.insert(&entry.h5path, handle);
                }
                Err(e) if entry.optional => {
                    log::debug!("Skipping optional entry '{}': {}", key, e);
                }
                Err(e) => return Err(e),
            }
        }

        let mut output = RecipeOutput::default();
        for (key, entry) in &recipe.attributes {
            let Some(handle) = handles.get(entry.h5path.as_str()) else {
                continue;
            };
            let value = run_pipeline(registry, entry, handle.clone(), &output.attributes)?;
            store(&mut output.attributes, key, entry, value)?;
        }
        for (key, entry) in &recipe.datasets {
            let Some(handle) = handles.get(entry.h5path.as_str()) else {
                continue;
            };
            let value = run_pipeline(registry, entry, handle.clone(), &output.attributes)?;
            store(&mut output.datasets, key, entry, value)?;
        }

        if move_to_memory {
            output.attributes = into_memory(output.attributes)?;
            output.datasets = into_memory(output.datasets)?;
        }
        Ok(output)
    }
}

fn run_pipeline(
    registry: &TransformRegistry,
    entry: &RecipeEntry,
    mut value: H5Value,
    attributes: &BTreeMap<String, H5Value>,
) -> Result<H5Value> {
    for step in &entry.transforms {
        let attribute = match step.attrib_name() {
            Some(attrib_name) => Some(attributes.get(attrib_name).ok_or_else(|| {
                FleurError::Recipe(format!(
                    "attribute '{}' is not available for {}",
                    attrib_name, entry.h5path
                ))
            })?),
            None => None,
        };
        value = registry.apply(step.transformation(), value, attribute)?;
    }
    Ok(value)
}

fn store(
    output: &mut BTreeMap<String, H5Value>,
    key: &str,
    entry: &RecipeEntry,
    value: H5Value,
) -> Result<()> {
    let items = if entry.unpack_dict {
        let description = value.describe();
        value.into_map().ok_or_else(|| {
            FleurError::Recipe(format!(
                "entry '{}' unpacks a mapping but produced {}",
                key, description
            ))
        })?
    } else {
        BTreeMap::from([(key.to_string(), value)])
    };
    for (name, item) in items {
        if output.contains_key(&name) {
            return Err(FleurError::Recipe(format!(
                "key '{}' of entry '{}' is already present",
                name, key
            )));
        }
        output.insert(name, item);
    }
    Ok(())
}

fn into_memory(values: BTreeMap<String, H5Value>) -> Result<BTreeMap<String, H5Value>> {
    values
        .into_iter()
        .map(|(key, value)| Ok((key, value.into_memory()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> &'static TransformRegistry {
        TransformRegistry::global()
    }

    #[test]
    fn test_validate_unknown_attribute() {
        let recipe = Recipe::new("broken")
            .attribute("nbands", RecipeEntry::new("/Local/BS/eigenvalues"))
            .dataset(
                "eigenvalues",
                RecipeEntry::new("/Local/BS/eigenvalues")
                    .step(Step::with_attribute("shift_by_attribute", "fermi_energy")),
            );
        let error = recipe.validate(registry()).unwrap_err();
        assert!(error.to_string().contains("fermi_energy"));
    }

    #[test]
    fn test_validate_attribute_transform_needs_attribute() {
        let recipe = Recipe::new("broken").dataset(
            "x",
            RecipeEntry::new("/x").step(Step::new("shift_by_attribute")),
        );
        assert!(matches!(recipe.validate(registry()), Err(FleurError::Recipe(_))));

        let recipe = Recipe::new("broken").dataset(
            "x",
            RecipeEntry::new("/x").step(Step::new("no_such_transform")),
        );
        assert!(matches!(recipe.validate(registry()), Err(FleurError::Recipe(_))));
    }

    #[test]
    fn test_store_rejects_duplicate_keys() {
        let mut output = BTreeMap::new();
        let entry = RecipeEntry::new("/x").unpack_dict();
        let first = BTreeMap::from([("a".to_string(), H5Value::int(1))]);
        store(&mut output, "first", &entry, H5Value::Map(first.clone())).unwrap();
        let error = store(&mut output, "second", &entry, H5Value::Map(first)).unwrap_err();
        assert!(error.to_string().contains("'a'"));

        let error = store(&mut output, "third", &entry, H5Value::int(3)).unwrap_err();
        assert!(matches!(error, FleurError::Recipe(_)));
    }

    #[test]
    fn test_pipeline_order() {
        let entry = RecipeEntry::new("/x")
            .step(Step::new("multiply_scalar").arg(2.0))
            .step(Step::new("shift_dataset").arg(1.0));
        let value = run_pipeline(
            registry(),
            &entry,
            H5Value::float_vec(vec![1.0, 2.0]),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(value, H5Value::float_vec(vec![3.0, 5.0]));
    }
}
