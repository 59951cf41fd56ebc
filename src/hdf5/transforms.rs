//! Named transformations usable in recipes.
//!
//! A transformation takes the current value and returns a new one. Transformations that
//! need a previously computed recipe attribute receive it before their own arguments.
//! Unless stated otherwise, a transformation applied to a mapping is applied to every
//! entry of the mapping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use ::hdf5::Location;
use ndarray::{Array1, Array2, ArrayD, Axis, Ix2, IxDyn, Slice};
use num_complex::Complex64;
use serde_json::Value as JsonValue;

use super::reader::{Arg, Lambda, Transformation};
use super::value::{H5Value, read_container};
use crate::error::{FleurError, Result};

type TransformResult = std::result::Result<H5Value, String>;

pub type TransformFn = fn(H5Value, &StepArgs<'_>) -> TransformResult;

/// Arguments of one step, addressed by position or keyword
pub struct StepArgs<'a> {
    attribute: Option<&'a H5Value>,
    positional: &'a [Arg],
    kwargs: &'a BTreeMap<String, JsonValue>,
}

impl<'a> StepArgs<'a> {
    fn attribute(&self) -> std::result::Result<&'a H5Value, String> {
        self.attribute
            .ok_or_else(|| "no attribute value was passed".to_string())
    }

    fn json(&self, index: usize, name: &str) -> Option<&'a JsonValue> {
        if let Some(value) = self.kwargs.get(name) {
            return Some(value);
        }
        match self.positional.get(index) {
            Some(Arg::Json(value)) => Some(value),
            _ => None,
        }
    }

    fn f64(&self, index: usize, name: &str) -> std::result::Result<f64, String> {
        self.json(index, name)
            .ok_or_else(|| format!("missing argument '{}'", name))?
            .as_f64()
            .ok_or_else(|| format!("argument '{}' must be a number", name))
    }

    fn i64(&self, index: usize, name: &str) -> std::result::Result<i64, String> {
        self.json(index, name)
            .ok_or_else(|| format!("missing argument '{}'", name))?
            .as_i64()
            .ok_or_else(|| format!("argument '{}' must be an integer", name))
    }

    fn bool_or(&self, index: usize, name: &str, default: bool) -> std::result::Result<bool, String> {
        match self.json(index, name) {
            None | Some(JsonValue::Null) => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| format!("argument '{}' must be a boolean", name)),
        }
    }

    fn str_opt(&self, index: usize, name: &str) -> std::result::Result<Option<&'a str>, String> {
        match self.json(index, name) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| format!("argument '{}' must be a string", name)),
        }
    }

    /// A single string or a list of strings
    fn strings(&self, index: usize, name: &str) -> std::result::Result<Option<Vec<String>>, String> {
        match self.json(index, name) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(text)) => Ok(Some(vec![text.clone()])),
            Some(JsonValue::Array(items)) => items
                .iter()
                .map(|item| match item {
                    JsonValue::String(text) => Ok(text.clone()),
                    JsonValue::Number(number) => Ok(number.to_string()),
                    _ => Err(format!("argument '{}' must contain strings", name)),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(format!("argument '{}' must be a string or a list", name)),
        }
    }

    fn lambda(&self, index: usize) -> std::result::Result<Lambda, String> {
        match self.positional.get(index) {
            Some(Arg::Lambda(function)) => Ok(*function),
            _ => Err("missing function argument".to_string()),
        }
    }
}

/// All known transformations
pub struct TransformRegistry {
    transforms: BTreeMap<&'static str, TransformFn>,
    attribute_transforms: BTreeSet<&'static str>,
}

static REGISTRY: LazyLock<TransformRegistry> = LazyLock::new(|| {
    let mut registry = TransformRegistry {
        transforms: BTreeMap::new(),
        attribute_transforms: BTreeSet::new(),
    };
    registry.register("get_first_element", get_first_element, false);
    registry.register("index_dataset", index_dataset, false);
    registry.register("slice_dataset", slice_dataset, false);
    registry.register("get_shape", get_shape, false);
    registry.register("get_name", get_name, false);
    registry.register("tile_array", tile_array, false);
    registry.register("repeat_array", repeat_array, false);
    registry.register("get_all_child_datasets", get_all_child_datasets, false);
    registry.register("merge_subgroup_datasets", merge_subgroup_datasets, false);
    registry.register("stack_datasets", stack_datasets, false);
    registry.register("shift_dataset", shift_dataset, false);
    registry.register("multiply_scalar", multiply_scalar, false);
    registry.register("multiply_array", multiply_array, false);
    registry.register("calculate_norm", calculate_norm, false);
    registry.register("cumulative_sum", cumulative_sum, false);
    registry.register("get_attribute", get_attribute, false);
    registry.register("attributes", attributes, false);
    registry.register("move_to_memory", move_to_memory, false);
    registry.register("flatten_array", flatten_array, false);
    registry.register("split_array", split_array, false);
    registry.register("convert_to_str", convert_to_str, false);
    registry.register("apply_lambda", apply_lambda, false);
    registry.register("periodic_elements", periodic_elements, false);
    registry.register("sum_over_dict_entries", sum_over_dict_entries, false);
    registry.register("add_partial_sums_fixed", add_partial_sums_fixed, false);
    registry.register("convert_to_complex_array", convert_to_complex_array, false);
    registry.register("multiply_by_attribute", multiply_by_attribute, true);
    registry.register("shift_by_attribute", shift_by_attribute, true);
    registry.register("add_partial_sums", add_partial_sums, true);
    registry.register("repeat_array_by_attribute", repeat_array_by_attribute, true);
    registry.register("tile_array_by_attribute", tile_array_by_attribute, true);
    registry
});

impl TransformRegistry {
    pub fn global() -> &'static TransformRegistry {
        &REGISTRY
    }

    fn register(&mut self, name: &'static str, function: TransformFn, needs_attribute: bool) {
        self.transforms.insert(name, function);
        if needs_attribute {
            self.attribute_transforms.insert(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn needs_attribute(&self, name: &str) -> bool {
        self.attribute_transforms.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.transforms.keys().copied()
    }

    /// Run one transformation; failures name the transformation and its input
    pub fn apply(
        &self,
        transformation: &Transformation,
        value: H5Value,
        attribute: Option<&H5Value>,
    ) -> Result<H5Value> {
        let function = self.transforms.get(transformation.name.as_str()).ok_or_else(|| {
            FleurError::Recipe(format!("unknown transformation '{}'", transformation.name))
        })?;
        let input = value.describe();
        let args = StepArgs {
            attribute,
            positional: &transformation.args,
            kwargs: &transformation.kwargs,
        };
        log::debug!("Applying {} to {}", transformation.name, input);
        function(value, &args).map_err(|reason| FleurError::Transformation {
            name: transformation.name.clone(),
            input,
            reason,
        })
    }
}

/// Apply a generic array operation to whichever element type the value holds
macro_rules! map_any_array {
    ($value:expr, $array:ident => $body:expr) => {
        match $value {
            H5Value::Float($array) => $body.map(H5Value::Float),
            H5Value::Int($array) => $body.map(H5Value::Int),
            H5Value::Complex($array) => $body.map(H5Value::Complex),
            H5Value::Str($array) => $body.map(H5Value::Str),
            other => Err(format!("expected an array, got {}", other.describe())),
        }
    };
}

fn to_memory(value: H5Value) -> TransformResult {
    value.into_memory().map_err(|e| e.to_string())
}

/// Apply `function` to each entry of a mapping, or to the value itself
fn per_entry(value: H5Value, function: &dyn Fn(H5Value) -> TransformResult) -> TransformResult {
    match value {
        H5Value::Map(map) => map
            .into_iter()
            .map(|(key, value)| Ok((key, per_entry(value, function)?)))
            .collect::<std::result::Result<BTreeMap<_, _>, String>>()
            .map(H5Value::Map),
        value => function(value),
    }
}

fn float_array(value: H5Value) -> std::result::Result<ArrayD<f64>, String> {
    match to_memory(value)? {
        H5Value::Float(array) => Ok(array),
        H5Value::Int(array) => Ok(array.mapv(|v| v as f64)),
        other => Err(format!("expected a numeric array, got {}", other.describe())),
    }
}

fn int_array(value: &H5Value) -> std::result::Result<Vec<i64>, String> {
    match value.clone().into_memory().map_err(|e| e.to_string())? {
        H5Value::Int(array) => Ok(array.iter().copied().collect()),
        H5Value::Float(array) => array
            .iter()
            .map(|&v| {
                if v.fract() == 0.0 {
                    Ok(v as i64)
                } else {
                    Err(format!("expected integers, got {}", v))
                }
            })
            .collect(),
        other => Err(format!("expected integers, got {}", other.describe())),
    }
}

fn count(value: i64) -> std::result::Result<usize, String> {
    usize::try_from(value).map_err(|_| format!("expected a non-negative count, got {}", value))
}

fn normalize_index(index: i64, len: usize) -> std::result::Result<usize, String> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(format!("index {} out of range for length {}", index, len));
    }
    Ok(resolved as usize)
}

fn index_first_axis<T: Clone>(array: ArrayD<T>, index: i64) -> std::result::Result<ArrayD<T>, String> {
    if array.ndim() == 0 {
        return Err("cannot index a scalar".to_string());
    }
    let position = normalize_index(index, array.len_of(Axis(0)))?;
    Ok(array.index_axis(Axis(0), position).to_owned())
}

/// Python-style slice bounds, clamped to the axis length
fn clamp_slice(bounds: &JsonValue, len: usize) -> std::result::Result<Slice, String> {
    let items = bounds
        .as_array()
        .ok_or_else(|| format!("slice must be a list, got {}", bounds))?;
    let bound = |position: usize| -> std::result::Result<Option<i64>, String> {
        match items.get(position) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| format!("slice bounds must be integers, got {}", value)),
        }
    };
    let step = bound(2)?.unwrap_or(1);
    if step <= 0 {
        return Err(format!("slice step must be positive, got {}", step));
    }
    let resolve = |bound: i64| -> usize {
        let resolved = if bound < 0 { bound + len as i64 } else { bound };
        resolved.clamp(0, len as i64) as usize
    };
    let start = bound(0)?.map(resolve).unwrap_or(0);
    let end = bound(1)?.map(resolve).unwrap_or(len).max(start);
    Ok(Slice::new(start as isize, Some(end as isize), step as isize))
}

fn flatten<T: Clone>(array: ArrayD<T>, fortran: bool) -> ArrayD<T> {
    let elements: Vec<T> = if fortran {
        array.t().iter().cloned().collect()
    } else {
        array.iter().cloned().collect()
    };
    Array1::from(elements).into_dyn()
}

fn tile<T: Clone>(array: ArrayD<T>, times: usize) -> std::result::Result<ArrayD<T>, String> {
    if array.ndim() == 0 {
        let element = array.iter().next().cloned().into_iter();
        return Ok(Array1::from_iter(element.cycle().take(times)).into_dyn());
    }
    let last = Axis(array.ndim() - 1);
    if times == 0 {
        let mut shape = array.shape().to_vec();
        shape[last.index()] = 0;
        return ArrayD::from_shape_vec(IxDyn(&shape), Vec::new()).map_err(|e| e.to_string());
    }
    let views = vec![array.view(); times];
    ndarray::concatenate(last, &views).map_err(|e| e.to_string())
}

fn repeat<T: Clone>(array: ArrayD<T>, times: usize) -> ArrayD<T> {
    let elements: Vec<T> = array
        .iter()
        .flat_map(|element| std::iter::repeat_n(element.clone(), times))
        .collect();
    Array1::from(elements).into_dyn()
}

fn split_first_axis<T: Clone>(array: ArrayD<T>) -> std::result::Result<Vec<ArrayD<T>>, String> {
    if array.ndim() == 0 {
        return Err("cannot split a scalar".to_string());
    }
    Ok(array.outer_iter().map(|part| part.to_owned()).collect())
}

fn matrix(value: &H5Value) -> std::result::Result<Array2<f64>, String> {
    float_array(value.clone())?
        .into_dimensionality::<Ix2>()
        .map_err(|_| format!("expected a matrix, got {}", value.describe()))
}

fn json_matrix(value: &JsonValue) -> std::result::Result<Array2<f64>, String> {
    let rows = value
        .as_array()
        .ok_or_else(|| format!("expected a nested list, got {}", value))?;
    let mut elements = Vec::new();
    let mut width = None;
    for row in rows {
        let row = row
            .as_array()
            .ok_or_else(|| format!("expected a nested list, got {}", value))?;
        if *width.get_or_insert(row.len()) != row.len() {
            return Err("matrix rows have different lengths".to_string());
        }
        for element in row {
            elements.push(
                element
                    .as_f64()
                    .ok_or_else(|| format!("matrix entries must be numbers, got {}", element))?,
            );
        }
    }
    Array2::from_shape_vec((rows.len(), width.unwrap_or(0)), elements).map_err(|e| e.to_string())
}

/// `array @ matrix` over the last axis; rows of a 2D array are vectors
fn matrix_product(
    array: ArrayD<f64>,
    matrix: Array2<f64>,
    transpose: bool,
) -> std::result::Result<ArrayD<f64>, String> {
    let matrix = if transpose { matrix.reversed_axes() } else { matrix };
    match array.ndim() {
        1 => {
            let vector = array.into_dimensionality::<ndarray::Ix1>().map_err(|e| e.to_string())?;
            if vector.len() != matrix.nrows() {
                return Err(format!(
                    "cannot multiply vector of length {} with a {}x{} matrix",
                    vector.len(),
                    matrix.nrows(),
                    matrix.ncols()
                ));
            }
            Ok(vector.dot(&matrix).into_dyn())
        }
        2 => {
            let rows = array.into_dimensionality::<Ix2>().map_err(|e| e.to_string())?;
            if rows.ncols() != matrix.nrows() {
                return Err(format!(
                    "cannot multiply {}x{} array with a {}x{} matrix",
                    rows.nrows(),
                    rows.ncols(),
                    matrix.nrows(),
                    matrix.ncols()
                ));
            }
            Ok(rows.dot(&matrix).into_dyn())
        }
        n => Err(format!("matrix products need 1 or 2 dimensions, got {}", n)),
    }
}

/// Key filters shared by the child dataset collectors
///
/// A key is dropped when it contains any `ignore` phrase, or when it lacks any of the
/// `contains` phrases.
fn keep_key(key: &str, ignore: &Option<Vec<String>>, contains: &Option<Vec<String>>) -> bool {
    if let Some(ignore) = ignore
        && ignore.iter().any(|phrase| key.contains(phrase.as_str()))
    {
        return false;
    }
    if let Some(contains) = contains
        && contains.iter().any(|phrase| !key.contains(phrase.as_str()))
    {
        return false;
    }
    true
}

fn get_first_element(value: H5Value, _args: &StepArgs<'_>) -> TransformResult {
    per_entry(value, &|value| {
        map_any_array!(to_memory(value)?, array => {
            if array.ndim() == 0 {
                Ok(array)
            } else {
                index_first_axis(array, 0)
            }
        })
    })
}

fn index_dataset(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let index = args.i64(0, "index")?;
    per_entry(value, &|value| {
        map_any_array!(to_memory(value)?, array => index_first_axis(array, index))
    })
}

fn slice_dataset(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let bounds = args
        .json(0, "slice")
        .ok_or_else(|| "missing argument 'slice'".to_string())?;
    // [start, stop, step] applies to the first axis, a list of such lists to each axis
    let per_axis: Vec<JsonValue> = match bounds.as_array() {
        Some(items) if items.iter().any(JsonValue::is_array) => items.clone(),
        _ => vec![bounds.clone()],
    };
    per_entry(value, &|value| {
        map_any_array!(to_memory(value)?, array => {
            if per_axis.len() > array.ndim() {
                Err(format!("{} slices for {} dimensions", per_axis.len(), array.ndim()))
            } else {
                let slices = per_axis
                    .iter()
                    .enumerate()
                    .map(|(axis, bounds)| clamp_slice(bounds, array.len_of(Axis(axis))))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(array
                    .slice_each_axis(|axis| {
                        slices
                            .get(axis.axis.index())
                            .copied()
                            .unwrap_or_else(|| Slice::from(..))
                    })
                    .to_owned())
            }
        })
    })
}

fn get_shape(value: H5Value, _args: &StepArgs<'_>) -> TransformResult {
    per_entry(value, &|value| {
        let shape = value
            .shape()
            .ok_or_else(|| format!("{} has no shape", value.describe()))?;
        Ok(H5Value::Int(
            Array1::from_iter(shape.into_iter().map(|n| n as i64)).into_dyn(),
        ))
    })
}

fn get_name(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let full_path = args.bool_or(0, "full_path", true)?;
    per_entry(value, &|value| {
        let name = match &value {
            H5Value::Dataset(dataset) => dataset.name(),
            H5Value::Group(group) => group.name(),
            other => return Err(format!("{} has no name", other.describe())),
        };
        let name = if full_path {
            name
        } else {
            name.rsplit('/').next().unwrap_or_default().to_string()
        };
        Ok(H5Value::string(name))
    })
}

fn tile_array(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let times = count(args.i64(0, "n_tiles")?)?;
    per_entry(value, &|value| map_any_array!(to_memory(value)?, array => tile(array, times)))
}

fn repeat_array(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let times = count(args.i64(0, "n_repeats")?)?;
    per_entry(value, &|value| {
        map_any_array!(to_memory(value)?, array => Ok::<_, String>(repeat(array, times)))
    })
}

fn child_datasets(
    group: &::hdf5::Group,
    ignore: &Option<Vec<String>>,
    contains: &Option<Vec<String>>,
) -> std::result::Result<BTreeMap<String, H5Value>, String> {
    let mut children = BTreeMap::new();
    for name in group.member_names().map_err(|e| e.to_string())? {
        if !keep_key(&name, ignore, contains) {
            continue;
        }
        if let Ok(dataset) = group.dataset(&name) {
            children.insert(name, H5Value::Dataset(dataset));
        }
    }
    Ok(children)
}

fn get_all_child_datasets(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let ignore = args.strings(0, "ignore")?;
    let contains = args.strings(1, "contains")?;
    match value {
        H5Value::Group(group) => child_datasets(&group, &ignore, &contains).map(H5Value::Map),
        H5Value::Map(map) => Ok(H5Value::Map(
            map.into_iter()
                .filter(|(key, value)| {
                    !matches!(value, H5Value::Map(_) | H5Value::Group(_))
                        && keep_key(key, &ignore, &contains)
                })
                .collect(),
        )),
        other => Err(format!("expected a group, got {}", other.describe())),
    }
}

/// Datasets of all subgroups, keyed `<subgroup>/<dataset>`
fn merge_subgroup_datasets(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let ignore = args.strings(0, "ignore")?;
    let contains = args.strings(1, "contains")?;
    let H5Value::Group(group) = value else {
        return Err(format!("expected a group, got {}", value.describe()));
    };
    let mut merged = BTreeMap::new();
    for name in group.member_names().map_err(|e| e.to_string())? {
        let Ok(subgroup) = group.group(&name) else {
            continue;
        };
        if !keep_key(&name, &ignore, &contains) {
            continue;
        }
        for (child, dataset) in child_datasets(&subgroup, &None, &None)? {
            merged.insert(format!("{}/{}", name, child), dataset);
        }
    }
    Ok(H5Value::Map(merged))
}

/// Order keys by their text with embedded numbers compared by value
fn natural_key(key: &str) -> Vec<(String, u64)> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut digits = c.to_string();
            while let Some(&next) = chars.peek() {
                if !next.is_ascii_digit() {
                    break;
                }
                digits.push(next);
                chars.next();
            }
            parts.push((std::mem::take(&mut text), digits.parse().unwrap_or(u64::MAX)));
        } else {
            text.push(c);
        }
    }
    parts.push((text, 0));
    parts
}

fn stack_datasets(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let axis = args.json(0, "axis").map_or(Ok(-1), |axis| {
        axis.as_i64()
            .ok_or_else(|| "argument 'axis' must be an integer".to_string())
    })?;
    let natural = match args.str_opt(1, "sort")? {
        None | Some("key") => false,
        Some("natural") => true,
        Some(other) => return Err(format!("unknown sort order '{}'", other)),
    };
    let H5Value::Map(map) = value else {
        return Err(format!("expected a mapping, got {}", value.describe()));
    };
    let mut entries: Vec<(String, H5Value)> = map.into_iter().collect();
    if natural {
        entries.sort_by_key(|(key, _)| natural_key(key));
    }
    let mut arrays = Vec::with_capacity(entries.len());
    let mut all_int = true;
    for (_, value) in entries {
        let value = to_memory(value)?;
        all_int &= matches!(value, H5Value::Int(_));
        arrays.push(value);
    }
    let Some(first) = arrays.first() else {
        return Err("nothing to stack".to_string());
    };
    let ndim = first.shape().map(|shape| shape.len()).unwrap_or(0) as i64;
    let resolved = if axis < 0 { axis + ndim + 1 } else { axis };
    if resolved < 0 || resolved > ndim {
        return Err(format!("axis {} out of range for {} dimensions", axis, ndim));
    }
    let axis = Axis(resolved as usize);

    if all_int {
        let ints = arrays
            .into_iter()
            .filter_map(|value| match value {
                H5Value::Int(array) => Some(array),
                _ => None,
            })
            .collect::<Vec<_>>();
        let views: Vec<_> = ints.iter().map(|array| array.view()).collect();
        return ndarray::stack(axis, &views)
            .map(H5Value::Int)
            .map_err(|e| e.to_string());
    }
    let floats = arrays
        .into_iter()
        .map(float_array)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let views: Vec<_> = floats.iter().map(|array| array.view()).collect();
    ndarray::stack(axis, &views)
        .map(H5Value::Float)
        .map_err(|e| e.to_string())
}

fn shifted(value: H5Value, shift: f64, negative: bool) -> TransformResult {
    let shift = if negative { -shift } else { shift };
    per_entry(value, &|value| Ok(H5Value::Float(float_array(value)? + shift)))
}

fn shift_dataset(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let shift = args.f64(0, "scalar_value")?;
    let negative = args.bool_or(1, "negative", false)?;
    shifted(value, shift, negative)
}

fn scaled(value: H5Value, factor: f64) -> TransformResult {
    per_entry(value, &|value| match to_memory(value)? {
        H5Value::Complex(array) => Ok(H5Value::Complex(array.mapv(|v| v * factor))),
        other => Ok(H5Value::Float(float_array(other)? * factor)),
    })
}

fn multiply_scalar(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    scaled(value, args.f64(0, "scalar_value")?)
}

fn multiply_array(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let matrix = json_matrix(
        args.json(0, "matrix")
            .ok_or_else(|| "missing argument 'matrix'".to_string())?,
    )?;
    let transpose = args.bool_or(1, "transpose", false)?;
    per_entry(value, &|value| {
        matrix_product(float_array(value)?, matrix.clone(), transpose).map(H5Value::Float)
    })
}

/// Euclidean norm of each row; `between_neighbours` uses differences of consecutive rows
fn calculate_norm(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let between_neighbours = args.bool_or(0, "between_neighbours", false)?;
    per_entry(value, &|value| {
        let array = float_array(value)?;
        if array.ndim() < 2 {
            return Ok(H5Value::float(array.iter().map(|v| v * v).sum::<f64>().sqrt()));
        }
        let rows = array.outer_iter().collect::<Vec<_>>();
        let norms: Vec<f64> = if between_neighbours {
            rows.windows(2)
                .map(|pair| (&pair[1] - &pair[0]).iter().map(|v| v * v).sum::<f64>().sqrt())
                .collect()
        } else {
            rows.iter()
                .map(|row| row.iter().map(|v| v * v).sum::<f64>().sqrt())
                .collect()
        };
        Ok(H5Value::Float(Array1::from(norms).into_dyn()))
    })
}

fn cumulative_sum(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let beginning_zero = args.bool_or(0, "beginning_zero", false)?;
    per_entry(value, &|value| {
        let mut total = 0.0;
        let mut sums: Vec<f64> = if beginning_zero { vec![0.0] } else { Vec::new() };
        for element in float_array(value)?.iter() {
            total += element;
            sums.push(total);
        }
        Ok(H5Value::Float(Array1::from(sums).into_dyn()))
    })
}

fn location(value: &H5Value) -> std::result::Result<&Location, String> {
    let location: &Location = match value {
        H5Value::Dataset(dataset) => dataset,
        H5Value::Group(group) => group,
        other => return Err(format!("{} has no attributes", other.describe())),
    };
    Ok(location)
}

fn get_attribute(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let name = args
        .str_opt(0, "attribute_name")?
        .ok_or_else(|| "missing argument 'attribute_name'".to_string())?;
    per_entry(value, &|value| {
        let attribute = location(&value)?
            .attr(name)
            .map_err(|e| format!("attribute '{}': {}", name, e))?;
        read_container(&attribute).map_err(|e| e.to_string())
    })
}

fn attributes(value: H5Value, _args: &StepArgs<'_>) -> TransformResult {
    per_entry(value, &|value| {
        let location = location(&value)?;
        let mut map = BTreeMap::new();
        for name in location.attr_names().map_err(|e| e.to_string())? {
            let attribute = location.attr(&name).map_err(|e| e.to_string())?;
            map.insert(name, read_container(&attribute).map_err(|e| e.to_string())?);
        }
        Ok(H5Value::Map(map))
    })
}

fn move_to_memory(value: H5Value, _args: &StepArgs<'_>) -> TransformResult {
    to_memory(value)
}

fn flatten_array(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let fortran = match args.str_opt(0, "order")? {
        None | Some("C") => false,
        Some("F") => true,
        Some(other) => return Err(format!("unknown order '{}'", other)),
    };
    per_entry(value, &|value| {
        map_any_array!(to_memory(value)?, array => Ok::<_, String>(flatten(array, fortran)))
    })
}

fn split_into(
    value: H5Value,
    name: Option<&str>,
    suffixes: &Option<Vec<String>>,
    output: &mut BTreeMap<String, H5Value>,
) -> std::result::Result<(), String> {
    let parts: Vec<H5Value> = match to_memory(value)? {
        H5Value::Float(array) => split_first_axis(array)?.into_iter().map(H5Value::Float).collect(),
        H5Value::Int(array) => split_first_axis(array)?.into_iter().map(H5Value::Int).collect(),
        H5Value::Complex(array) => split_first_axis(array)?
            .into_iter()
            .map(H5Value::Complex)
            .collect(),
        H5Value::Str(array) => split_first_axis(array)?.into_iter().map(H5Value::Str).collect(),
        other => return Err(format!("expected an array, got {}", other.describe())),
    };
    if let Some(suffixes) = suffixes
        && suffixes.len() < parts.len()
    {
        return Err(format!(
            "{} suffixes for {} parts",
            suffixes.len(),
            parts.len()
        ));
    }
    for (index, part) in parts.into_iter().enumerate() {
        let suffix = suffixes
            .as_ref()
            .map(|suffixes| suffixes[index].clone())
            .unwrap_or_else(|| index.to_string());
        let key = match name {
            Some(name) => format!("{}_{}", name, suffix),
            None => suffix,
        };
        output.insert(key, part);
    }
    Ok(())
}

/// Split along the first axis into `<name>_<suffix>` entries
fn split_array(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let suffixes = args.strings(0, "suffixes")?;
    let name = args.str_opt(1, "name")?;
    let mut output = BTreeMap::new();
    match value {
        H5Value::Map(map) => {
            for (key, value) in map {
                split_into(value, Some(name.unwrap_or(&key)), &suffixes, &mut output)?;
            }
        }
        value => split_into(value, name, &suffixes, &mut output)?,
    }
    Ok(H5Value::Map(output))
}

fn convert_to_str(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let join = args.bool_or(0, "join", false)?;
    per_entry(value, &|value| {
        let strings: ArrayD<String> = match to_memory(value)? {
            H5Value::Str(array) => array,
            H5Value::Float(array) => array.mapv(|v| v.to_string()),
            H5Value::Int(array) => array.mapv(|v| v.to_string()),
            H5Value::Complex(array) => array.mapv(|v| v.to_string()),
            other => return Err(format!("cannot convert {} to text", other.describe())),
        };
        if join {
            Ok(H5Value::string(strings.iter().map(String::as_str).collect::<String>()))
        } else {
            Ok(H5Value::Str(strings))
        }
    })
}

/// The function sees the whole value, mappings included
fn apply_lambda(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let function = args.lambda(0)?;
    function(to_memory(value)?)
}

const ELEMENTS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Element symbol for an atomic number; 0 is used for vacancies
pub fn element_symbol(number: i64) -> Option<&'static str> {
    match number {
        0 => Some("X"),
        n if n > 0 => ELEMENTS.get(n as usize - 1).copied(),
        _ => None,
    }
}

fn periodic_elements(value: H5Value, _args: &StepArgs<'_>) -> TransformResult {
    per_entry(value, &|value| {
        let numbers = match to_memory(value)? {
            H5Value::Int(array) => array,
            H5Value::Float(array) if array.iter().all(|v| v.fract() == 0.0) => {
                array.mapv(|v| v as i64)
            }
            other => return Err(format!("expected atomic numbers, got {}", other.describe())),
        };
        let mut symbols = Vec::with_capacity(numbers.len());
        for &number in numbers.iter() {
            symbols.push(
                element_symbol(number)
                    .ok_or_else(|| format!("no element with atomic number {}", number))?
                    .to_string(),
            );
        }
        ArrayD::from_shape_vec(numbers.raw_dim(), symbols)
            .map(H5Value::Str)
            .map_err(|e| e.to_string())
    })
}

fn sum_arrays<'v>(
    arrays: impl Iterator<Item = &'v H5Value>,
) -> std::result::Result<Option<ArrayD<f64>>, String> {
    let mut total: Option<ArrayD<f64>> = None;
    for value in arrays {
        let array = float_array(value.clone())?;
        total = Some(match total {
            None => array,
            Some(sum) if sum.shape() == array.shape() => sum + array,
            Some(sum) => {
                return Err(format!(
                    "cannot add arrays of shape {:?} and {:?}",
                    sum.shape(),
                    array.shape()
                ));
            }
        });
    }
    Ok(total)
}

/// Sum of all entries, added as `sum` or replacing the mapping
fn sum_over_dict_entries(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let overwrite = args.bool_or(0, "overwrite_dict", false)?;
    let H5Value::Map(mut map) = to_memory(value)? else {
        return Err("expected a mapping".to_string());
    };
    let total = sum_arrays(map.values())?.ok_or_else(|| "nothing to sum".to_string())?;
    if overwrite {
        return Ok(H5Value::Float(total));
    }
    map.insert("sum".to_string(), H5Value::Float(total));
    Ok(H5Value::Map(map))
}

/// `key` starts with `pattern` and does not continue it with another digit
fn matches_pattern(key: &str, pattern: &str) -> bool {
    key.strip_prefix(pattern)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

fn partial_sums(
    value: H5Value,
    patterns: &[String],
    replace: bool,
) -> TransformResult {
    let H5Value::Map(mut map) = to_memory(value)? else {
        return Err("expected a mapping".to_string());
    };
    let mut sums = BTreeMap::new();
    let mut consumed = BTreeSet::new();
    for pattern in patterns {
        let matching: Vec<&String> = map.keys().filter(|key| matches_pattern(key, pattern)).collect();
        if matching.is_empty() {
            return Err(format!("no entries match '{}'", pattern));
        }
        let total = sum_arrays(matching.iter().map(|key| &map[*key]))?
            .ok_or_else(|| format!("no entries match '{}'", pattern))?;
        consumed.extend(matching.into_iter().cloned());
        sums.insert(pattern.clone(), H5Value::Float(total));
    }
    if replace {
        map.retain(|key, _| !consumed.contains(key));
    }
    for (pattern, total) in sums {
        if map.contains_key(&pattern) {
            return Err(format!("partial sum '{}' would overwrite an entry", pattern));
        }
        map.insert(pattern, total);
    }
    Ok(H5Value::Map(map))
}

fn add_partial_sums_fixed(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let patterns = args
        .strings(0, "patterns")?
        .ok_or_else(|| "missing argument 'patterns'".to_string())?;
    let replace = args.bool_or(1, "replace_entries", false)?;
    partial_sums(value, &patterns, replace)
}

/// Float array whose last axis holds real and imaginary parts
fn convert_to_complex_array(value: H5Value, _args: &StepArgs<'_>) -> TransformResult {
    per_entry(value, &|value| {
        let array = float_array(value)?;
        let Some((&2, rest)) = array.shape().split_last() else {
            return Err(format!(
                "last axis must have length 2, got shape {:?}",
                array.shape()
            ));
        };
        let rest = rest.to_vec();
        let elements: Vec<Complex64> = array
            .as_standard_layout()
            .as_slice()
            .unwrap_or_default()
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]))
            .collect();
        ArrayD::from_shape_vec(IxDyn(&rest), elements)
            .map(H5Value::Complex)
            .map_err(|e| e.to_string())
    })
}

/// Scalar attributes scale elementwise, matrices multiply the last axis
fn multiply_by_attribute(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let attribute = args.attribute()?;
    let transpose = args.bool_or(0, "transpose", false)?;
    if let Some(factor) = attribute.as_f64() {
        return scaled(value, factor);
    }
    let matrix = matrix(attribute)?;
    per_entry(value, &|value| {
        matrix_product(float_array(value)?, matrix.clone(), transpose).map(H5Value::Float)
    })
}

fn shift_by_attribute(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let attribute = args.attribute()?;
    let shift = attribute
        .as_f64()
        .ok_or_else(|| format!("expected a scalar attribute, got {}", attribute.describe()))?;
    let negative = args.bool_or(0, "negative", false)?;
    shifted(value, shift, negative)
}

/// One partial sum per attribute value, the key formatted by `pattern_format`
fn add_partial_sums(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let attribute = args.attribute()?;
    let pattern_format = args
        .str_opt(0, "pattern_format")?
        .ok_or_else(|| "missing argument 'pattern_format'".to_string())?;
    if !pattern_format.contains("{}") {
        return Err(format!("pattern '{}' has no '{{}}' placeholder", pattern_format));
    }
    let make_set = args.bool_or(1, "make_set", false)?;
    let replace = args.bool_or(2, "replace_entries", false)?;

    let labels: Vec<String> = match attribute.clone().into_memory().map_err(|e| e.to_string())? {
        H5Value::Str(array) => array.iter().cloned().collect(),
        other => int_array(&other)?.iter().map(i64::to_string).collect(),
    };
    let mut patterns: Vec<String> = Vec::new();
    for label in labels {
        let pattern = pattern_format.replace("{}", &label);
        if make_set && patterns.contains(&pattern) {
            continue;
        }
        patterns.push(pattern);
    }
    partial_sums(value, &patterns, replace)
}

fn attribute_count(args: &StepArgs<'_>) -> std::result::Result<usize, String> {
    let attribute = args.attribute()?;
    let value = attribute
        .as_i64()
        .ok_or_else(|| format!("expected an integer attribute, got {}", attribute.describe()))?;
    count(value)
}

fn repeat_array_by_attribute(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let times = attribute_count(args)?;
    per_entry(value, &|value| {
        map_any_array!(to_memory(value)?, array => Ok::<_, String>(repeat(array, times)))
    })
}

fn tile_array_by_attribute(value: H5Value, args: &StepArgs<'_>) -> TransformResult {
    let times = attribute_count(args)?;
    per_entry(value, &|value| map_any_array!(to_memory(value)?, array => tile(array, times)))
}
