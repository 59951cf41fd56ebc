//! Values flowing through recipe pipelines.

use std::collections::BTreeMap;
use std::fmt;

use ::hdf5::types::{TypeDescriptor, VarLenAscii, VarLenUnicode};
use ::hdf5::{Container, Dataset, Group};
use ndarray::{Array1, ArrayD, ArrayViewD, arr0};
use num_complex::Complex64;
use serde_json::{Value as JsonValue, json};

/// A file-backed handle, an in-memory array or a mapping of values
#[derive(Clone)]
pub enum H5Value {
    Dataset(Dataset),
    Group(Group),
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
    Complex(ArrayD<Complex64>),
    Str(ArrayD<String>),
    Map(BTreeMap<String, H5Value>),
}

impl H5Value {
    pub fn float(value: f64) -> Self {
        H5Value::Float(arr0(value).into_dyn())
    }

    pub fn int(value: i64) -> Self {
        H5Value::Int(arr0(value).into_dyn())
    }

    pub fn string(value: impl Into<String>) -> Self {
        H5Value::Str(arr0(value.into()).into_dyn())
    }

    pub fn float_vec(values: Vec<f64>) -> Self {
        H5Value::Float(Array1::from(values).into_dyn())
    }

    /// Short description used in error messages
    pub fn describe(&self) -> String {
        match self {
            H5Value::Dataset(dataset) => format!("dataset {}", dataset.name()),
            H5Value::Group(group) => format!("group {}", group.name()),
            H5Value::Float(array) => format!("float array of shape {:?}", array.shape()),
            H5Value::Int(array) => format!("int array of shape {:?}", array.shape()),
            H5Value::Complex(array) => format!("complex array of shape {:?}", array.shape()),
            H5Value::Str(array) => format!("string array of shape {:?}", array.shape()),
            H5Value::Map(map) => format!(
                "mapping with keys [{}]",
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, H5Value::Dataset(_) | H5Value::Group(_))
    }

    pub fn shape(&self) -> Option<Vec<usize>> {
        match self {
            H5Value::Dataset(dataset) => Some(dataset.shape()),
            H5Value::Float(array) => Some(array.shape().to_vec()),
            H5Value::Int(array) => Some(array.shape().to_vec()),
            H5Value::Complex(array) => Some(array.shape().to_vec()),
            H5Value::Str(array) => Some(array.shape().to_vec()),
            H5Value::Group(_) | H5Value::Map(_) => None,
        }
    }

    /// The single element of a scalar or one-element array, as float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            H5Value::Float(array) if array.len() == 1 => array.iter().next().copied(),
            H5Value::Int(array) if array.len() == 1 => array.iter().next().map(|&v| v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            H5Value::Int(array) if array.len() == 1 => array.iter().next().copied(),
            H5Value::Float(array) if array.len() == 1 => array
                .iter()
                .next()
                .filter(|v| v.fract() == 0.0)
                .map(|&v| v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            H5Value::Str(array) if array.len() == 1 => array.iter().next().map(String::as_str),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, H5Value>> {
        match self {
            H5Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<BTreeMap<String, H5Value>> {
        match self {
            H5Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Read file-backed handles; groups become mappings of their members
    pub fn into_memory(self) -> ::hdf5::Result<H5Value> {
        match self {
            H5Value::Dataset(dataset) => read_container(&dataset),
            H5Value::Group(group) => {
                let mut map = BTreeMap::new();
                for name in group.member_names()? {
                    let member = match group.dataset(&name) {
                        Ok(dataset) => H5Value::Dataset(dataset),
                        Err(_) => H5Value::Group(group.group(&name)?),
                    };
                    map.insert(name, member.into_memory()?);
                }
                Ok(H5Value::Map(map))
            }
            H5Value::Map(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, value.into_memory()?)))
                .collect::<::hdf5::Result<_>>()
                .map(H5Value::Map),
            array => Ok(array),
        }
    }

    /// JSON rendering; handles are shown by their path
    pub fn to_json(&self) -> JsonValue {
        fn array_json<T>(array: ArrayViewD<'_, T>, element: &dyn Fn(&T) -> JsonValue) -> JsonValue {
            if array.ndim() == 0 {
                return array.iter().next().map(element).unwrap_or(JsonValue::Null);
            }
            JsonValue::Array(
                array
                    .outer_iter()
                    .map(|sub| array_json(sub, element))
                    .collect(),
            )
        }

        match self {
            H5Value::Dataset(dataset) => json!({"dataset": dataset.name()}),
            H5Value::Group(group) => json!({"group": group.name()}),
            H5Value::Float(array) => array_json(array.view(), &|v| json!(v)),
            H5Value::Int(array) => array_json(array.view(), &|v| json!(v)),
            H5Value::Complex(array) => array_json(array.view(), &|v| json!([v.re, v.im])),
            H5Value::Str(array) => array_json(array.view(), &|v| json!(v)),
            H5Value::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for H5Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (H5Value::Dataset(a), H5Value::Dataset(b)) => a.name() == b.name(),
            (H5Value::Group(a), H5Value::Group(b)) => a.name() == b.name(),
            (H5Value::Float(a), H5Value::Float(b)) => a == b,
            (H5Value::Int(a), H5Value::Int(b)) => a == b,
            (H5Value::Complex(a), H5Value::Complex(b)) => a == b,
            (H5Value::Str(a), H5Value::Str(b)) => a == b,
            (H5Value::Map(a), H5Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for H5Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            H5Value::Float(array) => write!(f, "Float({:?})", array),
            H5Value::Int(array) => write!(f, "Int({:?})", array),
            H5Value::Complex(array) => write!(f, "Complex({:?})", array),
            H5Value::Str(array) => write!(f, "Str({:?})", array),
            H5Value::Map(map) => f.debug_map().entries(map.iter()).finish(),
            handle => f.write_str(&handle.describe()),
        }
    }
}

impl From<ArrayD<f64>> for H5Value {
    fn from(array: ArrayD<f64>) -> Self {
        H5Value::Float(array)
    }
}

impl From<ArrayD<i64>> for H5Value {
    fn from(array: ArrayD<i64>) -> Self {
        H5Value::Int(array)
    }
}

impl From<BTreeMap<String, H5Value>> for H5Value {
    fn from(map: BTreeMap<String, H5Value>) -> Self {
        H5Value::Map(map)
    }
}

/// Read a dataset or attribute with the element type matching its datatype
pub fn read_container(container: &Container) -> ::hdf5::Result<H5Value> {
    match container.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            Ok(H5Value::Int(container.read_dyn::<i64>()?))
        }
        TypeDescriptor::Float(_) => Ok(H5Value::Float(container.read_dyn::<f64>()?)),
        TypeDescriptor::VarLenUnicode | TypeDescriptor::FixedUnicode(_) => Ok(H5Value::Str(
            container
                .read_dyn::<VarLenUnicode>()?
                .map(|text| text.as_str().trim_end().to_string()),
        )),
        TypeDescriptor::VarLenAscii | TypeDescriptor::FixedAscii(_) => Ok(H5Value::Str(
            container
                .read_dyn::<VarLenAscii>()?
                .map(|text| text.as_str().trim_end().to_string()),
        )),
        other => Err(format!("unsupported HDF5 datatype {:?}", other).into()),
    }
}
