//! Conversion between XML text and typed values under the union-of-types model.
//!
//! Every attribute (and text) has an ordered list of admissible type definitions.
//! Reading tries them in order and keeps the first success; writing picks the first
//! definition able to represent the value.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::constants::Constants;
use crate::error::{FleurError, Result};
use crate::expression;
use crate::schema_dict::{BaseType, Length, TypeDefinition, ValueType};

/// Digits after the decimal point when writing floats
pub const DEFAULT_FLOAT_PRECISION: usize = 10;

/// A value read from, or destined for, an XML document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The elements of a list, or the value itself as a one-element list
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::List(values) => values,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "mapping",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Str(value) => f.write_str(value),
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(value) => Value::Str(value),
            serde_json::Value::Array(values) => {
                Value::List(values.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

fn parse_switch(text: &str) -> std::result::Result<bool, String> {
    match text {
        "T" | "t" => Ok(true),
        "F" | "f" => Ok(false),
        other => Err(format!("'{}' is not T or F", other)),
    }
}

fn parse_single(
    text: &str,
    definition: &TypeDefinition,
    constants: &Constants,
) -> std::result::Result<Value, String> {
    match definition.base_type {
        BaseType::Switch => parse_switch(text).map(Value::Bool),
        BaseType::Int => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("'{}': {}", text, e)),
        BaseType::Float => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("'{}': {}", text, e)),
        BaseType::FloatExpression => match text.parse::<f64>() {
            Ok(value) => Ok(Value::Float(value)),
            Err(_) => expression::evaluate(text, constants).map(Value::Float),
        },
        BaseType::StringEnum => definition
            .enumeration
            .iter()
            .find(|member| member.eq_ignore_ascii_case(text))
            .map(|member| Value::Str(member.clone()))
            .ok_or_else(|| {
                format!(
                    "'{}' is not one of {}",
                    text,
                    definition.enumeration.join(", ")
                )
            }),
        BaseType::String => Ok(Value::Str(text.to_string())),
    }
}

fn parse_definition(
    text: &str,
    definition: &TypeDefinition,
    constants: &Constants,
) -> std::result::Result<Value, String> {
    if !definition.is_list() {
        return parse_single(text, definition, constants);
    }
    let items: Vec<&str> = text.split_whitespace().collect();
    if let Length::Fixed(expected) = definition.length
        && items.len() != expected
    {
        return Err(format!(
            "expected {} values, found {}",
            expected,
            items.len()
        ));
    }
    items
        .into_iter()
        .map(|item| parse_single(item, definition, constants))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Value::List)
}

/// Parse XML text of `name` into a typed value
///
/// A name without known types is returned as a string.
pub fn convert_from_xml(
    text: &str,
    value_type: &ValueType,
    constants: &Constants,
    name: &str,
) -> Result<Value> {
    let text = text.trim();
    if value_type.definitions().is_empty() {
        return Ok(Value::Str(text.to_string()));
    }

    let mut reasons = Vec::new();
    for definition in value_type.definitions() {
        match parse_definition(text, definition, constants) {
            Ok(value) => return Ok(value),
            Err(reason) => reasons.push(format!("{}: {}", definition, reason)),
        }
    }

    Err(FleurError::Conversion {
        name: name.to_string(),
        text: text.to_string(),
        types: value_type.type_names(),
        reason: reasons.join("; "),
    })
}

/// Parse several texts, preserving their order
pub fn convert_all_from_xml(
    texts: &[String],
    value_type: &ValueType,
    constants: &Constants,
    name: &str,
) -> Result<Vec<Value>> {
    texts
        .iter()
        .map(|text| convert_from_xml(text, value_type, constants, name))
        .collect()
}

/// Fixed-point rendering of a float
pub fn format_float(value: f64, precision: usize) -> String {
    format!("{:.*}", precision, value)
}

fn format_switch(value: bool) -> String {
    let flag = if value { "T" } else { "F" };
    flag.to_string()
}

fn format_single(
    value: &Value,
    definition: &TypeDefinition,
    precision: usize,
) -> std::result::Result<String, String> {
    match (definition.base_type, value) {
        (BaseType::Switch, Value::Bool(flag)) => Ok(format_switch(*flag)),
        (BaseType::Switch, Value::Str(text)) => parse_switch(text).map(format_switch),
        (BaseType::Int, Value::Int(number)) => Ok(number.to_string()),
        (BaseType::Int, Value::Str(text)) => text
            .trim()
            .parse::<i64>()
            .map(|number| number.to_string())
            .map_err(|e| format!("'{}': {}", text, e)),
        (BaseType::Float | BaseType::FloatExpression, Value::Int(number)) => {
            Ok(format_float(*number as f64, precision))
        }
        (BaseType::Float | BaseType::FloatExpression, Value::Float(number)) => {
            Ok(format_float(*number, precision))
        }
        (BaseType::Float, Value::Str(text)) => text
            .trim()
            .parse::<f64>()
            .map(|_| text.trim().to_string())
            .map_err(|e| format!("'{}': {}", text, e)),
        (BaseType::FloatExpression, Value::Str(text)) => Ok(text.trim().to_string()),
        (BaseType::StringEnum, Value::Str(text)) => definition
            .enumeration
            .iter()
            .find(|member| member.eq_ignore_ascii_case(text))
            .cloned()
            .ok_or_else(|| {
                format!(
                    "'{}' is not one of {}",
                    text,
                    definition.enumeration.join(", ")
                )
            }),
        (BaseType::String, Value::Str(text)) => Ok(text.clone()),
        (BaseType::String, Value::Int(number)) => Ok(number.to_string()),
        (BaseType::String, Value::Float(number)) => Ok(format_float(*number, precision)),
        (BaseType::String, Value::Bool(flag)) => Ok(format_switch(*flag)),
        (base_type, value) => Err(format!("a {} is not a {}", value.kind(), base_type)),
    }
}

fn format_definition(
    value: &Value,
    definition: &TypeDefinition,
    precision: usize,
) -> std::result::Result<String, String> {
    match value {
        Value::List(items) => {
            if !definition.is_list() {
                return Err(format!("{} does not take a list", definition));
            }
            if let Length::Fixed(expected) = definition.length
                && items.len() != expected
            {
                return Err(format!(
                    "expected {} values, got {}",
                    expected,
                    items.len()
                ));
            }
            let rendered = items
                .iter()
                .map(|item| format_single(item, definition, precision))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rendered.join(" "))
        }
        single => {
            if definition.is_list() && definition.length != Length::Unbounded {
                return Err(format!("{} needs a list of values", definition));
            }
            format_single(single, definition, precision)
        }
    }
}

fn format_untyped(value: &Value, precision: usize) -> std::result::Result<String, String> {
    match value {
        Value::Bool(flag) => Ok(format_switch(*flag)),
        Value::Int(number) => Ok(number.to_string()),
        Value::Float(number) => Ok(format_float(*number, precision)),
        Value::Str(text) => Ok(text.clone()),
        Value::List(items) => Ok(items
            .iter()
            .map(|item| format_untyped(item, precision))
            .collect::<std::result::Result<Vec<_>, _>>()?
            .join(" ")),
        other => Err(format!("a {} cannot be written as XML text", other.kind())),
    }
}

/// Render a value of `name` as XML text
pub fn convert_to_xml(
    value: &Value,
    value_type: &ValueType,
    name: &str,
    precision: usize,
) -> Result<String> {
    let conversion_error = |reason: String| FleurError::Conversion {
        name: name.to_string(),
        text: value.to_string(),
        types: value_type.type_names(),
        reason,
    };

    if matches!(value, Value::Null | Value::Map(_)) {
        return Err(conversion_error(format!(
            "a {} cannot be written as XML text",
            value.kind()
        )));
    }
    if value_type.definitions().is_empty() {
        return format_untyped(value, precision).map_err(conversion_error);
    }

    let mut reasons = Vec::new();
    for definition in value_type.definitions() {
        match format_definition(value, definition, precision) {
            Ok(text) => return Ok(text),
            Err(reason) => reasons.push(reason),
        }
    }
    Err(conversion_error(reasons.join("; ")))
}

/// Render a value destined for one or several nodes
///
/// A list of lists, or a flat list of a name that also admits single values, gives one
/// text per node; anything else is a single text.
pub fn convert_values_to_xml(
    value: &Value,
    value_type: &ValueType,
    name: &str,
    precision: usize,
) -> Result<Vec<String>> {
    let per_node = match value {
        Value::List(items) if items.is_empty() => false,
        Value::List(items) if items.iter().all(|item| matches!(item, Value::List(_))) => true,
        Value::List(_) => value_type.definitions().is_empty() || value_type.allows_single(),
        _ => false,
    };
    if per_node {
        value
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(|item| convert_to_xml(item, value_type, name, precision))
            .collect()
    } else {
        Ok(vec![convert_to_xml(value, value_type, name, precision)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::predefined_constants;

    fn types(definitions: &[TypeDefinition]) -> ValueType {
        ValueType::new(definitions.iter().cloned())
    }

    #[test]
    fn test_first_matching_type_wins() {
        let int_or_string = types(&[
            TypeDefinition::single(BaseType::String),
            TypeDefinition::single(BaseType::Int),
        ]);
        let constants = predefined_constants();
        assert_eq!(
            convert_from_xml("2", &int_or_string, &constants, "jspins").unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            convert_from_xml("all", &int_or_string, &constants, "jspins").unwrap(),
            Value::Str("all".to_string())
        );
    }

    #[test]
    fn test_switch_and_expression() {
        let constants = predefined_constants();
        let switch = types(&[TypeDefinition::single(BaseType::Switch)]);
        assert_eq!(
            convert_from_xml(" t ", &switch, &constants, "l_noco").unwrap(),
            Value::Bool(true)
        );
        assert!(convert_from_xml("yes", &switch, &constants, "l_noco").is_err());

        let expression = types(&[TypeDefinition::single(BaseType::FloatExpression)]);
        match convert_from_xml("2*Pi", &expression, &constants, "alpha").unwrap() {
            Value::Float(value) => assert!((value - 2.0 * std::f64::consts::PI).abs() < 1e-12),
            other => panic!("Expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_lists_respect_length() {
        let constants = predefined_constants();
        let vector =
            types(&[TypeDefinition::single(BaseType::Float).with_length(Length::Fixed(3))]);
        assert_eq!(
            convert_from_xml("0.0 0.5 1", &vector, &constants, "row-1").unwrap(),
            Value::List(vec![Value::Float(0.0), Value::Float(0.5), Value::Float(1.0)])
        );
        assert!(convert_from_xml("0.0 0.5", &vector, &constants, "row-1").is_err());
    }

    #[test]
    fn test_conversion_error_names_types() {
        let constants = predefined_constants();
        let int = types(&[TypeDefinition::single(BaseType::Int)]);
        match convert_from_xml("2.5", &int, &constants, "jspins") {
            Err(FleurError::Conversion { name, types, .. }) => {
                assert_eq!(name, "jspins");
                assert_eq!(types, vec!["int"]);
            }
            other => panic!("Expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_values_for_several_nodes() {
        let float = types(&[TypeDefinition::single(BaseType::Float)]);
        let values = Value::List(vec![Value::Float(1.0), Value::Float(2.5)]);
        assert_eq!(
            convert_values_to_xml(&values, &float, "radius", 2).unwrap(),
            vec!["1.00", "2.50"]
        );

        let vector =
            types(&[TypeDefinition::single(BaseType::Float).with_length(Length::Fixed(3))]);
        let single = Value::List(vec![Value::Int(0), Value::Int(0), Value::Int(1)]);
        assert_eq!(
            convert_values_to_xml(&single, &vector, "row-1", 1).unwrap(),
            vec!["0.0 0.0 1.0"]
        );
    }

    #[test]
    fn test_write_values() {
        let float = types(&[TypeDefinition::single(BaseType::FloatExpression)]);
        assert_eq!(
            convert_to_xml(&Value::Float(10.0), &float, "radius", 10).unwrap(),
            "10.0000000000"
        );
        assert_eq!(
            convert_to_xml(&Value::Int(2), &float, "radius", 3).unwrap(),
            "2.000"
        );

        let switch = types(&[TypeDefinition::single(BaseType::Switch)]);
        assert_eq!(
            convert_to_xml(&Value::Bool(false), &switch, "l_noco", 10).unwrap(),
            "F"
        );
        assert!(convert_to_xml(&Value::Int(1), &switch, "l_noco", 10).is_err());

        let list = types(&[TypeDefinition::single(BaseType::Int).with_length(Length::Unbounded)]);
        assert_eq!(
            convert_to_xml(&Value::from(vec![1, 2, 3]), &list, "nx", 10).unwrap(),
            "1 2 3"
        );
    }

    #[test]
    fn test_enumeration_uses_schema_case() {
        let mut definition = TypeDefinition::single(BaseType::StringEnum);
        definition.enumeration = vec!["pbe".to_string(), "vwn".to_string()];
        let enumeration = types(&[definition]);
        assert_eq!(
            convert_to_xml(&Value::from("PBE"), &enumeration, "name", 10).unwrap(),
            "pbe"
        );
        assert!(convert_to_xml(&Value::from("lda"), &enumeration, "name", 10).is_err());
    }

    #[test]
    fn test_value_from_json() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"radius": 2.2, "lmax": 10, "flags": [true, "x"]}"#).unwrap();
        let value = Value::from(json);
        let map = value.as_map().unwrap();
        assert_eq!(map["radius"], Value::Float(2.2));
        assert_eq!(map["lmax"], Value::Int(10));
        assert_eq!(map["flags"].as_list().map(<[Value]>::len), Some(2));
    }
}
