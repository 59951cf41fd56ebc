//! Programmatic construction of XPath predicates.
//!
//! A builder starts from a simple (predicate free) path. Conditions are attached to the
//! tags of that path and rendered as one predicate per tag. Literal operands never appear
//! inline: each one is bound to an XPath variable named `<tag>_cond_<n>` (or
//! `<tag>_index` for positions), so the rendered expression only depends on the shape of
//! the filters.
//!
//! Conditions can be built directly or parsed from a JSON tree:
//!
//! ```json
//! {"species": {"/mtSphere/@radius": {">=": 2.0}, "index": -1}}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

use crate::error::{FleurError, Result};
use crate::libxml2::{XPathLiteral, XPathVariables, compile_check};

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][\w.-]*)").expect("valid variable regex"))
}

/// Comparison and string operators of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl BinaryOp {
    /// Operator from its filter key (`==` is accepted for `=`)
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "=" | "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            "contains" => BinaryOp::Contains,
            "not-contains" => BinaryOp::NotContains,
            "starts-with" => BinaryOp::StartsWith,
            "ends-with" => BinaryOp::EndsWith,
            _ => return None,
        })
    }

    fn render(&self, lhs: &str, rhs: &str) -> String {
        match self {
            BinaryOp::Eq => format!("{} = {}", lhs, rhs),
            BinaryOp::Ne => format!("{} != {}", lhs, rhs),
            BinaryOp::Lt => format!("{} < {}", lhs, rhs),
            BinaryOp::Gt => format!("{} > {}", lhs, rhs),
            BinaryOp::Le => format!("{} <= {}", lhs, rhs),
            BinaryOp::Ge => format!("{} >= {}", lhs, rhs),
            BinaryOp::Contains => format!("contains({}, {})", lhs, rhs),
            BinaryOp::NotContains => format!("not(contains({}, {}))", lhs, rhs),
            BinaryOp::StartsWith => format!("starts-with({}, {})", lhs, rhs),
            BinaryOp::EndsWith => format!(
                "substring({lhs}, string-length({lhs}) - string-length({rhs}) + 1) = {rhs}"
            ),
        }
    }

    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundOp {
    And,
    Or,
}

impl CompoundOp {
    fn joiner(&self) -> &'static str {
        match self {
            CompoundOp::And => " and ",
            CompoundOp::Or => " or ",
        }
    }
}

/// Left-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Lhs {
    /// The filtered tag itself (`.`)
    Current,
    /// A path relative to the filtered tag
    Path(String),
    /// Union of relative paths, `(a | b)`
    Union(Vec<String>),
}

impl Lhs {
    /// Interpret a path-valued filter key
    ///
    /// Bare names refer to attributes, a leading `/` is made relative, and `|` separates
    /// the members of a union.
    pub fn from_key(key: &str) -> Self {
        if key.contains('|') {
            return Lhs::Union(key.split('|').map(|part| normalize_path(part.trim())).collect());
        }
        Lhs::Path(normalize_path(key))
    }

    fn render(&self) -> String {
        match self {
            Lhs::Current => ".".to_string(),
            Lhs::Path(path) => path.clone(),
            Lhs::Union(paths) => format!("({})", paths.join(" | ")),
        }
    }
}

fn normalize_path(key: &str) -> String {
    if let Some(rest) = key.strip_prefix('/') {
        return format!("./{}", rest);
    }
    if key.starts_with('.') || key.starts_with('@') || key.starts_with('(') || key.contains('/')
    {
        return key.to_string();
    }
    format!("@{}", key)
}

/// A filter condition on one tag
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `lhs op $value`
    Compare { op: BinaryOp, value: XPathLiteral },
    /// `in` / `not-in`
    In {
        values: Vec<XPathLiteral>,
        negated: bool,
    },
    /// `and` / `or` over conditions sharing the left-hand side; may not nest
    Compound {
        op: CompoundOp,
        conditions: Vec<Condition>,
    },
    /// Position among the matches; negative values count from the end
    Index { op: BinaryOp, value: i64 },
    /// Existence of a relative path
    Has(String),
    HasNot(String),
    /// Compare the number of nodes of the left-hand side
    NumberNodes(Box<Condition>),
    /// Compare the string length of the left-hand side
    StringLength(Box<Condition>),
    /// Switch the left-hand side
    Path { lhs: Lhs, condition: Box<Condition> },
    /// Conjunction of independent conditions
    All(Vec<Condition>),
}

fn literal_from_json(value: &JsonValue) -> Result<XPathLiteral> {
    match value {
        JsonValue::String(text) => Ok(XPathLiteral::String(text.clone())),
        JsonValue::Number(number) => number
            .as_f64()
            .map(XPathLiteral::Number)
            .ok_or_else(|| FleurError::invalid(format!("unsupported number {}", number))),
        JsonValue::Bool(flag) => Ok(XPathLiteral::String(if *flag { "T" } else { "F" }.into())),
        other => Err(FleurError::invalid(format!(
            "filter literal must be a string, number or bool, got {}",
            other
        ))),
    }
}

fn index_from_json(value: &JsonValue) -> Result<Condition> {
    let as_index = |value: &JsonValue| {
        value
            .as_i64()
            .ok_or_else(|| FleurError::invalid(format!("index must be an integer, got {}", value)))
    };
    match value {
        JsonValue::Object(map) => {
            let mut conditions = Vec::new();
            for (key, operand) in map {
                let op = BinaryOp::from_key(key)
                    .filter(BinaryOp::is_comparison)
                    .ok_or_else(|| {
                        FleurError::invalid(format!("'{}' is not a comparison for index", key))
                    })?;
                conditions.push(Condition::Index {
                    op,
                    value: as_index(operand)?,
                });
            }
            match conditions.len() {
                1 => Ok(conditions.remove(0)),
                _ => Err(FleurError::invalid("index takes exactly one comparison")),
            }
        }
        other => Ok(Condition::Index {
            op: BinaryOp::Eq,
            value: as_index(other)?,
        }),
    }
}

impl Condition {
    pub fn compare(op: BinaryOp, value: impl Into<XPathLiteral>) -> Self {
        Condition::Compare {
            op,
            value: value.into(),
        }
    }

    pub fn equals(value: impl Into<XPathLiteral>) -> Self {
        Condition::compare(BinaryOp::Eq, value)
    }

    pub fn index(value: i64) -> Self {
        Condition::Index {
            op: BinaryOp::Eq,
            value,
        }
    }

    /// Condition on a path relative to the filtered tag
    pub fn at(path: &str, condition: Condition) -> Self {
        Condition::Path {
            lhs: Lhs::from_key(path),
            condition: Box::new(condition),
        }
    }

    /// Parse a condition from its JSON form
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let map = match value {
            JsonValue::Object(map) => map,
            scalar => return Ok(Condition::compare(BinaryOp::Eq, literal_from_json(scalar)?)),
        };

        let mut conditions = Vec::new();
        for (key, operand) in map {
            let condition = match key.as_str() {
                "in" | "not-in" => {
                    let values = operand
                        .as_array()
                        .ok_or_else(|| FleurError::invalid(format!("'{}' needs a list", key)))?
                        .iter()
                        .map(literal_from_json)
                        .collect::<Result<Vec<_>>>()?;
                    Condition::In {
                        values,
                        negated: key == "not-in",
                    }
                }
                "and" | "or" => {
                    let conditions = operand
                        .as_array()
                        .ok_or_else(|| FleurError::invalid(format!("'{}' needs a list", key)))?
                        .iter()
                        .map(Condition::from_json)
                        .collect::<Result<Vec<_>>>()?;
                    Condition::Compound {
                        op: if key == "and" {
                            CompoundOp::And
                        } else {
                            CompoundOp::Or
                        },
                        conditions,
                    }
                }
                "index" => index_from_json(operand)?,
                "has" | "has-not" => {
                    let path = operand.as_str().ok_or_else(|| {
                        FleurError::invalid(format!("'{}' needs a path string", key))
                    })?;
                    let path = match path.strip_prefix('/') {
                        Some(rest) => format!("./{}", rest),
                        None => path.to_string(),
                    };
                    if key == "has" {
                        Condition::Has(path)
                    } else {
                        Condition::HasNot(path)
                    }
                }
                "number-nodes" => Condition::NumberNodes(Box::new(Condition::from_json(operand)?)),
                "string-length" => {
                    Condition::StringLength(Box::new(Condition::from_json(operand)?))
                }
                op_key => match BinaryOp::from_key(op_key) {
                    Some(op) => Condition::Compare {
                        op,
                        value: literal_from_json(operand)?,
                    },
                    None => Condition::Path {
                        lhs: Lhs::from_key(op_key),
                        condition: Box::new(Condition::from_json(operand)?),
                    },
                },
            };
            conditions.push(condition);
        }

        match conditions.len() {
            0 => Err(FleurError::invalid("empty filter condition")),
            1 => Ok(conditions.remove(0)),
            _ => Ok(Condition::All(conditions)),
        }
    }

    fn contains_compound(&self) -> bool {
        match self {
            Condition::Compound { .. } => true,
            Condition::NumberNodes(inner) | Condition::StringLength(inner) => {
                inner.contains_compound()
            }
            Condition::Path { condition, .. } => condition.contains_compound(),
            Condition::All(conditions) => conditions.iter().any(Condition::contains_compound),
            _ => false,
        }
    }
}

impl From<&str> for XPathLiteral {
    fn from(value: &str) -> Self {
        XPathLiteral::String(value.to_string())
    }
}

impl From<String> for XPathLiteral {
    fn from(value: String) -> Self {
        XPathLiteral::String(value)
    }
}

impl From<f64> for XPathLiteral {
    fn from(value: f64) -> Self {
        XPathLiteral::Number(value)
    }
}

impl From<i64> for XPathLiteral {
    fn from(value: i64) -> Self {
        XPathLiteral::Number(value as f64)
    }
}

/// Renders the conditions of one tag, allocating its variables
struct PredicateRenderer<'v> {
    prefix: String,
    counter: usize,
    variables: &'v mut XPathVariables,
}

impl PredicateRenderer<'_> {
    fn bind(&mut self, value: &XPathLiteral) -> String {
        let name = format!("{}_cond_{}", self.prefix, self.counter);
        self.counter += 1;
        self.variables.insert(name.clone(), value.clone());
        format!("${}", name)
    }

    fn render(&mut self, condition: &Condition, lhs: &str, top_level: bool) -> Result<String> {
        match condition {
            Condition::Compare { op, value } => {
                let rhs = self.bind(value);
                Ok(op.render(lhs, &rhs))
            }
            Condition::In { values, negated } => {
                if values.is_empty() {
                    return Err(FleurError::invalid("'in' needs at least one value"));
                }
                let (op, joiner) = if *negated {
                    (BinaryOp::Ne, " and ")
                } else {
                    (BinaryOp::Eq, " or ")
                };
                let parts: Vec<String> = values
                    .iter()
                    .map(|value| {
                        let rhs = self.bind(value);
                        op.render(lhs, &rhs)
                    })
                    .collect();
                Ok(format!("({})", parts.join(joiner)))
            }
            Condition::Compound { op, conditions } => {
                if conditions.iter().any(Condition::contains_compound) {
                    return Err(FleurError::invalid(
                        "compound conditions ('and'/'or') cannot be nested",
                    ));
                }
                let parts = conditions
                    .iter()
                    .map(|inner| self.render(inner, lhs, false))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(op.joiner())))
            }
            Condition::Index { op, value } => {
                if !top_level || lhs != "." {
                    return Err(FleurError::invalid(
                        "'index' can only be used directly on a tag",
                    ));
                }
                let name = format!("{}_index", self.prefix);
                let (position, bound) = if *value >= 0 {
                    (format!("${}", name), *value + 1)
                } else {
                    (format!("last() - ${}", name), -*value - 1)
                };
                self.variables
                    .insert(name, XPathLiteral::Number(bound as f64));
                Ok(op.render("position()", &position))
            }
            Condition::Has(path) => Ok(path.clone()),
            Condition::HasNot(path) => Ok(format!("not({})", path)),
            Condition::NumberNodes(inner) => self.render_wrapped(inner, lhs, "count"),
            Condition::StringLength(inner) => self.render_wrapped(inner, lhs, "string-length"),
            Condition::Path { lhs: path, condition } => {
                self.render(condition, &join_lhs(lhs, path), false)
            }
            Condition::All(conditions) => {
                let parts = conditions
                    .iter()
                    .map(|inner| self.render(inner, lhs, top_level))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" and "))
            }
        }
    }

    /// Apply `function` to the left-hand side the inner condition compares
    fn render_wrapped(&mut self, inner: &Condition, lhs: &str, function: &str) -> Result<String> {
        match inner {
            Condition::Path { lhs: path, condition } => {
                let target = join_lhs(lhs, path);
                self.render(condition, &format!("{}({})", function, target), false)
            }
            Condition::All(conditions) => {
                let parts = conditions
                    .iter()
                    .map(|condition| self.render_wrapped(condition, lhs, function))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(" and "))
            }
            other => self.render(other, &format!("{}({})", function, lhs), false),
        }
    }
}

fn join_lhs(outer: &str, path: &Lhs) -> String {
    match (outer, path) {
        (".", path) => path.render(),
        (outer, Lhs::Path(inner)) => format!("{}/{}", outer, inner.trim_start_matches("./")),
        (_, path) => path.render(),
    }
}

fn variable_prefix(tag: &str) -> String {
    let mut prefix: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if prefix.starts_with(|c: char| c.is_ascii_digit()) || prefix.is_empty() {
        prefix.insert(0, '_');
    }
    prefix
}

/// XPath under construction
#[derive(Debug, Clone, PartialEq)]
pub struct XPathBuilder {
    components: Vec<String>,
    absolute: bool,
    filters: BTreeMap<String, Vec<Condition>>,
    path_variables: XPathVariables,
    compile_path: bool,
    strict: bool,
}

impl XPathBuilder {
    /// Start from a simple XPath
    pub fn new(simple_path: &str) -> Result<Self> {
        let absolute = simple_path.starts_with('/');
        let mut builder = XPathBuilder {
            components: Vec::new(),
            absolute,
            filters: BTreeMap::new(),
            path_variables: XPathVariables::new(),
            compile_path: false,
            strict: false,
        };
        for component in simple_path.split('/').filter(|step| !step.is_empty()) {
            builder.append_tag(component)?;
        }
        if builder.components.is_empty() {
            return Err(FleurError::invalid(format!(
                "'{}' has no steps to filter",
                simple_path
            )));
        }
        Ok(builder)
    }

    /// Start from a simple XPath and a JSON mapping of tag → condition
    pub fn with_filters(simple_path: &str, filters: &JsonValue) -> Result<Self> {
        let mut builder = XPathBuilder::new(simple_path)?;
        builder.add_filters_json(filters)?;
        Ok(builder)
    }

    /// Check the rendered expression with libxml2 whenever it is rendered
    pub fn compile_path(mut self, compile_path: bool) -> Self {
        self.compile_path = compile_path;
        self
    }

    /// Refuse materializing the path with literals substituted
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn filters(&self) -> &BTreeMap<String, Vec<Condition>> {
        &self.filters
    }

    /// Variables bound by the last call to [`XPathBuilder::path`]
    pub fn path_variables(&self) -> &XPathVariables {
        &self.path_variables
    }

    /// The simple path without any predicates
    pub fn simple_path(&self) -> String {
        let joined = self.components.join("/");
        if self.absolute {
            format!("/{}", joined)
        } else {
            joined
        }
    }

    /// Attach a condition to a tag of the path
    ///
    /// Conditions on the same tag accumulate; a new `index` replaces the previous one.
    pub fn add_filter(&mut self, tag: &str, condition: Condition) -> Result<()> {
        if !self.components.iter().any(|component| component == tag) {
            return Err(FleurError::invalid(format!(
                "cannot filter '{}': not a tag of {}",
                tag,
                self.simple_path()
            )));
        }
        let conditions = self.filters.entry(tag.to_string()).or_default();
        if matches!(condition, Condition::Index { .. }) {
            conditions.retain(|existing| !matches!(existing, Condition::Index { .. }));
        }
        conditions.push(condition);
        Ok(())
    }

    /// Attach the conditions of a JSON mapping of tag → condition
    pub fn add_filters_json(&mut self, filters: &JsonValue) -> Result<()> {
        let map = filters.as_object().ok_or_else(|| {
            FleurError::invalid(format!("filters must map tag names to conditions, got {}", filters))
        })?;
        for (tag, condition) in map {
            self.add_filter(tag, Condition::from_json(condition)?)?;
        }
        Ok(())
    }

    /// Add a step at the end of the path
    pub fn append_tag(&mut self, tag: &str) -> Result<()> {
        if self.components.iter().any(|component| component == tag) {
            return Err(FleurError::invalid(format!(
                "'{}' is already part of the path; filters would be ambiguous",
                tag
            )));
        }
        self.components.push(tag.to_string());
        Ok(())
    }

    /// Remove the last step and its filters
    pub fn strip_off_tag(&mut self) -> Result<String> {
        if self.components.len() < 2 {
            return Err(FleurError::invalid(format!(
                "cannot strip the last tag of {}",
                self.simple_path()
            )));
        }
        let tag = self.components.pop().unwrap_or_default();
        self.filters.remove(&tag);
        Ok(tag)
    }

    fn render(&self) -> Result<(String, XPathVariables)> {
        let mut variables = XPathVariables::new();
        let mut steps = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let Some(conditions) = self.filters.get(component) else {
                steps.push(component.clone());
                continue;
            };
            let mut renderer = PredicateRenderer {
                prefix: variable_prefix(component),
                counter: 0,
                variables: &mut variables,
            };
            let mut parts = Vec::new();
            for condition in conditions {
                parts.push(renderer.render(condition, ".", true)?);
            }
            steps.push(format!("{}[{}]", component, parts.join(" and ")));
        }

        let joined = steps.join("/");
        let path = if self.absolute {
            format!("/{}", joined)
        } else {
            joined
        };
        if self.compile_path {
            compile_check(&path).map_err(|e| FleurError::XPath {
                expression: path.clone(),
                details: e.to_string(),
            })?;
        }
        Ok((path, variables))
    }

    /// Render the expression and the variables it refers to
    pub fn path(&mut self) -> Result<(String, XPathVariables)> {
        let (path, variables) = self.render()?;
        self.path_variables = variables.clone();
        Ok((path, variables))
    }

    /// The expression with every variable replaced by its literal
    pub fn materialize(&self) -> Result<String> {
        if self.strict {
            return Err(FleurError::invalid(
                "strict XPathBuilder cannot be converted to a plain string",
            ));
        }
        let (path, variables) = self.render()?;
        Ok(substitute_variables(&path, &variables))
    }
}

/// Replace `$name` references by the literal text of the bound values
pub fn substitute_variables(path: &str, variables: &XPathVariables) -> String {
    variable_regex()
        .replace_all(path, |captures: &Captures| match variables.get(&captures[1]) {
            Some(value) => value.to_xpath_text(),
            None => captures[0].to_string(),
        })
        .into_owned()
}

impl fmt::Display for XPathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, variables) = self.render().map_err(|_| fmt::Error)?;
        if self.strict {
            f.write_str(&path)
        } else {
            f.write_str(&substitute_variables(&path, &variables))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPECIES_NAME: &str = "/fleurInput/atomSpecies/species/@name";

    #[test]
    fn test_without_filters_round_trips() {
        let builder = XPathBuilder::new(SPECIES_NAME).unwrap();
        assert_eq!(builder.to_string(), SPECIES_NAME);
        assert_eq!(builder.simple_path(), SPECIES_NAME);

        let relative = XPathBuilder::new("./mtSphere/@radius").unwrap();
        assert_eq!(relative.to_string(), "./mtSphere/@radius");
    }

    #[test]
    fn test_literals_become_variables() {
        let mut builder = XPathBuilder::with_filters(
            SPECIES_NAME,
            &json!({"species": {"/mtSphere/@radius": {">=": 2.0}}}),
        )
        .unwrap();
        let (path, variables) = builder.path().unwrap();

        assert_eq!(
            path,
            "/fleurInput/atomSpecies/species[./mtSphere/@radius >= $species_cond_0]/@name"
        );
        assert!(!path.contains("2.0"));
        assert_eq!(
            variables.get("species_cond_0"),
            Some(&XPathLiteral::Number(2.0))
        );
        assert_eq!(builder.path_variables(), &variables);
        assert_eq!(
            builder.to_string(),
            "/fleurInput/atomSpecies/species[./mtSphere/@radius >= 2]/@name"
        );
    }

    #[test]
    fn test_bare_names_are_attributes() {
        let mut builder =
            XPathBuilder::with_filters(SPECIES_NAME, &json!({"species": {"name": "Fe-1"}}))
                .unwrap();
        let (path, _) = builder.path().unwrap();
        assert_eq!(
            path,
            "/fleurInput/atomSpecies/species[@name = $species_cond_0]/@name"
        );
    }

    #[test]
    fn test_index_and_negative_index() {
        let mut builder = XPathBuilder::new("/fleurInput/atomGroups/atomGroup").unwrap();
        builder.add_filter("atomGroup", Condition::index(0)).unwrap();
        let (path, variables) = builder.path().unwrap();
        assert_eq!(path, "/fleurInput/atomGroups/atomGroup[position() = $atomGroup_index]");
        assert_eq!(variables["atomGroup_index"], XPathLiteral::Number(1.0));

        builder.add_filter("atomGroup", Condition::index(-1)).unwrap();
        let (path, variables) = builder.path().unwrap();
        assert_eq!(
            path,
            "/fleurInput/atomGroups/atomGroup[position() = last() - $atomGroup_index]"
        );
        assert_eq!(variables["atomGroup_index"], XPathLiteral::Number(0.0));
    }

    #[test]
    fn test_compounds_and_membership() {
        let mut builder = XPathBuilder::with_filters(
            SPECIES_NAME,
            &json!({"species": {"name": {"or": [{"starts-with": "Fe"}, {"ends-with": "-2"}]}}}),
        )
        .unwrap();
        let (path, variables) = builder.path().unwrap();
        assert!(path.contains("(starts-with(@name, $species_cond_0) or "));
        assert!(path.contains(
            "substring(@name, string-length(@name) - string-length($species_cond_1) + 1) = $species_cond_1"
        ));
        assert_eq!(variables.len(), 2);

        let mut builder = XPathBuilder::with_filters(
            SPECIES_NAME,
            &json!({"species": {"name": {"not-in": ["Fe-1", "Pt-1"]}}}),
        )
        .unwrap();
        let (path, _) = builder.path().unwrap();
        assert!(path.contains("(@name != $species_cond_0 and @name != $species_cond_1)"));
    }

    #[test]
    fn test_nested_compound_is_rejected() {
        let mut builder = XPathBuilder::with_filters(
            SPECIES_NAME,
            &json!({"species": {"and": [{"name": "x"}, {"or": [{"element": "Fe"}]}]}}),
        )
        .unwrap();
        assert!(builder.path().is_err());
    }

    #[test]
    fn test_union_existence_and_counts() {
        let mut builder = XPathBuilder::with_filters(
            "/fleurInput/atomSpecies/species",
            &json!({"species": {"has": "lo", "number-nodes": {"/ldaU": {">": 1}}}}),
        )
        .unwrap();
        let (path, _) = builder.path().unwrap();
        assert!(
            path.contains("species[lo and count(./ldaU) > $species_cond_0]"),
            "{}",
            path
        );

        let mut builder = XPathBuilder::with_filters(
            "/fleurInput/atomSpecies/species",
            &json!({"species": {"./lo/@n|./ldaU/@l": {"=": 2}}}),
        )
        .unwrap();
        let (path, _) = builder.path().unwrap();
        assert!(path.contains("(./lo/@n | ./ldaU/@l) = $species_cond_0"));

        let mut builder = XPathBuilder::with_filters(
            "/fleurInput/atomSpecies/species",
            &json!({"species": {"number-nodes": {"/lo": {">=": 2}}}}),
        )
        .unwrap();
        let (path, _) = builder.path().unwrap();
        assert!(path.contains("count(./lo) >= $species_cond_0"), "{}", path);
    }

    #[test]
    fn test_component_rules() {
        let mut builder = XPathBuilder::new("/fleurInput/atomSpecies/species").unwrap();
        assert!(builder.add_filter("atomGroup", Condition::index(0)).is_err());
        assert!(builder.append_tag("species").is_err());
        builder.append_tag("mtSphere").unwrap();
        builder
            .add_filter("mtSphere", Condition::at("radius", Condition::equals(2.2)))
            .unwrap();
        assert_eq!(builder.strip_off_tag().unwrap(), "mtSphere");
        assert!(!builder.has_filters());
        assert_eq!(builder.simple_path(), "/fleurInput/atomSpecies/species");
    }

    #[test]
    fn test_strict_builder_does_not_materialize() {
        let builder = XPathBuilder::with_filters(
            SPECIES_NAME,
            &json!({"species": {"name": "Fe-1"}}),
        )
        .unwrap()
        .strict(true);
        assert!(builder.materialize().is_err());
        assert!(builder.to_string().contains("$species_cond_0"));
    }

    #[test]
    fn test_compile_path_checks_expression() {
        let mut builder = XPathBuilder::new(SPECIES_NAME).unwrap().compile_path(true);
        assert!(builder.path().is_ok());
    }
}
