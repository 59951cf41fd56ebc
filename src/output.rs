//! Output formatting for command results.

use std::io::IsTerminal;

use serde_json::{Value as JsonValue, json};

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::conversion::ConversionReport;
use crate::converters::Value;
use crate::hdf5::{H5Value, RecipeOutput};
use crate::libxml2::ValidationResult;
use crate::logger::Logger;

/// Formatter for human-readable or JSON results
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: format == OutputFormat::Human && std::io::stdout().is_terminal(),
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_value(&self, name: &str, value: &Value) -> String {
        match self.format {
            OutputFormat::Json => json!({ name: value }).to_string(),
            OutputFormat::Human => match value {
                Value::List(values) if self.verbosity >= VerbosityLevel::Verbose => {
                    let mut output = format!("{} ({} values):", name, values.len());
                    for value in values {
                        output.push_str(&format!("\n  {}", value));
                    }
                    output
                }
                value => format!("{} = {}", name, value),
            },
        }
    }

    pub fn format_validation(&self, source: &str, result: &ValidationResult) -> String {
        match self.format {
            OutputFormat::Json => {
                let (status, errors) = match result {
                    ValidationResult::Valid => ("valid", Vec::new()),
                    ValidationResult::Invalid { errors, .. } => ("invalid", errors.clone()),
                    ValidationResult::InternalError { code } => {
                        ("error", vec![format!("internal error {}", code)])
                    }
                };
                json!({"file": source, "status": status, "errors": errors}).to_string()
            }
            OutputFormat::Human => match result {
                ValidationResult::Valid => {
                    format!("{}  {}", self.colorize("✓ VALID", "32"), source)
                }
                ValidationResult::Invalid {
                    error_count,
                    errors,
                } => {
                    let mut output = format!(
                        "{}  {} - {} error{}",
                        self.colorize("✗ INVALID", "31"),
                        source,
                        error_count,
                        if *error_count == 1 { "" } else { "s" }
                    );
                    if self.verbosity >= VerbosityLevel::Verbose {
                        for error in errors {
                            output.push_str(&format!("\n    {}", error));
                        }
                    }
                    output
                }
                ValidationResult::InternalError { code } => format!(
                    "{}  {} - internal libxml2 error {}",
                    self.colorize("⚠ ERROR", "33"),
                    source,
                    code
                ),
            },
        }
    }

    pub fn format_conversion(&self, source: &str, report: &ConversionReport) -> String {
        match self.format {
            OutputFormat::Json => json!({
                "file": source,
                "removed_tags": report.removed_tags,
                "removed_attribs": report.removed_attribs,
                "moved": report.moved,
                "created": report.created,
                "valid": report.validation.is_valid(),
            })
            .to_string(),
            OutputFormat::Human => {
                let mut output = format!("Converted {}:\n", source);
                output.push_str(&format!("  Removed tags: {}\n", report.removed_tags));
                output.push_str(&format!("  Removed attributes: {}\n", report.removed_attribs));
                output.push_str(&format!("  Moved: {}\n", report.moved));
                output.push_str(&format!("  Created: {}\n", report.created));
                output.push_str(&self.format_validation(source, &report.validation));
                output
            }
        }
    }

    pub fn format_recipe_output(&self, recipe: &str, output: &RecipeOutput) -> String {
        let section = |values: &std::collections::BTreeMap<String, H5Value>| -> JsonValue {
            JsonValue::Object(
                values
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            )
        };
        match self.format {
            OutputFormat::Json => json!({
                "recipe": recipe,
                "datasets": section(&output.datasets),
                "attributes": section(&output.attributes),
            })
            .to_string(),
            OutputFormat::Human => {
                let mut text = format!("Recipe {}\n", recipe);
                text.push_str("Attributes:\n");
                for (key, value) in &output.attributes {
                    text.push_str(&format!("  {}: {}\n", key, self.describe_h5(value)));
                }
                text.push_str("Datasets:\n");
                for (key, value) in &output.datasets {
                    text.push_str(&format!("  {}: {}\n", key, self.describe_h5(value)));
                }
                text
            }
        }
    }

    /// Small values in full, larger ones by shape unless verbose
    fn describe_h5(&self, value: &H5Value) -> String {
        let small = value.shape().is_some_and(|shape| shape.iter().product::<usize>() <= 9);
        if small || self.verbosity >= VerbosityLevel::Debug {
            value.to_json().to_string()
        } else {
            value.describe()
        }
    }

    pub fn format_warnings(&self, logger: &Logger) -> String {
        logger
            .records()
            .iter()
            .map(|record| self.colorize(&record.to_string(), "33"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Normal);
        assert_eq!(output.format_value("jspins", &Value::Int(2)), "jspins = 2");

        let output = Output::new(OutputFormat::Json, VerbosityLevel::Normal);
        assert_eq!(
            output.format_value("radius", &Value::List(vec![Value::Float(2.2), Value::Float(2.4)])),
            r#"{"radius":[2.2,2.4]}"#
        );
    }

    #[test]
    fn test_format_validation() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Verbose);
        let result = ValidationResult::Invalid {
            error_count: 1,
            errors: vec!["element 'foo' not expected".to_string()],
        };
        let formatted = output.format_validation("inp.xml", &result);
        assert!(formatted.contains("INVALID"));
        assert!(formatted.contains("1 error\n"));
        assert!(formatted.contains("element 'foo'"));

        let output = Output::new(OutputFormat::Json, VerbosityLevel::Normal);
        let formatted = output.format_validation("inp.xml", &ValidationResult::Valid);
        assert_eq!(
            serde_json::from_str::<JsonValue>(&formatted).unwrap()["status"],
            "valid"
        );
    }

    #[test]
    fn test_format_recipe_output() {
        let mut recipe_output = RecipeOutput::default();
        recipe_output
            .attributes
            .insert("spins".to_string(), H5Value::int(2));
        let output = Output::new(OutputFormat::Json, VerbosityLevel::Normal);
        let formatted: JsonValue =
            serde_json::from_str(&output.format_recipe_output("FleurBands", &recipe_output)).unwrap();
        assert_eq!(formatted["attributes"]["spins"], 2);
    }
}
