//! Named physical constants usable inside `float_expression` values.

use std::collections::BTreeMap;

use crate::error::{FleurError, Result};
use crate::expression;
use crate::libxml2::{XPathVariables, XmlNode};
use crate::logger::Logger;
use crate::schema_dict::{PathFilter, SchemaDictionary};

/// Identifier → value, in atomic units
pub type Constants = BTreeMap<String, f64>;

pub(crate) const BOHR_IN_ANGSTROM: f64 = 0.52917721067;
pub(crate) const HARTREE_IN_EV: f64 = 27.21138602;

/// Constants known to every document
pub fn predefined_constants() -> Constants {
    let pi = std::f64::consts::PI;
    [
        ("Pi", pi),
        ("Deg", 2.0 * pi / 360.0),
        ("Ang", 1.0 / BOHR_IN_ANGSTROM),
        ("nm", 10.0 / BOHR_IN_ANGSTROM),
        ("pm", 0.01 / BOHR_IN_ANGSTROM),
        ("Bohr", 1.0),
        ("Htr", 1.0),
        ("eV", 1.0 / HARTREE_IN_EV),
        ("Ry", 0.5),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}

/// Predefined constants extended by the `constant` elements of a document
///
/// Definitions are read in document order and may refer to earlier ones. Redefining a
/// name that is already known fails with [`FleurError::AmbiguousConstant`], with or
/// without a logger.
pub fn read_constants(
    root: XmlNode<'_>,
    schema: &dyn SchemaDictionary,
    logger: Option<&Logger>,
) -> Result<Constants> {
    let mut constants = predefined_constants();

    let path = match schema.dict().tag_xpath("constant", &PathFilter::new()) {
        Ok(path) => path,
        Err(FleurError::NoPathFound { .. }) => return Ok(constants),
        Err(e) => return Err(e),
    };

    let nodes = root
        .xpath_nodes(&path, &XPathVariables::new())
        .map_err(FleurError::from)?;

    for node in nodes {
        let Some(name) = node.attribute("name") else {
            let error = FleurError::MissingData {
                details: format!("constant at {} has no name", node.node_path()),
            };
            match logger {
                Some(logger) => {
                    logger.warning(error.to_string());
                    continue;
                }
                None => return Err(error),
            }
        };
        if constants.contains_key(&name) {
            return Err(FleurError::AmbiguousConstant { name });
        }

        let text = node.attribute("value").unwrap_or_default();
        let value = expression::evaluate(&text, &constants).map_err(|reason| {
            FleurError::Conversion {
                name: name.clone(),
                text: text.clone(),
                types: vec!["float_expression".to_string()],
                reason,
            }
        })?;
        log::debug!("Read constant {} = {}", name, value);
        constants.insert(name, value);
    }

    Ok(constants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_values() {
        let constants = predefined_constants();
        assert_eq!(constants.len(), 9);
        assert!((constants["Deg"] * 360.0 - 2.0 * std::f64::consts::PI).abs() < 1e-12);
        assert!((constants["Ang"] * BOHR_IN_ANGSTROM - 1.0).abs() < 1e-12);
        assert!((constants["nm"] - 10.0 * constants["Ang"]).abs() < 1e-9);
        assert_eq!(constants["Ry"], 0.5);
    }
}
