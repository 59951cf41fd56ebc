//! Reading the 0.34 output fixture, including broken and remapped variants

mod common;

use common::test_helpers::*;
use fleurio::constants::read_constants;
use fleurio::context::FleurXmlContext;
use fleurio::converters::Value;
use fleurio::error::FleurError;
use fleurio::libxml2::XPathVariables;
use fleurio::loader::{LoadedOutput, load_outxml};
use fleurio::logger::Logger;
use fleurio::query::{self, EvalOptions, TagOptions};
use fleurio::schema_dict::{SchemaDictionary, SchemaVersion};

fn fixture_text() -> String {
    read_fixture(&TestFixtures::new().outxml())
}

fn load_text(text: &str, logger: Option<&Logger>) -> fleurio::Result<LoadedOutput> {
    load_outxml(text.as_bytes(), &schema_cache(), logger)
}

fn values_of(records: &Value) -> Vec<f64> {
    records
        .as_map()
        .and_then(|map| map.get("value"))
        .and_then(Value::as_list)
        .unwrap()
        .iter()
        .map(|value| value.as_f64().unwrap())
        .collect()
}

fn value_of(record: &Value) -> f64 {
    record
        .as_map()
        .and_then(|map| map.get("value"))
        .and_then(Value::as_f64)
        .unwrap()
}

#[test]
fn test_load_output_versions() {
    let fixtures = TestFixtures::new();
    let cache = schema_cache();
    let loaded = load_outxml(fixtures.outxml().as_path(), &cache, None).unwrap();

    assert_eq!(loaded.schema.output_version(), Some(SchemaVersion::new(0, 34)));
    assert_eq!(loaded.schema.input_version(), SchemaVersion::new(0, 34));
    assert!(!loaded.schema.fallback());
    assert!(loaded.schema.iteration().is_some());
}

#[test]
fn test_constants_of_embedded_input() {
    let loaded = load_text(&fixture_text(), None).unwrap();
    let constants = read_constants(loaded.document.root(), loaded.schema.as_ref(), None).unwrap();

    assert_eq!(constants["A"], -3.14);
    assert!((constants["B"] + 6.28).abs() < 1e-12);
    assert_eq!(constants["Pi"], std::f64::consts::PI);
    assert_eq!(constants.len(), 11);
}

#[test]
fn test_redefined_constant_is_rejected() {
    let text = fixture_text().replace(r#"name="B""#, r#"name="Pi""#);
    let loaded = load_text(&text, None).unwrap();

    let error = read_constants(loaded.document.root(), loaded.schema.as_ref(), None).unwrap_err();
    assert!(matches!(&error, FleurError::AmbiguousConstant { name } if name == "Pi"));
    assert!(error.to_string().contains("'Pi'"));

    let logger = Logger::new();
    assert!(read_constants(loaded.document.root(), loaded.schema.as_ref(), Some(&logger)).is_err());
}

#[test]
fn test_input_values_inside_output() {
    let loaded = load_text(&fixture_text(), None).unwrap();
    let value = query::evaluate_attribute(
        loaded.document.root(),
        loaded.schema.as_ref(),
        "jspins",
        &EvalOptions::new(),
    )
    .unwrap();
    assert_eq!(value, Value::Int(2));
}

#[test]
fn test_values_of_all_iterations() {
    let loaded = load_text(&fixture_text(), None).unwrap();
    let energies = query::evaluate_single_value_tag(
        loaded.document.root(),
        loaded.schema.as_ref(),
        "FermiEnergy",
        &EvalOptions::new().iteration_path(true).list_return(true),
        &TagOptions::default(),
    )
    .unwrap();

    assert_eq!(values_of(&energies), vec![-0.2120722140, -0.2154536570]);
    let units = energies.as_map().unwrap()["units"].as_list().unwrap();
    assert_eq!(units.len(), 2);
}

#[test]
fn test_values_of_last_iteration() {
    let loaded = load_text(&fixture_text(), None).unwrap();
    let schema = loaded.schema.as_ref();
    let root = loaded.document.root();
    let constants = read_constants(root, schema, None).unwrap();

    let iteration_path = schema.iteration().unwrap().iteration_path().to_string();
    let last = root
        .xpath_nodes(&iteration_path, &XPathVariables::new())
        .unwrap()
        .pop()
        .unwrap();
    let context = FleurXmlContext::new(last, schema, &constants).with_iteration_path(true);

    let fermi = context.single_value_tag("FermiEnergy", context.options()).unwrap();
    assert_eq!(value_of(&fermi), -0.2154536570);

    let total = context.single_value_tag("totalEnergy", context.options()).unwrap();
    assert_eq!(value_of(&total), -38491.8820113220);
    assert_eq!(
        total.as_map().unwrap().get("units"),
        Some(&Value::Str("Htr".to_string()))
    );
}

#[test]
fn test_tag_exists_in_iterations() {
    let loaded = load_text(&fixture_text(), None).unwrap();
    let logger = Logger::new();
    let options = EvalOptions::new().iteration_path(true).logger(&logger);

    let result = query::tag_exists(
        loaded.document.root(),
        loaded.schema.as_ref(),
        "FermiEnergy",
        &options,
    )
    .unwrap();
    assert!(result);
    assert!(logger.is_empty());
}

#[test]
fn test_truncated_output_is_recovered() {
    let text = fixture_text();
    let marker = r#"<FermiEnergy value="-.2154536570" units="Htr"/>"#;
    let cut = text.find(marker).unwrap() + marker.len();
    let truncated = &text[..cut];

    let logger = Logger::new();
    let loaded = load_text(truncated, Some(&logger)).unwrap();
    assert_eq!(logger.warnings().len(), 1);
    assert!(logger.warnings()[0].contains("recovery mode"));

    let iterations = loaded
        .document
        .root()
        .xpath_nodes("//iteration", &XPathVariables::new())
        .unwrap();
    assert_eq!(iterations.len(), 2);

    let energies = query::evaluate_single_value_tag(
        loaded.document.root(),
        loaded.schema.as_ref(),
        "FermiEnergy",
        &EvalOptions::new().iteration_path(true).list_return(true),
        &TagOptions::default(),
    )
    .unwrap();
    assert_eq!(values_of(&energies).len(), 2);
}

#[test]
fn test_old_output_version_is_remapped() {
    let text = fixture_text()
        .replace(r#"fleurOutputVersion="0.34""#, r#"fleurOutputVersion="0.27""#)
        .replace(r#"version="fleur 34""#, r#"version="fleur 32""#)
        .replace(r#"fleurInputVersion="0.34""#, r#"fleurInputVersion="0.33""#);

    let loaded = load_text(&text, None).unwrap();
    assert!(loaded.schema.fallback());

    let energies = query::evaluate_single_value_tag(
        loaded.document.root(),
        loaded.schema.as_ref(),
        "totalEnergy",
        &EvalOptions::new().iteration_path(true).list_return(true),
        &TagOptions::default(),
    )
    .unwrap();
    assert_eq!(values_of(&energies), vec![-38491.8807047650, -38491.8820113220]);
}

#[test]
fn test_unknown_program_version() {
    let text = fixture_text()
        .replace(r#"fleurOutputVersion="0.34""#, r#"fleurOutputVersion="0.27""#)
        .replace(r#"version="fleur 34""#, r#"version="fleur 20""#);
    let error = load_text(&text, None).unwrap_err();
    assert!(matches!(error, FleurError::SchemaVersion { .. }));
}
