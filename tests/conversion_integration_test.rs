//! Converting MaX4 input files and the k-point operations of older versions

mod common;

use std::collections::BTreeMap;

use common::test_helpers::*;
use fleurio::conversion::{ConversionDescription, conversion_file, convert_inpxml};
use fleurio::error::FleurError;
use fleurio::libxml2::{ParseOptions, XmlDocument};
use fleurio::loader::load_inpxml;
use fleurio::schema_dict::{SchemaDictionary, SchemaVersion};
use fleurio::setters::fleur::{self, KPointList};
use fleurio::setters::WriteOptions;

fn max4_document() -> XmlDocument {
    let fixtures = TestFixtures::new();
    XmlDocument::parse_file(&fixtures.inpxml_max4(), ParseOptions::default()).unwrap()
}

fn description() -> ConversionDescription {
    let fixtures = TestFixtures::new();
    conversion_file(
        &fixtures.conversions_dir(),
        SchemaVersion::new(0, 31),
        SchemaVersion::new(0, 34),
    )
    .unwrap()
}

#[test]
fn test_max4_file_converts_to_valid_input() {
    let cache = schema_cache();
    let mut document = max4_document();
    let report = convert_inpxml(&mut document, &description(), &cache, WriteOptions::default()).unwrap();

    assert!(report.validation.is_valid(), "{:?}", report.validation);
    assert_eq!(report.moved, 4);
    assert!(report.created >= 4);
    assert_eq!(
        document.root().attribute("fleurInputVersion").as_deref(),
        Some("0.34")
    );

    assert_eq!(
        xpath_texts(&document, "/fleurInput/cell/bzIntegration/kPointListSelection/@listName"),
        vec!["default-1"]
    );
    assert_eq!(
        xpath_texts(&document, "/fleurInput/cell/bzIntegration/kPointLists/kPointList/@type"),
        vec!["mesh"]
    );
    assert_eq!(
        xpath_texts(&document, "/fleurInput/cell/bzIntegration/@valenceElectrons"),
        vec!["8.00000000"]
    );
    assert_eq!(
        xpath_texts(&document, "//kPoint/@weight"),
        vec!["0.2500000000", "0.7500000000"]
    );
    assert!(xpath_texts(&document, "//@latnam").is_empty());
    assert!(xpath_texts(&document, "//@posScale").is_empty());
    assert!(!child_names(&document, "/fleurInput/calculationSetup").contains(&"bzIntegration".to_string()));
    assert_eq!(
        child_names(&document, "/fleurInput/cell")[..2],
        ["bzIntegration".to_string(), "bulkLattice".to_string()]
    );

    let loaded = load_inpxml(document, &cache).unwrap();
    assert_eq!(loaded.schema.input_version(), SchemaVersion::new(0, 34));
}

#[test]
fn test_conversion_checks_start_version() {
    let cache = schema_cache();
    let fixtures = TestFixtures::new();
    let mut document =
        XmlDocument::parse_file(&fixtures.inpxml(), ParseOptions::default()).unwrap();
    let error = convert_inpxml(&mut document, &description(), &cache, WriteOptions::default())
        .unwrap_err();
    assert!(matches!(error, FleurError::SchemaVersion { .. }));
}

#[test]
fn test_missing_conversion_file() {
    let fixtures = TestFixtures::new();
    assert!(
        conversion_file(
            &fixtures.conversions_dir(),
            SchemaVersion::new(0, 27),
            SchemaVersion::new(0, 34),
        )
        .is_err()
    );
}

#[test]
fn test_conversion_description_from_file() {
    let text = r#"{
        "from": "0.31",
        "to": "0.34",
        "tag": {"move": [], "remove": [], "create": []},
        "attrib": {"move": [], "remove": [], "create": []}
    }"#;
    let (_dir, path) = write_temp("conversion.json", text);
    let description = ConversionDescription::from_file(&path).unwrap();
    assert_eq!(description.from, SchemaVersion::new(0, 31));
    assert_eq!(description.to, SchemaVersion::new(0, 34));
    assert!(description.tag.moves.is_empty());
}

#[test]
fn test_max4_kpoint_count() {
    let cache = schema_cache();
    let mut loaded = load_inpxml(max4_document(), &cache).unwrap();
    let schema = loaded.schema.clone();

    fleur::set_nkpts(
        loaded.document.root_mut(),
        schema.as_ref(),
        50,
        true,
        WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(
        child_names(&loaded.document, "/fleurInput/calculationSetup/bzIntegration"),
        vec!["kPointCount"]
    );
    assert_eq!(xpath_texts(&loaded.document, "//kPointCount/@count"), vec!["50"]);
    assert_eq!(xpath_texts(&loaded.document, "//kPointCount/@gamma"), vec!["T"]);
}

#[test]
fn test_max4_kpath_creates_alternative_set() {
    let cache = schema_cache();
    let mut loaded = load_inpxml(max4_document(), &cache).unwrap();
    let schema = loaded.schema.clone();

    let kpath: BTreeMap<String, [f64; 3]> = [
        ("g".to_string(), [0.0, 0.0, 0.0]),
        ("x".to_string(), [0.5, 0.0, 0.5]),
    ]
    .into_iter()
    .collect();
    fleur::set_kpath(
        loaded.document.root_mut(),
        schema.as_ref(),
        &kpath,
        200,
        false,
        WriteOptions::default(),
    )
    .unwrap();

    assert_eq!(
        xpath_texts(&loaded.document, "//altKPointSet/@purpose"),
        vec!["bands"]
    );
    assert_eq!(
        xpath_texts(&loaded.document, "//altKPointSet/kPointCount/@count"),
        vec!["200"]
    );
    assert_eq!(
        xpath_texts(&loaded.document, "//altKPointSet/kPointCount/specialPoint/@name"),
        vec!["g", "x"]
    );
    assert_eq!(
        child_names(&loaded.document, "/fleurInput/calculationSetup/bzIntegration"),
        vec!["kPointList", "altKPointSet"]
    );
}

#[test]
fn test_max4_rejects_named_lists() {
    let cache = schema_cache();
    let mut loaded = load_inpxml(max4_document(), &cache).unwrap();
    let schema = loaded.schema.clone();

    let error = fleur::switch_kpointset(
        loaded.document.root_mut(),
        schema.as_ref(),
        "default",
        WriteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(error, FleurError::UnsupportedOperation { .. }));

    let mut list = KPointList::new(vec![[0.0, 0.0, 0.0]], vec![1.0]);
    list.name = Some("named".to_string());
    let error = fleur::set_kpointlist(
        loaded.document.root_mut(),
        schema.as_ref(),
        &list,
        WriteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(error, FleurError::UnsupportedOperation { .. }));

    list.name = None;
    fleur::set_kpointlist(
        loaded.document.root_mut(),
        schema.as_ref(),
        &list,
        WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(xpath_texts(&loaded.document, "//kPointList/@count"), vec!["1"]);
    assert_eq!(xpath_texts(&loaded.document, "//kPoint/@weight"), vec!["1.0000000000"]);
}
