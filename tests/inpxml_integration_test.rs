//! Reading and modifying the 0.34 input fixture through the schema dictionary

mod common;

use std::collections::BTreeMap;

use serde_json::json;

use common::test_helpers::*;
use fleurio::constants::read_constants;
use fleurio::context::FleurXmlContext;
use fleurio::converters::Value;
use fleurio::error::FleurError;
use fleurio::loader::{LoadedInput, load_inpxml};
use fleurio::logger::Logger;
use fleurio::query::{self, EvalOptions};
use fleurio::schema_dict::{PathFilter, SchemaDictionary, SchemaVersion};
use fleurio::setters::fleur::{self, KPointList};
use fleurio::setters::names;
use fleurio::setters::{AddMode, NewElement, SetOptions, WriteOptions};
use fleurio::xpath_builder::XPathBuilder;

fn load() -> LoadedInput {
    let fixtures = TestFixtures::new();
    let cache = schema_cache();
    load_inpxml(fixtures.inpxml().as_path(), &cache).unwrap()
}

fn attribute(loaded: &LoadedInput, name: &str, options: EvalOptions<'_>) -> fleurio::Result<Value> {
    query::evaluate_attribute(loaded.document.root(), loaded.schema.as_ref(), name, &options)
}

fn assert_valid(loaded: &LoadedInput) {
    let xml_schema = loaded.schema.xml_schema().unwrap();
    let result = loaded.document.validate(xml_schema).unwrap();
    assert!(result.is_valid(), "{:?}", result);
}

#[test]
fn test_load_selects_schema_by_version() {
    let loaded = load();
    assert_eq!(loaded.schema.input_version(), SchemaVersion::new(0, 34));
    assert!(!loaded.schema.fallback());
    assert_eq!(loaded.schema.dict().root_tag(), "fleurInput");
    assert_valid(&loaded);
}

#[test]
fn test_evaluate_unique_and_repeated_attributes() {
    let loaded = load();

    assert_eq!(attribute(&loaded, "jspins", EvalOptions::new()).unwrap(), Value::Int(2));
    assert_eq!(
        attribute(&loaded, "radius", EvalOptions::new().contains("species")).unwrap(),
        Value::List(vec![Value::Float(2.2), Value::Float(2.2)])
    );
    assert_eq!(
        attribute(
            &loaded,
            "radius",
            EvalOptions::new().filters(json!({"species": {"name": "Pt-1"}}))
        )
        .unwrap(),
        Value::Float(2.2)
    );
}

#[test]
fn test_expressions_use_constants() {
    let loaded = load();
    let constants = read_constants(loaded.document.root(), loaded.schema.as_ref(), None).unwrap();
    let context = FleurXmlContext::new(loaded.document.root(), loaded.schema.as_ref(), &constants);

    let beta = context.attribute("beta").unwrap();
    let values = beta.as_list().unwrap();
    assert_eq!(values[0], Value::Float(1.570796326));
    assert!((values[1].as_f64().unwrap() - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

    let positions = context
        .text_with("filmPos", context.options().list_return(true))
        .unwrap();
    let pt_position = &positions.as_list().unwrap()[1];
    assert_eq!(
        pt_position.as_list().unwrap()[..2],
        [Value::Float(0.5), Value::Float(0.5)]
    );
}

#[test]
fn test_context_scopes_to_child_tags() {
    let loaded = load();
    let constants = read_constants(loaded.document.root(), loaded.schema.as_ref(), None).unwrap();
    let context = FleurXmlContext::new(loaded.document.root(), loaded.schema.as_ref(), &constants);

    let names = context
        .children("species", |species| species.attribute("name"))
        .unwrap();
    assert_eq!(names, vec![Value::from("Fe-1"), Value::from("Pt-1")]);

    let gmax = context
        .child("calculationSetup", |setup| setup.attribute("Gmax"))
        .unwrap();
    assert_eq!(gmax, Value::Float(10.0));

    let missing = context
        .optional_child("qss", |qss| qss.text("qss"))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_ambiguous_tag_lists_candidates() {
    let loaded = load();
    let error = loaded
        .schema
        .dict()
        .tag_xpath("ldaU", &PathFilter::new())
        .unwrap_err();
    match error {
        FleurError::NoUniquePathFound { candidates, .. } => {
            assert!(candidates.len() >= 3, "{:?}", candidates);
            assert!(candidates.contains(&"/fleurInput/calculationSetup/ldaU".to_string()));
            assert!(candidates.contains(&"/fleurInput/atomGroups/atomGroup/ldaU".to_string()));
        }
        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(
        loaded
            .schema
            .dict()
            .tag_xpath("ldaU", &PathFilter::new().contains("species"))
            .unwrap(),
        "/fleurInput/atomSpecies/species/ldaU"
    );
}

#[test]
fn test_lookup_ignores_case() {
    let loaded = load();
    let filter = PathFilter::new();
    let path = loaded.schema.dict().tag_xpath("magnetism", &filter).unwrap();
    assert_eq!(loaded.schema.dict().tag_xpath("mAgNeTiSm", &filter).unwrap(), path);
    assert_eq!(loaded.schema.dict().tag_xpath("magnetism", &filter).unwrap(), path);
    assert_eq!(
        attribute(&loaded, "JSPINS", EvalOptions::new()).unwrap(),
        Value::Int(2)
    );
}

#[test]
fn test_unknown_name_is_reported() {
    let loaded = load();
    let error = attribute(&loaded, "notAnAttribute", EvalOptions::new()).unwrap_err();
    assert!(matches!(error, FleurError::NoPathFound { .. }));
}

#[test]
fn test_filters_render_as_variables() {
    let loaded = load();
    let mut builder = XPathBuilder::with_filters(
        "/fleurInput/atomSpecies/species/@name",
        &json!({"species": {"/mtSphere/@radius": {">=": 2.0}}}),
    )
    .unwrap();
    let (path, variables) = builder.path().unwrap();

    assert!(path.contains("$species_cond_"), "{}", path);
    assert!(!path.contains("2.0"), "{}", path);
    assert!(!variables.is_empty());

    let names: Vec<String> = loaded
        .document
        .root()
        .xpath_nodes(&path, &variables)
        .unwrap()
        .into_iter()
        .map(|node| node.content())
        .collect();
    assert_eq!(names, vec!["Fe-1", "Pt-1"]);

    let plain = XPathBuilder::new("/fleurInput/atomSpecies/species/@name").unwrap();
    assert_eq!(plain.to_string(), "/fleurInput/atomSpecies/species/@name");
}

#[test]
fn test_tag_exists_matches_node_count() {
    let loaded = load();
    let root = loaded.document.root();
    let schema = loaded.schema.as_ref();
    let options = EvalOptions::new();

    for name in ["species", "lo", "qss", "kPoint", "bandDOS"] {
        let count = query::get_number_of_nodes(root, schema, name, &options).unwrap();
        let exists = query::tag_exists(root, schema, name, &options).unwrap();
        assert_eq!(exists, count > 0, "{}", name);
    }
    assert_eq!(query::get_number_of_nodes(root, schema, "lo", &options).unwrap(), 3);
    assert!(!query::tag_exists(root, schema, "qss", &options).unwrap());
}

#[test]
fn test_lenient_mode_collects_warnings() {
    let loaded = load();

    let error = attribute(&loaded, "fixed_moment", EvalOptions::new()).unwrap_err();
    assert!(matches!(error, FleurError::MissingData { .. }));

    let logger = Logger::new();
    let value = attribute(&loaded, "fixed_moment", EvalOptions::new().logger(&logger)).unwrap();
    assert_eq!(value, Value::Null);
    assert_eq!(logger.warnings().len(), 1);
}

#[test]
fn test_set_species_replaces_repeated_children() {
    let mut loaded = load();
    let changes = Value::from(json!({
        "mtSphere": {"radius": 10.0},
        "lo": [{"type": "TEST", "n": 5, "l": 12}],
        "electronConfig": {"stateOccupation": [{"state": "x"}, {"state": "y"}]}
    }));
    fleur::set_species(
        loaded.document.root_mut(),
        loaded.schema.as_ref(),
        "Fe-1",
        &changes,
        false,
        WriteOptions::default(),
    )
    .unwrap();

    let document = &loaded.document;
    assert_eq!(
        xpath_texts(document, "//species[@name='Fe-1']/mtSphere/@radius"),
        vec!["10.0000000000"]
    );
    assert_eq!(xpath_texts(document, "//species[@name='Fe-1']/lo/@type"), vec!["TEST"]);
    assert_eq!(xpath_texts(document, "//species[@name='Fe-1']/lo/@n"), vec!["5"]);
    assert_eq!(xpath_texts(document, "//species[@name='Fe-1']/lo/@l"), vec!["12"]);
    assert_eq!(
        xpath_texts(document, "//species[@name='Fe-1']/electronConfig/stateOccupation/@state"),
        vec!["x", "y"]
    );

    assert_eq!(
        xpath_texts(document, "//species[@name='Pt-1']/mtSphere/@radius"),
        vec!["2.20000000"]
    );
    assert_eq!(xpath_texts(document, "//species[@name='Pt-1']/lo/@type"), vec!["SCLO"]);
    assert_valid(&loaded);
}

#[test]
fn test_set_attrib_value_round_trip() {
    let mut loaded = load();
    let options = SetOptions::new();
    let schema = loaded.schema.clone();

    let changed = names::set_attrib_value(
        loaded.document.root_mut(),
        schema.as_ref(),
        "itmax",
        &Value::Int(30),
        &options,
    )
    .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(attribute(&loaded, "itmax", EvalOptions::new()).unwrap(), Value::Int(30));

    names::set_attrib_value(
        loaded.document.root_mut(),
        schema.as_ref(),
        "l_noco",
        &Value::Bool(true),
        &options,
    )
    .unwrap();
    assert_eq!(xpath_texts(&loaded.document, "//magnetism/@l_noco"), vec!["T"]);
    assert_eq!(
        attribute(&loaded, "l_noco", EvalOptions::new()).unwrap(),
        Value::Bool(true)
    );

    names::set_attrib_value(
        loaded.document.root_mut(),
        schema.as_ref(),
        "radius",
        &Value::List(vec![Value::Float(2.3), Value::Float(2.4)]),
        &options.clone().contains("species"),
    )
    .unwrap();
    assert_eq!(
        attribute(&loaded, "radius", EvalOptions::new()).unwrap(),
        Value::List(vec![Value::Float(2.3), Value::Float(2.4)])
    );
    assert_valid(&loaded);
}

#[test]
fn test_create_tag_keeps_schema_order() {
    let mut loaded = load();
    let schema = loaded.schema.clone();
    let options = SetOptions::new();

    names::delete_tag(loaded.document.root_mut(), schema.as_ref(), "soc", &options).unwrap();
    assert!(!child_names(&loaded.document, "/fleurInput/calculationSetup").contains(&"soc".to_string()));

    let created = names::create_tag(
        loaded.document.root_mut(),
        schema.as_ref(),
        NewElement::Tag("soc"),
        &options,
    )
    .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(
        child_names(&loaded.document, "/fleurInput/calculationSetup"),
        vec![
            "cutoffs",
            "scfLoop",
            "coreElectrons",
            "magnetism",
            "soc",
            "expertModes",
            "ldaU"
        ]
    );
}

#[test]
fn test_set_inpchanges_and_shift_value() {
    let mut loaded = load();
    let schema = loaded.schema.clone();

    let changes: BTreeMap<String, Value> = [
        ("itmax".to_string(), Value::Int(99)),
        ("xcFunctional".to_string(), Value::from("pbe")),
        ("minDistance".to_string(), Value::Float(0.0002)),
    ]
    .into_iter()
    .collect();
    fleur::set_inpchanges(
        loaded.document.root_mut(),
        schema.as_ref(),
        &changes,
        WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(xpath_texts(&loaded.document, "//xcFunctional/@name"), vec!["pbe"]);
    assert_eq!(xpath_texts(&loaded.document, "//scfLoop/@itmax"), vec!["99"]);

    let shifts: BTreeMap<String, f64> = [("Kmax".to_string(), 0.5)].into_iter().collect();
    fleur::shift_value(
        loaded.document.root_mut(),
        schema.as_ref(),
        &shifts,
        AddMode::Abs,
        &SetOptions::new(),
    )
    .unwrap();
    assert_eq!(attribute(&loaded, "Kmax", EvalOptions::new()).unwrap(), Value::Float(4.5));
    assert_valid(&loaded);
}

#[test]
fn test_switch_species_with_clone() {
    let mut loaded = load();
    let schema = loaded.schema.clone();

    let atom = fleur::find_atom_label(loaded.document.root_mut(), schema.as_ref(), "2").unwrap();
    assert_eq!(atom.species, "Pt-1");

    fleur::switch_species_label(
        loaded.document.root_mut(),
        schema.as_ref(),
        "1",
        "Fe-2",
        true,
        &Value::from(json!({"mtSphere": {"radius": 2.5}})),
        WriteOptions::default(),
    )
    .unwrap();

    assert_eq!(
        xpath_texts(&loaded.document, "//species/@name"),
        vec!["Fe-1", "Pt-1", "Fe-2"]
    );
    assert_eq!(
        xpath_texts(&loaded.document, "//atomGroup/@species"),
        vec!["Fe-2", "Pt-1"]
    );
    assert_eq!(
        xpath_texts(&loaded.document, "//species[@name='Fe-2']/mtSphere/@radius"),
        vec!["2.5000000000"]
    );
    assert_eq!(
        xpath_texts(&loaded.document, "//species[@name='Fe-1']/mtSphere/@radius"),
        vec!["2.20000000"]
    );
    assert_valid(&loaded);
}

#[test]
fn test_kpoint_lists_on_current_versions() {
    let mut loaded = load();
    let schema = loaded.schema.clone();

    let mut list = KPointList::new(
        vec![[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]],
        vec![0.5, 0.5],
    );
    list.name = Some("path-1".to_string());
    list.switch = true;
    list.special_labels.insert(0, "g".to_string());
    fleur::set_kpointlist(
        loaded.document.root_mut(),
        schema.as_ref(),
        &list,
        WriteOptions::default(),
    )
    .unwrap();

    assert_eq!(
        xpath_texts(&loaded.document, "//kPointList/@name"),
        vec!["default", "path-1"]
    );
    assert_eq!(xpath_texts(&loaded.document, "//kPointListSelection/@listName"), vec!["path-1"]);
    assert_eq!(xpath_texts(&loaded.document, "//kPointList[@name='path-1']/kPoint/@label"), vec!["g"]);
    assert_valid(&loaded);

    let duplicate = fleur::set_kpointlist(
        loaded.document.root_mut(),
        schema.as_ref(),
        &list,
        WriteOptions::default(),
    );
    assert!(duplicate.is_err());

    fleur::switch_kpointset(
        loaded.document.root_mut(),
        schema.as_ref(),
        "default",
        WriteOptions::default(),
    )
    .unwrap();
    assert_eq!(xpath_texts(&loaded.document, "//kPointListSelection/@listName"), vec!["default"]);
    assert!(
        fleur::switch_kpointset(
            loaded.document.root_mut(),
            schema.as_ref(),
            "missing",
            WriteOptions::default(),
        )
        .is_err()
    );

    let error = fleur::set_nkpts(
        loaded.document.root_mut(),
        schema.as_ref(),
        100,
        false,
        WriteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(error, FleurError::UnsupportedOperation { .. }));
}

#[test]
fn test_kpointlist_length_mismatch() {
    let mut loaded = load();
    let schema = loaded.schema.clone();
    let list = KPointList::new(vec![[0.0, 0.0, 0.0]], vec![0.5, 0.5]);
    let error = fleur::set_kpointlist(
        loaded.document.root_mut(),
        schema.as_ref(),
        &list,
        WriteOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(error, FleurError::InvalidArgument(_)));
}
