use divan::Bencher;
use std::path::PathBuf;

use fleurio::config::bundled_schema_dir;
use fleurio::loader::load_inpxml;
use fleurio::query::{self, EvalOptions};
use fleurio::schema_dict::{InputSchemaDict, PathFilter, SchemaCache, SchemaDictionary};

fn main() {
    divan::main();
}

fn inpxml() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/inp.xml")
}

#[divan::bench]
fn build_input_dictionary(bencher: Bencher) {
    let schema = bundled_schema_dir().join("inp/0.34/FleurInputSchema.xsd");

    bencher.bench_local(move || InputSchemaDict::from_file(&schema).expect("Failed to build dictionary"));
}

#[divan::bench]
fn load_with_warm_cache(bencher: Bencher) {
    let cache = SchemaCache::new(bundled_schema_dir(), 4);
    let path = inpxml();
    load_inpxml(path.as_path(), &cache).expect("Failed to load");

    bencher.bench_local(move || load_inpxml(path.as_path(), &cache).expect("Failed to load"));
}

#[divan::bench(args = ["jspins", "radius", "ldaU"])]
fn tag_or_attrib_xpath(bencher: Bencher, name: &str) {
    let cache = SchemaCache::new(bundled_schema_dir(), 4);
    let schema = cache.input("0.34").expect("Failed to build dictionary");
    let filter = PathFilter::new().contains("species");

    bencher.bench_local(move || {
        let dict = schema.dict();
        dict.attrib_xpath(name, &filter)
            .or_else(|_| dict.tag_xpath(name, &filter))
    });
}

#[divan::bench]
fn evaluate_attribute(bencher: Bencher) {
    let cache = SchemaCache::new(bundled_schema_dir(), 4);
    let loaded = load_inpxml(inpxml().as_path(), &cache).expect("Failed to load");
    let options = EvalOptions::new().contains("species");

    bencher.bench_local(move || {
        query::evaluate_attribute(loaded.document.root(), loaded.schema.as_ref(), "radius", &options)
            .expect("Failed to evaluate")
    });
}

#[divan::bench]
fn validate_input(bencher: Bencher) {
    let cache = SchemaCache::new(bundled_schema_dir(), 4);
    let loaded = load_inpxml(inpxml().as_path(), &cache).expect("Failed to load");

    bencher.bench_local(move || {
        let xml_schema = loaded.schema.xml_schema().expect("Compiled schema");
        loaded.document.validate(xml_schema).expect("Validation failed")
    });
}
