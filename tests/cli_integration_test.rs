mod common;

use std::process::{Command, Output};

use common::test_helpers::*;
use fleurio::config::bundled_schema_dir;

fn fleurio(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fleurio"))
        .arg("--schema-dir")
        .arg(bundled_schema_dir())
        .args(args)
        .output()
        .expect("Failed to execute fleurio")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_cli_help_output() {
    let output = fleurio(&["--help"]);
    assert!(output.status.success());
    let help = stdout(&output);
    for command in ["inpxml", "outxml", "hdf5", "--schema-dir", "--format"] {
        assert!(help.contains(command), "{} missing in help", command);
    }
}

#[test]
fn test_cli_get_attribute() {
    let fixtures = TestFixtures::new();
    let inpxml = fixtures.inpxml();
    let output = fleurio(&["inpxml", "get", inpxml.to_str().unwrap(), "jspins"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "jspins = 2");

    let output = fleurio(&[
        "--format",
        "json",
        "inpxml",
        "get",
        inpxml.to_str().unwrap(),
        "radius",
        "--filters",
        r#"{"species": {"name": "Pt-1"}}"#,
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(value["radius"], 2.2);
}

#[test]
fn test_cli_ambiguous_name_fails() {
    let fixtures = TestFixtures::new();
    let inpxml = fixtures.inpxml();
    let output = fleurio(&["-v", "inpxml", "get", inpxml.to_str().unwrap(), "spinf"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Candidates"));
}

#[test]
fn test_cli_outxml_last_iteration() {
    let fixtures = TestFixtures::new();
    let outxml = fixtures.outxml();
    let output = fleurio(&[
        "--format",
        "json",
        "outxml",
        "get",
        outxml.to_str().unwrap(),
        "value",
        "--contains",
        "FermiEnergy",
        "--last-iteration",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(stdout(&output).trim()).unwrap();
    assert_eq!(value["value"], -0.215453657);
}

#[test]
fn test_cli_nonexistent_file() {
    let output = fleurio(&["inpxml", "get", "/nonexistent/inp.xml", "jspins"]);
    assert!(!output.status.success());
    assert!(!stderr(&output).is_empty());
}

#[test]
fn test_cli_set_writes_output_file() {
    let fixtures = TestFixtures::new();
    let (_dir, target) = write_temp("inp_changed.xml", "");
    let inpxml = fixtures.inpxml();
    let output = fleurio(&[
        "inpxml",
        "set",
        inpxml.to_str().unwrap(),
        "itmax",
        "42",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = fleurio(&["inpxml", "get", target.to_str().unwrap(), "itmax"]);
    assert_eq!(stdout(&output).trim(), "itmax = 42");

    let output = fleurio(&["inpxml", "validate", target.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("VALID"));
}

#[test]
fn test_cli_convert_max4_file() {
    let fixtures = TestFixtures::new();
    let (_dir, target) = write_temp("inp_converted.xml", "");
    let inpxml = fixtures.inpxml_max4();
    let output = fleurio(&[
        "inpxml",
        "convert",
        inpxml.to_str().unwrap(),
        "0.34",
        "-o",
        target.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Moved: 4"));

    let converted = read_fixture(&target);
    assert!(converted.contains(r#"fleurInputVersion="0.34""#));
    assert!(converted.contains(r#"listName="default-1""#));
}

#[test]
fn test_cli_lists_recipes() {
    let output = fleurio(&["hdf5", "recipes"]);
    assert!(output.status.success());
    let recipes = stdout(&output);
    assert!(recipes.lines().any(|line| line == "FleurBands"));
    assert!(recipes.lines().any(|line| line == "FleurDOS"));
}

#[test]
fn test_cli_unknown_recipe() {
    let fixtures = TestFixtures::new();
    let output = fleurio(&[
        "hdf5",
        "read",
        fixtures.inpxml().to_str().unwrap(),
        "--recipe",
        "FleurPlot",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown recipe"));
}
