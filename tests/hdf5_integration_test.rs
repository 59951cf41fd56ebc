//! Reading a small `banddos.hdf` written with the same layout Fleur uses

use std::path::Path;

use ndarray::{Array, Array2, Array3, arr1, arr2};
use tempfile::TempDir;

use fleurio::error::FleurError;
use fleurio::hdf5::{BandGroup, H5Value, Hdf5Reader, Recipe, RecipeEntry, Step, bands_recipe, recipe_by_name};

const NKPTS: usize = 3;
const NBANDS: usize = 2;
const FERMI: f64 = 0.25;
const HARTREE_IN_EV: f64 = 27.21138602;

fn eigenvalues() -> Array3<f64> {
    Array::from_shape_fn((2, NKPTS, NBANDS), |(spin, k, band)| {
        0.1 * (spin * 10 + k * 2 + band) as f64
    })
}

fn weight(offset: f64) -> Array3<f64> {
    Array::from_shape_fn((2, NKPTS, NBANDS), |(spin, k, band)| {
        offset + (spin + k + band) as f64
    })
}

fn dos(offset: f64) -> Array2<f64> {
    Array::from_shape_fn((2, 4), |(spin, e)| offset + (spin * 4 + e) as f64)
}

fn write_banddos(path: &Path) -> hdf5::Result<()> {
    let file = hdf5::File::create(path)?;

    let general = file.create_group("general")?;
    general
        .new_attr_builder()
        .with_data(&arr1(&[FERMI]))
        .create("lastFermiEnergy")?;
    general
        .new_attr_builder()
        .with_data(&arr1(&[2i32]))
        .create("spins")?;

    let cell = file.create_group("cell")?;
    let identity = arr2(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    cell.new_dataset_builder()
        .with_data(&identity)
        .create("reciprocalCell")?;
    cell.new_dataset_builder()
        .with_data(&(identity.clone() * 5.0))
        .create("bravaisMatrix")?;

    let atoms = file.create_group("atoms")?;
    atoms
        .new_dataset_builder()
        .with_data(&arr1(&[26i32, 78]))
        .create("atomicNumbers")?;
    atoms
        .new_dataset_builder()
        .with_data(&arr1(&[1i32, 2]))
        .create("equivAtomsGroup")?;
    atoms
        .new_dataset_builder()
        .with_data(&arr2(&[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]]))
        .create("positions")?;

    let kpts = file.create_group("kpts")?;
    kpts.new_dataset_builder()
        .with_data(&arr2(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0], [0.5, 0.5, 0.0]]))
        .create("coordinates")?;
    kpts.new_dataset_builder()
        .with_data(&arr1(&[1i32, 3]))
        .create("specialPointIndices")?;

    let local = file.create_group("Local")?;
    let bs = local.create_group("BS")?;
    bs.new_dataset_builder()
        .with_data(&eigenvalues())
        .create("eigenvalues")?;
    bs.new_dataset_builder().with_data(&weight(0.0)).create("MT:1s")?;
    bs.new_dataset_builder().with_data(&weight(0.5)).create("INT")?;

    let dos_group = local.create_group("DOS")?;
    dos_group
        .new_dataset_builder()
        .with_data(&arr1(&[-0.25, 0.0, 0.25, 0.5]))
        .create("energyGrid")?;
    dos_group.new_dataset_builder().with_data(&dos(0.0)).create("MT:1s")?;
    dos_group.new_dataset_builder().with_data(&dos(1.0)).create("MT:1p")?;
    dos_group.new_dataset_builder().with_data(&dos(2.0)).create("MT:2s")?;
    dos_group.new_dataset_builder().with_data(&dos(3.0)).create("Total")?;
    Ok(())
}

fn banddos() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("banddos.hdf");
    write_banddos(&path).unwrap();
    (temp_dir, path)
}

fn floats(value: &H5Value) -> Vec<f64> {
    match value {
        H5Value::Float(array) => array.iter().copied().collect(),
        H5Value::Int(array) => array.iter().map(|&v| v as f64).collect(),
        other => panic!("expected numbers, got {:?}", other),
    }
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{:?} vs {:?}", actual, expected);
    }
}

#[test]
fn test_bands_recipe() {
    let (_dir, path) = banddos();
    let reader = Hdf5Reader::open(&path).unwrap();
    let output = reader.read(&recipe_by_name("FleurBands").unwrap(), true).unwrap();

    let attributes = &output.attributes;
    assert_eq!(attributes["fermi_energy"].as_f64(), Some(FERMI));
    assert_eq!(attributes["spins"].as_i64(), Some(2));
    assert_eq!(attributes["nkpts"].as_i64(), Some(NKPTS as i64));
    assert_eq!(attributes["nbands"].as_i64(), Some(NBANDS as i64));
    assert_eq!(attributes["atoms_groups"], H5Value::Int(arr1(&[1i64, 2]).into_dyn()));
    assert_eq!(
        attributes["atoms_elements"],
        H5Value::Str(arr1(&["Fe".to_string(), "Pt".to_string()]).into_dyn())
    );
    assert_eq!(
        attributes["special_kpoint_indices"],
        H5Value::Int(arr1(&[1i64, 3]).into_dyn())
    );
    assert!(!attributes.contains_key("special_kpoint_labels"));
    assert_close(
        &floats(&attributes["atoms_position"])[3..],
        &[0.5 * 0.52917721067; 3],
    );

    let datasets = &output.datasets;
    let expected_up: Vec<f64> = eigenvalues()
        .index_axis(ndarray::Axis(0), 0)
        .iter()
        .map(|e| (e - FERMI) * HARTREE_IN_EV)
        .collect();
    assert_close(&floats(&datasets["eigenvalues_up"]), &expected_up);
    assert_eq!(floats(&datasets["eigenvalues_down"]).len(), NKPTS * NBANDS);

    assert_close(&floats(&datasets["kpath"]), &[0.0, 0.0, 0.5, 0.5, 1.0, 1.0]);

    for key in ["MT:1s_up", "MT:1s_down", "INT_up", "INT_down"] {
        assert_eq!(floats(&datasets[key]).len(), NKPTS * NBANDS, "{}", key);
    }
    assert!(!datasets.contains_key("eigenvalues"));
    assert!(datasets.values().all(|value| !value.is_handle()));
}

#[test]
fn test_reading_twice_gives_equal_results() {
    let (_dir, path) = banddos();
    let reader = Hdf5Reader::open(&path).unwrap();
    let recipe = recipe_by_name("FleurBands").unwrap();
    assert_eq!(reader.read(&recipe, true).unwrap(), reader.read(&recipe, true).unwrap());
}

#[test]
fn test_simple_bands_without_weights() {
    let (_dir, path) = banddos();
    let reader = Hdf5Reader::open(&path).unwrap();
    let output = reader
        .read(&bands_recipe(BandGroup::Local, true), true)
        .unwrap();

    let mut keys: Vec<&str> = output.datasets.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["eigenvalues_down", "eigenvalues_up", "kpath"]);
}

#[test]
fn test_dos_recipe_adds_partial_sums() {
    let (_dir, path) = banddos();
    let file = std::fs::File::open(&path).unwrap();
    let reader = Hdf5Reader::from_reader(file).unwrap();
    let output = reader.read(&recipe_by_name("FleurDOS").unwrap(), true).unwrap();

    assert_close(
        &floats(&output.datasets["energy_grid"]),
        &[-0.5 * HARTREE_IN_EV, -0.25 * HARTREE_IN_EV, 0.0, 0.25 * HARTREE_IN_EV],
    );

    let mt1_up = floats(&output.datasets["MT:1_up"]);
    let expected: Vec<f64> = (0..4)
        .map(|e| (2.0 * e as f64 + 1.0) / HARTREE_IN_EV)
        .collect();
    assert_close(&mt1_up, &expected);

    for key in ["MT:1s_up", "MT:1p_down", "MT:2_up", "MT:2s_down", "Total_up"] {
        assert!(output.datasets.contains_key(key), "{}", key);
    }
    assert!(!output.datasets.contains_key("energyGrid_up"));
}

#[test]
fn test_handles_without_moving_to_memory() {
    let (_dir, path) = banddos();
    let reader = Hdf5Reader::open(&path).unwrap();
    let recipe = Recipe::new("positions").dataset("positions", RecipeEntry::new("/atoms/positions"));
    let output = reader.read(&recipe, false).unwrap();
    assert!(output.datasets["positions"].is_handle());
    assert_eq!(output.datasets["positions"].shape(), Some(vec![2, 3]));
}

#[test]
fn test_missing_path_is_reported() {
    let (_dir, path) = banddos();
    let reader = Hdf5Reader::open(&path).unwrap();
    let recipe = Recipe::new("missing")
        .dataset("missing", RecipeEntry::new("/Local/BS/missing").step(Step::new("move_to_memory")));
    let error = reader.read(&recipe, true).unwrap_err();
    assert!(matches!(error, FleurError::MissingData { .. }));

    assert!(reader.read(&recipe_by_name("FleurOrbcompBands").unwrap(), true).is_err());
}
