//! Recipes for the `banddos.hdf` files written by Fleur.

use std::fmt;
use std::str::FromStr;

use super::reader::{Recipe, RecipeEntry, Step};
use crate::constants::{BOHR_IN_ANGSTROM, HARTREE_IN_EV};
use crate::error::FleurError;

/// Top-level group holding a band structure or DOS calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandGroup {
    Local,
    Orbcomp,
    JDos,
    Mcd,
}

impl BandGroup {
    pub fn h5_name(self) -> &'static str {
        match self {
            BandGroup::Local => "Local",
            BandGroup::Orbcomp => "Orbcomp",
            BandGroup::JDos => "jDOS",
            BandGroup::Mcd => "MCD",
        }
    }
}

impl fmt::Display for BandGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.h5_name())
    }
}

impl FromStr for BandGroup {
    type Err = FleurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BandGroup::Local),
            "orbcomp" => Ok(BandGroup::Orbcomp),
            "jdos" => Ok(BandGroup::JDos),
            "mcd" => Ok(BandGroup::Mcd),
            _ => Err(FleurError::invalid(format!("unknown HDF5 group '{}'", s))),
        }
    }
}

/// Names accepted by [`recipe_by_name`]
pub const RECIPE_NAMES: [&str; 9] = [
    "FleurBands",
    "FleurSimpleBands",
    "FleurOrbcompBands",
    "FleurjDOSBands",
    "FleurMCDBands",
    "FleurDOS",
    "FleurORBCOMP",
    "FleurJDOS",
    "FleurMCD",
];

pub fn recipe_by_name(name: &str) -> Option<Recipe> {
    let recipe = match name {
        "FleurBands" => bands_recipe(BandGroup::Local, false),
        "FleurSimpleBands" => bands_recipe(BandGroup::Local, true),
        "FleurOrbcompBands" => bands_recipe(BandGroup::Orbcomp, false),
        "FleurjDOSBands" => bands_recipe(BandGroup::JDos, false),
        "FleurMCDBands" => bands_recipe(BandGroup::Mcd, false),
        "FleurDOS" => dos_recipe(BandGroup::Local),
        "FleurORBCOMP" => dos_recipe(BandGroup::Orbcomp),
        "FleurJDOS" => dos_recipe(BandGroup::JDos),
        "FleurMCD" => dos_recipe(BandGroup::Mcd),
        _ => return None,
    };
    Some(Recipe {
        name: name.to_string(),
        ..recipe
    })
}

fn fermi_energy() -> RecipeEntry {
    RecipeEntry::new("/general")
        .step(Step::new("get_attribute").arg("lastFermiEnergy"))
        .step(Step::new("get_first_element"))
        .description("Fermi energy of the last iteration in Hartree")
}

fn spins() -> RecipeEntry {
    RecipeEntry::new("/general")
        .step(Step::new("get_attribute").arg("spins"))
        .step(Step::new("get_first_element"))
}

fn shape_entry(h5path: &str, axis: i64) -> RecipeEntry {
    RecipeEntry::new(h5path)
        .step(Step::new("get_shape"))
        .step(Step::new("index_dataset").arg(axis))
}

fn structure_attributes(recipe: Recipe) -> Recipe {
    recipe
        .attribute(
            "bravais_matrix",
            RecipeEntry::new("/cell/bravaisMatrix")
                .step(Step::new("multiply_scalar").arg(BOHR_IN_ANGSTROM))
                .description("Lattice vectors in Angstrom, one per row"),
        )
        .attribute(
            "atoms_elements",
            RecipeEntry::new("/atoms/atomicNumbers").step(Step::new("periodic_elements")),
        )
        .attribute(
            "atoms_groups",
            RecipeEntry::new("/atoms/equivAtomsGroup").step(Step::new("move_to_memory")),
        )
        .attribute(
            "atoms_position",
            RecipeEntry::new("/atoms/positions")
                .step(Step::new("multiply_scalar").arg(BOHR_IN_ANGSTROM)),
        )
}

/// Eigenvalues relative to the Fermi energy in eV, the k-point path and, unless `simple`,
/// the band weights of `group`
///
/// Every dataset is flattened to `nkpts * nbands` entries per spin.
pub fn bands_recipe(group: BandGroup, simple: bool) -> Recipe {
    let bs = format!("/{}/BS", group.h5_name());
    let eigenvalues = format!("{}/eigenvalues", bs);

    let mut recipe = Recipe::new(format!("{}Bands", group))
        .dataset(
            "eigenvalues",
            RecipeEntry::new(&eigenvalues)
                .step(Step::with_attribute("shift_by_attribute", "fermi_energy").kwarg("negative", true))
                .step(Step::new("multiply_scalar").arg(HARTREE_IN_EV))
                .step(
                    Step::new("split_array")
                        .kwarg("suffixes", ["up", "down"].as_slice())
                        .kwarg("name", "eigenvalues"),
                )
                .step(Step::new("flatten_array"))
                .unpack_dict(),
        )
        .dataset(
            "kpath",
            RecipeEntry::new("/kpts/coordinates")
                .step(
                    Step::with_attribute("multiply_by_attribute", "reciprocal_cell")
                        .kwarg("transpose", true),
                )
                .step(Step::new("calculate_norm").kwarg("between_neighbours", true))
                .step(Step::new("cumulative_sum").kwarg("beginning_zero", true))
                .step(Step::with_attribute("repeat_array_by_attribute", "nbands")),
        );
    if !simple {
        recipe = recipe.dataset(
            "weights",
            RecipeEntry::new(&bs)
                .step(Step::new("get_all_child_datasets").kwarg("ignore", "eigenvalues"))
                .step(Step::new("split_array").kwarg("suffixes", ["up", "down"].as_slice()))
                .step(Step::new("flatten_array"))
                .unpack_dict(),
        );
    }

    let recipe = recipe
        .attribute("fermi_energy", fermi_energy())
        .attribute("spins", spins())
        .attribute("nkpts", shape_entry(&eigenvalues, 1))
        .attribute("nbands", shape_entry(&eigenvalues, 2))
        .attribute(
            "reciprocal_cell",
            RecipeEntry::new("/cell/reciprocalCell").step(Step::new("move_to_memory")),
        )
        .attribute(
            "special_kpoint_indices",
            RecipeEntry::new("/kpts/specialPointIndices")
                .step(Step::new("move_to_memory"))
                .description("1-based indices into the k-point list")
                .optional(),
        )
        .attribute(
            "special_kpoint_labels",
            RecipeEntry::new("/kpts/specialPointLabels")
                .step(Step::new("convert_to_str"))
                .optional(),
        );
    structure_attributes(recipe)
}

/// Energy grid relative to the Fermi energy in eV and the DOS per state and eV, with
/// partial sums per atom type
pub fn dos_recipe(group: BandGroup) -> Recipe {
    let dos = format!("/{}/DOS", group.h5_name());
    let recipe = Recipe::new(format!("{}DOS", group))
        .dataset(
            "energy_grid",
            RecipeEntry::new(format!("{}/energyGrid", dos))
                .step(Step::with_attribute("shift_by_attribute", "fermi_energy").kwarg("negative", true))
                .step(Step::new("multiply_scalar").arg(HARTREE_IN_EV)),
        )
        .dataset(
            "dos",
            RecipeEntry::new(&dos)
                .step(Step::new("get_all_child_datasets").kwarg("ignore", "energyGrid"))
                .step(
                    Step::with_attribute("add_partial_sums", "atoms_groups")
                        .arg("MT:{}")
                        .kwarg("make_set", true),
                )
                .step(Step::new("multiply_scalar").arg(1.0 / HARTREE_IN_EV))
                .step(Step::new("split_array").kwarg("suffixes", ["up", "down"].as_slice()))
                .unpack_dict(),
        )
        .attribute("fermi_energy", fermi_energy())
        .attribute("spins", spins());
    structure_attributes(recipe)
}
