//! Reading Fleur HDF5 result files through recipes.
//!
//! A [`Recipe`] lists the paths to read and the pipeline of named transformations applied
//! to each. Entries in the `attributes` section are computed first; dataset pipelines can
//! refer to them with [`Step::with_attribute`].
//!
//! ```no_run
//! use fleurio::hdf5::{Hdf5Reader, recipe_by_name};
//!
//! let reader = Hdf5Reader::open("banddos.hdf".as_ref())?;
//! let recipe = recipe_by_name("FleurBands").expect("shipped recipe");
//! let output = reader.read(&recipe, true)?;
//! println!("{:?}", output.attributes["fermi_energy"]);
//! # Ok::<(), fleurio::FleurError>(())
//! ```

pub mod reader;
pub mod recipes;
pub mod transforms;
pub mod value;

pub use reader::{Arg, Hdf5Reader, Lambda, Recipe, RecipeEntry, RecipeOutput, Step, Transformation};
pub use recipes::{BandGroup, RECIPE_NAMES, bands_recipe, dos_recipe, recipe_by_name};
pub use transforms::{TransformRegistry, element_symbol};
pub use value::{H5Value, read_container};
