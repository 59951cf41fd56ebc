//! # fleurio
//!
//! Schema-aware access to the versioned XML input and output files of the Fleur DFT code,
//! and recipe-driven reading of its HDF5 result files.
//!
//! Names of tags and attributes are resolved to XPaths through a [`SchemaDict`] built from
//! the XML schema of each file version, so callers rarely need to know where in the
//! document a value lives.

pub mod case_insensitive;
pub mod cli;
pub mod config;
pub mod constants;
pub mod context;
pub mod conversion;
pub mod converters;
pub mod error;
pub mod error_reporter;
pub mod expression;
pub mod hdf5;
pub mod libxml2;
pub mod loader;
pub mod logger;
pub mod output;
pub mod query;
pub mod schema_dict;
pub mod setters;
pub mod xpath_builder;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigManager};
pub use context::FleurXmlContext;
pub use conversion::{ConversionDescription, ConversionReport, convert_inpxml};
pub use converters::Value;
pub use error::{FleurError, Result};
pub use hdf5::{H5Value, Hdf5Reader, Recipe, RecipeEntry, RecipeOutput, Step};
pub use libxml2::{ParseOptions, ValidationResult, XmlDocument, XmlSchemaPtr};
pub use loader::{LoadedInput, LoadedOutput, XmlSource, load_inpxml, load_outxml};
pub use logger::Logger;
pub use output::Output;
pub use query::EvalOptions;
pub use schema_dict::{
    InputSchemaDict, OutputSchemaDict, SchemaCache, SchemaDict, SchemaDictionary, SchemaVersion,
};
pub use setters::SetOptions;
pub use xpath_builder::XPathBuilder;
