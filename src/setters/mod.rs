//! Modification of Fleur XML documents.
//!
//! Three layers build on each other:
//!
//! - [`basic`]: operations on explicit XPaths that only need to know the tag order
//! - [`xpaths`]: type aware setters on explicit XPaths
//! - [`names`]: setters addressed by tag or attribute name, resolved with the schema
//!   dictionary
//!
//! [`fleur`] adds helpers specific to Fleur input files on top of the name-based layer.

pub mod basic;
pub mod dispatch;
pub mod fleur;
pub mod names;
pub mod xpaths;

pub use basic::{NewElement, Occurrences, TargetPath};
pub use fleur::{AtomGroupSelection, KPointList};
pub use names::SetOptions;
pub use xpaths::{AddMode, WriteOptions};
