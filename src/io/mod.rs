//! I/O modules for reading ENVI captures, measurement logs, and datasets

pub mod dataset;
pub mod envi;
pub mod metadata;

pub use dataset::{Dataset, Variable};
pub use envi::{EnviHeader, EnviReader};
pub use metadata::MetadataTable;
