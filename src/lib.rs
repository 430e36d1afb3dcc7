//! hypercal: A Modular Hyperspectral Lab Radiometric Calibration Toolkit
//!
//! Processes laboratory captures of color tiles and PTFE reference panels:
//! collects ENVI cubes into combined datasets, subtracts dark current,
//! computes reflectance against white references, averages regions of
//! interest, and fits the five-parameter spectrophotometric correction model.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BandImage, CalError, CalResult, Distance, FrameMeta, FrameStack, Material, SpectralCube,
    Spectrum,
};

pub use crate::io::{Dataset, EnviReader, MetadataTable, Variable};

pub use crate::core::{
    compute_reflectance, fit, gather_distance_set, spatial_mean, spectral_derivative,
    DarkCorrection, DarkMethod, DerivativeOrder, DistanceSeries, EdgeOrder, ModelCoefficients,
    ModelFit,
};
