//! Core calibration processing modules

pub mod derivative;
pub mod model;
pub mod radiometry;
pub mod reflectance;
pub mod selection;
pub mod spatial;

// Re-export main types
pub use derivative::{derivative_along_bands, spectral_derivative, DerivativeOrder, EdgeOrder};
pub use model::{delta_r_spectrum, evaluate, fit, ModelCoefficients, ModelFit};
pub use radiometry::{DarkCorrection, DarkMethod};
pub use reflectance::{compute_reflectance, reference_indices};
pub use selection::{gather_distance_set, DistanceSeries};
pub use spatial::{center_range, crop_center, spatial_mean};
