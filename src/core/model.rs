//! Spectrophotometric correction model
//!
//! The correction equation relates the reported reflectance R (in percent)
//! and its first and second spectral derivatives to the difference from the
//! assigned reflectance:
//!
//! ```text
//! dR = c1 + c2*R + c3*R' + c4*R'' + c5*(100 - R)*R
//! ```
//!
//! from "Spectrophotometry: Accurate Measurement of Optical Properties of
//! Materials", vol. 46, p. 394. Fitting stacks every band of every measured
//! spectrum into one linear system and solves it by SVD least squares.

use crate::core::derivative::{
    derivative_along_bands, spectral_derivative, DerivativeOrder, EdgeOrder,
};
use crate::types::{CalError, CalResult, Spectrum};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

const N_PARAMS: usize = 5;
const SVD_EPSILON: f64 = 1e-12;

/// The five model parameters c1..c5
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelCoefficients {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub c4: f64,
    pub c5: f64,
}

impl ModelCoefficients {
    /// Evaluate the correction for one band given precomputed derivatives
    pub fn delta_r(&self, r: f64, dr: f64, ddr: f64) -> f64 {
        self.c1 + self.c2 * r + self.c3 * dr + self.c4 * ddr + self.c5 * (100.0 - r) * r
    }
}

/// Evaluate the correction over a spectrum with precomputed derivatives
pub fn delta_r_spectrum(
    r: ArrayView1<f64>,
    dr: ArrayView1<f64>,
    ddr: ArrayView1<f64>,
    coeffs: &ModelCoefficients,
) -> Spectrum {
    Array1::from_shape_fn(r.len(), |i| coeffs.delta_r(r[i], dr[i], ddr[i]))
}

/// Evaluate the correction, differentiating against the wavelength coordinate
pub fn evaluate(
    r: ArrayView1<f64>,
    wavelengths: ArrayView1<f64>,
    coeffs: &ModelCoefficients,
    edge: EdgeOrder,
) -> CalResult<Spectrum> {
    let dr = spectral_derivative(r, wavelengths, DerivativeOrder::First, edge)?;
    let ddr = spectral_derivative(r, wavelengths, DerivativeOrder::Second, edge)?;
    Ok(delta_r_spectrum(r, dr.view(), ddr.view(), coeffs))
}

/// Result of a least-squares fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFit {
    pub coefficients: ModelCoefficients,
    /// Root-mean-square residual of the fit
    pub rmse: f64,
    /// Number of (spectrum, band) samples that entered the fit
    pub n_samples: usize,
}

/// Fit c1..c5 to paired measured/assigned reflectance spectra
///
/// `measured` and `assigned` are (spectrum, band) arrays on the same
/// wavelength grid; the target is `assigned - measured` per band. Bands with
/// non-finite values in either input are dropped.
pub fn fit(
    measured: ArrayView2<f64>,
    assigned: ArrayView2<f64>,
    wavelengths: ArrayView1<f64>,
    edge: EdgeOrder,
) -> CalResult<ModelFit> {
    if measured.dim() != assigned.dim() {
        return Err(CalError::Processing(format!(
            "Measured shape {:?} does not match assigned shape {:?}",
            measured.dim(),
            assigned.dim()
        )));
    }

    let dr = derivative_along_bands(measured, wavelengths, DerivativeOrder::First, edge)?;
    let ddr = derivative_along_bands(measured, wavelengths, DerivativeOrder::Second, edge)?;

    let mut rows: Vec<[f64; N_PARAMS]> = Vec::new();
    let mut targets: Vec<f64> = Vec::new();
    for ((s, b), &r) in measured.indexed_iter() {
        let target = assigned[[s, b]] - r;
        let row = [1.0, r, dr[[s, b]], ddr[[s, b]], (100.0 - r) * r];
        if target.is_finite() && row.iter().all(|v| v.is_finite()) {
            rows.push(row);
            targets.push(target);
        }
    }

    let n = rows.len();
    if n < N_PARAMS {
        return Err(CalError::Processing(format!(
            "Only {} usable samples for a {}-parameter fit",
            n, N_PARAMS
        )));
    }
    log::info!(
        "Fitting correction model to {} samples from {} spectra",
        n,
        measured.nrows()
    );

    let design = DMatrix::from_fn(n, N_PARAMS, |i, j| rows[i][j]);
    let b = DVector::from_vec(targets);

    let svd = design.clone().svd(true, true);
    let solution = svd
        .solve(&b, SVD_EPSILON)
        .map_err(|e| CalError::Processing(format!("SVD solve failed: {}", e)))?;

    let residual = &design * &solution - &b;
    let rmse = (residual.norm_squared() / n as f64).sqrt();

    let coefficients = ModelCoefficients {
        c1: solution[0],
        c2: solution[1],
        c3: solution[2],
        c4: solution[3],
        c5: solution[4],
    };
    log::info!("Fit complete: {:?} (rmse {:.4e})", coefficients, rmse);

    Ok(ModelFit {
        coefficients,
        rmse,
        n_samples: n,
    })
}
