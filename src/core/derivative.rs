//! Spectral finite-difference derivatives
//!
//! Derivatives along the wavelength coordinate, which may be unevenly
//! spaced. The interior uses the three-point centered stencil weighted for
//! uneven spacing; the boundary points use one-sided stencils whose accuracy
//! is selectable: first order (two-point) or second order (three-point).
//! The second derivative is the first-derivative operator applied twice.

use crate::types::{CalError, CalResult, Spectrum};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Which derivative to take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeOrder {
    First,
    Second,
}

/// Accuracy of the one-sided boundary stencils
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrder {
    One,
    Two,
}

impl Default for EdgeOrder {
    fn default() -> Self {
        EdgeOrder::Two
    }
}

/// Differentiate a spectrum along its coordinate
pub fn spectral_derivative(
    values: ArrayView1<f64>,
    coords: ArrayView1<f64>,
    order: DerivativeOrder,
    edge: EdgeOrder,
) -> CalResult<Spectrum> {
    validate(values, coords, edge)?;
    match order {
        DerivativeOrder::First => Ok(gradient(values, coords, edge)),
        DerivativeOrder::Second => {
            let first = gradient(values, coords, edge);
            Ok(gradient(first.view(), coords, edge))
        }
    }
}

/// Differentiate each row of a (sample, band) array along the band axis
pub fn derivative_along_bands(
    spectra: ArrayView2<f64>,
    coords: ArrayView1<f64>,
    order: DerivativeOrder,
    edge: EdgeOrder,
) -> CalResult<Array2<f64>> {
    if spectra.len_of(Axis(1)) != coords.len() {
        return Err(CalError::Processing(format!(
            "{} bands but {} coordinate points",
            spectra.len_of(Axis(1)),
            coords.len()
        )));
    }
    let mut out = Array2::zeros(spectra.raw_dim());
    for (row, mut slot) in spectra.outer_iter().zip(out.outer_iter_mut()) {
        slot.assign(&spectral_derivative(row, coords, order, edge)?);
    }
    Ok(out)
}

fn validate(
    values: ArrayView1<f64>,
    coords: ArrayView1<f64>,
    edge: EdgeOrder,
) -> CalResult<()> {
    if values.len() != coords.len() {
        return Err(CalError::Processing(format!(
            "{} values but {} coordinate points",
            values.len(),
            coords.len()
        )));
    }
    let min_len = match edge {
        EdgeOrder::One => 2,
        EdgeOrder::Two => 3,
    };
    if values.len() < min_len {
        return Err(CalError::Processing(format!(
            "Need at least {} points for edge order {:?}",
            min_len, edge
        )));
    }
    for w in coords.windows(2) {
        let h = w[1] - w[0];
        if !h.is_finite() || h <= 0.0 {
            return Err(CalError::Processing(
                "Coordinate must be finite and strictly increasing".to_string(),
            ));
        }
    }
    Ok(())
}

/// First derivative on a possibly uneven grid
fn gradient(f: ArrayView1<f64>, x: ArrayView1<f64>, edge: EdgeOrder) -> Spectrum {
    let n = f.len();
    let mut df = Spectrum::zeros(n);

    for i in 1..n - 1 {
        let hs = x[i] - x[i - 1];
        let hd = x[i + 1] - x[i];
        df[i] = (hs * hs * f[i + 1] + (hd * hd - hs * hs) * f[i] - hd * hd * f[i - 1])
            / (hs * hd * (hd + hs));
    }

    match edge {
        EdgeOrder::One => {
            df[0] = (f[1] - f[0]) / (x[1] - x[0]);
            df[n - 1] = (f[n - 1] - f[n - 2]) / (x[n - 1] - x[n - 2]);
        }
        EdgeOrder::Two => {
            let h0 = x[1] - x[0];
            let h1 = x[2] - x[1];
            df[0] = -(2.0 * h0 + h1) / (h0 * (h0 + h1)) * f[0]
                + (h0 + h1) / (h0 * h1) * f[1]
                - h0 / (h1 * (h0 + h1)) * f[2];

            let hp = x[n - 2] - x[n - 3];
            let hs = x[n - 1] - x[n - 2];
            df[n - 1] = hs / (hp * (hp + hs)) * f[n - 3]
                - (hp + hs) / (hp * hs) * f[n - 2]
                + (hp + 2.0 * hs) / (hs * (hp + hs)) * f[n - 1];
        }
    }

    df
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_linear_is_exact_everywhere() {
        let x = array![400.0, 410.0, 425.0, 445.0, 470.0];
        let f = x.mapv(|v| 3.0 * v - 7.0);
        for edge in [EdgeOrder::One, EdgeOrder::Two] {
            let df =
                spectral_derivative(f.view(), x.view(), DerivativeOrder::First, edge).unwrap();
            for &v in df.iter() {
                assert_abs_diff_eq!(v, 3.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_quadratic_exact_with_second_order_edges() {
        // Uneven grid; the centered stencil and the three-point edges are
        // both exact for quadratics
        let x = array![0.0, 1.0, 2.5, 4.0, 6.0];
        let f = x.mapv(|v| v * v);
        let df = spectral_derivative(f.view(), x.view(), DerivativeOrder::First, EdgeOrder::Two)
            .unwrap();
        for (i, &v) in df.iter().enumerate() {
            assert_abs_diff_eq!(v, 2.0 * x[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_first_order_edges_match_one_sided_difference() {
        let x = array![0.0, 1.0, 3.0];
        let f = array![0.0, 2.0, 10.0];
        let df = spectral_derivative(f.view(), x.view(), DerivativeOrder::First, EdgeOrder::One)
            .unwrap();
        assert_abs_diff_eq!(df[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(df[2], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_second_derivative_of_quadratic() {
        let x = Array1::linspace(400.0, 700.0, 31);
        let f = x.mapv(|v| 0.5 * v * v);
        let ddf =
            spectral_derivative(f.view(), x.view(), DerivativeOrder::Second, EdgeOrder::Two)
                .unwrap();
        for &v in ddf.iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_rejects_bad_coordinates() {
        let x = array![0.0, 0.0, 1.0];
        let f = array![1.0, 2.0, 3.0];
        assert!(
            spectral_derivative(f.view(), x.view(), DerivativeOrder::First, EdgeOrder::One)
                .is_err()
        );
        let short = array![1.0, 2.0];
        let xs = array![0.0, 1.0];
        assert!(spectral_derivative(
            short.view(),
            xs.view(),
            DerivativeOrder::First,
            EdgeOrder::Two
        )
        .is_err());
    }

    #[test]
    fn test_row_wise_application() {
        let x = array![0.0, 1.0, 2.0, 3.0];
        let spectra = ndarray::stack![
            Axis(0),
            x.mapv(|v| 2.0 * v),
            x.mapv(|v| -1.0 * v)
        ];
        let df = derivative_along_bands(
            spectra.view(),
            x.view(),
            DerivativeOrder::First,
            EdgeOrder::Two,
        )
        .unwrap();
        assert_abs_diff_eq!(df[[0, 2]], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(df[[1, 0]], -1.0, epsilon = 1e-12);
    }
}
