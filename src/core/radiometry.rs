//! Dark-current correction
//!
//! Raw digital numbers carry a sensor dark-current baseline. The correction
//! subtracts a dark capture element-wise and clips at zero, so counts below
//! the dark level come out as 0 rather than negative.

use crate::io::dataset::{Dataset, Variable};
use crate::types::{CalError, CalResult, FrameStack, SpectralCube};
#[cfg(feature = "parallel")]
use ndarray::parallel::prelude::*;
use ndarray::{Array4, Axis, Ix4, Zip};

/// How the dark baseline is formed from the dark capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DarkMethod {
    /// Subtract the dark capture pixel by pixel
    PerPixel,
    /// Average the dark capture over the y axis and subtract the
    /// resulting (band, x) profile from every row
    RowMean,
}

impl Default for DarkMethod {
    fn default() -> Self {
        DarkMethod::PerPixel
    }
}

/// Dark-current correction processor
pub struct DarkCorrection {
    dark: SpectralCube,
    method: DarkMethod,
}

impl DarkCorrection {
    /// Per-pixel correction from a dark capture
    pub fn new(dark: SpectralCube) -> Self {
        Self {
            dark,
            method: DarkMethod::default(),
        }
    }

    pub fn with_method(dark: SpectralCube, method: DarkMethod) -> Self {
        Self { dark, method }
    }

    /// Correct a single frame cube
    pub fn apply(&self, cube: &SpectralCube) -> CalResult<SpectralCube> {
        if cube.dim() != self.dark.dim() {
            return Err(CalError::Processing(format!(
                "Frame shape {:?} does not match dark shape {:?}",
                cube.dim(),
                self.dark.dim()
            )));
        }

        let corrected = match self.method {
            DarkMethod::PerPixel => Zip::from(cube)
                .and(&self.dark)
                .map_collect(|&dn, &dark| subclip(dn, dark)),
            DarkMethod::RowMean => {
                // (band, x) profile broadcast back over rows
                let profile = self.dark.mean_axis(Axis(1)).ok_or_else(|| {
                    CalError::Processing("Dark capture has no rows to average".to_string())
                })?;
                let profile = profile.insert_axis(Axis(1));
                let profile = profile.broadcast(cube.dim()).ok_or_else(|| {
                    CalError::Processing("Dark profile does not broadcast".to_string())
                })?;
                Zip::from(cube)
                    .and(profile)
                    .map_collect(|&dn, &dark| subclip(dn, dark))
            }
        };

        Ok(corrected)
    }

    /// Correct every frame of a stack in parallel
    pub fn apply_stack(&self, stack: &FrameStack) -> CalResult<FrameStack> {
        log::info!(
            "Subtracting dark ({:?}) from {} frames",
            self.method,
            stack.len_of(Axis(0))
        );

        #[cfg(feature = "parallel")]
        let corrected: CalResult<Vec<SpectralCube>> = stack
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|frame| self.apply(&frame.to_owned()))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let corrected: CalResult<Vec<SpectralCube>> = stack
            .axis_iter(Axis(0))
            .map(|frame| self.apply(&frame.to_owned()))
            .collect();
        let corrected = corrected?;

        let mut out = Array4::zeros(stack.raw_dim());
        for (i, cube) in corrected.iter().enumerate() {
            out.index_axis_mut(Axis(0), i).assign(cube);
        }
        Ok(out)
    }

    /// Replace a dataset's `input` variable with its dark-corrected `output`
    pub fn apply_to_dataset(
        &self,
        ds: &mut Dataset,
        input: &str,
        output: &str,
    ) -> CalResult<()> {
        let var = ds.get(input)?;
        let dims = var.dims.clone();
        let stack = var.data.view().into_dimensionality::<Ix4>().map_err(|_| {
            CalError::Processing(format!(
                "Variable {} is not a (time, wavelength, y, x) stack",
                input
            ))
        })?;

        let corrected = self.apply_stack(&stack.to_owned())?;
        ds.remove(input);
        ds.insert(output, Variable::new(dims, corrected.into_dyn())?)?;
        Ok(())
    }
}

/// Clipped subtraction: counts at or below the dark level become zero
fn subclip(dn: f64, dark: f64) -> f64 {
    if dn > dark {
        dn - dark
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameMeta;
    use ndarray::{array, Array3};

    #[test]
    fn test_subtract_clips_at_zero() {
        let cube = Array3::from_shape_vec((1, 2, 2), vec![10.0, 5.0, 3.0, 0.0]).unwrap();
        let dark = Array3::from_elem((1, 2, 2), 4.0);
        let out = DarkCorrection::new(dark).apply(&cube).unwrap();
        assert_eq!(out, Array3::from_shape_vec((1, 2, 2), vec![6.0, 1.0, 0.0, 0.0]).unwrap());
    }

    #[test]
    fn test_row_mean_profile() {
        // Dark rows 2 and 4 average to 3 everywhere
        let dark = Array3::from_shape_vec((1, 2, 2), vec![2.0, 2.0, 4.0, 4.0]).unwrap();
        let cube = Array3::from_elem((1, 2, 2), 10.0);
        let out = DarkCorrection::with_method(dark, DarkMethod::RowMean)
            .apply(&cube)
            .unwrap();
        assert_eq!(out, Array3::from_elem((1, 2, 2), 7.0));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dark = Array3::zeros((1, 2, 2));
        let cube = Array3::zeros((1, 3, 2));
        assert!(DarkCorrection::new(dark).apply(&cube).is_err());
    }

    #[test]
    fn test_dataset_variable_swap() {
        let cube = Array3::from_elem((1, 2, 2), 9.0);
        let mut ds = Dataset::from_cubes(
            "dn",
            vec![cube.clone(), cube],
            array![550.0],
            vec![FrameMeta::named("a"), FrameMeta::named("b")],
        )
        .unwrap();

        let dark = Array3::from_elem((1, 2, 2), 4.0);
        DarkCorrection::new(dark)
            .apply_to_dataset(&mut ds, "dn", "dark_corrected_dn")
            .unwrap();

        assert!(ds.variables.get("dn").is_none());
        let var = ds.get("dark_corrected_dn").unwrap();
        assert_eq!(var.data[[0, 0, 0, 0]], 5.0);
        assert_eq!(var.dims, vec!["time", "wavelength", "y", "x"]);
    }
}
