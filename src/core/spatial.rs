//! Center cropping and spatial averaging
//!
//! Tile measurements use only the central patch of each frame, away from the
//! vignetted edges. The spatial-mean step crops the central n x n pixels,
//! records the crop as a mask, and collapses the spatial axes into per-band
//! mean and standard-deviation spectra.

use crate::io::dataset::{Dataset, Variable};
use crate::types::{CalError, CalResult};
use ndarray::{ArrayD, ArrayViewD, Axis, Slice};
use std::ops::Range;

/// Index range of a centered window of length `n` on an axis of length `len`
pub fn center_range(len: usize, n: usize) -> CalResult<Range<usize>> {
    if n == 0 {
        return Err(CalError::Processing("Crop size must be positive".to_string()));
    }
    if n > len {
        return Err(CalError::Processing(format!(
            "Crop size {} exceeds axis length {}",
            n, len
        )));
    }
    let start = (len - n) / 2;
    Ok(start..start + n)
}

/// Central n x n crop of a variable's `y`/`x` axes
pub fn crop_center<'a>(var: &'a Variable, n: usize) -> CalResult<ArrayViewD<'a, f64>> {
    let y_axis = var
        .axis_of("y")
        .ok_or_else(|| CalError::Processing("Variable has no y dimension".to_string()))?;
    let x_axis = var
        .axis_of("x")
        .ok_or_else(|| CalError::Processing("Variable has no x dimension".to_string()))?;

    let y_range = center_range(var.data.shape()[y_axis], n)?;
    let x_range = center_range(var.data.shape()[x_axis], n)?;

    Ok(var.data.slice_each_axis(|ax| {
        if ax.axis.index() == y_axis {
            Slice::from(y_range.clone())
        } else if ax.axis.index() == x_axis {
            Slice::from(x_range.clone())
        } else {
            Slice::from(..)
        }
    }))
}

/// Replace `var` with `mean_<var>` / `std_<var>` over the center crop
///
/// Also stores the crop footprint as a `cropped_area` mask on the spatial
/// grid (1.0 inside the crop, 0.0 outside). The standard deviation is the
/// population statistic.
pub fn spatial_mean(ds: &mut Dataset, var_name: &str, n: usize) -> CalResult<()> {
    let var = ds.get(var_name)?;
    let y_axis = var
        .axis_of("y")
        .ok_or_else(|| CalError::Processing("Variable has no y dimension".to_string()))?;
    let x_axis = var
        .axis_of("x")
        .ok_or_else(|| CalError::Processing("Variable has no x dimension".to_string()))?;
    let ny = var.data.shape()[y_axis];
    let nx = var.data.shape()[x_axis];

    log::info!(
        "Spatial mean of {} x {} center pixels of variable {}",
        n,
        n,
        var_name
    );

    let cropped = crop_center(var, n)?.to_owned();

    // Collapse the higher axis first so the lower index stays valid
    let (hi, lo) = if y_axis > x_axis {
        (y_axis, x_axis)
    } else {
        (x_axis, y_axis)
    };
    let reduce = |a: &ArrayD<f64>| -> CalResult<ArrayD<f64>> {
        let partial = a
            .mean_axis(Axis(hi))
            .ok_or_else(|| CalError::Processing("Empty crop".to_string()))?;
        partial
            .mean_axis(Axis(lo))
            .ok_or_else(|| CalError::Processing("Empty crop".to_string()))
    };

    let mean = reduce(&cropped)?;
    let mean_sq = reduce(&cropped.mapv(|v| v * v))?;
    let std = ndarray::Zip::from(&mean_sq)
        .and(&mean)
        .map_collect(|&sq, &m| (sq - m * m).max(0.0).sqrt());

    let out_dims: Vec<String> = var
        .dims
        .iter()
        .filter(|d| d.as_str() != "y" && d.as_str() != "x")
        .cloned()
        .collect();

    // Crop footprint on the original spatial grid
    let y_range = center_range(ny, n)?;
    let x_range = center_range(nx, n)?;
    let mut mask = ArrayD::zeros(ndarray::IxDyn(&[ny, nx]));
    for y in y_range {
        for x in x_range.clone() {
            mask[[y, x]] = 1.0;
        }
    }

    ds.remove(var_name);
    ds.insert("cropped_area", Variable::new(vec!["y", "x"], mask)?)?;
    ds.insert(
        &format!("mean_{}", var_name),
        Variable::new(out_dims.clone(), mean)?,
    )?;
    ds.insert(&format!("std_{}", var_name), Variable::new(out_dims, std)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameMeta;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array3};

    #[test]
    fn test_center_range() {
        assert_eq!(center_range(5, 3).unwrap(), 1..4);
        assert_eq!(center_range(6, 2).unwrap(), 2..4);
        assert_eq!(center_range(4, 4).unwrap(), 0..4);
        assert!(center_range(3, 4).is_err());
        assert!(center_range(3, 0).is_err());
    }

    #[test]
    fn test_crop_center_view() {
        let cube = Array3::from_shape_fn((1, 4, 4), |(_, y, x)| (y * 4 + x) as f64);
        let ds = Dataset::from_cubes(
            "dn",
            vec![cube],
            array![550.0],
            vec![FrameMeta::named("a")],
        )
        .unwrap();
        let cropped = crop_center(ds.get("dn").unwrap(), 2).unwrap();
        assert_eq!(cropped.shape(), &[1, 1, 2, 2]);
        assert_eq!(cropped[[0, 0, 0, 0]], 5.0);
        assert_eq!(cropped[[0, 0, 1, 1]], 10.0);
    }

    #[test]
    fn test_spatial_mean_and_std() {
        // Center 2x2 of the single band is [5, 6, 9, 10]
        let cube = Array3::from_shape_fn((1, 4, 4), |(_, y, x)| (y * 4 + x) as f64);
        let mut ds = Dataset::from_cubes(
            "reflectance",
            vec![cube],
            array![550.0],
            vec![FrameMeta::named("a")],
        )
        .unwrap();

        spatial_mean(&mut ds, "reflectance", 2).unwrap();
        assert!(ds.variables.get("reflectance").is_none());

        let mean = ds.get("mean_reflectance").unwrap();
        assert_eq!(mean.dims, vec!["time", "wavelength"]);
        assert_abs_diff_eq!(mean.data[[0, 0]], 7.5);

        let std = ds.get("std_reflectance").unwrap();
        // Population std of [5, 6, 9, 10]
        assert_abs_diff_eq!(std.data[[0, 0]], 2.0615528128088303, epsilon = 1e-12);

        let mask = ds.get("cropped_area").unwrap();
        assert_eq!(mask.dims, vec!["y", "x"]);
        assert_eq!(mask.data.sum(), 4.0);
        assert_eq!(mask.data[[1, 1]], 1.0);
        assert_eq!(mask.data[[0, 0]], 0.0);
    }
}
