//! Reflectance computation
//!
//! Reflectance is the ratio of a frame's dark-corrected counts to the
//! dark-corrected counts of a white (PTFE) reference frame taken in the same
//! session. Every white frame in the dataset serves as a reference, so the
//! output gains a `reference` dimension keyed by the reference acquisition
//! times. Zero counts in the reference produce non-finite ratios, which are
//! kept as-is for downstream masking.

use crate::io::dataset::{Dataset, Variable};
use crate::types::{CalError, CalResult};
use ndarray::{ArrayD, Axis, Ix3, Ix4, IxDyn, Zip};

/// Indices of the frames holding white reference panels
pub fn reference_indices(ds: &Dataset) -> Vec<usize> {
    ds.frames
        .iter()
        .enumerate()
        .filter(|(_, f)| f.is_reference())
        .map(|(i, _)| i)
        .collect()
}

/// Replace `input` with a `(reference, time, wavelength, y, x)` reflectance variable
pub fn compute_reflectance(ds: &mut Dataset, input: &str, output: &str) -> CalResult<()> {
    let refs = reference_indices(ds);
    if refs.is_empty() {
        return Err(CalError::Processing(
            "No white reference frames in dataset".to_string(),
        ));
    }
    log::info!(
        "Computing reflectance against {} reference frames: {:?}",
        refs.len(),
        refs.iter().map(|&i| ds.frames[i].time).collect::<Vec<_>>()
    );

    let var = ds.get(input)?;
    let dims = var.dims.clone();
    let stack = var
        .data
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| {
            CalError::Processing(format!(
                "Variable {} is not a (time, wavelength, y, x) stack",
                input
            ))
        })?;
    let (nf, nb, ny, nx) = stack.dim();

    let mut out = ArrayD::zeros(IxDyn(&[refs.len(), nf, nb, ny, nx]));
    for (ri, &r) in refs.iter().enumerate() {
        log::debug!("Reference {} ({})", r, ds.frames[r].time);
        let reference = stack.index_axis(Axis(0), r);
        for f in 0..nf {
            let frame = stack.index_axis(Axis(0), f);
            let mut ref_slot = out.index_axis_mut(Axis(0), ri);
            let slot = ref_slot.index_axis_mut(Axis(0), f);
            let mut slot = slot.into_dimensionality::<Ix3>()?;
            Zip::from(&mut slot)
                .and(&frame)
                .and(&reference)
                .for_each(|o, &v, &rv| *o = v / rv);
        }
    }

    ds.references = refs.iter().map(|&i| ds.frames[i].time).collect();
    ds.remove(input);

    let mut out_dims = vec!["reference".to_string()];
    out_dims.extend(dims);
    ds.insert(output, Variable::new(out_dims, out)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FrameMeta, Material};
    use ndarray::{array, Array3};

    fn dataset_with_reference() -> Dataset {
        let white = Array3::from_elem((1, 2, 2), 50.0);
        let tile = Array3::from_elem((1, 2, 2), 25.0);
        let mut frames = vec![FrameMeta::named("white"), FrameMeta::named("tile")];
        frames[0].material = Some(Material::White);
        frames[1].material = Some(Material::Green);
        Dataset::from_cubes("dark_corrected_dn", vec![white, tile], array![550.0], frames)
            .unwrap()
    }

    #[test]
    fn test_reference_selection() {
        let ds = dataset_with_reference();
        assert_eq!(reference_indices(&ds), vec![0]);
    }

    #[test]
    fn test_reflectance_ratio() {
        let mut ds = dataset_with_reference();
        compute_reflectance(&mut ds, "dark_corrected_dn", "reflectance").unwrap();

        assert!(ds.variables.get("dark_corrected_dn").is_none());
        assert_eq!(ds.references.len(), 1);

        let var = ds.get("reflectance").unwrap();
        assert_eq!(
            var.dims,
            vec!["reference", "time", "wavelength", "y", "x"]
        );
        // White frame against itself is 1, the tile is half as bright
        assert_eq!(var.data[[0, 0, 0, 0, 0]], 1.0);
        assert_eq!(var.data[[0, 1, 0, 1, 1]], 0.5);
    }

    #[test]
    fn test_zero_reference_preserved_as_nonfinite() {
        let mut ds = dataset_with_reference();
        {
            let var = ds.variables.get_mut("dark_corrected_dn").unwrap();
            var.data[[0, 0, 0, 0]] = 0.0;
        }
        compute_reflectance(&mut ds, "dark_corrected_dn", "reflectance").unwrap();
        let var = ds.get("reflectance").unwrap();
        assert!(!var.data[[0, 1, 0, 0, 0]].is_finite());
    }

    #[test]
    fn test_no_reference_is_an_error() {
        let white = Array3::from_elem((1, 2, 2), 50.0);
        let mut ds = Dataset::from_cubes(
            "dark_corrected_dn",
            vec![white],
            array![550.0],
            vec![FrameMeta::named("tile")],
        )
        .unwrap();
        assert!(compute_reflectance(&mut ds, "dark_corrected_dn", "reflectance").is_err());
    }
}
