//! Distance-series selection
//!
//! One capture session photographs the green tiles and the PTFE panels at
//! several distances. This step pulls those frames out of a combined dataset
//! and attaches the distance coordinate to each.

use crate::io::dataset::Dataset;
use crate::types::{CalResult, CalError, Distance};

/// Which frames form the distance series, and their distance labels
///
/// The labels run over the green-tile frames first, then the PTFE frames,
/// in the order given.
#[derive(Debug, Clone)]
pub struct DistanceSeries {
    /// Frame indices of the green tiles
    pub green: Vec<usize>,
    /// Frame indices of the PTFE panels
    pub ptfe: Vec<usize>,
    pub distances: Vec<Distance>,
}

impl Default for DistanceSeries {
    /// The session layout of the original capture campaign
    fn default() -> Self {
        Self {
            green: vec![12, 17, 21],
            ptfe: vec![19, 18, 20],
            distances: vec![
                Distance::Near,
                Distance::Middle,
                Distance::Far,
                Distance::Middle,
                Distance::Near,
                Distance::Far,
            ],
        }
    }
}

/// Subset the dataset to the distance-series frames with labels attached
pub fn gather_distance_set(ds: &Dataset, series: &DistanceSeries) -> CalResult<Dataset> {
    let indices: Vec<usize> = series
        .green
        .iter()
        .chain(series.ptfe.iter())
        .copied()
        .collect();
    if indices.len() != series.distances.len() {
        return Err(CalError::Processing(format!(
            "{} frames selected but {} distance labels",
            indices.len(),
            series.distances.len()
        )));
    }

    log::info!(
        "Gathering distance series: green {:?}, PTFE {:?}",
        series.green,
        series.ptfe
    );
    let mut subset = ds.select_frames(&indices)?;
    for (frame, &d) in subset.frames.iter_mut().zip(&series.distances) {
        frame.distance = Some(d);
    }
    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameMeta;
    use ndarray::{array, Array3};

    fn dataset(n: usize) -> Dataset {
        let cubes = (0..n)
            .map(|i| Array3::from_elem((1, 1, 1), i as f64))
            .collect();
        let frames = (0..n).map(|i| FrameMeta::named(&format!("f{}", i))).collect();
        Dataset::from_cubes("dn", cubes, array![550.0], frames).unwrap()
    }

    #[test]
    fn test_gather_assigns_distances() {
        let ds = dataset(6);
        let series = DistanceSeries {
            green: vec![0, 2],
            ptfe: vec![4, 5],
            distances: vec![
                Distance::Near,
                Distance::Far,
                Distance::Near,
                Distance::Far,
            ],
        };
        let sub = gather_distance_set(&ds, &series).unwrap();
        assert_eq!(sub.n_frames(), 4);
        assert_eq!(sub.frames[0].name, "f0");
        assert_eq!(sub.frames[1].distance, Some(Distance::Far));
        assert_eq!(sub.frames[2].name, "f4");
        assert_eq!(sub.get("dn").unwrap().data[[1, 0, 0, 0]], 2.0);
    }

    #[test]
    fn test_label_count_mismatch() {
        let ds = dataset(6);
        let series = DistanceSeries {
            green: vec![0],
            ptfe: vec![1],
            distances: vec![Distance::Near],
        };
        assert!(gather_distance_set(&ds, &series).is_err());
    }

    #[test]
    fn test_default_layout_needs_enough_frames() {
        let ds = dataset(6);
        assert!(gather_distance_set(&ds, &DistanceSeries::default()).is_err());
    }
}
