//! Combined dataset storage
//!
//! A dataset holds the coordinates shared by all pipeline stages (wavelength,
//! per-frame metadata, reference times once reflectance is computed) plus a
//! set of named variables. On disk it is a directory:
//!
//! - `manifest.json` — coordinates, frame metadata, variable dims and shapes
//! - `<variable>.bin` — one flat little-endian f64 payload per variable
//!
//! Dimension names follow the lab convention: `time` (frame), `reference`,
//! `wavelength`, `y`, `x`.

use crate::types::{CalError, CalResult, FrameMeta, SpectralCube};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Array4, ArrayD, Axis, Ix2, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const FORMAT_VERSION: u32 = 1;
const MANIFEST_NAME: &str = "manifest.json";

/// Named data variable with its dimension labels
#[derive(Debug, Clone)]
pub struct Variable {
    pub dims: Vec<String>,
    pub data: ArrayD<f64>,
}

impl Variable {
    pub fn new<S: Into<String>>(dims: Vec<S>, data: ArrayD<f64>) -> CalResult<Self> {
        let dims: Vec<String> = dims.into_iter().map(|d| d.into()).collect();
        if dims.len() != data.ndim() {
            return Err(CalError::Processing(format!(
                "Variable has {} dims for a {}-d array",
                dims.len(),
                data.ndim()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Position of a dimension by name
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// The variable as a `(time, wavelength)` table
    ///
    /// Axes other than `time` and `wavelength` are squeezed away when they
    /// have length 1, so a spatial mean taken against a single white
    /// reference still reads as a table.
    pub fn spectra(&self) -> CalResult<Array2<f64>> {
        let mut data = self.data.clone();
        let mut dims = self.dims.clone();
        let mut axis = 0;
        while axis < dims.len() {
            if dims[axis] != "time" && dims[axis] != "wavelength" && data.shape()[axis] == 1 {
                data = data.index_axis_move(Axis(axis), 0);
                dims.remove(axis);
            } else {
                axis += 1;
            }
        }
        if dims != ["time", "wavelength"] {
            return Err(CalError::Processing(format!(
                "Variable is not a (time, wavelength) table (dims {:?})",
                dims
            )));
        }
        Ok(data.into_dimensionality::<Ix2>()?)
    }
}

/// In-memory dataset: coordinates plus named variables
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Band-center wavelengths (the `wavelength` coordinate)
    pub wavelengths: Array1<f64>,
    /// Per-frame metadata (the `time` coordinate and its attributes)
    pub frames: Vec<FrameMeta>,
    /// Reference acquisition times (the `reference` coordinate)
    pub references: Vec<DateTime<Utc>>,
    pub variables: BTreeMap<String, Variable>,
}

impl Dataset {
    pub fn new(wavelengths: Array1<f64>, frames: Vec<FrameMeta>) -> Self {
        Self {
            wavelengths,
            frames,
            references: Vec::new(),
            variables: BTreeMap::new(),
        }
    }

    /// Build a dataset from per-frame cubes under one `(time, wavelength, y, x)` variable
    pub fn from_cubes(
        name: &str,
        cubes: Vec<SpectralCube>,
        wavelengths: Array1<f64>,
        frames: Vec<FrameMeta>,
    ) -> CalResult<Self> {
        if cubes.is_empty() {
            return Err(CalError::Processing("No input cubes".to_string()));
        }
        if cubes.len() != frames.len() {
            return Err(CalError::Processing(format!(
                "{} cubes for {} frames",
                cubes.len(),
                frames.len()
            )));
        }
        let (bands, ny, nx) = cubes[0].dim();
        if wavelengths.len() != bands {
            return Err(CalError::Processing(format!(
                "{} wavelengths for {} bands",
                wavelengths.len(),
                bands
            )));
        }

        let mut stack = Array4::zeros((cubes.len(), bands, ny, nx));
        for (i, cube) in cubes.iter().enumerate() {
            if cube.dim() != (bands, ny, nx) {
                return Err(CalError::Processing(format!(
                    "Frame {} has shape {:?}, expected {:?}",
                    frames[i].name,
                    cube.dim(),
                    (bands, ny, nx)
                )));
            }
            stack.index_axis_mut(Axis(0), i).assign(cube);
        }

        let mut ds = Dataset::new(wavelengths, frames);
        ds.insert(
            name,
            Variable::new(vec!["time", "wavelength", "y", "x"], stack.into_dyn())?,
        )?;
        Ok(ds)
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Insert a variable, validating coordinate-backed dimension lengths
    pub fn insert(&mut self, name: &str, var: Variable) -> CalResult<()> {
        for (axis, dim) in var.dims.iter().enumerate() {
            let len = var.data.shape()[axis];
            let expected = match dim.as_str() {
                "time" => Some(self.frames.len()),
                "wavelength" => Some(self.wavelengths.len()),
                "reference" => Some(self.references.len()),
                _ => None,
            };
            if let Some(expected) = expected {
                if len != expected {
                    return Err(CalError::Processing(format!(
                        "Variable {} dim {} has length {}, coordinate has {}",
                        name, dim, len, expected
                    )));
                }
            }
        }
        self.variables.insert(name.to_string(), var);
        Ok(())
    }

    pub fn get(&self, name: &str) -> CalResult<&Variable> {
        self.variables.get(name).ok_or_else(|| {
            CalError::Processing(format!(
                "Dataset has no variable {} (has: {:?})",
                name,
                self.variables.keys().collect::<Vec<_>>()
            ))
        })
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.variables.remove(name)
    }

    /// Subset the `time` dimension to the given frame indices, in order
    pub fn select_frames(&self, indices: &[usize]) -> CalResult<Dataset> {
        for &i in indices {
            if i >= self.frames.len() {
                return Err(CalError::Processing(format!(
                    "Frame index {} out of range ({} frames)",
                    i,
                    self.frames.len()
                )));
            }
        }

        let frames = indices.iter().map(|&i| self.frames[i].clone()).collect();
        let mut out = Dataset::new(self.wavelengths.clone(), frames);
        out.references = self.references.clone();

        for (name, var) in &self.variables {
            let selected = match var.axis_of("time") {
                Some(axis) => var.data.select(Axis(axis), indices),
                None => var.data.clone(),
            };
            out.insert(name, Variable::new(var.dims.clone(), selected)?)?;
        }
        Ok(out)
    }

    /// Write the dataset directory
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> CalResult<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        log::info!(
            "Saving dataset to {} ({} frames, {} variables)",
            dir.display(),
            self.frames.len(),
            self.variables.len()
        );

        let mut entries = BTreeMap::new();
        for (name, var) in &self.variables {
            let file = format!("{}.bin", name);
            write_binary(&dir.join(&file), &var.data)?;
            entries.insert(
                name.clone(),
                VariableEntry {
                    dims: var.dims.clone(),
                    shape: var.data.shape().to_vec(),
                    file,
                },
            );
        }

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            wavelengths: self.wavelengths.to_vec(),
            frames: self.frames.clone(),
            references: self.references.clone(),
            variables: entries,
        };
        let f = File::create(dir.join(MANIFEST_NAME))?;
        serde_json::to_writer_pretty(BufWriter::new(f), &manifest)?;
        Ok(())
    }

    /// Read a dataset directory
    pub fn load<P: AsRef<Path>>(dir: P) -> CalResult<Dataset> {
        let dir = dir.as_ref();
        let f = File::open(dir.join(MANIFEST_NAME)).map_err(|e| {
            CalError::Io(std::io::Error::new(
                e.kind(),
                format!("No dataset manifest in {}: {}", dir.display(), e),
            ))
        })?;
        let manifest: Manifest = serde_json::from_reader(BufReader::new(f))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(CalError::InvalidFormat(format!(
                "Unsupported dataset format version: {}",
                manifest.format_version
            )));
        }

        let mut ds = Dataset::new(Array1::from(manifest.wavelengths), manifest.frames);
        ds.references = manifest.references;
        for (name, entry) in manifest.variables {
            let data = read_binary(&dir.join(&entry.file), &entry.shape)?;
            ds.insert(&name, Variable::new(entry.dims, data)?)?;
        }
        log::info!(
            "Loaded dataset from {} ({} frames, variables {:?})",
            dir.display(),
            ds.frames.len(),
            ds.variables.keys().collect::<Vec<_>>()
        );
        Ok(ds)
    }
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    wavelengths: Vec<f64>,
    frames: Vec<FrameMeta>,
    references: Vec<DateTime<Utc>>,
    variables: BTreeMap<String, VariableEntry>,
}

#[derive(Serialize, Deserialize)]
struct VariableEntry {
    dims: Vec<String>,
    shape: Vec<usize>,
    file: String,
}

fn write_binary(path: &Path, data: &ArrayD<f64>) -> CalResult<()> {
    let f = File::create(path)?;
    let mut w = BufWriter::new(f);
    // Row-major regardless of the in-memory layout
    for &v in data.as_standard_layout().iter() {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

fn read_binary(path: &Path, shape: &[usize]) -> CalResult<ArrayD<f64>> {
    let n: usize = shape.iter().product();
    let mut raw = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut raw)?;
    if raw.len() != n * 8 {
        return Err(CalError::InvalidFormat(format!(
            "{}: {} bytes for shape {:?} ({} expected)",
            path.display(),
            raw.len(),
            shape,
            n * 8
        )));
    }
    let values: Vec<f64> = raw
        .chunks_exact(8)
        .map(|c| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(c);
            f64::from_le_bytes(buf)
        })
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(shape), values)?)
}
