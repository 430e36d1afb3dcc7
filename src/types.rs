use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

/// Single spectrum sampled along the wavelength axis
pub type Spectrum = Array1<f64>;

/// 2D single-band image (y x x)
pub type BandImage = Array2<f64>;

/// 3D spectral cube for one acquisition frame (band x y x x)
pub type SpectralCube = Array3<f64>;

/// 4D stack of spectral cubes (frame x band x y x x)
pub type FrameStack = Array4<f64>;

/// Target material placed in front of the camera for a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Material {
    /// PTFE white reference panel
    White,
    /// Green color tile
    Green,
    /// Anything else recorded in the metadata table
    Other(String),
}

impl From<String> for Material {
    fn from(s: String) -> Self {
        match s.as_str() {
            "White" => Material::White,
            "Green" => Material::Green,
            _ => Material::Other(s),
        }
    }
}

impl From<Material> for String {
    fn from(m: Material) -> Self {
        format!("{}", m)
    }
}

impl std::fmt::Display for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Material::White => write!(f, "White"),
            Material::Green => write!(f, "Green"),
            Material::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Target distance from the camera in the distance-series captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    Near,
    Middle,
    Far,
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distance::Near => write!(f, "near"),
            Distance::Middle => write!(f, "middle"),
            Distance::Far => write!(f, "far"),
        }
    }
}

impl std::str::FromStr for Distance {
    type Err = CalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "near" => Ok(Distance::Near),
            "middle" => Ok(Distance::Middle),
            "far" => Ok(Distance::Far),
            other => Err(CalError::Metadata(format!(
                "Invalid distance label: {}",
                other
            ))),
        }
    }
}

/// Per-frame metadata joined from the measurement log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Source file stem the frame was read from
    pub name: String,
    /// Acquisition time
    pub time: DateTime<Utc>,
    /// Material in front of the camera, if recorded
    pub material: Option<Material>,
    /// Target distance, if this frame belongs to a distance series
    pub distance: Option<Distance>,
}

impl FrameMeta {
    /// Frame carrying only a name; time defaults to the Unix epoch
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            time: DateTime::<Utc>::UNIX_EPOCH,
            material: None,
            distance: None,
        }
    }

    /// True if this frame holds a white reference panel
    pub fn is_reference(&self) -> bool {
        self.material == Some(Material::White)
    }
}

/// Error types for calibration processing
#[derive(Debug, thiserror::Error)]
pub enum CalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Manifest error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for calibration operations
pub type CalResult<T> = Result<T, CalError>;
