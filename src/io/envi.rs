//! ENVI raster reading
//!
//! ENVI images come as a flat binary file plus a text `.hdr` companion:
//! - header: `key = value` records, multi-value fields in `{ ... }` blocks
//! - data: samples in band-sequential (BSQ), band-interleaved-by-line (BIL)
//!   or band-interleaved-by-pixel (BIP) order, either byte order
//!
//! All sample types are promoted to `f64` on read; cubes come back in
//! (band, y, x) order regardless of the file interleave.

use crate::types::{CalError, CalResult, SpectralCube};
use ndarray::Array3;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Sample type codes from the ENVI header `data type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnviDataType {
    U8,
    I16,
    I32,
    F32,
    F64,
    U16,
    U32,
}

impl EnviDataType {
    /// Map the numeric header code to a sample type
    pub fn from_code(code: u32) -> CalResult<Self> {
        match code {
            1 => Ok(EnviDataType::U8),
            2 => Ok(EnviDataType::I16),
            3 => Ok(EnviDataType::I32),
            4 => Ok(EnviDataType::F32),
            5 => Ok(EnviDataType::F64),
            12 => Ok(EnviDataType::U16),
            13 => Ok(EnviDataType::U32),
            other => Err(CalError::InvalidFormat(format!(
                "Unsupported ENVI data type code: {}",
                other
            ))),
        }
    }

    /// Bytes per sample
    pub fn size(&self) -> usize {
        match self {
            EnviDataType::U8 => 1,
            EnviDataType::I16 | EnviDataType::U16 => 2,
            EnviDataType::I32 | EnviDataType::U32 | EnviDataType::F32 => 4,
            EnviDataType::F64 => 8,
        }
    }
}

/// Band interleave order of the binary payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    Bsq,
    Bil,
    Bip,
}

impl std::str::FromStr for Interleave {
    type Err = CalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bsq" => Ok(Interleave::Bsq),
            "bil" => Ok(Interleave::Bil),
            "bip" => Ok(Interleave::Bip),
            other => Err(CalError::InvalidFormat(format!(
                "Unknown ENVI interleave: {}",
                other
            ))),
        }
    }
}

/// Parsed ENVI header
#[derive(Debug, Clone)]
pub struct EnviHeader {
    pub samples: usize,
    pub lines: usize,
    pub bands: usize,
    pub data_type: EnviDataType,
    pub interleave: Interleave,
    /// 0 = little endian, 1 = big endian
    pub big_endian: bool,
    pub header_offset: usize,
    pub description: Option<String>,
    /// Band-center wavelengths, when the header carries them
    pub wavelengths: Option<Vec<f64>>,
}

impl EnviHeader {
    /// Parse header text into key/value fields
    pub fn parse(text: &str) -> CalResult<Self> {
        let fields = parse_fields(text)?;

        let samples = required_usize(&fields, "samples")?;
        let lines = required_usize(&fields, "lines")?;
        let bands = required_usize(&fields, "bands")?;

        let type_code = required(&fields, "data type")?
            .trim()
            .parse::<u32>()
            .map_err(|e| {
                CalError::InvalidFormat(format!("Invalid ENVI data type field: {}", e))
            })?;
        let data_type = EnviDataType::from_code(type_code)?;

        let interleave = required(&fields, "interleave")?.parse::<Interleave>()?;

        let big_endian = match required(&fields, "byte order") {
            Ok(v) => v.trim() == "1",
            Err(_) => false,
        };

        let header_offset = fields
            .iter()
            .find(|(k, _)| k == "header offset")
            .map(|(_, v)| {
                v.trim().parse::<usize>().map_err(|e| {
                    CalError::InvalidFormat(format!("Invalid ENVI header offset: {}", e))
                })
            })
            .transpose()?
            .unwrap_or(0);

        let description = fields
            .iter()
            .find(|(k, _)| k == "description")
            .map(|(_, v)| v.trim().to_string());

        let wavelengths = fields
            .iter()
            .find(|(k, _)| k == "wavelength")
            .map(|(_, v)| {
                v.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| {
                        s.trim().parse::<f64>().map_err(|e| {
                            CalError::InvalidFormat(format!("Invalid wavelength entry: {}", e))
                        })
                    })
                    .collect::<CalResult<Vec<f64>>>()
            })
            .transpose()?;

        if let Some(wl) = &wavelengths {
            if wl.len() != bands {
                return Err(CalError::InvalidFormat(format!(
                    "Header has {} wavelengths for {} bands",
                    wl.len(),
                    bands
                )));
            }
        }

        if samples == 0 || lines == 0 || bands == 0 {
            return Err(CalError::InvalidFormat(
                "ENVI header reports an empty image".to_string(),
            ));
        }

        Ok(Self {
            samples,
            lines,
            bands,
            data_type,
            interleave,
            big_endian,
            header_offset,
            description,
            wavelengths,
        })
    }

    /// Total payload size in bytes
    pub fn payload_bytes(&self) -> CalResult<usize> {
        self.samples
            .checked_mul(self.lines)
            .and_then(|n| n.checked_mul(self.bands))
            .and_then(|n| n.checked_mul(self.data_type.size()))
            .ok_or_else(|| {
                CalError::InvalidFormat(format!(
                    "ENVI dimensions overflow: {} samples x {} lines x {} bands",
                    self.samples, self.lines, self.bands
                ))
            })
    }
}

fn required<'a>(fields: &'a [(String, String)], key: &str) -> CalResult<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| CalError::InvalidFormat(format!("ENVI header missing field: {}", key)))
}

fn required_usize(fields: &[(String, String)], key: &str) -> CalResult<usize> {
    required(fields, key)?
        .trim()
        .parse::<usize>()
        .map_err(|e| CalError::InvalidFormat(format!("Invalid ENVI {} field: {}", key, e)))
}

/// Split header text into (key, value) pairs, collapsing `{ ... }` blocks
fn parse_fields(text: &str) -> CalResult<Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut lines = text.lines();

    match lines.next() {
        Some(first) if first.trim() == "ENVI" => {}
        _ => {
            return Err(CalError::InvalidFormat(
                "Missing ENVI magic line in header".to_string(),
            ))
        }
    }

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let mut value = value.trim().to_string();

        // Multi-line { ... } blocks run until the closing brace
        if value.starts_with('{') && !value.ends_with('}') {
            for cont in lines.by_ref() {
                value.push(' ');
                value.push_str(cont.trim());
                if cont.trim().ends_with('}') {
                    break;
                }
            }
        }
        if value.starts_with('{') {
            if !value.ends_with('}') {
                return Err(CalError::InvalidFormat(format!(
                    "Unterminated {{ block for ENVI field: {}",
                    key
                )));
            }
            value = value[1..value.len() - 1].trim().to_string();
        }

        fields.push((key, value));
    }

    Ok(fields)
}

/// ENVI cube reader
pub struct EnviReader {
    data_path: PathBuf,
    header: EnviHeader,
}

impl EnviReader {
    /// Open an ENVI image given the path of its data file
    ///
    /// The header is looked up as `<path>.hdr` first, then with the data
    /// file's extension replaced by `.hdr`.
    pub fn open<P: AsRef<Path>>(path: P) -> CalResult<Self> {
        let data_path = path.as_ref().to_path_buf();
        if !data_path.exists() {
            return Err(CalError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", data_path.display()),
            )));
        }

        let header_path = find_header(&data_path)?;
        log::debug!("Reading ENVI header from {}", header_path.display());
        let text = std::fs::read_to_string(&header_path)?;
        let header = EnviHeader::parse(&text)?;

        Ok(Self { data_path, header })
    }

    pub fn header(&self) -> &EnviHeader {
        &self.header
    }

    /// Read the full cube, promoted to f64, in (band, y, x) order
    pub fn read_cube(&self) -> CalResult<SpectralCube> {
        let h = &self.header;
        log::info!(
            "Reading ENVI cube {} ({} bands x {} lines x {} samples, {:?}/{:?})",
            self.data_path.display(),
            h.bands,
            h.lines,
            h.samples,
            h.data_type,
            h.interleave
        );

        let file = File::open(&self.data_path)?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(h.header_offset as u64))?;

        let payload = h.payload_bytes()?;
        let mut raw = vec![0u8; payload];
        reader.read_exact(&mut raw).map_err(|e| {
            CalError::InvalidFormat(format!(
                "ENVI payload shorter than header promises ({} bytes expected): {}",
                payload, e
            ))
        })?;

        let values = decode_samples(&raw, h.data_type, h.big_endian);
        let (bands, lines, samples) = (h.bands, h.lines, h.samples);

        let cube = match h.interleave {
            // BSQ is already (band, y, x) in memory
            Interleave::Bsq => Array3::from_shape_vec((bands, lines, samples), values)?,
            Interleave::Bil => {
                let mut cube = Array3::zeros((bands, lines, samples));
                for y in 0..lines {
                    for b in 0..bands {
                        for x in 0..samples {
                            cube[[b, y, x]] = values[(y * bands + b) * samples + x];
                        }
                    }
                }
                cube
            }
            Interleave::Bip => {
                let mut cube = Array3::zeros((bands, lines, samples));
                for y in 0..lines {
                    for x in 0..samples {
                        for b in 0..bands {
                            cube[[b, y, x]] = values[(y * samples + x) * bands + b];
                        }
                    }
                }
                cube
            }
        };

        Ok(cube)
    }
}

/// Locate the `.hdr` companion of an ENVI data file
fn find_header(data_path: &Path) -> CalResult<PathBuf> {
    let mut appended = data_path.as_os_str().to_os_string();
    appended.push(".hdr");
    let appended = PathBuf::from(appended);
    if appended.exists() {
        return Ok(appended);
    }

    let replaced = data_path.with_extension("hdr");
    if replaced.exists() {
        return Ok(replaced);
    }

    Err(CalError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("No .hdr companion for {}", data_path.display()),
    )))
}

/// Decode raw sample bytes to f64
fn decode_samples(raw: &[u8], dtype: EnviDataType, big_endian: bool) -> Vec<f64> {
    macro_rules! decode {
        ($ty:ty, $width:expr) => {
            raw.chunks_exact($width)
                .map(|c| {
                    let mut arr = [0u8; $width];
                    arr.copy_from_slice(c);
                    let v = if big_endian {
                        <$ty>::from_be_bytes(arr)
                    } else {
                        <$ty>::from_le_bytes(arr)
                    };
                    v as f64
                })
                .collect()
        };
    }

    match dtype {
        EnviDataType::U8 => raw.iter().map(|&b| b as f64).collect(),
        EnviDataType::I16 => decode!(i16, 2),
        EnviDataType::U16 => decode!(u16, 2),
        EnviDataType::I32 => decode!(i32, 4),
        EnviDataType::U32 => decode!(u32, 4),
        EnviDataType::F32 => decode!(f32, 4),
        EnviDataType::F64 => decode!(f64, 8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "ENVI\n\
        description = {\n  Lab capture\n}\n\
        samples = 3\n\
        lines = 2\n\
        bands = 2\n\
        header offset = 0\n\
        data type = 12\n\
        interleave = bil\n\
        byte order = 0\n\
        wavelength = {\n 500.0, 600.0\n}\n";

    #[test]
    fn test_header_parsing() {
        let h = EnviHeader::parse(HEADER).unwrap();
        assert_eq!(h.samples, 3);
        assert_eq!(h.lines, 2);
        assert_eq!(h.bands, 2);
        assert_eq!(h.data_type, EnviDataType::U16);
        assert_eq!(h.interleave, Interleave::Bil);
        assert!(!h.big_endian);
        assert_eq!(h.wavelengths.as_deref(), Some(&[500.0, 600.0][..]));
        assert_eq!(h.description.as_deref(), Some("Lab capture"));
    }

    #[test]
    fn test_header_requires_magic() {
        assert!(EnviHeader::parse("samples = 3\n").is_err());
    }

    #[test]
    fn test_header_wavelength_count_mismatch() {
        let bad = HEADER.replace("bands = 2", "bands = 3");
        assert!(EnviHeader::parse(&bad).is_err());
    }

    #[test]
    fn test_read_bil_cube() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("frame_000.raw");
        std::fs::write(dir.path().join("frame_000.raw.hdr"), HEADER).unwrap();

        // BIL: line 0 band 0, line 0 band 1, line 1 band 0, line 1 band 1
        let samples: [u16; 12] = [0, 1, 2, 100, 101, 102, 3, 4, 5, 103, 104, 105];
        let mut f = File::create(&data_path).unwrap();
        for s in samples {
            f.write_all(&s.to_le_bytes()).unwrap();
        }
        drop(f);

        let reader = EnviReader::open(&data_path).unwrap();
        let cube = reader.read_cube().unwrap();
        assert_eq!(cube.dim(), (2, 2, 3));
        assert_eq!(cube[[0, 0, 0]], 0.0);
        assert_eq!(cube[[0, 1, 2]], 5.0);
        assert_eq!(cube[[1, 0, 0]], 100.0);
        assert_eq!(cube[[1, 1, 2]], 105.0);
    }

    #[test]
    fn test_read_bsq_big_endian() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("frame_001.raw");
        let header = HEADER
            .replace("interleave = bil", "interleave = bsq")
            .replace("byte order = 0", "byte order = 1");
        std::fs::write(dir.path().join("frame_001.raw.hdr"), header).unwrap();

        let samples: [u16; 12] = [0, 1, 2, 3, 4, 5, 100, 101, 102, 103, 104, 105];
        let mut f = File::create(&data_path).unwrap();
        for s in samples {
            f.write_all(&s.to_be_bytes()).unwrap();
        }
        drop(f);

        let cube = EnviReader::open(&data_path).unwrap().read_cube().unwrap();
        assert_eq!(cube[[0, 1, 0]], 3.0);
        assert_eq!(cube[[1, 0, 1]], 101.0);
    }

    #[test]
    fn test_read_bip_signed_samples() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("frame_002.raw");
        let header = HEADER
            .replace("interleave = bil", "interleave = bip")
            .replace("data type = 12", "data type = 2");
        std::fs::write(dir.path().join("frame_002.raw.hdr"), header).unwrap();

        // BIP: both bands of a pixel are adjacent; band 0 counts down from -1
        let samples: [i16; 12] = [-1, 100, -2, 101, -3, 102, -4, 103, -5, 104, -6, 105];
        let mut f = File::create(&data_path).unwrap();
        for s in samples {
            f.write_all(&s.to_le_bytes()).unwrap();
        }
        drop(f);

        let cube = EnviReader::open(&data_path).unwrap().read_cube().unwrap();
        assert_eq!(cube.dim(), (2, 2, 3));
        assert_eq!(cube[[0, 0, 0]], -1.0);
        assert_eq!(cube[[0, 1, 2]], -6.0);
        assert_eq!(cube[[1, 0, 0]], 100.0);
        assert_eq!(cube[[1, 1, 1]], 104.0);
    }

    #[test]
    fn test_read_f32_cube() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("frame_003.raw");
        let header = HEADER
            .replace("interleave = bil", "interleave = bsq")
            .replace("data type = 12", "data type = 4");
        std::fs::write(dir.path().join("frame_003.raw.hdr"), header).unwrap();

        let mut f = File::create(&data_path).unwrap();
        for i in 0..12 {
            f.write_all(&(i as f32 * 0.5).to_le_bytes()).unwrap();
        }
        drop(f);

        let cube = EnviReader::open(&data_path).unwrap().read_cube().unwrap();
        assert_eq!(cube[[0, 0, 1]], 0.5);
        assert_eq!(cube[[1, 1, 2]], 5.5);
    }

    #[test]
    fn test_huge_dimensions_rejected() {
        let header = format!(
            "ENVI\nsamples = {}\nlines = 4\nbands = 3\n\
             data type = 12\ninterleave = bil\nbyte order = 0\n",
            usize::MAX
        );
        let h = EnviHeader::parse(&header).unwrap();
        assert!(h.payload_bytes().is_err());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let data_path = dir.path().join("short.raw");
        std::fs::write(dir.path().join("short.raw.hdr"), HEADER).unwrap();
        std::fs::write(&data_path, [0u8; 4]).unwrap();

        let reader = EnviReader::open(&data_path).unwrap();
        assert!(reader.read_cube().is_err());
    }
}
