//! Measurement-log CSV parsing
//!
//! The lab log is a small CSV table indexed by the `filename` column; the
//! remaining columns (acquisition `time`, `material`, `distance`) are joined
//! onto the frames of a collected dataset.

use crate::types::{CalError, CalResult, Distance, FrameMeta, Material};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use std::path::Path;

/// One parsed row of the measurement log
#[derive(Debug, Clone, Default)]
pub struct MetadataRow {
    pub time: Option<DateTime<Utc>>,
    pub material: Option<Material>,
    pub distance: Option<Distance>,
}

/// Measurement log indexed by filename
#[derive(Debug, Clone)]
pub struct MetadataTable {
    rows: HashMap<String, MetadataRow>,
    /// Column names other than `filename`, in file order
    pub columns: Vec<String>,
}

impl MetadataTable {
    /// Read a measurement-log CSV file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CalResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let table = Self::parse(&text)?;
        log::info!(
            "Read measurement log {} ({} rows, columns {:?})",
            path.as_ref().display(),
            table.rows.len(),
            table.columns
        );
        Ok(table)
    }

    /// Parse CSV text with a header line containing a `filename` column
    pub fn parse(text: &str) -> CalResult<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| CalError::Metadata("Empty metadata table".to_string()))?;
        let names: Vec<String> = header.split(',').map(|s| s.trim().to_string()).collect();

        let filename_col = names
            .iter()
            .position(|n| n == "filename")
            .ok_or_else(|| CalError::Metadata("No filename column in metadata".to_string()))?;

        let mut rows = HashMap::new();
        for (lineno, line) in lines.enumerate() {
            let cells: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
            if cells.len() != names.len() {
                return Err(CalError::Metadata(format!(
                    "Row {} has {} cells, header has {}",
                    lineno + 2,
                    cells.len(),
                    names.len()
                )));
            }

            let mut row = MetadataRow::default();
            for (name, cell) in names.iter().zip(&cells) {
                if cell.is_empty() {
                    continue;
                }
                match name.as_str() {
                    "filename" => {}
                    "time" => row.time = Some(parse_time(cell)?),
                    "material" => row.material = Some(Material::from(cell.to_string())),
                    "distance" => row.distance = Some(cell.parse::<Distance>()?),
                    _ => {}
                }
            }
            rows.insert(cells[filename_col].to_string(), row);
        }

        let columns = names
            .iter()
            .filter(|n| n.as_str() != "filename")
            .cloned()
            .collect();

        Ok(Self { rows, columns })
    }

    /// Look up a row by the filename it was logged under
    ///
    /// Falls back to matching on the file stem, since logs sometimes record
    /// the data file and sometimes its header.
    pub fn get(&self, filename: &str) -> Option<&MetadataRow> {
        if let Some(row) = self.rows.get(filename) {
            return Some(row);
        }
        let stem = Path::new(filename).file_stem()?.to_str()?;
        self.rows
            .iter()
            .find(|(k, _)| {
                Path::new(k.as_str())
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s == stem)
                    .unwrap_or(false)
            })
            .map(|(_, v)| v)
    }

    /// Join the logged columns onto a frame's metadata
    pub fn apply(&self, filename: &str, meta: &mut FrameMeta) {
        let Some(row) = self.get(filename) else {
            log::warn!("No metadata row for {}", filename);
            return;
        };
        if let Some(t) = row.time {
            meta.time = t;
        }
        if let Some(m) = &row.material {
            meta.material = Some(m.clone());
        }
        if let Some(d) = row.distance {
            meta.distance = Some(d);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parse an acquisition timestamp (RFC 3339, or a bare naive datetime)
fn parse_time(s: &str) -> CalResult<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(t.and_utc());
        }
    }
    Err(CalError::Metadata(format!("Unparseable time: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "filename,time,material,distance\n\
        frame_000.raw,2021-03-01T10:00:00,White,\n\
        frame_001.raw,2021-03-01T10:05:00,Green,near\n";

    #[test]
    fn test_parse_and_lookup() {
        let table = MetadataTable::parse(LOG).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns, vec!["time", "material", "distance"]);

        let row = table.get("frame_000.raw").unwrap();
        assert_eq!(row.material, Some(Material::White));
        assert!(row.distance.is_none());

        // Stem fallback
        let row = table.get("frame_001").unwrap();
        assert_eq!(row.distance, Some(Distance::Near));
    }

    #[test]
    fn test_apply_to_frame() {
        let table = MetadataTable::parse(LOG).unwrap();
        let mut meta = FrameMeta::named("frame_001");
        table.apply("frame_001.raw", &mut meta);
        assert_eq!(meta.material, Some(Material::Green));
        assert_eq!(meta.time.to_rfc3339(), "2021-03-01T10:05:00+00:00");
    }

    #[test]
    fn test_ragged_row_rejected() {
        let bad = "filename,time\nframe_000.raw,2021-03-01T10:00:00,extra\n";
        assert!(MetadataTable::parse(bad).is_err());
    }

    #[test]
    fn test_missing_filename_column() {
        assert!(MetadataTable::parse("time,material\n1,2\n").is_err());
    }
}
