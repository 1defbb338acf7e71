//! JSON output for detection and pair records.
//!
//! The training collaborator reads these files directly, so the layout is the
//! plain serde rendering of [`DetectionRecord`] with no envelope.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use super::model::DetectionRecord;
use crate::error::PrepError;

/// Reads a list of detection records from a JSON file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_records_json(path: &Path) -> Result<Vec<DetectionRecord>, PrepError> {
    let file = File::open(path).map_err(PrepError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| PrepError::RecordsParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes any serializable value as pretty JSON.
///
/// # Arguments
/// * `path` - Path to the output file
/// * `value` - Records (or any run output) to write
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PrepError> {
    let file = File::create(path).map_err(PrepError::Io)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| {
        PrepError::OutputWrite {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Reads detection records from a JSON string.
pub fn from_json_str(json: &str) -> Result<Vec<DetectionRecord>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Writes detection records to a JSON string.
pub fn to_json_string(records: &[DetectionRecord]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest_bytes;
    use crate::ir::{BBox, CategoryId, DetectionObject, Padding, Point, Polygon, TileDescriptor};
    use std::path::PathBuf;

    fn sample_record() -> DetectionRecord {
        let polygon = Polygon::new(vec![
            Point::new(1.0, 1.0),
            Point::new(4.0, 1.0),
            Point::new(4.0, 3.0),
        ]);
        DetectionRecord {
            file_name: PathBuf::from("cache/abc.raster"),
            height: 600,
            width: 1024,
            image_id: "trap01.2020-06-01".into(),
            digest: digest_bytes(b"raster"),
            original_source: PathBuf::from("data/trap01.2020-06-01.svg"),
            annotations: vec![DetectionObject::new(
                BBox::new(1.0, 1.0, 3.0, 2.0),
                &polygon,
                CategoryId(0),
            )],
            tile: Some(TileDescriptor {
                origin_x: 512,
                origin_y: 0,
                crop_width: 512,
                crop_height: 512,
                padding: Padding {
                    top: 212,
                    bottom: 212,
                    left: 0,
                    right: 0,
                },
            }),
        }
    }

    #[test]
    fn test_json_format() {
        let json = to_json_string(&[sample_record()]).expect("serialize");
        assert!(json.contains("\"file_name\": \"cache/abc.raster\""));
        assert!(json.contains("\"bbox_mode\": \"XYWH_ABS\""));
        assert!(json.contains("\"origin_x\": 512"));

        let parsed = from_json_str(&json).expect("parse");
        assert_eq!(parsed, vec![sample_record()]);
    }

    #[test]
    fn untiled_records_omit_tile_field() {
        let mut record = sample_record();
        record.tile = None;
        let json = to_json_string(&[record]).expect("serialize");
        assert!(!json.contains("\"tile\""));
    }

    #[test]
    fn write_then_read_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("records.json");
        write_json(&path, &[sample_record()]).expect("write");
        let back = read_records_json(&path).expect("read");
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].image_id, "trap01.2020-06-01");
    }

    #[test]
    fn garbage_is_records_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_records_json(&path),
            Err(PrepError::RecordsParse { .. })
        ));
    }
}
