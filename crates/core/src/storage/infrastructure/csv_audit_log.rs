use std::fs::{File, OpenOptions};
use std::path::Path;

use crate::storage::domain::audit_log::{AuditLog, AuditRow};

const HEADER: [&str; 6] = ["image_path", "x", "y", "width", "height", "group"];

/// [`AuditLog`] appending to a CSV file.
///
/// The header is written once, when the file is empty. Each row is flushed
/// before `record` returns so the log survives an interrupted run.
pub struct CsvAuditLog {
    writer: csv::Writer<File>,
}

impl CsvAuditLog {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }
}

impl AuditLog for CsvAuditLog {
    fn record(&mut self, row: &AuditRow) -> Result<(), Box<dyn std::error::Error>> {
        let path = row.image_path.to_string_lossy();
        let geometry = match row.bbox {
            Some(b) => [b.x, b.y, b.width, b.height].map(|v| v.to_string()),
            None => Default::default(),
        };
        let fields: [&str; 6] = [
            &path,
            &geometry[0],
            &geometry[1],
            &geometry[2],
            &geometry[3],
            &row.group,
        ];
        self.writer.write_record(fields)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn face_row(path: &str, group: &str) -> AuditRow {
        AuditRow {
            image_path: PathBuf::from(path),
            bbox: Some(BoundingBox::new(10, 20, 30, 40)),
            group: group.to_string(),
        }
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_writes_header_then_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("face_clusters.csv");

        let mut log = CsvAuditLog::open(&path).unwrap();
        log.record(&face_row("in/a.jpg", "0")).unwrap();
        log.record(&AuditRow {
            image_path: PathBuf::from("in/blank.jpg"),
            bbox: None,
            group: "others".to_string(),
        })
        .unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows[0], HEADER.map(String::from).to_vec());
        assert_eq!(rows[1], vec!["in/a.jpg", "10", "20", "30", "40", "0"]);
        assert_eq!(rows[2], vec!["in/blank.jpg", "", "", "", "", "others"]);
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("face_clusters.csv");

        CsvAuditLog::open(&path)
            .unwrap()
            .record(&face_row("a.jpg", "0"))
            .unwrap();
        CsvAuditLog::open(&path)
            .unwrap()
            .record(&face_row("b.jpg", "1"))
            .unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2][0], "b.jpg");
    }

    #[test]
    fn test_paths_with_commas_are_quoted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("audit.csv");

        let mut log = CsvAuditLog::open(&path).unwrap();
        log.record(&face_row("trip, day 1/a.jpg", "face_0")).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows[1][0], "trip, day 1/a.jpg");
        assert_eq!(rows[1][5], "face_0");
    }
}
