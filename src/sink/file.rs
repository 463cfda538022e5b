use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::LoadError;
use crate::sink::table::DataTable;
use crate::sink::TableSink;

/// Byte order mark written ahead of the CSV payload so spreadsheet tools
/// detect the encoding (utf-8-sig).
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Delimited-file sink: one CSV file per destination, full overwrite.
///
/// Writing the same table twice produces a byte-identical file; there is
/// no append mode at the file level.
pub struct CsvSink {
    out_dir: PathBuf,
}

impl CsvSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// File path a destination stem resolves to.
    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.out_dir.join(format!("{destination}.csv"))
    }

    fn write_table(&self, table: &DataTable, path: &Path) -> Result<(), LoadError> {
        fs::create_dir_all(&self.out_dir)?;

        let mut file = File::create(path)?;
        file.write_all(UTF8_BOM)?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row.iter().map(|cell| cell.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl TableSink for CsvSink {
    async fn write(&self, table: &DataTable, destination: &str) -> Result<(), LoadError> {
        self.write_table(table, &self.path_for(destination))
    }

    fn kind(&self) -> &'static str {
        "csv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::reshape::PriceRecord;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table() -> DataTable {
        DataTable::from_prices(&[
            PriceRecord {
                date: date(2024, 1, 1),
                symbol: "AAA".to_string(),
                close: 10.5,
            },
            PriceRecord {
                date: date(2024, 1, 2),
                symbol: "BBB".to_string(),
                close: 20.25,
            },
        ])
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let table = sample_table();

        sink.write(&table, "prices").await.unwrap();
        let first = fs::read(sink.path_for("prices")).unwrap();

        sink.write(&table, "prices").await.unwrap();
        let second = fs::read(sink.path_for("prices")).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_write_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());

        sink.write(&sample_table(), "prices").await.unwrap();
        let big = fs::read(sink.path_for("prices")).unwrap();

        let small = DataTable::from_prices(&[PriceRecord {
            date: date(2024, 1, 1),
            symbol: "AAA".to_string(),
            close: 10.5,
        }]);
        sink.write(&small, "prices").await.unwrap();
        let rewritten = fs::read(sink.path_for("prices")).unwrap();

        assert!(rewritten.len() < big.len());
    }

    #[tokio::test]
    async fn test_file_starts_with_bom_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());

        sink.write(&sample_table(), "prices").await.unwrap();
        let bytes = fs::read(sink.path_for("prices")).unwrap();

        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert!(text.starts_with("Date,Symbol,Close\n"));
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let table = sample_table();

        sink.write(&table, "prices").await.unwrap();

        let bytes = fs::read(sink.path_for("prices")).unwrap();
        let mut reader = csv::Reader::from_reader(&bytes[UTF8_BOM.len()..]);

        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(String::from)
            .collect();
        assert_eq!(headers, table.columns);

        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        assert_eq!(rows.len(), table.rows.len());
        for (parsed, original) in rows.iter().zip(&table.rows) {
            let formatted: Vec<String> = original.iter().map(|c| c.to_string()).collect();
            assert_eq!(parsed, &formatted);
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("nested").join("out"));

        sink.write(&sample_table(), "prices").await.unwrap();
        assert!(sink.path_for("prices").exists());
    }
}
