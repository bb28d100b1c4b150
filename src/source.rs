// 📥 Record Sources - where a build reads its raw price records from
//
// Every source returns normalized (trimmed) records. Rows that cannot become a
// record are skipped and counted in the batch; a source that cannot be read at
// all fails the whole build with SourceUnavailable.

use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::db;
use crate::error::{BuildError, Result};
use crate::record::{PriceRecord, RecordBatch};

pub trait RecordSource {
    /// Short description used in errors and logs
    fn name(&self) -> String;

    fn read_records(&self) -> Result<RecordBatch>;
}

/// Records already in memory
impl RecordSource for Vec<PriceRecord> {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn read_records(&self) -> Result<RecordBatch> {
        let (records, bad): (Vec<PriceRecord>, Vec<PriceRecord>) = self
            .iter()
            .cloned()
            .map(PriceRecord::normalized)
            .partition(PriceRecord::has_valid_price);
        Ok(RecordBatch::new(records, bad.len()))
    }
}

/// CSV export of the price table
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        CsvSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordSource for CsvSource {
    fn name(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn read_records(&self) -> Result<RecordBatch> {
        db::load_csv(&self.path).map_err(|e| BuildError::source_unavailable(self.name(), format!("{:#}", e)))
    }
}

/// The SQLite record store
pub struct SqliteSource<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteSource<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        SqliteSource { conn }
    }
}

impl RecordSource for SqliteSource<'_> {
    fn name(&self) -> String {
        match self.conn.path() {
            Some(path) if !path.is_empty() => format!("sqlite:{}", path),
            _ => "sqlite:memory".to_string(),
        }
    }

    fn read_records(&self) -> Result<RecordBatch> {
        db::get_all_price_records(self.conn)
            .map_err(|e| BuildError::source_unavailable(self.name(), format!("{:#}", e)))
    }
}
