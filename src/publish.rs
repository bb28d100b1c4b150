// 📤 Publishing - atomic replacement of the served price list
//
// The previous artifact stays valid and servable until the new one is fully
// written: bytes go to a sibling temp file, are synced, then renamed over the
// target. A failed publish removes the temp file and leaves the target as it was.

use rusqlite::Connection;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::db;
use crate::error::{BuildError, Result};
use crate::price_list::PriceList;

pub trait PriceListSink {
    /// Where the list ends up, for logs
    fn target(&self) -> String;

    fn publish(&self, list: &PriceList) -> Result<()>;
}

// ============================================================================
// FILE ARTIFACTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Csv,
    Json,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Csv => "csv",
            ArtifactFormat::Json => "json",
        }
    }
}

/// Price list written to a file, replaced atomically
#[derive(Debug, Clone)]
pub struct FileArtifact {
    path: PathBuf,
    format: ArtifactFormat,
}

impl FileArtifact {
    pub fn new(path: impl AsRef<Path>, format: ArtifactFormat) -> Self {
        FileArtifact {
            path: path.as_ref().to_path_buf(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self, list: &PriceList) -> std::io::Result<Vec<u8>> {
        match self.format {
            ArtifactFormat::Csv => render_csv(list),
            ArtifactFormat::Json => serde_json::to_vec_pretty(list).map_err(std::io::Error::from),
        }
    }
}

impl PriceListSink for FileArtifact {
    fn target(&self) -> String {
        self.path.display().to_string()
    }

    fn publish(&self, list: &PriceList) -> Result<()> {
        let bytes = self.render(list).map_err(|source| BuildError::Publish {
            target: self.path.clone(),
            source,
        })?;

        write_atomic(&self.path, &bytes).map_err(|source| BuildError::Publish {
            target: self.path.clone(),
            source,
        })
    }
}

/// CSV with the published header; empty cells mean "no price"
pub fn render_csv(list: &PriceList) -> std::io::Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(list.header())?;

    for row in &list.rows {
        let mut record = vec![
            row.part_id.clone(),
            row.description.clone(),
            row.effective_date.to_string(),
        ];
        record.extend(
            row.prices
                .iter()
                .map(|cell| cell.price.map(|p| p.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    wtr.into_inner().map_err(|e| e.into_error())
}

/// Write `bytes` to `path` through a synced temp file and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(path);
    let written = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "pricelist".into());
    name.push(".tmp");
    path.with_file_name(name)
}

// ============================================================================
// SQLITE
// ============================================================================

/// Materialized price list in the record store, replaced in one transaction
pub struct SqliteSink<'c> {
    conn: &'c Connection,
    build_id: String,
}

impl<'c> SqliteSink<'c> {
    pub fn new(conn: &'c Connection, build_id: impl Into<String>) -> Self {
        SqliteSink {
            conn,
            build_id: build_id.into(),
        }
    }
}

impl PriceListSink for SqliteSink<'_> {
    fn target(&self) -> String {
        format!("sqlite:pricelist_generated ({})", self.build_id)
    }

    fn publish(&self, list: &PriceList) -> Result<()> {
        db::replace_generated_list(self.conn, list, &self.build_id)
            .map(|_| ())
            .map_err(|e| BuildError::Store(format!("{:#}", e)))
    }
}
