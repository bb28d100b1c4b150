// 🔎 Lookup Enrichment - descriptions for published rows
//
// The build always emits an empty description. A lookup CSV (the first *.csv
// in the lookup folder, by name) maps `Part #` to a display part id and a
// description, and enrichment copies the description onto matching rows.
// Keys and row order are never changed.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::price_list::PriceList;

const KEY_COLUMN: &str = "Part #";
const PART_ID_COLUMN: &str = "Part ID";
const DESCRIPTION_COLUMN: &str = "Description";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    /// Part id as the lookup sheet spells it
    pub part_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: HashMap<String, LookupEntry>,
    source: Option<PathBuf>,
}

impl LookupTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read lookup header")?
            .iter()
            .map(clean_header)
            .collect();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let key_idx = match column(KEY_COLUMN) {
            Some(idx) => idx,
            None => {
                tracing::warn!("lookup has no '{}' column, nothing to enrich", KEY_COLUMN);
                return Ok(LookupTable::default());
            }
        };
        let part_idx = column(PART_ID_COLUMN);
        let desc_idx = column(DESCRIPTION_COLUMN);

        let mut entries = HashMap::new();
        for (line_num, result) in rdr.records().enumerate() {
            let row = result.with_context(|| format!("Failed to parse lookup line {}", line_num + 2))?;

            let key = row.get(key_idx).unwrap_or("").trim();
            if key.is_empty() {
                continue;
            }

            let field = |idx: Option<usize>| {
                idx.and_then(|i| row.get(i))
                    .unwrap_or("")
                    .trim()
                    .to_string()
            };

            // Later rows win, as in a plain dict insert
            entries.insert(
                key.to_string(),
                LookupEntry {
                    part_id: field(part_idx),
                    description: field(desc_idx),
                },
            );
        }

        Ok(LookupTable { entries, source: None })
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open lookup file: {}", path.display()))?;
        let mut table = Self::from_reader(file)?;
        table.source = Some(path.to_path_buf());
        Ok(table)
    }

    /// First `*.csv` in `dir` by file name. A missing folder or an empty one
    /// gives an empty table.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            tracing::info!(dir = %dir.display(), "no lookup folder, descriptions stay empty");
            return Ok(LookupTable::default());
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list lookup folder: {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .collect();
        candidates.sort();

        match candidates.first() {
            Some(path) => {
                let table = Self::from_csv(path)?;
                tracing::info!(file = %path.display(), entries = table.len(), "loaded lookup");
                Ok(table)
            }
            None => {
                tracing::info!(dir = %dir.display(), "no lookup csv found");
                Ok(LookupTable::default())
            }
        }
    }

    pub fn get(&self, part_id: &str) -> Option<&LookupEntry> {
        self.entries.get(part_id.trim())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fill descriptions for known parts. Returns how many rows were filled.
    pub fn enrich(&self, list: &mut PriceList) -> usize {
        let mut filled = 0;
        for row in &mut list.rows {
            if let Some(entry) = self.get(&row.part_id) {
                row.description = entry.description.clone();
                filled += 1;
            }
        }
        filled
    }
}

fn clean_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryRegistry;
    use crate::price_list::PriceListBuilder;
    use crate::record::PriceRecord;
    use chrono::NaiveDate;

    const LOOKUP: &str = "\u{feff}Part ID,Part #,Description\n\
                          FG-100,P1,Front grille\n\
                          FG-200, P3 ,Rear bumper\n\
                          ,,orphan\n";

    fn sample_list() -> PriceList {
        let registry = CategoryRegistry::from_labels(&["DLR-1"]).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceListBuilder::new(registry).build(&[
            PriceRecord::new("P1", "DLR", 1, date, 1.0),
            PriceRecord::new("P2", "DLR", 1, date, 2.0),
        ])
    }

    #[test]
    fn test_reads_bom_header() {
        let table = LookupTable::from_reader(LOOKUP.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        let entry = table.get("P3").unwrap();
        assert_eq!(entry.part_id, "FG-200");
        assert_eq!(entry.description, "Rear bumper");
    }

    #[test]
    fn test_enrich_fills_only_known_parts() {
        let table = LookupTable::from_reader(LOOKUP.as_bytes()).unwrap();
        let mut list = sample_list();
        let before: Vec<String> = list.rows.iter().map(|r| r.part_id.clone()).collect();

        assert_eq!(table.enrich(&mut list), 1);
        assert_eq!(list.row("P1").unwrap().description, "Front grille");
        assert_eq!(list.row("P2").unwrap().description, "");

        let after: Vec<String> = list.rows.iter().map(|r| r.part_id.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_missing_key_column_is_empty() {
        let table = LookupTable::from_reader("Part ID,Description\nA,B\n".as_bytes()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_load_dir_picks_first_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "Part #,Description\nP1,from b\n").unwrap();
        fs::write(dir.path().join("a.csv"), "Part #,Description\nP1,from a\n").unwrap();
        fs::write(dir.path().join("0-notes.txt"), "ignored").unwrap();

        let table = LookupTable::load_dir(dir.path()).unwrap();
        assert_eq!(table.get("P1").unwrap().description, "from a");
        assert_eq!(table.source(), Some(dir.path().join("a.csv").as_path()));
    }

    #[test]
    fn test_load_dir_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let table = LookupTable::load_dir(&dir.path().join("nope")).unwrap();
        assert!(table.is_empty());
    }
}
