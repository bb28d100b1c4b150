// 🧩 Templated Exports - customer price sheets filled from the price list
//
// `lists/templates/` holds CSV templates. `lists/schema.json` says, per
// template, which row data starts on and which price list field or column
// feeds each template column. `generate_exports` writes one filled copy of
// every described template to `lists/output/`, keeping its relative path.
//
// A mapping (`dfcolumnname`) is one of:
//   ""                 → left empty
//   partid, display_partid, description, effective_date
//                      → a row field (case-insensitive)
//   DLR-1 or [DLR-1]   → a price list column
// Anything else (e.g. `[DLR-1]*0.9`) is not evaluated: the cells stay empty
// and the template logs one warning.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::lookup::LookupTable;
use crate::price_list::{PriceList, PriceListRow};
use crate::publish::write_atomic;

/// Data row used when a schema entry does not say
pub const DEFAULT_STARTING_ROW: usize = 1;

/// Data row written by `generate_schemas` for new entries (header on row 1)
pub const GENERATED_STARTING_ROW: usize = 2;

// ============================================================================
// SCHEMA MODEL
// ============================================================================

/// One template column and the price list value that fills it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub columnname: String,

    /// `null` and a missing key both read as ""
    #[serde(default, deserialize_with = "null_as_empty")]
    pub dfcolumnname: String,
}

impl ColumnMapping {
    pub fn new(columnname: impl Into<String>, dfcolumnname: impl Into<String>) -> Self {
        ColumnMapping {
            columnname: columnname.into(),
            dfcolumnname: dfcolumnname.into(),
        }
    }
}

/// One `schema.json` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSchema {
    /// Template path relative to the templates folder, `/`-separated
    pub filename: String,

    /// 1-based row where the first data row goes
    #[serde(default = "default_starting_row")]
    pub starting_row: usize,

    #[serde(default)]
    pub columns: Vec<ColumnMapping>,
}

fn default_starting_row() -> usize {
    DEFAULT_STARTING_ROW
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn load_schemas(path: &Path) -> Result<Vec<TemplateSchema>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid schema file: {}", path.display()))
}

pub fn save_schemas(path: &Path, schemas: &[TemplateSchema]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(schemas)?;
    write_atomic(path, &bytes).with_context(|| format!("Failed to write schema file: {}", path.display()))
}

// ============================================================================
// FIELD RESOLUTION
// ============================================================================

/// Where a template cell gets its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellSource {
    Empty,
    PartId,
    /// Part id as the lookup sheet spells it, falling back to the price list id
    DisplayPartId,
    Description,
    EffectiveDate,
    /// A price list column label
    Price(String),
    /// A mapping that is not evaluated
    Unsupported(String),
}

impl CellSource {
    pub fn parse(mapping: &str) -> Self {
        let raw = mapping.trim();
        if raw.is_empty() {
            return CellSource::Empty;
        }

        match raw.to_ascii_lowercase().as_str() {
            "partid" => return CellSource::PartId,
            "display_partid" => return CellSource::DisplayPartId,
            "description" => return CellSource::Description,
            "effective_date" => return CellSource::EffectiveDate,
            _ => {}
        }

        let label = raw
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(raw)
            .trim();

        if !label.is_empty() && !label.contains(['[', ']', '*', '/', '+']) {
            CellSource::Price(label.to_ascii_uppercase())
        } else {
            CellSource::Unsupported(raw.to_string())
        }
    }

    fn value(&self, row: &PriceListRow, lookup: &LookupTable) -> String {
        match self {
            CellSource::Empty | CellSource::Unsupported(_) => String::new(),
            CellSource::PartId => row.part_id.clone(),
            CellSource::DisplayPartId => lookup
                .get(&row.part_id)
                .map(|entry| entry.part_id.as_str())
                .filter(|id| !id.is_empty())
                .unwrap_or(row.part_id.as_str())
                .to_string(),
            CellSource::Description => lookup
                .get(&row.part_id)
                .map(|entry| entry.description.clone())
                .filter(|desc| !desc.is_empty())
                .unwrap_or_else(|| row.description.clone()),
            CellSource::EffectiveDate => row.effective_date.to_string(),
            CellSource::Price(label) => row
                .price(label)
                .map(|p| p.to_string())
                .unwrap_or_default(),
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

type Grid = Vec<Vec<String>>;

fn read_grid(bytes: &[u8]) -> Result<Grid> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in rdr.records() {
        grid.push(record?.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

/// 1-based header row: the row among 1..=starting_row holding the most schema
/// column names. Ties keep the earliest row. None when no row holds any.
pub fn detect_header_row(grid: &[Vec<String>], schema: &TemplateSchema) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;

    for row_num in 1..=schema.starting_row.max(1) {
        let values: Vec<&str> = grid
            .get(row_num - 1)
            .map(|row| row.iter().map(|v| v.trim()).collect())
            .unwrap_or_default();

        let score = schema
            .columns
            .iter()
            .filter(|col| values.contains(&col.columnname.trim()))
            .count();

        if best.map_or(true, |(_, top)| score > top) {
            best = Some((row_num, score));
        }
    }

    best.filter(|(_, score)| *score > 0).map(|(row, _)| row)
}

/// 0-based template column for each schema column, in schema order.
///
/// With a header row, columns are found by name; otherwise schema order maps
/// onto the first columns. Columns missing from the header are appended
/// after the widest template row.
pub fn map_columns(grid: &[Vec<String>], schema: &TemplateSchema) -> Vec<usize> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);

    let by_name: HashMap<&str, usize> = match detect_header_row(grid, schema) {
        Some(row_num) => grid[row_num - 1]
            .iter()
            .enumerate()
            .map(|(idx, value)| (value.trim(), idx))
            .collect(),
        None => {
            return (0..schema.columns.len()).collect();
        }
    };

    let mut next_free = width;
    schema
        .columns
        .iter()
        .map(|col| match by_name.get(col.columnname.trim()) {
            Some(idx) => *idx,
            None => {
                next_free += 1;
                next_free - 1
            }
        })
        .collect()
}

/// Fill one template. Rows above `starting_row` are kept; everything from
/// `starting_row` down is replaced by one row per price list row.
pub fn render_template(
    template: &[u8],
    schema: &TemplateSchema,
    list: &PriceList,
    lookup: &LookupTable,
) -> Result<Vec<u8>> {
    let mut grid = read_grid(template)
        .with_context(|| format!("Failed to read template {}", schema.filename))?;
    let positions = map_columns(&grid, schema);
    let sources: Vec<CellSource> = schema
        .columns
        .iter()
        .map(|col| CellSource::parse(&col.dfcolumnname))
        .collect();

    for source in &sources {
        match source {
            CellSource::Unsupported(raw) => {
                tracing::warn!(template = %schema.filename, mapping = %raw, "mapping not evaluated, column left empty");
            }
            CellSource::Price(label) if !list.columns.contains(label) => {
                tracing::warn!(template = %schema.filename, column = %label, "price list has no such column");
            }
            _ => {}
        }
    }

    grid.truncate(schema.starting_row.max(1) - 1);
    while grid.len() < schema.starting_row.max(1) - 1 {
        grid.push(Vec::new());
    }

    let width = positions
        .iter()
        .map(|idx| idx + 1)
        .chain(grid.iter().map(Vec::len))
        .max()
        .unwrap_or(0);

    for row in &list.rows {
        let mut cells = vec![String::new(); width];
        for (idx, source) in positions.iter().zip(&sources) {
            cells[*idx] = source.value(row, lookup);
        }
        grid.push(cells);
    }

    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in &mut grid {
        row.resize(width, String::new());
        wtr.write_record(row.iter())?;
    }
    wtr.into_inner().map_err(|e| e.into_error().into())
}

// ============================================================================
// EXPORT RUN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub written: Vec<ExportedFile>,

    /// Templates with no schema entry
    pub skipped: Vec<String>,
}

/// Fill every template under `templates_dir` that has a schema entry and
/// write it under `output_dir` at the same relative path.
pub fn generate_exports(
    templates_dir: &Path,
    schemas: &[TemplateSchema],
    list: &PriceList,
    lookup: &LookupTable,
    output_dir: &Path,
) -> Result<ExportReport> {
    if !templates_dir.is_dir() {
        bail!("Templates folder does not exist: {}", templates_dir.display());
    }

    let mut report = ExportReport::default();

    for path in template_files(templates_dir)? {
        let filename = relative_name(templates_dir, &path);
        let Some(schema) = schemas.iter().find(|s| s.filename == filename) else {
            tracing::warn!(template = %filename, "no schema entry, skipping");
            report.skipped.push(filename);
            continue;
        };

        let template = fs::read(&path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        let bytes = render_template(&template, schema, list, lookup)?;

        let dest = output_dir.join(&filename);
        write_atomic(&dest, &bytes).with_context(|| format!("Failed to write export: {}", dest.display()))?;
        tracing::info!(template = %filename, rows = list.len(), "export written");

        report.written.push(ExportedFile {
            filename,
            path: dest,
            rows: list.len(),
        });
    }

    Ok(report)
}

/// Every `*.csv` below `root`, sorted
fn template_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).with_context(|| format!("Failed to list folder: {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// SCHEMA GENERATOR
// ============================================================================

/// First-row headers of every template under `root`, as schema entries.
///
/// Mappings and starting rows from `existing` are carried over by filename
/// and column name, so re-running keeps hand-written work. Templates with no
/// readable header are left out unless `include_empty`.
pub fn generate_schemas(root: &Path, include_empty: bool, existing: &[TemplateSchema]) -> Result<Vec<TemplateSchema>> {
    if !root.is_dir() {
        bail!("Templates folder does not exist: {}", root.display());
    }

    let mut schemas = Vec::new();

    for path in template_files(root)? {
        let filename = relative_name(root, &path);
        let headers = match fs::read(&path).map_err(anyhow::Error::from).and_then(|b| read_grid(&b)) {
            Ok(grid) => grid
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
                .filter(|h| !h.is_empty())
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(template = %filename, error = %e, "unreadable template");
                Vec::new()
            }
        };

        if headers.is_empty() && !include_empty {
            continue;
        }

        let previous = existing.iter().find(|s| s.filename == filename);
        let mapping_for = |name: &str| {
            previous
                .and_then(|s| s.columns.iter().find(|c| c.columnname == name))
                .map(|c| c.dfcolumnname.clone())
                .unwrap_or_default()
        };

        schemas.push(TemplateSchema {
            starting_row: previous.map_or(GENERATED_STARTING_ROW, |s| s.starting_row),
            columns: headers
                .iter()
                .map(|name| ColumnMapping::new(name.as_str(), mapping_for(name)))
                .collect(),
            filename,
        });
    }

    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryRegistry;
    use crate::price_list::PriceListBuilder;
    use crate::record::PriceRecord;
    use chrono::NaiveDate;

    fn sample_list() -> PriceList {
        let registry = CategoryRegistry::from_labels(&["DLR-1", "GLD-250"]).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        PriceListBuilder::new(registry).build(&[
            PriceRecord::new("P1", "DLR", 1, day, 8.5),
            PriceRecord::new("P2", "GLD", 250, day, 100.0),
        ])
    }

    fn lookup() -> LookupTable {
        LookupTable::from_reader("Part ID,Part #,Description\nFG-1,P1,Front grille\n".as_bytes()).unwrap()
    }

    fn schema(starting_row: usize, columns: &[(&str, &str)]) -> TemplateSchema {
        TemplateSchema {
            filename: "dealer.csv".to_string(),
            starting_row,
            columns: columns.iter().map(|(c, d)| ColumnMapping::new(*c, *d)).collect(),
        }
    }

    fn render(template: &str, schema: &TemplateSchema) -> Vec<String> {
        let bytes = render_template(template.as_bytes(), schema, &sample_list(), &lookup()).unwrap();
        String::from_utf8(bytes).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_schema_json_defaults() {
        let json = r#"[{"filename": "a/b.csv", "columns": [
            {"columnname": "Item", "dfcolumnname": null},
            {"columnname": "Dealer"}
        ]}]"#;

        let schemas: Vec<TemplateSchema> = serde_json::from_str(json).unwrap();
        assert_eq!(schemas[0].starting_row, 1);
        assert_eq!(schemas[0].columns[0].dfcolumnname, "");
        assert_eq!(schemas[0].columns[1].dfcolumnname, "");
    }

    #[test]
    fn test_cell_source_parse() {
        assert_eq!(CellSource::parse(""), CellSource::Empty);
        assert_eq!(CellSource::parse("PartID"), CellSource::PartId);
        assert_eq!(CellSource::parse("display_partid"), CellSource::DisplayPartId);
        assert_eq!(CellSource::parse("[dlr-1]"), CellSource::Price("DLR-1".to_string()));
        assert_eq!(CellSource::parse("GLD-250"), CellSource::Price("GLD-250".to_string()));
        assert_eq!(
            CellSource::parse("[DLR-1]*0.9"),
            CellSource::Unsupported("[DLR-1]*0.9".to_string())
        );
    }

    #[test]
    fn test_header_row_best_score() {
        let grid = read_grid(b"Dealer price list,,\nItem,Name,Dealer\n,,\n").unwrap();
        let s = schema(3, &[("Item", ""), ("Dealer", "")]);
        assert_eq!(detect_header_row(&grid, &s), Some(2));

        // the header sits below the rows that are searched
        let s = schema(1, &[("Item", ""), ("Dealer", "")]);
        assert_eq!(detect_header_row(&grid, &s), None);
    }

    #[test]
    fn test_fill_by_header_names() {
        let s = schema(
            3,
            &[
                ("Dealer", "[DLR-1]"),
                ("Item", "display_partid"),
                ("Name", "description"),
                ("Bulk", "GLD-250"),
            ],
        );

        let lines = render("Dealer price list,,\nItem,Name,Dealer\n", &s);
        assert_eq!(
            lines,
            vec![
                "Dealer price list,,,",
                "Item,Name,Dealer,",
                "FG-1,Front grille,8.5,",
                "P2,,,100",
            ]
        );
    }

    #[test]
    fn test_fill_without_header_uses_schema_order() {
        let s = schema(1, &[("A", "partid"), ("B", "effective_date"), ("C", "[DLR-1]*0.9")]);

        let lines = render("", &s);
        assert_eq!(lines, vec!["P1,2024-02-01,", "P2,2024-02-01,"]);
    }

    #[test]
    fn test_generate_exports_and_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(templates.join("east")).unwrap();
        fs::write(templates.join("east").join("dealer.csv"), "Item,Dealer\n").unwrap();
        fs::write(templates.join("blank.csv"), "").unwrap();
        fs::write(templates.join("notes.txt"), "ignored").unwrap();

        let previous = vec![TemplateSchema {
            filename: "east/dealer.csv".to_string(),
            starting_row: 2,
            columns: vec![ColumnMapping::new("Dealer", "[DLR-1]")],
        }];
        let schemas = generate_schemas(&templates, false, &previous).unwrap();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].filename, "east/dealer.csv");
        assert_eq!(schemas[0].starting_row, 2);
        assert_eq!(
            schemas[0].columns,
            vec![ColumnMapping::new("Item", ""), ColumnMapping::new("Dealer", "[DLR-1]")]
        );
        assert_eq!(generate_schemas(&templates, true, &[]).unwrap().len(), 2);

        let schema_path = dir.path().join("schema.json");
        save_schemas(&schema_path, &schemas).unwrap();
        let mut schemas = load_schemas(&schema_path).unwrap();
        schemas[0].columns[0].dfcolumnname = "partid".to_string();

        let output = dir.path().join("output");
        let report = generate_exports(&templates, &schemas, &sample_list(), &lookup(), &output).unwrap();

        assert_eq!(report.written.len(), 1);
        assert_eq!(report.skipped, vec!["blank.csv"]);
        let written = fs::read_to_string(output.join("east").join("dealer.csv")).unwrap();
        assert_eq!(written.lines().collect::<Vec<_>>(), vec!["Item,Dealer", "P1,8.5", "P2,"]);
    }

    #[test]
    fn test_missing_templates_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        assert!(generate_exports(&missing, &[], &sample_list(), &lookup(), dir.path()).is_err());
        assert!(generate_schemas(&missing, false, &[]).is_err());
    }
}
