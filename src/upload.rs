// 📤 Price Upload Conversion - wide upload sheet → long price rows
//
// Pricing maintains one row per part with a column per tier. The ERP import
// wants one row per (price code, order quantity). The tier fan-out is fixed
// and produces exactly the default registry columns.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

use crate::publish::write_atomic;
use crate::record::{parse_effective_date, PriceRecord};

/// (price code, order qty, sheet column) for every upload row emitted per part
pub const UPLOAD_TIERS: [(&str, u32, &str); 18] = [
    ("RTL", 1, "Retail"),
    ("MAP", 1, "US MAP"),
    ("DST", 1, "Distributor"),
    // Dealer breaks
    ("DLR", 1, "Dealer (1-5 Units)"),
    ("DLR", 6, "Premier (6-24 Units)"),
    ("DLR", 25, "Silver (25-99 Units)"),
    ("DLR", 100, "Gold (100-249 Units)"),
    ("DLR", 250, "Platinum (250+ Units)"),
    ("GLD", 1, "Gold (100-249 Units)"),
    ("GLD", 250, "Platinum (250+ Units)"),
    ("PLT", 1, "Platinum (250+ Units)"),
    ("PMR", 1, "Premier (6-24 Units)"),
    ("PMR", 25, "Silver (25-99 Units)"),
    ("PMR", 100, "Gold (100-249 Units)"),
    ("PMR", 250, "Platinum (250+ Units)"),
    ("SIL", 1, "Silver (25-99 Units)"),
    ("SIL", 100, "Gold (100-249 Units)"),
    ("SIL", 250, "Platinum (250+ Units)"),
];

const PART_COLUMN: &str = "Part #";

// ============================================================================
// SHEET
// ============================================================================

/// One part from the wide sheet: prices in sheet column order
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub part_id: String,
    prices: Vec<(String, Option<f64>)>,
}

impl SheetRow {
    pub fn price(&self, column: &str) -> Option<f64> {
        self.prices
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, price)| *price)
    }
}

/// Read the wide sheet (CSV export). Header names are compared after
/// collapsing whitespace, so `"Dealer\n(1-5 Units)"` matches.
pub fn read_upload_sheet<R: Read>(reader: R) -> Result<Vec<SheetRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read upload sheet header")?
        .iter()
        .map(collapse_whitespace)
        .collect();

    let part_idx = match headers.iter().position(|h| h == PART_COLUMN) {
        Some(idx) => idx,
        None => bail!("Upload sheet has no '{}' column", PART_COLUMN),
    };

    let missing: Vec<&str> = tier_columns()
        .into_iter()
        .filter(|col| !headers.iter().any(|h| h == col))
        .collect();
    if !missing.is_empty() {
        bail!("Upload sheet is missing columns: {}", missing.join(", "));
    }

    let mut rows = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let line = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse upload line {}", line))?;

        let part_id = record.get(part_idx).unwrap_or("").trim().to_string();
        if part_id.is_empty() {
            continue;
        }

        let mut prices = Vec::new();
        for column in tier_columns() {
            let idx = headers.iter().position(|h| h == column).unwrap_or(part_idx);
            let raw = record.get(idx).unwrap_or("");
            let price = if raw.trim().is_empty() {
                None
            } else {
                Some(parse_unit_price(raw).with_context(|| {
                    format!("Invalid price '{}' in column '{}' on line {}", raw, column, line)
                })?)
            };
            prices.push((column.to_string(), price));
        }

        rows.push(SheetRow { part_id, prices });
    }

    Ok(rows)
}

pub fn read_upload_sheet_file(path: &Path) -> Result<Vec<SheetRow>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open upload sheet: {}", path.display()))?;
    read_upload_sheet(file)
}

/// Distinct sheet columns referenced by the tiers, first use order
fn tier_columns() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = Vec::new();
    for (_, _, column) in UPLOAD_TIERS {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    columns
}

fn collapse_whitespace(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// UPLOAD ROWS
// ============================================================================

/// Validity window stamped on every converted row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadWindow {
    pub effective: NaiveDate,
    pub end: NaiveDate,
}

impl UploadWindow {
    pub fn new(effective: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < effective {
            bail!("End date {} is before effective date {}", end, effective);
        }
        Ok(UploadWindow { effective, end })
    }

    /// Effective from `effective` until the end of that year
    pub fn through_year_end(effective: NaiveDate) -> Self {
        let end = NaiveDate::from_ymd_opt(effective.year(), 12, 31).unwrap_or(effective);
        UploadWindow { effective, end }
    }
}

/// One long row of the ERP price upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRow {
    #[serde(rename = "partid")]
    pub part_id: String,

    #[serde(rename = "Price Code")]
    pub price_code: String,

    #[serde(rename = "Effect Date")]
    pub effective_date: NaiveDate,

    #[serde(rename = "Order Qty")]
    pub order_qty: u32,

    #[serde(rename = "End Date")]
    pub end_date: NaiveDate,

    /// Formatted as `$1,234.56`
    #[serde(rename = "Unit Price")]
    pub unit_price: String,

    #[serde(rename = "Processed Flag")]
    pub processed_flag: String,
}

impl UploadRow {
    pub fn to_price_record(&self) -> Result<PriceRecord> {
        let price = parse_unit_price(&self.unit_price)?;
        Ok(PriceRecord::new(
            &self.part_id,
            &self.price_code,
            self.order_qty,
            self.effective_date,
            price,
        )
        .normalized())
    }
}

/// Fan every sheet row out into its tier rows. Blank tier prices are skipped.
pub fn convert(rows: &[SheetRow], window: UploadWindow) -> Vec<UploadRow> {
    let mut converted = Vec::with_capacity(rows.len() * UPLOAD_TIERS.len());
    let mut blank = 0;

    for row in rows {
        for (code, qty, column) in UPLOAD_TIERS {
            let price = match row.price(column) {
                Some(price) => price,
                None => {
                    blank += 1;
                    continue;
                }
            };

            converted.push(UploadRow {
                part_id: row.part_id.clone(),
                price_code: code.to_string(),
                effective_date: window.effective,
                order_qty: qty,
                end_date: window.end,
                unit_price: format_unit_price(price),
                processed_flag: "N".to_string(),
            });
        }
    }

    if blank > 0 {
        tracing::warn!(blank, "skipped tier prices left blank in the upload sheet");
    }
    tracing::info!(parts = rows.len(), rows = converted.len(), "converted upload sheet");

    converted
}

pub fn write_upload_csv(rows: &[UploadRow], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;

    write_atomic(path, &bytes).with_context(|| format!("Failed to write upload file: {}", path.display()))
}

pub fn read_upload_csv(path: &Path) -> Result<Vec<UploadRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open upload file: {}", path.display()))?;

    let rows = rdr
        .deserialize()
        .collect::<std::result::Result<Vec<UploadRow>, _>>()
        .with_context(|| format!("Failed to parse upload file: {}", path.display()))?;

    Ok(rows)
}

// ============================================================================
// MONEY
// ============================================================================

/// `1234.5` → `$1,234.50`
pub fn format_unit_price(price: f64) -> String {
    let cents = (price.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, digit) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if price < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Accepts `$1,234.56`, `1234.56` and ` 12 `
pub fn parse_unit_price(raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();

    let price: f64 = cleaned
        .trim()
        .parse()
        .with_context(|| format!("Invalid unit price '{}'", raw))?;

    if !price.is_finite() {
        bail!("Invalid unit price '{}'", raw);
    }
    Ok(price)
}

/// Parse a `YYYY-MM-DD` or `MM/DD/YYYY` CLI date
pub fn parse_window_date(raw: &str) -> Result<NaiveDate> {
    parse_effective_date(raw).with_context(|| format!("Invalid date '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryRegistry;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const SHEET: &str = "Part #,Retail,US MAP,Distributor,\"Dealer\n(1-5 Units)\",\"Premier\n(6-24 Units)\",\"Silver\n(25-99 Units)\",\"Gold\n(100-249 Units)\",\"Platinum\n(250+ Units)\"\n\
                         P-100,\"$1,299.00\",1199,900,850,800,750,700,650\n\
                         P-200,20,,15,14,13,12,11,10\n\
                         ,1,1,1,1,1,1,1,1\n";

    #[test]
    fn test_tiers_match_default_registry() {
        let registry = CategoryRegistry::with_defaults();
        let labels: Vec<String> = UPLOAD_TIERS
            .iter()
            .map(|(code, qty, _)| format!("{}-{}", code, qty))
            .collect();

        assert_eq!(labels, registry.labels());
    }

    #[test]
    fn test_read_sheet_collapses_header_whitespace() {
        let rows = read_upload_sheet(SHEET.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].part_id, "P-100");
        assert_eq!(rows[0].price("Retail"), Some(1299.0));
        assert_eq!(rows[0].price("Dealer (1-5 Units)"), Some(850.0));
        assert_eq!(rows[1].price("US MAP"), None);
    }

    #[test]
    fn test_read_sheet_missing_column() {
        let result = read_upload_sheet("Part #,Retail\nP1,10\n".as_bytes());
        assert!(result.is_err());
    }

    #[test]
    fn test_convert_fans_out_tiers() {
        let rows = read_upload_sheet(SHEET.as_bytes()).unwrap();
        let window = UploadWindow::new(date(2025, 7, 28), date(2025, 12, 31)).unwrap();
        let converted = convert(&rows, window);

        // P-200 has no MAP price
        assert_eq!(converted.len(), 18 + 17);

        let gld_250 = converted
            .iter()
            .find(|r| r.part_id == "P-100" && r.price_code == "GLD" && r.order_qty == 250)
            .unwrap();
        assert_eq!(gld_250.unit_price, "$650.00");
        assert_eq!(gld_250.processed_flag, "N");
        assert_eq!(gld_250.end_date, date(2025, 12, 31));

        let retail = &converted[0];
        assert_eq!(retail.price_code, "RTL");
        assert_eq!(retail.unit_price, "$1,299.00");
    }

    #[test]
    fn test_upload_row_to_price_record() {
        let row = UploadRow {
            part_id: "P-100".to_string(),
            price_code: "DLR".to_string(),
            effective_date: date(2025, 7, 28),
            order_qty: 6,
            end_date: date(2025, 12, 31),
            unit_price: "$1,234.56".to_string(),
            processed_flag: "N".to_string(),
        };

        let record = row.to_price_record().unwrap();
        assert_eq!(record.column().to_string(), "DLR-6");
        assert_eq!(record.price, 1234.56);
    }

    #[test]
    fn test_write_then_read_upload_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        let rows = read_upload_sheet(SHEET.as_bytes()).unwrap();
        let converted = convert(&rows, UploadWindow::through_year_end(date(2025, 7, 28)));

        write_upload_csv(&converted, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "partid,Price Code,Effect Date,Order Qty,End Date,Unit Price,Processed Flag"
        ));
        assert_eq!(read_upload_csv(&path).unwrap(), converted);
    }

    #[test]
    fn test_money_formatting() {
        assert_eq!(format_unit_price(1234.5), "$1,234.50");
        assert_eq!(format_unit_price(0.0), "$0.00");
        assert_eq!(format_unit_price(999.999), "$1,000.00");
        assert_eq!(format_unit_price(1234567.891), "$1,234,567.89");

        assert_eq!(parse_unit_price("$1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_unit_price(" 12 ").unwrap(), 12.0);
        assert!(parse_unit_price("n/a").is_err());
    }

    #[test]
    fn test_window_rejects_inverted_dates() {
        assert!(UploadWindow::new(date(2025, 12, 31), date(2025, 1, 1)).is_err());
    }
}
