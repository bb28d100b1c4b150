use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::parts::PartFilter;
use crate::price_list::{PriceCell, PriceList, PriceListRow};
use crate::record::{parse_effective_date, PriceRecord, RecordBatch};

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// What happened to the price data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A price export or converted upload went into the store
    RecordsImported,

    /// A price list was built and published
    PriceListBuilt,

    /// Templated export files were written
    ExportsGenerated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RecordsImported => "records_imported",
            EventKind::PriceListBuilt => "price_list_built",
            EventKind::ExportsGenerated => "exports_generated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim() {
            "records_imported" => Ok(EventKind::RecordsImported),
            "price_list_built" => Ok(EventKind::PriceListBuilt),
            "exports_generated" => Ok(EventKind::ExportsGenerated),
            other => Err(format!("unknown event kind '{}'", other)),
        }
    }
}

/// One audit trail entry. `subject` is the import file or the build id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub subject: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(kind: EventKind, subject: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            subject: subject.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Raw price records (append-only feed)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pricelist_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            partid TEXT NOT NULL,
            sku TEXT NOT NULL DEFAULT '',
            price_code TEXT NOT NULL,
            order_qty INTEGER NOT NULL,
            price REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'USD',
            effective_date TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Materialized price list (replaced wholesale on every build)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pricelist_generated (
            partid TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            effective_date TEXT NOT NULL,
            prices TEXT NOT NULL,
            build_id TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            kind TEXT NOT NULL,
            subject TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prices_part ON pricelist_prices(partid, effective_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_prices_code ON pricelist_prices(price_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind, id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// PRICE RECORDS
// ============================================================================

/// Header groups a price export must carry (any one name per group)
const REQUIRED_CSV_COLUMNS: [&[&str]; 5] = [
    &["partid"],
    &["price_code", "catid"],
    &["qty", "order_qty"],
    &["price"],
    &["effective_date"],
];

/// Read a price export (`partid, sku, catid|price_code, qty, price, effective_date, currency`).
///
/// Rows that do not parse, or carry a non-finite price, are skipped and
/// counted. A missing file, a missing column or an I/O error fails the read.
pub fn load_csv(csv_path: &Path) -> Result<RecordBatch> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("Failed to read CSV header in {}", csv_path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    for group in REQUIRED_CSV_COLUMNS {
        if !group.iter().any(|name| headers.iter().any(|h| h == name)) {
            bail!("{} has no '{}' column", csv_path.display(), group.join("' or '"));
        }
    }

    let mut records = Vec::new();
    let mut malformed = 0;

    for (line_num, result) in rdr.deserialize::<PriceRecord>().enumerate() {
        match result {
            Ok(record) if record.has_valid_price() => records.push(record.normalized()),
            Ok(record) => {
                malformed += 1;
                tracing::debug!(line = line_num + 2, price = record.price, "skipped non-finite price");
            }
            Err(e) if e.is_io_error() => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("Failed to read {}", csv_path.display()));
            }
            Err(e) => {
                malformed += 1;
                tracing::debug!(line = line_num + 2, error = %e, "skipped malformed CSV row");
            }
        }
    }

    Ok(RecordBatch::new(records, malformed))
}

/// Insert records, skipping exact re-imports. Returns the number inserted.
pub fn insert_price_records(conn: &Connection, records: &[PriceRecord]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;
    let mut rejected = 0;

    for record in records {
        if !record.has_valid_price() {
            rejected += 1;
            continue;
        }
        let record = record.clone().normalized();
        let hash = record.compute_idempotency_hash();

        let result = conn.execute(
            "INSERT INTO pricelist_prices (
                idempotency_hash, partid, sku, price_code, order_qty, price, currency, effective_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                hash,
                record.part_id,
                record.sku,
                record.price_code,
                record.order_qty,
                record.price,
                record.currency,
                record.effective_date.to_string(),
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if rejected > 0 {
        tracing::warn!(rejected, "refused records with non-finite prices");
    }
    tracing::info!(inserted, duplicates, "imported price records");

    Ok(inserted)
}

fn price_record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PriceRecord> {
    let date_str: String = row.get(5)?;
    let effective_date = parse_effective_date(&date_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("invalid effective date '{}'", date_str).into(),
        )
    })?;

    let price: f64 = row.get(4)?;
    if !price.is_finite() {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Real,
            format!("non-finite price {}", price).into(),
        ));
    }

    Ok(PriceRecord {
        part_id: row.get(0)?,
        sku: row.get(1)?,
        price_code: row.get(2)?,
        order_qty: row.get(3)?,
        price,
        effective_date,
        currency: row.get(6)?,
    }
    .normalized())
}

/// A row whose values cannot become a PriceRecord, as opposed to a failed query
fn is_malformed_row(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
    )
}

/// Collect mapped rows, skipping and counting malformed ones
fn collect_records<I>(rows: I) -> Result<RecordBatch>
where
    I: Iterator<Item = rusqlite::Result<PriceRecord>>,
{
    let mut batch = RecordBatch::default();

    for row in rows {
        match row {
            Ok(record) => batch.records.push(record),
            Err(e) if is_malformed_row(&e) => {
                batch.malformed += 1;
                tracing::debug!(error = %e, "skipped malformed price row");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(batch)
}

const PRICE_COLUMNS: &str = "partid, sku, price_code, order_qty, price, effective_date, currency";

/// Every stored record. Rows with unusable values are skipped and counted.
pub fn get_all_price_records(conn: &Connection) -> Result<RecordBatch> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM pricelist_prices
         ORDER BY partid, price_code, order_qty, effective_date, sku",
        PRICE_COLUMNS
    ))?;

    let rows = stmt.query_map([], price_record_from_row)?;
    collect_records(rows)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM pricelist_prices", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// ENUMERATION
// ============================================================================

/// Distinct part ids, ascending
pub fn list_parts(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT TRIM(partid) AS id FROM pricelist_prices
         WHERE TRIM(partid) <> ''
         ORDER BY id",
    )?;

    let parts = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(parts)
}

/// Distinct price codes present in the feed, ascending
pub fn list_price_codes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT TRIM(price_code) AS code FROM pricelist_prices
         ORDER BY code",
    )?;

    let codes = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(codes)
}

/// Part ids starting with `prefix`; limit is clamped to 1..=100
pub fn find_parts(conn: &Connection, prefix: &str, limit: usize) -> Result<Vec<String>> {
    let limit = limit.clamp(1, 100) as i64;
    let pattern = format!("{}%", escape_like(prefix.trim()));

    let mut stmt = conn.prepare(
        "SELECT DISTINCT TRIM(partid) AS id FROM pricelist_prices
         WHERE TRIM(partid) LIKE ?1 ESCAPE '\\' AND TRIM(partid) <> ''
         ORDER BY id
         LIMIT ?2",
    )?;

    let parts = stmt
        .query_map(params![pattern, limit], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(parts)
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Raw records filtered by part ids and/or price codes.
///
/// At least one filter must be given. A part list led by "ALL" means every
/// part. Limit is clamped to 1..=1000.
pub fn query_items(
    conn: &Connection,
    part_ids: &[String],
    codes: &[String],
    limit: usize,
) -> Result<Vec<PriceRecord>> {
    if part_ids.is_empty() && codes.is_empty() {
        bail!("At least one filter is required: part id and/or price code");
    }

    let mut conditions = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let PartFilter::Only(ids) = PartFilter::from_ids(part_ids) {
        conditions.push(format!("TRIM(partid) IN ({})", placeholders(values.len(), ids.len())));
        values.extend(ids);
    }

    if !codes.is_empty() {
        conditions.push(format!("TRIM(price_code) IN ({})", placeholders(values.len(), codes.len())));
        values.extend(codes.iter().map(|c| c.trim().to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM pricelist_prices {}
         ORDER BY partid, price_code, sku
         LIMIT {}",
        PRICE_COLUMNS,
        where_clause,
        limit.clamp(1, 1000)
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), price_record_from_row)?;
    let batch = collect_records(rows)?;

    if batch.malformed > 0 {
        tracing::warn!(malformed = batch.malformed, "skipped malformed price rows");
    }
    Ok(batch.records)
}

fn placeholders(offset: usize, count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", offset + i))
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// MATERIALIZED PRICE LIST
// ============================================================================

/// Replace the stored price list in one transaction. Returns rows written.
pub fn replace_generated_list(conn: &Connection, list: &PriceList, build_id: &str) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;

    tx.execute("DELETE FROM pricelist_generated", [])?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO pricelist_generated (partid, description, effective_date, prices, build_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for row in &list.rows {
            let prices_json = serde_json::to_string(&row.prices)?;
            stmt.execute(params![
                row.part_id,
                row.description,
                row.effective_date.to_string(),
                prices_json,
                build_id,
            ])?;
        }
    }

    tx.commit().context("Failed to commit price list")?;

    Ok(list.rows.len())
}

/// The stored price list, ordered by part id
pub fn get_generated_list(conn: &Connection) -> Result<Vec<PriceListRow>> {
    let mut stmt = conn.prepare(
        "SELECT partid, description, effective_date, prices
         FROM pricelist_generated
         ORDER BY partid",
    )?;

    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(part_id, description, date_str, prices_json)| -> Result<PriceListRow> {
            let effective_date = parse_effective_date(&date_str)
                .with_context(|| format!("Invalid effective date '{}' for {}", date_str, part_id))?;
            let prices: Vec<PriceCell> = serde_json::from_str(&prices_json)
                .with_context(|| format!("Invalid prices for {}", part_id))?;
            Ok(PriceListRow {
                part_id,
                description,
                effective_date,
                prices,
            })
        })
        .collect()
}

// ============================================================================
// EVENTS
// ============================================================================

/// Append an event to the audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (event_id, timestamp, kind, subject, data, actor)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.kind.as_str(),
            event.subject,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Record `kind` for `subject` as done by `actor`
pub fn record_event(
    conn: &Connection,
    kind: EventKind,
    subject: &str,
    data: serde_json::Value,
    actor: &str,
) -> Result<Event> {
    let event = Event::new(kind, subject, data, actor);
    insert_event(conn, &event)?;
    Ok(event)
}

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let timestamp_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let data_json: String = row.get(4)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
            .with_timezone(&Utc),
        kind: kind_str
            .parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
        subject: row.get(3)?,
        data: serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
        actor: row.get(5)?,
    })
}

const EVENT_COLUMNS: &str = "event_id, timestamp, kind, subject, data, actor";

/// Most recent events, newest first
pub fn get_recent_events(conn: &Connection, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events ORDER BY id DESC LIMIT ?1",
        EVENT_COLUMNS
    ))?;

    let events = stmt
        .query_map(params![limit as i64], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Most recent events of one kind, newest first
pub fn get_events_by_kind(conn: &Connection, kind: EventKind, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events WHERE kind = ?1 ORDER BY id DESC LIMIT ?2",
        EVENT_COLUMNS
    ))?;

    let events = stmt
        .query_map(params![kind.as_str(), limit as i64], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
