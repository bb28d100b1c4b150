// 📋 Price List Builder - one row per part, one column per category
//
// Pipeline per part: pick the authoritative date (snapshot), keep the records
// at that date, project them onto the registry, assemble the row. Parts are
// independent, so they are reduced in parallel and reassembled in part order.
// A build is a pure function of (records, registry).

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::access::{self, AccessGate};
use crate::categories::CategoryRegistry;
use crate::error::Result;
use crate::pivot::project;
use crate::publish::PriceListSink;
use crate::record::PriceRecord;
use crate::snapshot::PartSnapshot;
use crate::source::RecordSource;

// ============================================================================
// ROWS
// ============================================================================

/// One cell of the price matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCell {
    /// Column label, e.g. "DLR-1"
    pub column: String,

    /// None means "no price", never zero
    pub price: Option<f64>,
}

/// One published row: a part at its authoritative date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceListRow {
    #[serde(rename = "partid")]
    pub part_id: String,

    /// Always empty from the build; filled later by lookup enrichment
    pub description: String,

    pub effective_date: NaiveDate,

    /// One cell per registry column, registry order
    pub prices: Vec<PriceCell>,
}

impl PriceListRow {
    /// Price for a column label; None for an empty or unknown column
    pub fn price(&self, column: &str) -> Option<f64> {
        self.prices
            .iter()
            .find(|cell| cell.column == column)
            .and_then(|cell| cell.price)
    }

    pub fn column_labels(&self) -> Vec<&str> {
        self.prices.iter().map(|cell| cell.column.as_str()).collect()
    }
}

// ============================================================================
// BUILD STATS
// ============================================================================

/// Counters for the anomalies a build absorbs instead of failing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub records_read: usize,
    pub parts_emitted: usize,

    /// Records older than their part's authoritative date
    pub superseded_records: usize,

    /// Snapshot records whose column is not in the registry
    pub unknown_category_records: usize,
    pub unknown_columns: BTreeSet<String>,

    /// Snapshot records that hit an already filled cell (resolved by MAX)
    pub collisions: usize,

    /// Records skipped because their part id is blank
    pub blank_part_records: usize,

    /// Source rows that could not become a record (bad date, quantity or price)
    pub malformed_records: usize,
}

impl BuildStats {
    fn merge(mut self, other: BuildStats) -> BuildStats {
        self.records_read += other.records_read;
        self.parts_emitted += other.parts_emitted;
        self.superseded_records += other.superseded_records;
        self.unknown_category_records += other.unknown_category_records;
        self.unknown_columns.extend(other.unknown_columns);
        self.collisions += other.collisions;
        self.blank_part_records += other.blank_part_records;
        self.malformed_records += other.malformed_records;
        self
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records → {} parts ({} superseded, {} unknown-category, {} collisions, {} blank part ids, {} malformed)",
            self.records_read,
            self.parts_emitted,
            self.superseded_records,
            self.unknown_category_records,
            self.collisions,
            self.blank_part_records,
            self.malformed_records
        )
    }
}

// ============================================================================
// PRICE LIST
// ============================================================================

/// A complete build: header layout, rows sorted by part id, and stats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceList {
    pub columns: Vec<String>,
    pub rows: Vec<PriceListRow>,
    pub stats: BuildStats,
}

impl PriceList {
    /// Published header: `partid, description, effective_date, <columns>...`
    pub fn header(&self) -> Vec<String> {
        let mut header = vec![
            "partid".to_string(),
            "description".to_string(),
            "effective_date".to_string(),
        ];
        header.extend(self.columns.iter().cloned());
        header
    }

    pub fn row(&self, part_id: &str) -> Option<&PriceListRow> {
        self.rows
            .binary_search_by(|row| row.part_id.as_str().cmp(part_id))
            .ok()
            .map(|idx| &self.rows[idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct PriceListBuilder {
    registry: CategoryRegistry,
}

impl PriceListBuilder {
    pub fn new(registry: CategoryRegistry) -> Self {
        PriceListBuilder { registry }
    }

    /// Build the price list from raw records
    pub fn build(&self, records: &[PriceRecord]) -> PriceList {
        let mut groups: BTreeMap<&str, Vec<&PriceRecord>> = BTreeMap::new();
        let mut blank_part_records = 0;
        let mut malformed_records = 0;

        for record in records {
            if !record.has_valid_price() {
                malformed_records += 1;
                continue;
            }
            let part_id = record.part_key();
            if part_id.is_empty() {
                blank_part_records += 1;
                continue;
            }
            groups.entry(part_id).or_default().push(record);
        }

        let groups: Vec<(&str, Vec<&PriceRecord>)> = groups.into_iter().collect();

        let reduced: Vec<(PriceListRow, BuildStats)> = groups
            .par_iter()
            .filter_map(|(part_id, group)| self.reduce_part(part_id, group))
            .collect();

        let mut stats = BuildStats {
            records_read: records.len(),
            blank_part_records,
            malformed_records,
            ..BuildStats::default()
        };
        let mut rows = Vec::with_capacity(reduced.len());
        for (row, part_stats) in reduced {
            rows.push(row);
            stats = stats.merge(part_stats);
        }

        if stats.unknown_category_records > 0 {
            tracing::warn!(
                records = stats.unknown_category_records,
                columns = ?stats.unknown_columns,
                "dropped records with unregistered price categories"
            );
        }
        tracing::info!("price list built: {}", stats.summary());

        PriceList {
            columns: self.registry.labels(),
            rows,
            stats,
        }
    }

    /// Snapshot + projection for a single part's records
    fn reduce_part(&self, part_id: &str, group: &[&PriceRecord]) -> Option<(PriceListRow, BuildStats)> {
        let snapshot = PartSnapshot::from_group(part_id, group)?;
        let projection = project(&snapshot.records, &self.registry);

        if projection.collisions > 0 {
            tracing::debug!(
                part_id,
                collisions = projection.collisions,
                "duplicate cells resolved by max price"
            );
        }

        let prices = self
            .registry
            .columns()
            .iter()
            .zip(projection.cells.iter())
            .map(|(column, price)| PriceCell {
                column: column.label(),
                price: *price,
            })
            .collect();

        let row = PriceListRow {
            part_id: part_id.to_string(),
            description: String::new(),
            effective_date: snapshot.effective_date,
            prices,
        };

        let stats = BuildStats {
            parts_emitted: 1,
            superseded_records: snapshot.superseded,
            unknown_category_records: projection.unknown.len(),
            unknown_columns: projection.unknown.into_iter().collect(),
            collisions: projection.collisions,
            ..BuildStats::default()
        };

        Some((row, stats))
    }

    /// Check the gate, read the source, build. The source is not touched
    /// when the gate refuses.
    pub fn build_authorized(&self, gate: &dyn AccessGate, source: &dyn RecordSource) -> Result<PriceList> {
        access::require(gate)?;
        let batch = source.read_records()?;
        tracing::info!(source = %source.name(), records = batch.len(), "read price records");

        let mut list = self.build(&batch.records);
        list.stats.malformed_records += batch.malformed;
        if list.stats.malformed_records > 0 {
            tracing::warn!(
                source = %source.name(),
                malformed = list.stats.malformed_records,
                "skipped malformed price rows"
            );
        }
        Ok(list)
    }

    /// Build and hand the result to a sink. A failure at any step leaves the
    /// previously published artifact in place.
    pub fn build_and_publish(
        &self,
        gate: &dyn AccessGate,
        source: &dyn RecordSource,
        sink: &dyn PriceListSink,
    ) -> Result<PriceList> {
        let list = self.build_authorized(gate, source)?;
        sink.publish(&list)?;
        tracing::info!(sink = %sink.target(), rows = list.len(), "price list published");
        Ok(list)
    }
}

impl Default for PriceListBuilder {
    fn default() -> Self {
        PriceListBuilder::new(CategoryRegistry::with_defaults())
    }
}

/// Rows of the price list for `records` under `registry`
pub fn build(records: &[PriceRecord], registry: &CategoryRegistry) -> Vec<PriceListRow> {
    PriceListBuilder::new(registry.clone()).build(records).rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::record::RecordBatch;
    use std::cell::Cell;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn registry() -> CategoryRegistry {
        CategoryRegistry::from_labels(&["DLR-1", "GLD-250"]).unwrap()
    }

    fn scenario_records() -> Vec<PriceRecord> {
        vec![
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 9.99),
            PriceRecord::new("P1", "DLR", 1, date(2024, 2, 1), 8.50),
            PriceRecord::new("P2", "GLD", 250, date(2024, 1, 15), 100.00),
        ]
    }

    /// Counts reads so tests can prove a source was never touched
    struct CountingSource {
        records: Vec<PriceRecord>,
        malformed: usize,
        reads: Cell<usize>,
    }

    impl RecordSource for CountingSource {
        fn name(&self) -> String {
            "counting".to_string()
        }

        fn read_records(&self) -> Result<RecordBatch> {
            self.reads.set(self.reads.get() + 1);
            Ok(RecordBatch::new(self.records.clone(), self.malformed))
        }
    }

    #[test]
    fn test_scenario_two_parts() {
        let rows = build(&scenario_records(), &registry());

        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].part_id, "P1");
        assert_eq!(rows[0].effective_date, date(2024, 2, 1));
        assert_eq!(rows[0].price("DLR-1"), Some(8.50));
        assert_eq!(rows[0].price("GLD-250"), None);

        assert_eq!(rows[1].part_id, "P2");
        assert_eq!(rows[1].effective_date, date(2024, 1, 15));
        assert_eq!(rows[1].price("DLR-1"), None);
        assert_eq!(rows[1].price("GLD-250"), Some(100.00));

        assert!(rows.iter().all(|r| r.description.is_empty()));
    }

    #[test]
    fn test_latest_wins_ignores_older_prices() {
        let records = vec![
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 9.99),
            PriceRecord::new("P1", "GLD", 250, date(2024, 1, 1), 5.00),
            PriceRecord::new("P1", "DLR", 1, date(2024, 2, 1), 8.50),
        ];

        let list = PriceListBuilder::new(registry()).build(&records);
        let row = list.row("P1").unwrap();

        assert_eq!(row.effective_date, date(2024, 2, 1));
        assert_eq!(row.price("DLR-1"), Some(8.50));
        // GLD-250 only exists at the older date
        assert_eq!(row.price("GLD-250"), None);
        assert_eq!(list.stats.superseded_records, 2);
    }

    #[test]
    fn test_column_closure() {
        let records = vec![
            PriceRecord::new("P1", "XYZ", 1, date(2024, 1, 1), 1.00),
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 2.00),
            PriceRecord::new("P2", "RTL", 1, date(2024, 1, 1), 3.00),
        ];

        let list = PriceListBuilder::new(registry()).build(&records);

        for row in &list.rows {
            assert_eq!(row.column_labels(), vec!["DLR-1", "GLD-250"]);
        }
        assert_eq!(list.stats.unknown_category_records, 2);
        assert_eq!(
            list.stats.unknown_columns.iter().cloned().collect::<Vec<_>>(),
            vec!["RTL-1", "XYZ-1"]
        );
        // P2 only has an unknown category but still has data, so it keeps its row
        assert_eq!(list.row("P2").unwrap().price("DLR-1"), None);
    }

    #[test]
    fn test_collision_takes_max() {
        let records = vec![
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 10.00),
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 12.50),
        ];

        let list = PriceListBuilder::new(registry()).build(&records);
        assert_eq!(list.rows[0].price("DLR-1"), Some(12.50));
        assert_eq!(list.stats.collisions, 1);
    }

    #[test]
    fn test_no_data_no_row() {
        let records = vec![
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 10.00),
            PriceRecord::new("   ", "DLR", 1, date(2024, 1, 1), 10.00),
        ];

        let list = PriceListBuilder::new(registry()).build(&records);
        assert_eq!(list.len(), 1);
        assert!(list.row("P2").is_none());
        assert_eq!(list.stats.blank_part_records, 1);

        assert!(PriceListBuilder::new(registry()).build(&[]).is_empty());
    }

    #[test]
    fn test_rows_sorted_and_idempotent() {
        let mut records = Vec::new();
        for part in ["P9", "P10", "A1", "P2", "B7"] {
            records.push(PriceRecord::new(part, "DLR", 1, date(2024, 1, 1), 1.00));
        }

        let builder = PriceListBuilder::new(registry());
        let first = builder.build(&records);
        let second = builder.build(&records);
        assert_eq!(first, second);

        let ids: Vec<&str> = first.rows.iter().map(|r| r.part_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B7", "P10", "P2", "P9"]);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut records = scenario_records();
        records.push(PriceRecord::new("P1", "DLR", 1, date(2024, 2, 1), 8.75));
        let builder = PriceListBuilder::new(registry());
        let forward = builder.build(&records);

        records.reverse();
        let backward = builder.build(&records);

        assert_eq!(forward, backward);
        assert_eq!(forward.row("P1").unwrap().price("DLR-1"), Some(8.75));
    }

    #[test]
    fn test_header_layout() {
        let list = PriceListBuilder::new(registry()).build(&scenario_records());
        assert_eq!(
            list.header(),
            vec!["partid", "description", "effective_date", "DLR-1", "GLD-250"]
        );
    }

    #[test]
    fn test_unauthorized_never_reads_source() {
        let source = CountingSource {
            records: scenario_records(),
            malformed: 0,
            reads: Cell::new(0),
        };

        let result = PriceListBuilder::new(registry()).build_authorized(&false, &source);
        assert!(matches!(result, Err(BuildError::Unauthorized)));
        assert_eq!(source.reads.get(), 0);

        let list = PriceListBuilder::new(registry())
            .build_authorized(&true, &source)
            .unwrap();
        assert_eq!(source.reads.get(), 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_non_finite_prices_are_malformed() {
        let mut records = scenario_records();
        records.push(PriceRecord::new("P3", "DLR", 1, date(2024, 3, 1), f64::NAN));
        records.push(PriceRecord::new("P1", "DLR", 1, date(2024, 5, 1), f64::INFINITY));

        let list = PriceListBuilder::new(registry()).build(&records);

        assert_eq!(list.len(), 2);
        assert!(list.row("P3").is_none());
        // the infinite price must not move P1's authoritative date
        assert_eq!(list.row("P1").unwrap().effective_date, date(2024, 2, 1));
        assert_eq!(list.stats.malformed_records, 2);
    }

    #[test]
    fn test_source_malformed_rows_reach_stats() {
        let source = CountingSource {
            records: scenario_records(),
            malformed: 3,
            reads: Cell::new(0),
        };

        let list = PriceListBuilder::new(registry())
            .build_authorized(&true, &source)
            .unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list.stats.malformed_records, 3);
        assert!(list.stats.summary().contains("3 malformed"));
    }
}
