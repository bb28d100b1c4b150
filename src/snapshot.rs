// ⏰ Snapshot Selector - latest-wins per part
//
// A part's authoritative date is the maximum effective date among its own
// records. Every record at that date belongs to the snapshot (one per column
// in the normal case); older records are superseded. Dates are chosen per
// part, never globally.

use chrono::NaiveDate;

use crate::record::PriceRecord;

/// Authoritative effective date for `part_id`, or None when it has no records
pub fn select_snapshot(records: &[PriceRecord], part_id: &str) -> Option<NaiveDate> {
    let part_id = part_id.trim();
    records
        .iter()
        .filter(|r| r.part_key() == part_id)
        .map(|r| r.effective_date)
        .max()
}

/// All of the part's records at its authoritative date
pub fn snapshot_records<'a>(records: &'a [PriceRecord], part_id: &str) -> Vec<&'a PriceRecord> {
    let Some(date) = select_snapshot(records, part_id) else {
        return Vec::new();
    };
    let part_id = part_id.trim();
    records
        .iter()
        .filter(|r| r.part_key() == part_id && r.effective_date == date)
        .collect()
}

// ============================================================================
// PART SNAPSHOT
// ============================================================================

/// Snapshot of one part, taken from records already grouped by part
#[derive(Debug, Clone)]
pub struct PartSnapshot<'a> {
    pub part_id: &'a str,

    /// Authoritative date
    pub effective_date: NaiveDate,

    /// Records at the authoritative date
    pub records: Vec<&'a PriceRecord>,

    /// Records at earlier dates, left out of the snapshot
    pub superseded: usize,
}

impl<'a> PartSnapshot<'a> {
    /// Take the snapshot of a part's record group. Empty groups yield None.
    pub fn from_group(part_id: &'a str, group: &[&'a PriceRecord]) -> Option<Self> {
        let effective_date = group.iter().map(|r| r.effective_date).max()?;

        let records: Vec<&'a PriceRecord> = group
            .iter()
            .copied()
            .filter(|r| r.effective_date == effective_date)
            .collect();
        let superseded = group.len() - records.len();

        Some(PartSnapshot {
            part_id,
            effective_date,
            records,
            superseded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_records() -> Vec<PriceRecord> {
        vec![
            PriceRecord::new("P1", "DLR", 1, date(2024, 1, 1), 9.99),
            PriceRecord::new("P1", "DLR", 1, date(2024, 2, 1), 8.50),
            PriceRecord::new("P1", "GLD", 250, date(2024, 2, 1), 7.25),
            PriceRecord::new("P2", "GLD", 250, date(2024, 1, 15), 100.00),
        ]
    }

    #[test]
    fn test_select_snapshot_latest_wins() {
        let records = sample_records();

        assert_eq!(select_snapshot(&records, "P1"), Some(date(2024, 2, 1)));
        assert_eq!(select_snapshot(&records, "P2"), Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_select_snapshot_without_records() {
        let records = sample_records();
        assert_eq!(select_snapshot(&records, "P9"), None);
        assert!(snapshot_records(&records, "P9").is_empty());
    }

    #[test]
    fn test_snapshot_keeps_every_record_at_max_date() {
        let records = sample_records();
        let snapshot = snapshot_records(&records, " P1 ");

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.effective_date == date(2024, 2, 1)));
    }

    #[test]
    fn test_part_snapshot_counts_superseded() {
        let records = sample_records();
        let group: Vec<&PriceRecord> = records.iter().filter(|r| r.part_id == "P1").collect();

        let snapshot = PartSnapshot::from_group("P1", &group).unwrap();
        assert_eq!(snapshot.effective_date, date(2024, 2, 1));
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.superseded, 1);

        assert!(PartSnapshot::from_group("P9", &[]).is_none());
    }
}
