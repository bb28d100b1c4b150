// 🔀 Pivot Projector - spread a snapshot across the registry columns
//
// Each record lands in the cell for its `code-qty` column. Columns outside the
// registry are dropped. Two records in the same cell keep the higher price.
// The projection is total: it cannot fail on a well-formed snapshot.

use crate::categories::{CategoryColumn, CategoryRegistry};
use crate::record::PriceRecord;

/// One price list row's worth of cells, in registry order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// One cell per registry column; None means "no price"
    pub cells: Vec<Option<f64>>,

    /// Labels of records dropped because their column is not registered
    pub unknown: Vec<String>,

    /// Records that landed on an already filled cell
    pub collisions: usize,
}

impl Projection {
    /// Cell for a column, or None if the column is not registered
    pub fn get(&self, registry: &CategoryRegistry, column: &CategoryColumn) -> Option<Option<f64>> {
        registry.position(column).map(|idx| self.cells[idx])
    }

    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

/// Project snapshot records onto the registry columns
pub fn project(records: &[&PriceRecord], registry: &CategoryRegistry) -> Projection {
    let mut projection = Projection {
        cells: vec![None; registry.len()],
        unknown: Vec::new(),
        collisions: 0,
    };

    for record in records {
        let code = record.price_code.trim();
        let Some(idx) = registry.position_of(code, record.order_qty) else {
            projection.unknown.push(record.column().label());
            continue;
        };

        let cell = &mut projection.cells[idx];
        *cell = match *cell {
            None => Some(record.price),
            Some(existing) => {
                projection.collisions += 1;
                Some(existing.max(record.price))
            }
        };
    }

    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(code: &str, qty: u32, price: f64) -> PriceRecord {
        PriceRecord::new("P1", code, qty, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), price)
    }

    fn registry() -> CategoryRegistry {
        CategoryRegistry::from_labels(&["DLR-1", "GLD-250"]).unwrap()
    }

    #[test]
    fn test_project_fills_matching_cells() {
        let records = [record("DLR", 1, 8.50), record("GLD", 250, 7.25)];
        let refs: Vec<&PriceRecord> = records.iter().collect();

        let projection = project(&refs, &registry());
        assert_eq!(projection.cells, vec![Some(8.50), Some(7.25)]);
        assert_eq!(projection.filled(), 2);
        assert!(projection.unknown.is_empty());
    }

    #[test]
    fn test_project_missing_column_is_null() {
        let records = [record("DLR", 1, 8.50)];
        let refs: Vec<&PriceRecord> = records.iter().collect();
        let registry = registry();

        let projection = project(&refs, &registry);
        assert_eq!(projection.get(&registry, &CategoryColumn::new("GLD", 250)), Some(None));
        assert_eq!(projection.get(&registry, &CategoryColumn::new("XYZ", 1)), None);
    }

    #[test]
    fn test_project_collision_keeps_max() {
        let records = [record("DLR", 1, 10.00), record("DLR", 1, 12.50), record("DLR", 1, 11.00)];
        let refs: Vec<&PriceRecord> = records.iter().collect();

        let projection = project(&refs, &registry());
        assert_eq!(projection.cells[0], Some(12.50));
        assert_eq!(projection.collisions, 2);
    }

    #[test]
    fn test_project_drops_unknown_categories() {
        let records = [record("XYZ", 1, 1.00), record("DLR", 6, 2.00), record(" DLR ", 1, 3.00)];
        let refs: Vec<&PriceRecord> = records.iter().collect();

        let projection = project(&refs, &registry());
        assert_eq!(projection.cells, vec![Some(3.00), None]);
        assert_eq!(projection.unknown, vec!["XYZ-1", "DLR-6"]);
    }

    #[test]
    fn test_project_empty_registry() {
        let records = [record("DLR", 1, 1.00)];
        let refs: Vec<&PriceRecord> = records.iter().collect();

        let projection = project(&refs, &CategoryRegistry::new(Vec::new()));
        assert!(projection.cells.is_empty());
        assert_eq!(projection.unknown.len(), 1);
    }
}
