// 🏷️ Category Registry - the closed, ordered set of price list columns
//
// A column is a price code plus a quantity break ("DLR-1", "GLD-250").
// The registry is hard-coded: the published layout must not shift when a new
// price code shows up in the feed. Codes outside the registry are dropped by
// the pivot and counted, never turned into new columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CategoryError;

// ============================================================================
// CATEGORY COLUMN
// ============================================================================

/// One price list column: `price_code-order_qty`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CategoryColumn {
    /// Pricing tier code (e.g., "DLR", "GLD", "RTL")
    pub code: String,

    /// Minimum order quantity for this tier
    pub qty: u32,
}

impl CategoryColumn {
    pub fn new(code: impl Into<String>, qty: u32) -> Self {
        CategoryColumn {
            code: code.into(),
            qty,
        }
    }

    /// Column label as it appears in the published header
    pub fn label(&self) -> String {
        self.to_string()
    }

    pub fn matches(&self, code: &str, qty: u32) -> bool {
        self.qty == qty && self.code == code
    }
}

impl fmt::Display for CategoryColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.code, self.qty)
    }
}

impl FromStr for CategoryColumn {
    type Err = CategoryError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();
        let (code, qty) = label
            .rsplit_once('-')
            .ok_or_else(|| CategoryError::MissingSeparator(label.to_string()))?;

        let code = code.trim();
        if code.is_empty() {
            return Err(CategoryError::EmptyCode(label.to_string()));
        }

        let qty = qty.trim();
        let qty: u32 = qty.parse().map_err(|_| CategoryError::InvalidQuantity {
            label: label.to_string(),
            qty: qty.to_string(),
        })?;

        Ok(CategoryColumn::new(code, qty))
    }
}

// ============================================================================
// DEFAULT LAYOUT
// ============================================================================

/// Published column layout, in header order.
///
/// Matches the tiers produced by the price upload sheet (see `upload`).
pub const DEFAULT_COLUMNS: [(&str, u32); 18] = [
    ("RTL", 1),
    ("MAP", 1),
    ("DST", 1),
    ("DLR", 1),
    ("DLR", 6),
    ("DLR", 25),
    ("DLR", 100),
    ("DLR", 250),
    ("GLD", 1),
    ("GLD", 250),
    ("PLT", 1),
    ("PMR", 1),
    ("PMR", 25),
    ("PMR", 100),
    ("PMR", 250),
    ("SIL", 1),
    ("SIL", 100),
    ("SIL", 250),
];

// ============================================================================
// CATEGORY REGISTRY
// ============================================================================

/// Ordered set of columns the price list must contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRegistry {
    columns: Vec<CategoryColumn>,
}

impl CategoryRegistry {
    /// Build a registry from an explicit column list.
    /// Duplicates keep their first position.
    pub fn new(columns: impl IntoIterator<Item = CategoryColumn>) -> Self {
        let mut registry = CategoryRegistry {
            columns: Vec::new(),
        };
        for column in columns {
            registry.register(column);
        }
        registry
    }

    /// Registry with the published default layout
    pub fn with_defaults() -> Self {
        CategoryRegistry::new(
            DEFAULT_COLUMNS
                .iter()
                .map(|(code, qty)| CategoryColumn::new(*code, *qty)),
        )
    }

    /// Build a registry from labels such as `["DLR-1", "GLD-250"]`
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, CategoryError> {
        let columns = labels
            .iter()
            .map(|label| label.as_ref().parse::<CategoryColumn>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CategoryRegistry::new(columns))
    }

    fn register(&mut self, column: CategoryColumn) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    /// Columns in header order
    pub fn columns(&self) -> &[CategoryColumn] {
        &self.columns
    }

    pub fn labels(&self) -> Vec<String> {
        self.columns.iter().map(CategoryColumn::label).collect()
    }

    pub fn contains(&self, column: &CategoryColumn) -> bool {
        self.position(column).is_some()
    }

    pub fn position(&self, column: &CategoryColumn) -> Option<usize> {
        self.position_of(&column.code, column.qty)
    }

    /// Column index for a raw code/quantity pair, without allocating a column
    pub fn position_of(&self, code: &str, qty: u32) -> Option<usize> {
        self.columns.iter().position(|c| c.matches(code, qty))
    }

    /// Distinct known price codes, in first-seen registry order
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        for column in &self.columns {
            if !codes.contains(&column.code.as_str()) {
                codes.push(column.code.as_str());
            }
        }
        codes
    }

    pub fn is_known_code(&self, code: &str) -> bool {
        self.columns.iter().any(|c| c.code == code)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_layout() {
        let registry = CategoryRegistry::with_defaults();

        assert_eq!(registry.len(), 18);
        assert_eq!(registry.columns()[0].label(), "RTL-1");
        assert_eq!(registry.columns()[17].label(), "SIL-250");
        assert_eq!(
            registry.codes(),
            vec!["RTL", "MAP", "DST", "DLR", "GLD", "PLT", "PMR", "SIL"]
        );
    }

    #[test]
    fn test_parse_and_display_round_trip() {
        let column: CategoryColumn = "DLR-250".parse().unwrap();
        assert_eq!(column, CategoryColumn::new("DLR", 250));
        assert_eq!(column.to_string(), "DLR-250");
    }

    #[test]
    fn test_parse_rejects_malformed_labels() {
        assert_eq!(
            "DLR".parse::<CategoryColumn>(),
            Err(CategoryError::MissingSeparator("DLR".to_string()))
        );
        assert_eq!(
            "-1".parse::<CategoryColumn>(),
            Err(CategoryError::EmptyCode("-1".to_string()))
        );
        assert!(matches!(
            "DLR-ten".parse::<CategoryColumn>(),
            Err(CategoryError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let registry = CategoryRegistry::from_labels(&["GLD-250", "DLR-1", "GLD-250"]).unwrap();

        assert_eq!(registry.labels(), vec!["GLD-250", "DLR-1"]);
        assert_eq!(registry.position(&CategoryColumn::new("DLR", 1)), Some(1));
    }

    #[test]
    fn test_membership() {
        let registry = CategoryRegistry::from_labels(&["DLR-1", "GLD-250"]).unwrap();

        assert!(registry.contains(&CategoryColumn::new("DLR", 1)));
        assert!(!registry.contains(&CategoryColumn::new("DLR", 6)));
        assert!(registry.is_known_code("GLD"));
        assert!(!registry.is_known_code("XYZ"));
        assert_eq!(registry.position_of("XYZ", 1), None);
    }
}
