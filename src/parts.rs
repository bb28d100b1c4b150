// 🔩 Part Enumerator - distinct part identifiers plus the "ALL" sentinel
//
// "ALL" is a picker convenience meaning "no part filter". It is never a real
// part and never reaches the snapshot selector.

use std::collections::BTreeSet;

use crate::record::PriceRecord;

/// Sentinel identifier meaning "every part"
pub const ALL_PARTS: &str = "ALL";

/// Distinct, non-blank part ids in ascending order
pub fn parts(records: &[PriceRecord]) -> BTreeSet<String> {
    records
        .iter()
        .map(PriceRecord::part_key)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// `["ALL", part ids...]` for consumers building a part picker
pub fn enumerate_with_sentinel(records: &[PriceRecord]) -> Vec<String> {
    with_sentinel(parts(records))
}

/// Prefix already-distinct ids (e.g. from the record store) with "ALL".
/// Blank ids and a stray "ALL" are dropped so the sentinel appears once.
pub fn with_sentinel<I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = vec![ALL_PARTS.to_string()];
    out.extend(
        ids.into_iter()
            .filter(|id| !id.trim().is_empty() && id.trim() != ALL_PARTS),
    );
    out
}

// ============================================================================
// PART FILTER
// ============================================================================

/// Which parts a query should cover
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PartFilter {
    /// No filter
    #[default]
    All,

    /// Only these part ids
    Only(BTreeSet<String>),
}

impl PartFilter {
    /// Interpret a raw id list: empty or led by "ALL" means no filter
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Self {
        match ids.first() {
            None => PartFilter::All,
            Some(first) if first.as_ref().trim() == ALL_PARTS => PartFilter::All,
            Some(_) => PartFilter::Only(
                ids.iter()
                    .map(|id| id.as_ref().trim().to_string())
                    .filter(|id| !id.is_empty())
                    .collect(),
            ),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, PartFilter::All)
    }

    pub fn accepts(&self, part_id: &str) -> bool {
        match self {
            PartFilter::All => true,
            PartFilter::Only(ids) => ids.contains(part_id.trim()),
        }
    }
}
