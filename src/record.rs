// 🧾 Price Record - one row of the normalized price feed
//
// One record per part × price code × quantity break × effective date.
// Source data is fixed-width, so identifiers arrive padded and are trimmed
// on ingest.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::categories::CategoryColumn;

/// Raw price record as read from the record store or a CSV export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    #[serde(rename = "partid")]
    pub part_id: String,

    /// Informational only
    #[serde(default)]
    pub sku: String,

    #[serde(rename = "price_code", alias = "catid")]
    pub price_code: String,

    #[serde(rename = "qty", alias = "order_qty")]
    pub order_qty: u32,

    pub price: f64,

    #[serde(deserialize_with = "deserialize_effective_date")]
    pub effective_date: NaiveDate,

    /// Carried through, never used by the pivot
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl PriceRecord {
    pub fn new(
        part_id: &str,
        price_code: &str,
        order_qty: u32,
        effective_date: NaiveDate,
        price: f64,
    ) -> Self {
        PriceRecord {
            part_id: part_id.to_string(),
            sku: String::new(),
            price_code: price_code.to_string(),
            order_qty,
            price,
            effective_date,
            currency: default_currency(),
        }
    }

    /// Builder: set the sku
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into();
        self
    }

    /// Trim the padded identifier fields in place
    pub fn normalize(&mut self) {
        trim_in_place(&mut self.part_id);
        trim_in_place(&mut self.price_code);
        trim_in_place(&mut self.sku);
        trim_in_place(&mut self.currency);
    }

    /// Consuming variant of `normalize`
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Column this record lands in, e.g. `DLR-1`
    pub fn column(&self) -> CategoryColumn {
        CategoryColumn::new(self.price_code.trim(), self.order_qty)
    }

    /// Grouping key, tolerant of records that skipped normalization
    pub fn part_key(&self) -> &str {
        self.part_id.trim()
    }

    /// NaN and infinite prices cannot be compared or published
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite()
    }

    /// Hash over the full record, used by the store to reject exact re-imports.
    /// Two records that differ only in price hash differently and are both kept.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.part_key(),
            self.sku.trim(),
            self.price_code.trim(),
            self.order_qty,
            self.price,
            self.effective_date,
            self.currency.trim()
        ));
        format!("{:x}", hasher.finalize())
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

/// Parse an effective date as the store and the upload sheets write it.
///
/// Accepts `2024-01-31`, `2024-01-31 00:00:00`, `2024-01-31T00:00:00` and
/// `01/31/2024`.
pub fn parse_effective_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Some(head) = raw.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
}

// ============================================================================
// RECORD BATCH
// ============================================================================

/// Records read from a source, plus the count of rows that could not be
/// turned into a record and were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub records: Vec<PriceRecord>,
    pub malformed: usize,
}

impl RecordBatch {
    pub fn new(records: Vec<PriceRecord>, malformed: usize) -> Self {
        RecordBatch { records, malformed }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn deserialize_effective_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_effective_date(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid effective date '{}'", raw)))
}
