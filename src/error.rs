// ⚠️ Error taxonomy for the price list build
//
// Only two things halt a build: the caller is not authorized, or the record
// source cannot be read. Publishing can fail too, but never leaves a partial
// artifact behind. Per-record anomalies (unknown categories, duplicate cells,
// parts without data) are absorbed and counted in BuildStats instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a price list build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The capability gate refused the caller. Nothing was read or written.
    #[error("price list build refused: caller is not authorized")]
    Unauthorized,

    /// The raw record source could not be read.
    #[error("record source unavailable ({source_name}): {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// The new artifact could not be written. The previous one is untouched.
    #[error("failed to publish price list to {target}: {source}")]
    Publish {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The materialized list could not be stored.
    #[error("failed to store price list: {0}")]
    Store(String),
}

impl BuildError {
    pub fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        BuildError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors from parsing a `CODE-QTY` column label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("category column '{0}' has no '-' separator")]
    MissingSeparator(String),

    #[error("category column '{0}' has an empty price code")]
    EmptyCode(String),

    #[error("category column '{label}' has an invalid quantity '{qty}'")]
    InvalidQuantity { label: String, qty: String },
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BuildError::source_unavailable("sqlite:prices.db", "no such table");
        assert_eq!(
            err.to_string(),
            "record source unavailable (sqlite:prices.db): no such table"
        );

        let err = CategoryError::InvalidQuantity {
            label: "DLR-x".to_string(),
            qty: "x".to_string(),
        };
        assert_eq!(err.to_string(), "category column 'DLR-x' has an invalid quantity 'x'");
    }
}
