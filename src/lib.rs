// Price List Pivot - Core Library
// Exposes all modules for use in the CLI and in tests

pub mod error;
pub mod record;
pub mod categories;
pub mod parts;
pub mod snapshot;     // Latest-wins date per part
pub mod pivot;        // category × qty → registry columns
pub mod price_list;
pub mod access;
pub mod source;
pub mod publish;
pub mod db;
pub mod lookup;       // Description enrichment
pub mod upload;       // Wide upload sheet → long price rows
pub mod templates;    // Customer sheets filled from the price list
pub mod config;

// Re-export commonly used types
pub use error::{BuildError, CategoryError, Result};
pub use record::{parse_effective_date, PriceRecord, RecordBatch};
pub use categories::{CategoryColumn, CategoryRegistry, DEFAULT_COLUMNS};
pub use parts::{enumerate_with_sentinel, parts, with_sentinel, PartFilter, ALL_PARTS};
pub use snapshot::{select_snapshot, snapshot_records, PartSnapshot};
pub use pivot::{project, Projection};
pub use price_list::{build, BuildStats, PriceCell, PriceList, PriceListBuilder, PriceListRow};
pub use access::{require, AccessGate, AdminPassword};
pub use source::{CsvSource, RecordSource, SqliteSource};
pub use publish::{render_csv, write_atomic, ArtifactFormat, FileArtifact, PriceListSink, SqliteSink};
pub use db::{
    Event, EventKind,
    load_csv, setup_database, insert_price_records, get_all_price_records,
    verify_count, list_parts, list_price_codes, find_parts, query_items,
    replace_generated_list, get_generated_list,
    insert_event, record_event, get_recent_events, get_events_by_kind,
};
pub use lookup::{LookupEntry, LookupTable};
pub use upload::{convert, read_upload_sheet, SheetRow, UploadRow, UploadWindow, UPLOAD_TIERS};
pub use templates::{
    generate_exports, generate_schemas, load_schemas, save_schemas, ColumnMapping, ExportReport,
    TemplateSchema,
};
pub use config::Settings;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
