use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use pricelist_pivot::access::AccessGate;
use pricelist_pivot::templates;
use pricelist_pivot::upload::{self, UploadWindow};
use pricelist_pivot::{
    find_parts, get_events_by_kind, get_recent_events, insert_price_records, list_parts,
    list_price_codes, load_csv, query_items, record_event, setup_database, verify_count,
    with_sentinel, AdminPassword, ArtifactFormat, CategoryRegistry, EventKind, FileArtifact,
    LookupTable, PriceList, PriceListBuilder, PriceListSink, Settings, SqliteSink, SqliteSource,
    ALL_PARTS,
};

#[derive(Parser, Debug)]
#[command(name = "pricelist", version, about = "Latest-wins price list builder")]
struct Cli {
    /// SQLite record store, falls back to DATABASE_URL
    #[arg(long, global = true, env = "PRICELIST_DB")]
    db: Option<PathBuf>,

    /// Lists folder holding output/, lookup/, templates/ and schema.json
    #[arg(long, global = true, env = "LISTS_FOLDER")]
    lists: Option<PathBuf>,

    /// Admin password for commands that write prices
    #[arg(long, global = true, env = "PRICELIST_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a price export CSV into the record store
    Import { csv: PathBuf },

    /// Convert a wide upload sheet into long upload rows
    Convert {
        sheet: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// First day the prices apply (YYYY-MM-DD)
        #[arg(long)]
        effective_date: String,

        /// Last day the prices apply, defaults to the end of that year
        #[arg(long)]
        end_date: Option<String>,

        /// Also import the converted rows into the record store
        #[arg(long)]
        import: bool,
    },

    /// List part ids
    Parts {
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show the registry columns and the price codes present in the store
    Categories,

    /// Raw price records for some parts and/or price codes
    Items {
        #[arg(long = "part")]
        parts: Vec<String>,

        #[arg(long = "code")]
        codes: Vec<String>,

        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// Build and publish the price list
    Build {
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// Artifact path, defaults to <lists>/output/pricelist.<ext>
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also replace the materialized list in the record store
        #[arg(long)]
        store: bool,

        /// Folder with the description lookup CSV, defaults to <lists>/lookup
        #[arg(long)]
        lookup_dir: Option<PathBuf>,
    },

    /// Build the price list and fill every described template with it
    Generate {
        /// Defaults to <lists>/templates
        #[arg(long)]
        templates_dir: Option<PathBuf>,

        /// Defaults to <lists>/schema.json
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Defaults to <lists>/output
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Defaults to <lists>/lookup
        #[arg(long)]
        lookup_dir: Option<PathBuf>,
    },

    /// Write schema.json entries from the template headers
    Schemas {
        /// Defaults to <lists>/templates
        #[arg(long)]
        templates_dir: Option<PathBuf>,

        /// Defaults to <lists>/schema.json
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep templates with no readable header
        #[arg(long)]
        include_empty: bool,

        /// Ignore mappings already in the output file
        #[arg(long)]
        fresh: bool,
    },

    /// Recent audit events
    Events {
        /// records_imported, price_list_built or exports_generated
        #[arg(long)]
        kind: Option<EventKind>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for ArtifactFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => ArtifactFormat::Csv,
            Format::Json => ArtifactFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::resolve(cli.db.clone(), cli.lists.clone());
    let gate = settings.gate(cli.admin_password.clone());

    match cli.command {
        Command::Import { csv } => run_import(&settings, &gate, &csv),
        Command::Convert {
            sheet,
            output,
            effective_date,
            end_date,
            import,
        } => {
            let effective = upload::parse_window_date(&effective_date)?;
            let window = match end_date {
                Some(end) => UploadWindow::new(effective, upload::parse_window_date(&end)?)?,
                None => UploadWindow::through_year_end(effective),
            };
            run_convert(&settings, &gate, &sheet, &output, window, import)
        }
        Command::Parts { prefix, limit } => run_parts(&settings, prefix.as_deref(), limit),
        Command::Categories => run_categories(&settings),
        Command::Items { parts, codes, limit } => run_items(&settings, &parts, &codes, limit),
        Command::Build {
            format,
            output,
            store,
            lookup_dir,
        } => {
            let format = ArtifactFormat::from(format);
            let output = output.unwrap_or_else(|| settings.default_artifact(format));
            let lookup_dir = lookup_dir.unwrap_or_else(|| settings.lookup_dir());
            run_build(&settings, &gate, format, &output, store, &lookup_dir)
        }
        Command::Generate {
            templates_dir,
            schema,
            output_dir,
            lookup_dir,
        } => {
            let paths = ExportPaths {
                templates_dir: templates_dir.unwrap_or_else(|| settings.templates_dir()),
                schema: schema.unwrap_or_else(|| settings.schema_path()),
                output_dir: output_dir.unwrap_or_else(|| settings.output_dir()),
                lookup_dir: lookup_dir.unwrap_or_else(|| settings.lookup_dir()),
            };
            run_generate(&settings, &gate, &paths)
        }
        Command::Schemas {
            templates_dir,
            output,
            include_empty,
            fresh,
        } => {
            let templates_dir = templates_dir.unwrap_or_else(|| settings.templates_dir());
            let output = output.unwrap_or_else(|| settings.schema_path());
            run_schemas(&templates_dir, &output, include_empty, fresh)
        }
        Command::Events { kind, limit } => run_events(&settings, kind, limit),
    }
}

fn open_store(settings: &Settings) -> Result<Connection> {
    let conn = Connection::open(&settings.db_path)
        .with_context(|| format!("Failed to open database: {}", settings.db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn authorize(gate: &AdminPassword) -> Result<()> {
    pricelist_pivot::require(gate).map_err(|e| {
        if gate.is_configured() {
            eprintln!("❌ Not authorized. --admin-password is missing or does not match.");
        } else {
            eprintln!("❌ Not authorized. ADMIN_PASSWORD is not set, so price writes are disabled.");
        }
        e.into()
    })
}

fn run_import(settings: &Settings, gate: &AdminPassword, csv_path: &Path) -> Result<()> {
    println!("🗄️  Price Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    authorize(gate)?;

    println!("\n📂 Loading CSV...");
    let batch = load_csv(csv_path)?;
    println!("✓ Loaded {} price records from {}", batch.len(), csv_path.display());
    if batch.malformed > 0 {
        println!("⚠️  Skipped {} malformed rows", batch.malformed);
    }

    let conn = open_store(settings)?;
    import_records(&conn, &batch.records, &csv_path.display().to_string())
}

fn import_records(conn: &Connection, records: &[pricelist_pivot::PriceRecord], origin: &str) -> Result<()> {
    println!("\n💾 Inserting price records...");
    let inserted = insert_price_records(conn, records)?;

    let count = verify_count(conn)?;
    record_event(
        conn,
        EventKind::RecordsImported,
        origin,
        serde_json::json!({
            "read": records.len(),
            "inserted": inserted,
            "duplicates": records.len() - inserted,
        }),
        "cli",
    )?;

    println!("✓ Inserted {} new records ({} already present)", inserted, records.len() - inserted);
    println!("✓ Database contains {} price records", count);
    Ok(())
}

fn run_convert(
    settings: &Settings,
    gate: &AdminPassword,
    sheet: &Path,
    output: &Path,
    window: UploadWindow,
    import: bool,
) -> Result<()> {
    println!("🔄 Price Upload Conversion");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if import {
        authorize(gate)?;
    }

    let rows = upload::read_upload_sheet_file(sheet)?;
    println!("✓ Read {} parts from {}", rows.len(), sheet.display());

    let converted = upload::convert(&rows, window);
    upload::write_upload_csv(&converted, output)?;
    println!("✓ Wrote {} upload rows to {}", converted.len(), output.display());

    if import {
        let records = converted
            .iter()
            .map(upload::UploadRow::to_price_record)
            .collect::<Result<Vec<_>>>()?;
        let conn = open_store(settings)?;
        import_records(&conn, &records, &sheet.display().to_string())?;
    }

    Ok(())
}

fn run_parts(settings: &Settings, prefix: Option<&str>, limit: usize) -> Result<()> {
    let conn = open_store(settings)?;

    let ids = match prefix {
        Some(prefix) => find_parts(&conn, prefix, limit)?,
        None => with_sentinel(list_parts(&conn)?),
    };

    for id in &ids {
        println!("{}", id);
    }
    Ok(())
}

fn run_categories(settings: &Settings) -> Result<()> {
    let registry = CategoryRegistry::with_defaults();

    println!("📋 Published columns ({}):", registry.len());
    println!("   {}", registry.labels().join(", "));

    let conn = open_store(settings)?;
    let codes = list_price_codes(&conn)?;
    println!("\n🏷️  Price codes in store ({}):", codes.len());
    for code in &codes {
        let marker = if registry.is_known_code(code) { "✓" } else { "⚠️  not published" };
        println!("   {} {}", code, marker);
    }
    Ok(())
}

fn run_items(settings: &Settings, parts: &[String], codes: &[String], limit: usize) -> Result<()> {
    if parts.is_empty() && codes.is_empty() {
        bail!("Pass at least one --part or --code (use --part {} for every part)", ALL_PARTS);
    }

    let conn = open_store(settings)?;
    let records = query_items(&conn, parts, codes, limit)?;

    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for record in &records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_build(
    settings: &Settings,
    gate: &AdminPassword,
    format: ArtifactFormat,
    output: &Path,
    store: bool,
    lookup_dir: &Path,
) -> Result<()> {
    println!("🏗️  Price List Build - latest-wins snapshot per part");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    authorize(gate)?;

    let conn = open_store(settings)?;
    let lookup = LookupTable::load_dir(lookup_dir)?;
    let list = build_list(&conn, gate, &lookup)?;

    let build_id = uuid::Uuid::new_v4().to_string();

    let artifact = FileArtifact::new(output, format);
    artifact.publish(&list)?;
    println!("✓ Published {} rows to {}", list.len(), artifact.target());

    if store {
        let sink = SqliteSink::new(&conn, build_id.clone());
        sink.publish(&list)?;
        println!("✓ Stored {} rows in {}", list.len(), sink.target());
    }

    record_event(
        &conn,
        EventKind::PriceListBuilt,
        &build_id,
        serde_json::json!({
            "artifact": output.display().to_string(),
            "stored": store,
            "stats": list.stats,
        }),
        "cli",
    )?;

    println!("\n🎉 Price list ready ({} columns)", list.columns.len());
    Ok(())
}

/// Gated build from the store, with descriptions filled from the lookup
fn build_list(conn: &Connection, gate: &dyn AccessGate, lookup: &LookupTable) -> Result<PriceList> {
    let mut list = PriceListBuilder::default().build_authorized(gate, &SqliteSource::new(conn))?;
    println!("✓ {}", list.stats.summary());

    if !list.stats.unknown_columns.is_empty() {
        let unknown: Vec<&str> = list.stats.unknown_columns.iter().map(String::as_str).collect();
        println!("⚠️  Dropped unpublished columns: {}", unknown.join(", "));
    }
    if list.stats.malformed_records > 0 {
        println!("⚠️  Skipped {} malformed price rows", list.stats.malformed_records);
    }

    let described = lookup.enrich(&mut list);
    if !lookup.is_empty() {
        println!("✓ Descriptions filled for {} of {} parts", described, list.len());
    }

    Ok(list)
}

struct ExportPaths {
    templates_dir: PathBuf,
    schema: PathBuf,
    output_dir: PathBuf,
    lookup_dir: PathBuf,
}

fn run_generate(settings: &Settings, gate: &AdminPassword, paths: &ExportPaths) -> Result<()> {
    println!("🧩 Templated Exports - price list → customer sheets");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    authorize(gate)?;

    let schemas = templates::load_schemas(&paths.schema)?;
    println!("✓ Loaded {} schema entries from {}", schemas.len(), paths.schema.display());

    let conn = open_store(settings)?;
    let lookup = LookupTable::load_dir(&paths.lookup_dir)?;
    let list = build_list(&conn, gate, &lookup)?;

    let report = templates::generate_exports(&paths.templates_dir, &schemas, &list, &lookup, &paths.output_dir)?;
    for file in &report.written {
        println!("✓ {} ({} rows)", file.path.display(), file.rows);
    }
    for skipped in &report.skipped {
        println!("⚠️  No schema entry for {}, skipped", skipped);
    }

    record_event(
        &conn,
        EventKind::ExportsGenerated,
        &paths.output_dir.display().to_string(),
        serde_json::json!({
            "written": report.written.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>(),
            "skipped": report.skipped,
            "rows": list.len(),
        }),
        "cli",
    )?;

    println!("\n🎉 Wrote {} export files", report.written.len());
    Ok(())
}

fn run_schemas(templates_dir: &Path, output: &Path, include_empty: bool, fresh: bool) -> Result<()> {
    let existing = if !fresh && output.exists() {
        templates::load_schemas(output)?
    } else {
        Vec::new()
    };

    let schemas = templates::generate_schemas(templates_dir, include_empty, &existing)?;
    templates::save_schemas(output, &schemas)?;
    println!("✓ Wrote {} entries to {}", schemas.len(), output.display());
    Ok(())
}

fn run_events(settings: &Settings, kind: Option<EventKind>, limit: usize) -> Result<()> {
    let conn = open_store(settings)?;
    let events = match kind {
        Some(kind) => get_events_by_kind(&conn, kind, limit)?,
        None => get_recent_events(&conn, limit)?,
    };

    if events.is_empty() {
        println!("No events yet");
    }
    for event in &events {
        println!(
            "{}  {:<18} {}  {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.kind,
            event.subject,
            event.data
        );
    }
    Ok(())
}
