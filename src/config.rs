// ⚙️ Settings - where the store, the lists folder and the admin password come from
//
// Precedence: CLI flag (clap also fills `--db` from PRICELIST_DB and `--lists`
// from LISTS_FOLDER), then DATABASE_URL, then defaults. The binary loads a
// `.env` file before any of this runs.

use std::path::PathBuf;

use crate::access::AdminPassword;
use crate::publish::ArtifactFormat;

pub const DEFAULT_DB_PATH: &str = "pricelist.db";
pub const DEFAULT_LISTS_FOLDER: &str = "lists";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub lists_folder: PathBuf,
    pub admin_password: Option<String>,
}

impl Settings {
    /// Resolve against the process environment
    pub fn resolve(db_flag: Option<PathBuf>, lists_flag: Option<PathBuf>) -> Self {
        Self::resolve_with(db_flag, lists_flag, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary variable lookup
    pub fn resolve_with<F>(db_flag: Option<PathBuf>, lists_flag: Option<PathBuf>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let db_path = db_flag
            .or_else(|| non_empty("DATABASE_URL").map(|url| db_path_from_url(&url)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let lists_folder = lists_flag.unwrap_or_else(|| PathBuf::from(DEFAULT_LISTS_FOLDER));

        Settings {
            db_path,
            lists_folder,
            admin_password: non_empty("ADMIN_PASSWORD"),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.lists_folder.join("output")
    }

    pub fn lookup_dir(&self) -> PathBuf {
        self.lists_folder.join("lookup")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.lists_folder.join("templates")
    }

    /// Template column mappings, `lists/schema.json`
    pub fn schema_path(&self) -> PathBuf {
        self.lists_folder.join("schema.json")
    }

    /// `lists/output/pricelist.<ext>`
    pub fn default_artifact(&self, format: ArtifactFormat) -> PathBuf {
        self.output_dir()
            .join(format!("pricelist.{}", format.extension()))
    }

    /// Gate comparing the configured password with what the caller supplied
    pub fn gate(&self, supplied: Option<String>) -> AdminPassword {
        AdminPassword::new(self.admin_password.clone(), supplied)
    }
}

/// SQLAlchemy-style URL to a file path: `sqlite:///app.db` → `app.db`,
/// `sqlite:////data/app.db` → `/data/app.db`. Plain paths pass through.
pub fn db_path_from_url(url: &str) -> PathBuf {
    let url = url.trim();
    let path = url
        .strip_prefix("sqlite:///")
        .map(str::to_string)
        .or_else(|| url.strip_prefix("sqlite://").map(str::to_string))
        .or_else(|| url.strip_prefix("sqlite:").map(str::to_string))
        .unwrap_or_else(|| url.to_string());

    PathBuf::from(path)
}
