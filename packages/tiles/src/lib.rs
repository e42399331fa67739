#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch generation of static census geodata outputs.
//!
//! Produces the files a map front end loads without a live API:
//!
//! * `breaks/<geotype>/<cat>.json`: natural breaks for each category,
//!   as a ratio against the category's table totals
//! * `<geotype>/<tile>/<cat>.csv`: one pivot table per tile bounding box
//! * a `geocode,geotype,ename,wname` lookup CSV from `GeoJSON` boundaries
//!
//! Tile and breaks generation fan out over a bounded worker pool (see
//! [`pool`]). Outputs are written atomically (`.tmp` then rename) and
//! existing files are skipped, so an interrupted run can be resumed.

pub mod breaks;
pub mod geolookup;
pub mod pool;
pub mod tileset;

use std::path::{Path, PathBuf};

use geodata::{GeodataError, QueryEngine};
use geodata_models::{CategoryCodeError, DataVersion, category::is_totals_category};

/// Triple ceiling applied to every tile query.
pub const TILE_MAX_METRICS: usize = 400_000;

/// Default number of clusters for generated breaks.
pub const DEFAULT_K: usize = 5;

/// Errors from batch generation.
#[derive(Debug, thiserror::Error)]
pub enum TilesError {
    /// File system error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// `GeoJSON` parse error.
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    /// CSV write error.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Query or classification failed.
    #[error(transparent)]
    Geodata(#[from] GeodataError),

    /// Store connection failed.
    #[error(transparent)]
    Database(#[from] geodata_database::DbError),

    /// Store error outside a query.
    #[error(transparent)]
    Store(#[from] duckdb::Error),

    /// A totals category could not be derived.
    #[error(transparent)]
    Category(#[from] CategoryCodeError),

    /// Unknown geography type name in an input file.
    #[error("Invalid geotype: {name}")]
    InvalidGeotype {
        /// The name as given.
        name: String,
    },

    /// A list file had no entries.
    #[error("Empty list: {}", path.display())]
    EmptyList {
        /// The file read.
        path: PathBuf,
    },

    /// A worker panicked or was cancelled.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Settings shared by every generation task.
#[derive(Debug, Clone)]
pub struct Generator {
    /// Output root.
    pub out_dir: PathBuf,
    /// Data version pin.
    pub version: DataVersion,
    /// Query settings.
    pub engine: QueryEngine,
    /// Number of clusters for breaks.
    pub k: usize,
}

impl Generator {
    /// Creates a generator writing under `out_dir`.
    #[must_use]
    pub fn new(out_dir: PathBuf, version: DataVersion) -> Self {
        Self {
            out_dir,
            version,
            engine: QueryEngine::new().with_max_metrics(TILE_MAX_METRICS),
            k: DEFAULT_K,
        }
    }

    /// Sets the number of clusters for breaks.
    #[must_use]
    pub const fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

/// What a single task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The output was written.
    Written(PathBuf),
    /// The output already existed.
    Exists(PathBuf),
    /// Totals categories produce no output.
    SkippedTotals(String),
}

/// Counts of task outcomes for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Files written.
    pub written: usize,
    /// Files already present.
    pub existing: usize,
    /// Totals categories skipped.
    pub skipped: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Written(_) => self.written += 1,
            TaskOutcome::Exists(_) => self.existing += 1,
            TaskOutcome::SkippedTotals(_) => self.skipped += 1,
        }
    }
}

/// Reads a newline-separated list, dropping blank lines.
///
/// # Errors
///
/// Returns [`TilesError::Io`] if the file can't be read, or
/// [`TilesError::EmptyList`] if it has no entries.
pub fn load_list(path: &Path) -> Result<Vec<String>, TilesError> {
    let text = std::fs::read_to_string(path)?;
    let items: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect();

    if items.is_empty() {
        return Err(TilesError::EmptyList {
            path: path.to_path_buf(),
        });
    }

    Ok(items)
}

/// Loads a category list, dropping totals categories.
///
/// Totals are only ever used as denominators, so they produce no files.
///
/// # Errors
///
/// See [`load_list`].
pub fn load_categories(path: &Path) -> Result<Vec<String>, TilesError> {
    let mut categories = load_list(path)?;
    let before = categories.len();
    categories.retain(|cat| !is_totals_category(cat));

    if categories.len() < before {
        log::info!(
            "Skipping {} totals categories",
            before - categories.len()
        );
    }

    Ok(categories)
}

/// Writes `contents` to `path` via a `.tmp` sibling and a rename, creating
/// parent directories as needed.
///
/// # Errors
///
/// Returns [`TilesError::Io`] if any file operation fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), TilesError> {
    if let Some(parent) = path.parent() {
        geodata_database::paths::ensure_dir(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_drops_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cats.txt");
        std::fs::write(&path, "QS101EW0001\n\nQS101EW0002\n  \nQS102EW0003\n").unwrap();

        assert_eq!(
            load_list(&path).unwrap(),
            vec!["QS101EW0001", "QS101EW0002", "QS102EW0003"]
        );
        assert_eq!(
            load_categories(&path).unwrap(),
            vec!["QS101EW0002", "QS102EW0003"]
        );
    }

    #[test]
    fn empty_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cats.txt");
        std::fs::write(&path, "\n\n").unwrap();

        assert!(matches!(
            load_list(&path),
            Err(TilesError::EmptyList { .. })
        ));
    }

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breaks").join("LAD").join("QS101EW0002.json");

        write_atomic(&path, b"{}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        assert!(!dir.path().join("breaks/LAD/QS101EW0002.json.tmp").exists());
    }
}
