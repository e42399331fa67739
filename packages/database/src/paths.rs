//! Canonical file paths for the geodata data directory.
//!
//! All paths are relative to the project root's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`. Falls back to the
/// manifest directory itself if it has fewer than two ancestors.
#[must_use]
pub fn project_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.ancestors().nth(2).unwrap_or(manifest).to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the default path of the geodata `DuckDB` file.
#[must_use]
pub fn default_db_path() -> PathBuf {
    data_dir().join("geodata.duckdb")
}

/// Returns the `data/generated/` directory for breaks and tile output.
#[must_use]
pub fn generated_dir() -> PathBuf {
    data_dir().join("generated")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_lives_under_data_dir() {
        let path = default_db_path();
        assert!(path.starts_with(data_dir()));
        assert_eq!(path.file_name().unwrap(), "geodata.duckdb");
    }

    #[test]
    fn ensure_dir_accepts_empty_parent() {
        ensure_dir(Path::new("")).unwrap();
    }
}
