#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` store for census geodata.
//!
//! The store holds one fact row per (geography, category, data version)
//! observation in `geo_metric`, plus lookup tables for geographies,
//! geography types, categories, and data versions. Geography envelopes
//! and centroids are plain `DOUBLE` columns so bounding-box and radius
//! filters run without extensions; boundaries are kept as WKB blobs for
//! the `spatial` extension's polygon tests.

pub mod load;
pub mod paths;
pub mod pool;

use std::path::Path;

use duckdb::{AccessMode, Config, Connection};

pub use pool::DuckDbPool;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Opens (or creates) the store at `path` and ensures the schema exists.
///
/// # Errors
///
/// Returns [`DbError`] if the directory, connection, or schema creation
/// fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;

    Ok(conn)
}

/// Opens an existing store read-only. The schema is not touched.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened.
pub fn open_read_only(path: &Path) -> Result<Connection, DbError> {
    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Opens a fresh in-memory store with the schema applied.
///
/// Clones made with [`Connection::try_clone`] share the same database.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Creates the store tables if they don't exist.
///
/// `geo_metric` has no primary key: duplicate (geography, category,
/// version) rows are allowed and surface as duplicate triples.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS geo_type_id_seq;
         CREATE SEQUENCE IF NOT EXISTS geo_id_seq;
         CREATE SEQUENCE IF NOT EXISTS nomis_category_id_seq;
         CREATE SEQUENCE IF NOT EXISTS data_ver_id_seq;

         CREATE TABLE IF NOT EXISTS geo_type (
            id INTEGER PRIMARY KEY DEFAULT nextval('geo_type_id_seq'),
            name TEXT NOT NULL UNIQUE
         );

         CREATE TABLE IF NOT EXISTS geo (
            id INTEGER PRIMARY KEY DEFAULT nextval('geo_id_seq'),
            type_id INTEGER NOT NULL,
            code TEXT NOT NULL UNIQUE,
            name TEXT,
            welsh_name TEXT,
            valid BOOLEAN NOT NULL DEFAULT TRUE,
            min_lon DOUBLE,
            min_lat DOUBLE,
            max_lon DOUBLE,
            max_lat DOUBLE,
            centroid_lon DOUBLE,
            centroid_lat DOUBLE,
            wkb_geometry BLOB
         );

         CREATE TABLE IF NOT EXISTS nomis_category (
            id INTEGER PRIMARY KEY DEFAULT nextval('nomis_category_id_seq'),
            long_nomis_code TEXT NOT NULL,
            year INTEGER NOT NULL,
            UNIQUE (long_nomis_code, year)
         );

         CREATE TABLE IF NOT EXISTS data_ver (
            id INTEGER PRIMARY KEY DEFAULT nextval('data_ver_id_seq'),
            census_year INTEGER NOT NULL,
            ver_string TEXT NOT NULL,
            UNIQUE (census_year, ver_string)
         );

         CREATE TABLE IF NOT EXISTS geo_metric (
            geo_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            data_ver_id INTEGER NOT NULL,
            metric DOUBLE NOT NULL
         );

         CREATE INDEX IF NOT EXISTS geo_metric_category_idx
            ON geo_metric (category_id, data_ver_id);",
    )?;

    Ok(())
}

/// Installs and loads the `DuckDB` `spatial` extension on `conn`.
///
/// Required only for polygon filters. `INSTALL` downloads the extension
/// the first time it runs on a machine.
///
/// # Errors
///
/// Returns [`DbError`] if the extension cannot be installed or loaded.
pub fn enable_spatial(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch("INSTALL spatial; LOAD spatial;")?;
    log::info!("DuckDB spatial extension loaded");
    Ok(())
}
