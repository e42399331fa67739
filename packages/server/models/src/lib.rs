#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API response types for the geodata server.
//!
//! Successful pivot responses are CSV and classification responses are
//! the [`CkmeansResponse`] map, so the only structured body defined here
//! besides that is the error envelope.

use geodata_models::Breaks;
use serde::{Deserialize, Serialize};

/// Content type of pivot table responses.
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Content type of classification and error responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// `category -> (geotype | geotype_min_max) -> values`.
pub type CkmeansResponse = Breaks;

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable machine-readable kind, e.g. `"missing_params"`.
    pub kind: String,
    /// Human-readable message with geotype/category/geocode context.
    pub error: String,
}

impl ApiError {
    /// Creates an error body.
    #[must_use]
    pub fn new(kind: &str, error: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            error: error.into(),
        }
    }
}
