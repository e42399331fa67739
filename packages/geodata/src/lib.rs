#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Query and classification core for census geodata.
//!
//! Requests select geographies and categories with a small selector
//! language (exact codes and `START...END` ranges), optionally narrowed by
//! geography type and one spatial filter. The selection is compiled into
//! a store predicate, executed as a forward-only stream of
//! (geography, category, value) triples, and folded into either a pivot
//! table or a natural-breaks classification.
//!
//! Nothing here sorts in the store or materializes a full result set
//! before checking limits: the pivot assembler enforces its ceiling
//! per triple and the classification engine loads one
//! (geography type, category) metric set at a time into reused scratch.

pub mod ckmeans;
pub mod classify;
pub mod fingerprint;
pub mod params;
pub mod pivot;
pub mod predicate;
pub mod reader;
pub mod selector;
pub mod spatial;

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use duckdb::Connection;
use geodata_models::Breaks;

pub use ckmeans::CkmeansError;
pub use classify::{ClassifyRequest, MetricScratch, MetricSource};
pub use params::QueryParams;
pub use pivot::{PivotAssembler, PivotTable, Ratios, TableRequest};
pub use predicate::{Predicate, PredicateBuilder, QueryValue};
pub use reader::TripleReader;

/// Convenience alias for results in this crate.
pub type Result<T, E = GeodataError> = std::result::Result<T, E>;

/// Errors produced by the query and classification core.
#[derive(Debug, thiserror::Error)]
pub enum GeodataError {
    /// A range token did not split into exactly two non-empty codes.
    #[error("Malformed range {token:?}: expected START...END")]
    MalformedRange {
        /// The offending token.
        token: String,
    },

    /// A range was supplied where only exact codes are accepted.
    #[error("Ranges are not accepted for {param}")]
    UnsupportedRange {
        /// Parameter name.
        param: String,
    },

    /// A required parameter was absent or unusable.
    #[error("Missing parameters: {message}")]
    MissingParams {
        /// What was missing.
        message: String,
    },

    /// A geography type name is not one of the known types.
    #[error("Invalid geotype {name:?}")]
    InvalidGeotype {
        /// The name as supplied.
        name: String,
    },

    /// A spatial filter could not be parsed or cannot be evaluated.
    #[error("Invalid spatial filter: {message}")]
    InvalidSpatialFilter {
        /// Why the filter was rejected.
        message: String,
    },

    /// More triples were streamed than the configured ceiling allows.
    #[error("Too many metrics: result exceeds {limit}")]
    ResultSetTooLarge {
        /// The ceiling that was exceeded.
        limit: usize,
    },

    /// Numerator and denominator metric sets do not cover the same
    /// geographies.
    #[error(
        "Partial content for {geotype} {category}{}",
        .geocode.as_deref().map_or_else(String::new, |g| format!(" {g}"))
    )]
    PartialContent {
        /// Geography type being classified.
        geotype: String,
        /// Numerator category.
        category: String,
        /// The geography missing from the numerator, when known.
        geocode: Option<String>,
    },

    /// A denominator value is zero.
    #[error("Invalid ratio for {geotype} {category}: {geocode} denominator is 0")]
    InvalidRatio {
        /// Geography type being classified.
        geotype: String,
        /// Numerator category.
        category: String,
        /// Geography whose denominator is zero.
        geocode: String,
    },

    /// Natural-breaks clustering failed.
    #[error("Clustering {geotype} {category}: {source}")]
    Clustering {
        /// Geography type being classified.
        geotype: String,
        /// Category being classified.
        category: String,
        /// Underlying clustering error.
        #[source]
        source: CkmeansError,
    },

    /// The request deadline passed while streaming rows.
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] duckdb::Error),

    /// Output serialization failed.
    #[error("Render error: {message}")]
    Render {
        /// Description of what went wrong.
        message: String,
    },
}

impl GeodataError {
    /// Returns `true` for errors caused by the request itself rather than
    /// the data or the store.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRange { .. }
                | Self::UnsupportedRange { .. }
                | Self::MissingParams { .. }
                | Self::InvalidGeotype { .. }
                | Self::InvalidSpatialFilter { .. }
                | Self::ResultSetTooLarge { .. }
                | Self::InvalidRatio { .. }
                | Self::Clustering { .. }
        )
    }

    pub(crate) fn missing(message: impl Into<String>) -> Self {
        Self::MissingParams {
            message: message.into(),
        }
    }
}

impl From<csv::Error> for GeodataError {
    fn from(e: csv::Error) -> Self {
        Self::Render {
            message: e.to_string(),
        }
    }
}

/// Runs pivot and classification requests against a store connection.
///
/// Holds only per-deployment settings; every call is independent and
/// owns its own cursor for its duration.
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    max_metrics: usize,
    timeout: Option<Duration>,
    spatial_enabled: bool,
}

impl QueryEngine {
    /// An engine with no metric ceiling, no deadline, and polygon
    /// filters disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_metrics: 0,
            timeout: None,
            spatial_enabled: false,
        }
    }

    /// Sets the per-request triple ceiling. `0` means unlimited.
    #[must_use]
    pub const fn with_max_metrics(mut self, max_metrics: usize) -> Self {
        self.max_metrics = max_metrics;
        self
    }

    /// Sets the per-request deadline, measured from the start of each call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declares whether the store connections have the `spatial`
    /// extension loaded. Polygon filters are rejected without it.
    #[must_use]
    pub const fn with_spatial(mut self, enabled: bool) -> Self {
        self.spatial_enabled = enabled;
        self
    }

    /// The configured triple ceiling.
    #[must_use]
    pub const fn max_metrics(&self) -> usize {
        self.max_metrics
    }

    fn reader<'conn>(&self, conn: &'conn Connection) -> TripleReader<'conn> {
        TripleReader::new(conn)
            .with_deadline(self.timeout.map(|t| Instant::now() + t))
            .with_spatial(self.spatial_enabled)
    }

    /// Streams the triples selected by `request` into a pivot table.
    ///
    /// # Errors
    ///
    /// * [`GeodataError::ResultSetTooLarge`] if the ceiling is exceeded
    /// * [`GeodataError::InvalidSpatialFilter`] for a polygon filter
    ///   without the `spatial` extension
    /// * [`GeodataError::DeadlineExceeded`] if the deadline passes
    /// * [`GeodataError::Store`] if the query fails
    /// * [`GeodataError::PartialContent`] if `divide_by` is set and a
    ///   geography has no denominator
    /// * [`GeodataError::InvalidRatio`] if a denominator is zero
    pub fn table(&self, conn: &Connection, request: &TableRequest) -> Result<PivotTable> {
        let reader = self.reader(conn);
        let assembler = PivotAssembler::new(self.max_metrics);

        let table = if let Some(denominator) = request.denominator_predicate() {
            let mut denominators = HashMap::new();
            {
                let mut scan = reader.prepare(&denominator)?;
                assembler.load_denominators(scan.cursor()?, &mut denominators)?;
            }

            let mut scan = reader.prepare(&request.predicate())?;
            let ratios = Ratios::new(scan.cursor()?, &denominators, request.geotype_label());
            assembler.assemble(ratios)?
        } else {
            let mut scan = reader.prepare(&request.predicate())?;
            assembler.assemble(scan.cursor()?)?
        };

        log::debug!(
            "table: {} rows x {} columns",
            table.row_keys().len(),
            table.column_keys().len()
        );

        Ok(table)
    }

    /// Computes natural breaks and min/max for every requested
    /// (geography type, category) pair.
    ///
    /// # Errors
    ///
    /// Any error from [`classify::classify`]; no partial result is
    /// returned.
    pub fn classify(&self, conn: &Connection, request: &ClassifyRequest) -> Result<Breaks> {
        let mut reader = self.reader(conn);
        let mut scratch = MetricScratch::default();
        classify::classify(&mut reader, request, &mut scratch)
    }
}
