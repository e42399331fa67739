#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the census geodata service.
//!
//! Everything here is plain data: geography types, category codes,
//! selectors over code space, spatial filters, metric triples, and the
//! classification result shape. Parsing that can fail on user input
//! lives in the `geodata` crate, which owns the error taxonomy.

pub mod category;
pub mod feature;
pub mod spatial;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub use category::{CategoryCodeError, split_category, totals_category};
pub use feature::FeatureProperties;
pub use spatial::{BoundingBox, Point, SpatialFilter};

/// Census year pinned when the caller does not supply one.
pub const DEFAULT_CENSUS_YEAR: i32 = 2011;

/// Data version string pinned on every store query unless configured.
pub const DEFAULT_VER_STRING: &str = "2.2";

/// Name of the row-key column in rendered pivot tables.
pub const GEOGRAPHY_CODE_COLUMN: &str = "geography_code";

/// Suffix appended to a geography type name for its `[min, max]` entry in
/// a [`Breaks`] result.
pub const MIN_MAX_SUFFIX: &str = "_min_max";

/// Granularity class of a geography code.
///
/// Parsing is case-insensitive (`"lsoa"` parses as [`GeoType::Lsoa`]);
/// display and serialization always use the canonical upper-case name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum GeoType {
    /// Country.
    Ctry,
    /// Region.
    Rgn,
    /// Local authority district.
    Lad,
    /// Middle layer super output area.
    Msoa,
    /// Lower layer super output area.
    Lsoa,
    /// Output area.
    Oa,
}

/// A single (geography, category, value) observation from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTriple {
    /// Geography code, e.g. `E01000001`.
    pub geography_code: String,
    /// Category code, e.g. `QS101EW0001`.
    pub category_code: String,
    /// Observed value.
    pub value: f64,
}

impl MetricTriple {
    /// Creates a triple from borrowed codes.
    #[must_use]
    pub fn new(geography_code: &str, category_code: &str, value: f64) -> Self {
        Self {
            geography_code: geography_code.to_string(),
            category_code: category_code.to_string(),
            value,
        }
    }
}

/// An inclusive range of codes, compared lexicographically by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeRange {
    /// First code in the range.
    pub start: String,
    /// Last code in the range.
    pub end: String,
}

/// Normalized selection over one code axis (geographies or categories).
///
/// An empty selector means "no filter" to callers that allow a wildcard.
/// Duplicates are kept; order is not significant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    /// Exact codes.
    pub singles: Vec<String>,
    /// Inclusive code ranges.
    pub ranges: Vec<CodeRange>,
}

impl Selector {
    /// Returns `true` when neither singles nor ranges are present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.ranges.is_empty()
    }

    /// Returns `true` when at least one range is present.
    #[must_use]
    pub const fn has_ranges(&self) -> bool {
        !self.ranges.is_empty()
    }
}

/// The (census year, version string) pin applied to every store query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataVersion {
    /// Census year, e.g. 2011.
    pub census_year: i32,
    /// Data version string, e.g. `"2.2"`.
    pub ver_string: String,
}

impl DataVersion {
    /// Creates a pin for the given year and version string.
    #[must_use]
    pub fn new(census_year: i32, ver_string: &str) -> Self {
        Self {
            census_year,
            ver_string: ver_string.to_string(),
        }
    }
}

impl Default for DataVersion {
    fn default() -> Self {
        Self::new(DEFAULT_CENSUS_YEAR, DEFAULT_VER_STRING)
    }
}

/// Classification output.
///
/// Outer key is the category code; inner key is either a geography type
/// name (ascending cluster upper bounds) or `<geotype>_min_max` (exactly
/// `[min, max]`). `BTreeMap` keeps the serialized key order stable.
pub type Breaks = BTreeMap<String, BTreeMap<String, Vec<f64>>>;

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use strum::IntoEnumIterator as _;

    use super::*;

    #[test]
    fn geotype_parses_case_insensitively() {
        assert_eq!(GeoType::from_str("lsoa").unwrap(), GeoType::Lsoa);
        assert_eq!(GeoType::from_str("Lad").unwrap(), GeoType::Lad);
        assert_eq!(GeoType::from_str("OA").unwrap(), GeoType::Oa);
    }

    #[test]
    fn geotype_displays_upper_case() {
        let names: Vec<String> = GeoType::iter().map(|g| g.to_string()).collect();
        assert_eq!(names, ["CTRY", "RGN", "LAD", "MSOA", "LSOA", "OA"]);
    }

    #[test]
    fn rejects_unknown_geotype() {
        assert!(GeoType::from_str("WARD").is_err());
    }

    #[test]
    fn geotype_serializes_upper_case() {
        let json = serde_json::to_string(&GeoType::Msoa).unwrap();
        assert_eq!(json, "\"MSOA\"");
    }

    #[test]
    fn empty_selector() {
        let selector = Selector::default();
        assert!(selector.is_empty());
        assert!(!selector.has_ranges());
    }
}
