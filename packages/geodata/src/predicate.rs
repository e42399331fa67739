//! Compiles selectors, filters, and the data version pin into a store
//! predicate.
//!
//! A [`Predicate`] is a SQL boolean expression over the joined fact
//! tables (see [`TRIPLE_SELECT`]) with positional `?` placeholders and the
//! values to bind to them, in order. Ranges are emitted as `BETWEEN` over
//! the codes' text ordering, so a reversed range matches nothing.

use duckdb::{ToSql, types::ToSqlOutput};
use geodata_models::{DataVersion, GeoType, Selector, SpatialFilter};

/// Mean Earth radius in metres, used by the radius filter.
pub const EARTH_RADIUS_METRES: f64 = 6_371_008.8;

/// Selects `(geography_code, category_code, value)` from the joined fact
/// tables. Append `WHERE` and a [`Predicate`].
pub const TRIPLE_SELECT: &str = "SELECT
    geo.code AS geography_code,
    nomis_category.long_nomis_code AS category_code,
    geo_metric.metric AS value
FROM geo_metric
JOIN geo ON geo.id = geo_metric.geo_id
JOIN geo_type ON geo_type.id = geo.type_id
JOIN nomis_category ON nomis_category.id = geo_metric.category_id
JOIN data_ver ON data_ver.id = geo_metric.data_ver_id";

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Text parameter.
    Text(String),
    /// Integer parameter.
    Int(i64),
    /// Floating-point parameter.
    Real(f64),
}

impl ToSql for QueryValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(s) => s.to_sql(),
            Self::Int(i) => i.to_sql(),
            Self::Real(f) => f.to_sql(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i32> for QueryValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for QueryValue {
    fn from(f: f64) -> Self {
        Self::Real(f)
    }
}

/// A SQL boolean expression plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Expression text with `?` placeholders.
    pub sql: String,
    /// Values for the placeholders, in order.
    pub params: Vec<QueryValue>,
    /// Whether evaluating the expression needs the `spatial` extension.
    pub requires_spatial: bool,
}

impl Predicate {
    /// The focused per-pair predicate used by classification: one
    /// geography type, one category, valid geographies only.
    #[must_use]
    pub fn metric_set(geotype: GeoType, category: &str, version: &DataVersion) -> Self {
        let mut builder = PredicateBuilder::new(version);
        builder.clause("geo.valid");
        builder.push(
            "geo_type.name = ?".to_string(),
            [QueryValue::Text(geotype.to_string())],
        );
        builder.push(
            "nomis_category.long_nomis_code = ?".to_string(),
            [QueryValue::from(category)],
        );
        builder.build()
    }

    /// The complete triple query: [`TRIPLE_SELECT`] restricted by this
    /// predicate. No ordering is requested.
    #[must_use]
    pub fn to_select(&self) -> String {
        format!("{TRIPLE_SELECT}\nWHERE {}", self.sql)
    }
}

/// Accumulates `AND`-ed clauses into a [`Predicate`].
///
/// The data version pin is always the first clause.
#[derive(Debug, Clone)]
pub struct PredicateBuilder {
    clauses: Vec<String>,
    params: Vec<QueryValue>,
    requires_spatial: bool,
}

impl PredicateBuilder {
    /// Starts a predicate pinned to `version`.
    #[must_use]
    pub fn new(version: &DataVersion) -> Self {
        let mut builder = Self {
            clauses: Vec::new(),
            params: Vec::new(),
            requires_spatial: false,
        };
        builder.push(
            "data_ver.census_year = ?".to_string(),
            [QueryValue::from(version.census_year)],
        );
        builder.push(
            "data_ver.ver_string = ?".to_string(),
            [QueryValue::from(version.ver_string.as_str())],
        );
        builder.clause("nomis_category.year = data_ver.census_year");
        builder
    }

    fn clause(&mut self, sql: &str) {
        self.clauses.push(sql.to_string());
    }

    fn push<I: IntoIterator<Item = QueryValue>>(&mut self, clause: String, params: I) {
        self.clauses.push(clause);
        self.params.extend(params);
    }

    fn axis(&mut self, column: &str, selector: &Selector, prefixes: &[String]) {
        if selector.is_empty() && prefixes.is_empty() {
            return;
        }

        let mut terms = Vec::new();
        let mut params = Vec::new();

        if !selector.singles.is_empty() {
            terms.push(format!("{column} IN ({})", placeholders(selector.singles.len())));
            params.extend(selector.singles.iter().map(|s| QueryValue::from(s.as_str())));
        }

        for range in &selector.ranges {
            terms.push(format!("{column} BETWEEN ? AND ?"));
            params.push(QueryValue::from(range.start.as_str()));
            params.push(QueryValue::from(range.end.as_str()));
        }

        for prefix in prefixes {
            terms.push(format!("starts_with({column}, ?)"));
            params.push(QueryValue::from(prefix.as_str()));
        }

        self.push(format!("({})", terms.join(" OR ")), params);
    }

    /// Restricts geography codes. An empty selector adds nothing.
    #[must_use]
    pub fn geographies(mut self, selector: &Selector) -> Self {
        self.axis("geo.code", selector, &[]);
        self
    }

    /// Restricts category codes. An empty selector adds nothing.
    #[must_use]
    pub fn categories(self, selector: &Selector) -> Self {
        self.categories_in(selector, &[])
    }

    /// Restricts category codes to those matched by `selector` or
    /// belonging to one of `tables` (a code belongs to a table when it
    /// starts with the table's prefix, e.g. `QS101EW`).
    #[must_use]
    pub fn categories_in(mut self, selector: &Selector, tables: &[String]) -> Self {
        self.axis("nomis_category.long_nomis_code", selector, tables);
        self
    }

    /// Restricts geography types. An empty list adds nothing.
    #[must_use]
    pub fn geotypes(mut self, geotypes: &[GeoType]) -> Self {
        if !geotypes.is_empty() {
            self.push(
                format!("geo_type.name IN ({})", placeholders(geotypes.len())),
                geotypes.iter().map(|t| QueryValue::Text(t.to_string())),
            );
        }
        self
    }

    /// Applies a spatial filter, restricted to valid geographies.
    #[must_use]
    pub fn spatial(mut self, filter: Option<&SpatialFilter>) -> Self {
        let Some(filter) = filter else {
            return self;
        };

        self.clause("geo.valid");

        match filter {
            SpatialFilter::BoundingBox(bbox) => {
                self.push(
                    ENVELOPE_OVERLAP.to_string(),
                    [bbox.west, bbox.east, bbox.south, bbox.north].map(QueryValue::from),
                );
            }
            SpatialFilter::Radius { centre, metres } => {
                self.push(
                    format!(
                        "2 * {EARTH_RADIUS_METRES} * asin(least(1.0, sqrt(
                            pow(sin(radians(geo.centroid_lat - ?) / 2), 2)
                            + cos(radians(?)) * cos(radians(geo.centroid_lat))
                            * pow(sin(radians(geo.centroid_lon - ?) / 2), 2)
                        ))) <= ?"
                    ),
                    [centre.lat, centre.lat, centre.lon, *metres].map(QueryValue::from),
                );
            }
            SpatialFilter::Polygon { .. } => {
                if let Some(envelope) = filter.envelope() {
                    self.push(
                        ENVELOPE_OVERLAP.to_string(),
                        [envelope.west, envelope.east, envelope.south, envelope.north]
                            .map(QueryValue::from),
                    );
                }
                if let Some(wkt) = filter.to_wkt() {
                    self.push(
                        "geo.wkb_geometry IS NOT NULL
                         AND ST_Intersects(ST_GeomFromWKB(geo.wkb_geometry), ST_GeomFromText(?))"
                            .to_string(),
                        [QueryValue::Text(wkt)],
                    );
                }
                self.requires_spatial = true;
            }
        }

        self
    }

    /// Finishes the predicate.
    #[must_use]
    pub fn build(self) -> Predicate {
        Predicate {
            sql: self.clauses.join("\nAND "),
            params: self.params,
            requires_spatial: self.requires_spatial,
        }
    }
}

/// Envelope overlap, bound as `west, east, south, north`.
const ENVELOPE_OVERLAP: &str = "geo.max_lon >= ? AND geo.min_lon <= ? AND geo.max_lat >= ? AND geo.min_lat <= ?";

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
