//! Folding a triple stream into a dense geography × category table.

use std::{collections::HashMap, io::Write};

use geodata_models::{DataVersion, GEOGRAPHY_CODE_COLUMN, GeoType, MetricTriple, Selector, SpatialFilter};
use indexmap::IndexSet;

use crate::{
    GeodataError, QueryParams, Result,
    predicate::{Predicate, PredicateBuilder},
    selector::{parse_geotypes, parse_selector, require_singles},
    spatial::parse_spatial_filter,
};

/// Sparse table keyed by geography (rows) and category (columns).
///
/// Row and column keys keep first-seen order. Setting an existing cell
/// overwrites it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotTable {
    rows: IndexSet<String>,
    cols: IndexSet<String>,
    cells: HashMap<(usize, usize), f64>,
}

impl PivotTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one triple.
    pub fn insert(&mut self, triple: MetricTriple) {
        let (row, _) = self.rows.insert_full(triple.geography_code);
        let (col, _) = self.cols.insert_full(triple.category_code);
        self.cells.insert((row, col), triple.value);
    }

    /// Geography codes in first-seen order.
    #[must_use]
    pub const fn row_keys(&self) -> &IndexSet<String> {
        &self.rows
    }

    /// Category codes in first-seen order.
    #[must_use]
    pub const fn column_keys(&self) -> &IndexSet<String> {
        &self.cols
    }

    /// The value at (`geography`, `category`), if one was recorded.
    #[must_use]
    pub fn get(&self, geography: &str, category: &str) -> Option<f64> {
        let row = self.rows.get_index_of(geography)?;
        let col = self.cols.get_index_of(category)?;
        self.cells.get(&(row, col)).copied()
    }

    /// Returns `true` if no triple was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Writes the table as CSV: a `geography_code` header followed by the
    /// observed categories, then one line per geography. Missing cells
    /// are empty.
    ///
    /// # Errors
    ///
    /// Returns [`GeodataError::Render`] if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        csv.write_record(
            std::iter::once(GEOGRAPHY_CODE_COLUMN).chain(self.cols.iter().map(String::as_str)),
        )?;

        let mut record = Vec::with_capacity(self.cols.len() + 1);
        for (row, code) in self.rows.iter().enumerate() {
            record.clear();
            record.push(code.clone());
            record.extend((0..self.cols.len()).map(|col| {
                self.cells
                    .get(&(row, col))
                    .map_or_else(String::new, ToString::to_string)
            }));
            csv.write_record(&record)?;
        }

        csv.flush().map_err(|e| GeodataError::Render {
            message: e.to_string(),
        })
    }

    /// Renders the table as a CSV string.
    ///
    /// # Errors
    ///
    /// Returns [`GeodataError::Render`] if rendering fails.
    pub fn to_csv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| GeodataError::Render {
            message: e.to_string(),
        })
    }
}

/// Drains a triple stream into a [`PivotTable`] under a triple ceiling.
#[derive(Debug, Clone, Copy, Default)]
pub struct PivotAssembler {
    max_metrics: usize,
}

impl PivotAssembler {
    /// `max_metrics` of `0` means unlimited.
    #[must_use]
    pub const fn new(max_metrics: usize) -> Self {
        Self { max_metrics }
    }

    /// Consumes `triples` until exhausted.
    ///
    /// The ceiling is checked as each triple arrives, so an oversized
    /// result fails without being held in memory.
    ///
    /// # Errors
    ///
    /// * [`GeodataError::ResultSetTooLarge`] once more than `max_metrics`
    ///   triples have been seen
    /// * any error yielded by the stream
    pub fn assemble<I>(&self, triples: I) -> Result<PivotTable>
    where
        I: IntoIterator<Item = Result<MetricTriple>>,
    {
        let mut table = PivotTable::new();

        for (seen, triple) in triples.into_iter().enumerate() {
            if self.max_metrics > 0 && seen >= self.max_metrics {
                log::warn!("Result exceeds {} metrics, aborting", self.max_metrics);
                return Err(GeodataError::ResultSetTooLarge {
                    limit: self.max_metrics,
                });
            }
            table.insert(triple?);
        }

        Ok(table)
    }

    /// Drains a denominator stream into `into`, keyed by geography code,
    /// under the same ceiling. A geography seen twice keeps its last
    /// value.
    ///
    /// # Errors
    ///
    /// * [`GeodataError::ResultSetTooLarge`] once more than `max_metrics`
    ///   triples have been seen
    /// * any error yielded by the stream
    pub fn load_denominators<I>(&self, triples: I, into: &mut HashMap<String, f64>) -> Result<()>
    where
        I: IntoIterator<Item = Result<MetricTriple>>,
    {
        for (seen, triple) in triples.into_iter().enumerate() {
            if self.max_metrics > 0 && seen >= self.max_metrics {
                log::warn!("Denominator exceeds {} metrics, aborting", self.max_metrics);
                return Err(GeodataError::ResultSetTooLarge {
                    limit: self.max_metrics,
                });
            }
            let triple = triple?;
            into.insert(triple.geography_code, triple.value);
        }

        log::debug!("Loaded {} denominators", into.len());
        Ok(())
    }
}

/// Divides each streamed value by its geography's denominator.
///
/// Yields [`GeodataError::PartialContent`] for a geography without a
/// denominator and [`GeodataError::InvalidRatio`] for a zero one.
pub struct Ratios<'a, I> {
    triples: I,
    denominators: &'a HashMap<String, f64>,
    geotype: String,
}

impl<'a, I> Ratios<'a, I> {
    /// Wraps `triples`. `geotype` labels errors.
    #[must_use]
    pub const fn new(triples: I, denominators: &'a HashMap<String, f64>, geotype: String) -> Self {
        Self {
            triples,
            denominators,
            geotype,
        }
    }

    fn divide(&self, mut triple: MetricTriple) -> Result<MetricTriple> {
        let Some(&d) = self.denominators.get(&triple.geography_code) else {
            return Err(GeodataError::PartialContent {
                geotype: self.geotype.clone(),
                category: triple.category_code,
                geocode: Some(triple.geography_code),
            });
        };
        if d == 0.0 {
            return Err(GeodataError::InvalidRatio {
                geotype: self.geotype.clone(),
                category: triple.category_code,
                geocode: triple.geography_code,
            });
        }
        triple.value /= d;
        Ok(triple)
    }
}

impl<I> Iterator for Ratios<'_, I>
where
    I: Iterator<Item = Result<MetricTriple>>,
{
    type Item = Result<MetricTriple>;

    fn next(&mut self) -> Option<Self::Item> {
        let triple = self.triples.next()?;
        Some(triple.and_then(|t| self.divide(t)))
    }
}

/// A parsed pivot-table request.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRequest {
    /// Data version pin.
    pub version: DataVersion,
    /// Geography selector (`rows` / `geocode`).
    pub geographies: Selector,
    /// Category selector (`cols` / `cat`).
    pub categories: Selector,
    /// Table prefixes whose every category is selected (`censustable`).
    pub census_tables: Vec<String>,
    /// Geography type filter (`geotype`).
    pub geotypes: Vec<GeoType>,
    /// Spatial filter (`bbox`, `location` + `radius`, or `polygon`).
    pub spatial: Option<SpatialFilter>,
    /// Denominator category (`divide_by`); each cell becomes
    /// `value / denominator` for its geography.
    pub divide_by: Option<String>,
}

impl TableRequest {
    /// Parses request parameters.
    ///
    /// # Errors
    ///
    /// * [`GeodataError::MissingParams`] if no geographies, categories,
    ///   census tables, or spatial filter are given
    /// * [`GeodataError::UnsupportedRange`] if `censustable` holds a range
    /// * any selector, geotype, or spatial parse error
    pub fn from_params(version: DataVersion, params: &QueryParams) -> Result<Self> {
        let request = Self {
            version,
            geographies: parse_selector(&params.all_of(&["rows", "geocode"]))?,
            categories: parse_selector(&params.all_of(&["cols", "cat"]))?,
            census_tables: require_singles(
                parse_selector(&params.all("censustable"))?,
                "censustable",
            )?,
            geotypes: parse_geotypes(&params.all("geotype"))?,
            spatial: parse_spatial_filter(
                params.first("bbox"),
                params.first("location"),
                params.first("radius"),
                params.first("polygon"),
            )?,
            divide_by: params.first("divide_by").map(str::to_string),
        };

        if request.geographies.is_empty()
            && request.categories.is_empty()
            && request.census_tables.is_empty()
            && request.spatial.is_none()
        {
            return Err(GeodataError::missing(
                "at least one of rows, cols, censustable, bbox, location+radius, or polygon is required",
            ));
        }

        Ok(request)
    }

    /// Compiles the request into a store predicate.
    #[must_use]
    pub fn predicate(&self) -> Predicate {
        self.geography_filter()
            .categories_in(&self.categories, &self.census_tables)
            .build()
    }

    /// The predicate selecting `divide_by` for the same geographies as
    /// [`TableRequest::predicate`], or `None` without a denominator.
    #[must_use]
    pub fn denominator_predicate(&self) -> Option<Predicate> {
        let divide_by = self.divide_by.as_ref()?;
        Some(
            self.geography_filter()
                .categories(&Selector {
                    singles: vec![divide_by.clone()],
                    ranges: Vec::new(),
                })
                .build(),
        )
    }

    /// Names the requested geography types in ratio errors, `*` for all.
    #[must_use]
    pub fn geotype_label(&self) -> String {
        if self.geotypes.is_empty() {
            return "*".to_string();
        }
        self.geotypes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn geography_filter(&self) -> PredicateBuilder {
        PredicateBuilder::new(&self.version)
            .geographies(&self.geographies)
            .geotypes(&self.geotypes)
            .spatial(self.spatial.as_ref())
    }
}
