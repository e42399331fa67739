//! Natural-breaks classification per (geography type, category).
//!
//! Each pair is loaded with its own focused query into a reused map, so
//! peak memory is bounded by the largest single metric set (two with a
//! denominator) rather than the whole request. Results are keyed
//! `category -> geotype` (breaks) and `category -> geotype_min_max`.

use std::collections::HashMap;

use geodata_models::{Breaks, DataVersion, GeoType, MIN_MAX_SUFFIX};

use crate::{
    GeodataError, QueryParams, Result,
    ckmeans::{self, CkmeansError},
    predicate::Predicate,
    reader::TripleReader,
    selector::{parse_geotypes, parse_selector, require_singles},
};

/// A parsed classification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyRequest {
    /// Data version pin.
    pub version: DataVersion,
    /// Categories to classify (`cat`); exact codes only.
    pub categories: Vec<String>,
    /// Geography types to classify over (`geotype`).
    pub geotypes: Vec<GeoType>,
    /// Number of clusters (`k`).
    pub k: usize,
    /// Denominator category (`divide_by`).
    pub divide_by: Option<String>,
}

impl ClassifyRequest {
    /// Parses request parameters.
    ///
    /// # Errors
    ///
    /// * [`GeodataError::MissingParams`] if `cat` or `geotype` is empty,
    ///   or `k` is absent or not a positive integer
    /// * [`GeodataError::UnsupportedRange`] if `cat` contains a range
    /// * any selector or geotype parse error
    pub fn from_params(version: DataVersion, params: &QueryParams) -> Result<Self> {
        let categories = require_singles(parse_selector(&params.all("cat"))?, "cat")?;
        if categories.is_empty() {
            return Err(GeodataError::missing("cat is required"));
        }

        let geotypes = parse_geotypes(&params.all("geotype"))?;
        if geotypes.is_empty() {
            return Err(GeodataError::missing("geotype is required"));
        }

        let k = params
            .first("k")
            .ok_or_else(|| GeodataError::missing("k is required"))?
            .parse::<usize>()
            .ok()
            .filter(|k| *k > 0)
            .ok_or_else(|| GeodataError::missing("k must be a positive integer"))?;

        Ok(Self {
            version,
            categories,
            geotypes,
            k,
            divide_by: params.first("divide_by").map(str::to_string),
        })
    }
}

/// Request-scoped buffers reused across (geography type, category) pairs.
#[derive(Debug, Default)]
pub struct MetricScratch {
    numerator: HashMap<String, f64>,
    denominator: HashMap<String, f64>,
    values: Vec<f64>,
}

/// Supplies one metric set at a time, keyed by geography code.
pub trait MetricSource {
    /// Loads the `(geotype, category)` metric set for `version` into
    /// `into`, which the caller has cleared. A geography seen twice keeps
    /// its last value.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be read.
    fn load_metrics(
        &mut self,
        version: &DataVersion,
        geotype: GeoType,
        category: &str,
        into: &mut HashMap<String, f64>,
    ) -> Result<()>;
}

impl MetricSource for TripleReader<'_> {
    fn load_metrics(
        &mut self,
        version: &DataVersion,
        geotype: GeoType,
        category: &str,
        into: &mut HashMap<String, f64>,
    ) -> Result<()> {
        let predicate = Predicate::metric_set(geotype, category, version);
        let mut scan = self.prepare(&predicate)?;

        for triple in scan.cursor()? {
            let triple = triple?;
            into.insert(triple.geography_code, triple.value);
        }

        log::debug!("Loaded {} metrics for {geotype} {category}", into.len());
        Ok(())
    }
}

/// Whether every pair was classified, or an empty metric set cut the
/// request short.
enum Outcome {
    Complete,
    NoData,
}

/// Classifies every requested pair.
///
/// Returns an empty result, successfully, if the first metric set
/// examined is empty: the first pair without a denominator, or a
/// geotype's denominator set with one. Any error aborts the whole
/// request.
///
/// # Errors
///
/// * [`GeodataError::PartialContent`] if numerator and denominator cover
///   different geographies
/// * [`GeodataError::InvalidRatio`] if a denominator value is zero
/// * [`GeodataError::Clustering`] if clustering fails
/// * any error from `source`
pub fn classify<S: MetricSource + ?Sized>(
    source: &mut S,
    request: &ClassifyRequest,
    scratch: &mut MetricScratch,
) -> Result<Breaks> {
    let mut breaks = Breaks::new();

    let outcome = match &request.divide_by {
        None => nonratio(source, request, scratch, &mut breaks)?,
        Some(divide_by) => ratio(source, request, divide_by, scratch, &mut breaks)?,
    };

    match outcome {
        Outcome::Complete => Ok(breaks),
        Outcome::NoData => {
            log::debug!("Empty metric set, returning no breaks");
            Ok(Breaks::new())
        }
    }
}

fn nonratio<S: MetricSource + ?Sized>(
    source: &mut S,
    request: &ClassifyRequest,
    scratch: &mut MetricScratch,
    breaks: &mut Breaks,
) -> Result<Outcome> {
    for &geotype in &request.geotypes {
        for category in &request.categories {
            scratch.numerator.clear();
            source.load_metrics(&request.version, geotype, category, &mut scratch.numerator)?;
            if scratch.numerator.is_empty() {
                return Ok(Outcome::NoData);
            }

            scratch.values.clear();
            scratch.values.extend(scratch.numerator.values().copied());

            record(breaks, &scratch.values, request.k, geotype, category)?;
        }
    }
    Ok(Outcome::Complete)
}

fn ratio<S: MetricSource + ?Sized>(
    source: &mut S,
    request: &ClassifyRequest,
    divide_by: &str,
    scratch: &mut MetricScratch,
    breaks: &mut Breaks,
) -> Result<Outcome> {
    for &geotype in &request.geotypes {
        scratch.denominator.clear();
        source.load_metrics(&request.version, geotype, divide_by, &mut scratch.denominator)?;
        if scratch.denominator.is_empty() {
            return Ok(Outcome::NoData);
        }

        for category in &request.categories {
            scratch.numerator.clear();
            source.load_metrics(&request.version, geotype, category, &mut scratch.numerator)?;
            if scratch.numerator.is_empty() || scratch.numerator.len() != scratch.denominator.len() {
                return Err(GeodataError::PartialContent {
                    geotype: geotype.to_string(),
                    category: category.clone(),
                    geocode: None,
                });
            }

            scratch.values.clear();
            for (geocode, &d) in &scratch.denominator {
                if d == 0.0 {
                    return Err(GeodataError::InvalidRatio {
                        geotype: geotype.to_string(),
                        category: category.clone(),
                        geocode: geocode.clone(),
                    });
                }
                let Some(&n) = scratch.numerator.get(geocode) else {
                    return Err(GeodataError::PartialContent {
                        geotype: geotype.to_string(),
                        category: category.clone(),
                        geocode: Some(geocode.clone()),
                    });
                };
                scratch.values.push(n / d);
            }

            record(breaks, &scratch.values, request.k, geotype, category)?;
        }
    }
    Ok(Outcome::Complete)
}

fn record(
    breaks: &mut Breaks,
    values: &[f64],
    k: usize,
    geotype: GeoType,
    category: &str,
) -> Result<()> {
    let clustering = |source: CkmeansError| GeodataError::Clustering {
        geotype: geotype.to_string(),
        category: category.to_string(),
        source,
    };

    let cuts = ckmeans::breaks(values, k).map_err(clustering)?;
    let [min, max] = ckmeans::min_max(values).ok_or_else(|| clustering(CkmeansError::Empty))?;

    let entry = breaks.entry(category.to_string()).or_default();
    entry.insert(geotype.to_string(), cuts);
    entry.insert(format!("{geotype}{MIN_MAX_SUFFIX}"), vec![min, max]);
    Ok(())
}
