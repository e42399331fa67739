#![allow(clippy::module_name_repetitions)]
//! Loaders that populate the store.
//!
//! Lookup rows (geography types, categories, data versions) are resolved
//! select-or-insert so loaders can be re-run. Metric rows are appended in
//! multi-row chunks and never deduplicated.

use std::collections::BTreeMap;

use duckdb::{Connection, params};
use geodata_models::{BoundingBox, DataVersion, GeoType, MetricTriple, Point};

use crate::DbError;

/// Rows per multi-row `INSERT` into `geo_metric`.
const CHUNK_SIZE: usize = 2_000;

/// One geography to insert into the `geo` table.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    /// Geography code, unique across the store.
    pub code: String,
    /// Granularity class.
    pub geotype: GeoType,
    /// English name.
    pub name: Option<String>,
    /// Welsh name.
    pub welsh_name: Option<String>,
    /// Geographies flagged invalid are excluded from spatial and
    /// classification queries.
    pub valid: bool,
    /// Bounding envelope of the boundary.
    pub envelope: Option<BoundingBox>,
    /// Representative point used by radius filters.
    pub centroid: Option<Point>,
    /// Boundary as well-known binary.
    pub wkb_geometry: Option<Vec<u8>>,
}

impl GeoRecord {
    /// A valid geography with no names or geometry.
    #[must_use]
    pub fn new(code: &str, geotype: GeoType) -> Self {
        Self {
            code: code.to_string(),
            geotype,
            name: None,
            welsh_name: None,
            valid: true,
            envelope: None,
            centroid: None,
            wkb_geometry: None,
        }
    }

    /// Sets the envelope. The centroid defaults to the envelope's centre
    /// unless one was already set.
    #[must_use]
    pub fn with_envelope(mut self, envelope: BoundingBox) -> Self {
        if self.centroid.is_none() {
            self.centroid = Some(Point::new(
                f64::midpoint(envelope.west, envelope.east),
                f64::midpoint(envelope.south, envelope.north),
            ));
        }
        self.envelope = Some(envelope);
        self
    }

    /// Sets the centroid.
    #[must_use]
    pub const fn with_centroid(mut self, centroid: Point) -> Self {
        self.centroid = Some(centroid);
        self
    }

    /// Sets the English name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Sets the boundary WKB.
    #[must_use]
    pub fn with_wkb(mut self, wkb: Vec<u8>) -> Self {
        self.wkb_geometry = Some(wkb);
        self
    }

    /// Marks the geography invalid.
    #[must_use]
    pub const fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// Returns the id of the `geo_type` row for `geotype`, inserting it if
/// missing.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn ensure_geo_type(conn: &Connection, geotype: GeoType) -> Result<i32, DbError> {
    let name = geotype.as_ref();
    conn.execute(
        "INSERT INTO geo_type (name) VALUES (?) ON CONFLICT DO NOTHING",
        [name],
    )?;
    Ok(conn.query_row("SELECT id FROM geo_type WHERE name = ?", [name], |row| {
        row.get(0)
    })?)
}

/// Returns the id of the `nomis_category` row for `(code, year)`,
/// inserting it if missing.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn ensure_category(conn: &Connection, code: &str, year: i32) -> Result<i32, DbError> {
    conn.execute(
        "INSERT INTO nomis_category (long_nomis_code, year) VALUES (?, ?) ON CONFLICT DO NOTHING",
        params![code, year],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM nomis_category WHERE long_nomis_code = ? AND year = ?",
        params![code, year],
        |row| row.get(0),
    )?)
}

/// Returns the id of the `data_ver` row for `version`, inserting it if
/// missing.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub fn ensure_data_version(conn: &Connection, version: &DataVersion) -> Result<i32, DbError> {
    conn.execute(
        "INSERT INTO data_ver (census_year, ver_string) VALUES (?, ?) ON CONFLICT DO NOTHING",
        params![version.census_year, version.ver_string],
    )?;
    Ok(conn.query_row(
        "SELECT id FROM data_ver WHERE census_year = ? AND ver_string = ?",
        params![version.census_year, version.ver_string],
        |row| row.get(0),
    )?)
}

/// Inserts geographies, creating their `geo_type` rows as needed.
///
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails, including a duplicate code.
pub fn insert_geographies(conn: &Connection, records: &[GeoRecord]) -> Result<u64, DbError> {
    let mut type_ids: BTreeMap<GeoType, i32> = BTreeMap::new();
    let mut stmt = conn.prepare(
        "INSERT INTO geo (
            type_id, code, name, welsh_name, valid,
            min_lon, min_lat, max_lon, max_lat,
            centroid_lon, centroid_lat, wkb_geometry
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )?;

    let mut inserted = 0u64;
    for record in records {
        let type_id = match type_ids.get(&record.geotype) {
            Some(id) => *id,
            None => {
                let id = ensure_geo_type(conn, record.geotype)?;
                type_ids.insert(record.geotype, id);
                id
            }
        };

        let envelope = record.envelope.as_ref();
        let centroid = record.centroid.as_ref();

        let rows = stmt.execute(params![
            type_id,
            record.code,
            record.name,
            record.welsh_name,
            record.valid,
            envelope.map(|e| e.west),
            envelope.map(|e| e.south),
            envelope.map(|e| e.east),
            envelope.map(|e| e.north),
            centroid.map(|c| c.lon),
            centroid.map(|c| c.lat),
            record.wkb_geometry,
        ])?;
        inserted += u64::try_from(rows).unwrap_or(0);
    }

    log::debug!("Inserted {inserted} geographies");
    Ok(inserted)
}

/// Appends metric observations for `version`.
///
/// Every geography must already exist; categories and the data version
/// are created on demand (categories under `version.census_year`).
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] for a triple naming an unknown
/// geography, or [`DbError`] if a statement fails.
pub fn insert_metrics(
    conn: &Connection,
    version: &DataVersion,
    triples: &[MetricTriple],
) -> Result<u64, DbError> {
    if triples.is_empty() {
        return Ok(0);
    }

    let data_ver_id = ensure_data_version(conn, version)?;
    let geo_ids = load_geo_ids(conn)?;
    let mut category_ids: BTreeMap<&str, i32> = BTreeMap::new();

    let mut resolved = Vec::with_capacity(triples.len());
    for triple in triples {
        let geo_id = *geo_ids.get(&triple.geography_code).ok_or_else(|| DbError::Conversion {
            message: format!("unknown geography code {}", triple.geography_code),
        })?;

        let category_id = match category_ids.get(triple.category_code.as_str()) {
            Some(id) => *id,
            None => {
                let id = ensure_category(conn, &triple.category_code, version.census_year)?;
                category_ids.insert(&triple.category_code, id);
                id
            }
        };

        resolved.push((geo_id, category_id, triple.value));
    }

    let mut total_inserted = 0u64;

    for chunk in resolved.chunks(CHUNK_SIZE) {
        let mut sql =
            String::from("INSERT INTO geo_metric (geo_id, category_id, data_ver_id, metric) VALUES ");

        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?, ?, ?)");
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for (geo_id, category_id, value) in chunk {
            stmt.raw_bind_parameter(param_idx, geo_id)?;
            stmt.raw_bind_parameter(param_idx + 1, category_id)?;
            stmt.raw_bind_parameter(param_idx + 2, data_ver_id)?;
            stmt.raw_bind_parameter(param_idx + 3, value)?;
            param_idx += 4;
        }

        let rows = stmt.raw_execute()?;
        total_inserted += u64::try_from(rows).unwrap_or(0);
    }

    log::debug!(
        "Inserted {total_inserted} metrics for {} {}",
        version.census_year,
        version.ver_string
    );

    Ok(total_inserted)
}

fn load_geo_ids(conn: &Connection) -> Result<BTreeMap<String, i32>, DbError> {
    let mut stmt = conn.prepare("SELECT code, id FROM geo")?;
    let mut rows = stmt.query([])?;
    let mut ids = BTreeMap::new();

    while let Some(row) = rows.next()? {
        let code: String = row.get(0)?;
        let id: i32 = row.get(1)?;
        ids.insert(code, id);
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn lookup_rows_are_select_or_insert() {
        let conn = crate::open_in_memory().unwrap();
        let a = ensure_geo_type(&conn, GeoType::Lad).unwrap();
        let b = ensure_geo_type(&conn, GeoType::Lad).unwrap();
        assert_eq!(a, b);
        assert_eq!(count(&conn, "geo_type"), 1);

        let version = DataVersion::default();
        let v1 = ensure_data_version(&conn, &version).unwrap();
        let v2 = ensure_data_version(&conn, &version).unwrap();
        assert_eq!(v1, v2);

        let c1 = ensure_category(&conn, "QS101EW0001", 2011).unwrap();
        let c2 = ensure_category(&conn, "QS101EW0001", 2011).unwrap();
        let c3 = ensure_category(&conn, "QS101EW0001", 2021).unwrap();
        assert_eq!(c1, c2);
        assert_ne!(c1, c3);
    }

    #[test]
    fn envelope_defaults_centroid_to_its_centre() {
        let record = GeoRecord::new("E01000001", GeoType::Lsoa)
            .with_envelope(BoundingBox::new(-1.0, 50.0, 1.0, 52.0));
        assert_eq!(record.centroid, Some(Point::new(0.0, 51.0)));
    }

    #[test]
    fn inserts_geographies_and_metrics() {
        let conn = crate::open_in_memory().unwrap();
        let geos = vec![
            GeoRecord::new("E01000001", GeoType::Lsoa).with_name("City of London 001A"),
            GeoRecord::new("E01000002", GeoType::Lsoa).invalid(),
        ];
        assert_eq!(insert_geographies(&conn, &geos).unwrap(), 2);

        let triples = vec![
            MetricTriple::new("E01000001", "QS101EW0001", 10.0),
            MetricTriple::new("E01000002", "QS101EW0001", 20.0),
            MetricTriple::new("E01000002", "QS101EW0001", 20.0),
        ];
        let inserted = insert_metrics(&conn, &DataVersion::default(), &triples).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(count(&conn, "geo_metric"), 3);
        assert_eq!(count(&conn, "nomis_category"), 1);

        let valid: bool = conn
            .query_row("SELECT valid FROM geo WHERE code = 'E01000002'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert!(!valid);
    }

    #[test]
    fn unknown_geography_is_rejected() {
        let conn = crate::open_in_memory().unwrap();
        let err = insert_metrics(
            &conn,
            &DataVersion::default(),
            &[MetricTriple::new("E99999999", "QS101EW0001", 1.0)],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Conversion { .. }));
    }

    #[test]
    fn chunked_inserts_cover_every_row() {
        let conn = crate::open_in_memory().unwrap();
        insert_geographies(&conn, &[GeoRecord::new("W01000001", GeoType::Lsoa)]).unwrap();

        let triples: Vec<_> = (0..CHUNK_SIZE + 7)
            .map(|i| MetricTriple::new("W01000001", &format!("KS{:04}", i % 13), 1.0))
            .collect();
        let inserted = insert_metrics(&conn, &DataVersion::default(), &triples).unwrap();
        assert_eq!(inserted, (CHUNK_SIZE + 7) as u64);
    }
}
