//! Forward-only streaming of metric triples from the store.
//!
//! [`TripleReader::prepare`] compiles a [`Predicate`] into a statement;
//! [`PreparedScan::cursor`] executes it and returns a [`TripleCursor`]
//! that borrows the statement. Dropping the cursor releases the result
//! set whether it was exhausted, failed, or abandoned early.

use std::time::Instant;

use duckdb::{Connection, Row, Rows, Statement, params_from_iter};
use geodata_models::MetricTriple;

use crate::{GeodataError, Result, predicate::Predicate};

/// Executes predicates against one store connection.
#[derive(Clone, Copy)]
pub struct TripleReader<'conn> {
    conn: &'conn Connection,
    deadline: Option<Instant>,
    spatial_enabled: bool,
}

impl<'conn> TripleReader<'conn> {
    /// A reader with no deadline and polygon filters disabled.
    #[must_use]
    pub const fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            deadline: None,
            spatial_enabled: false,
        }
    }

    /// Fails every cursor with [`GeodataError::DeadlineExceeded`] once
    /// `deadline` passes.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Declares whether the connection has the `spatial` extension loaded.
    #[must_use]
    pub const fn with_spatial(mut self, enabled: bool) -> Self {
        self.spatial_enabled = enabled;
        self
    }

    /// Prepares the triple query for `predicate`.
    ///
    /// # Errors
    ///
    /// * [`GeodataError::InvalidSpatialFilter`] if the predicate needs the
    ///   `spatial` extension and it is not enabled
    /// * [`GeodataError::Store`] if the statement cannot be prepared
    pub fn prepare(&self, predicate: &Predicate) -> Result<PreparedScan<'conn>> {
        if predicate.requires_spatial && !self.spatial_enabled {
            return Err(GeodataError::InvalidSpatialFilter {
                message: "polygon filters are not enabled on this server".to_string(),
            });
        }

        let sql = predicate.to_select();
        log::trace!("triple query: {sql}");

        Ok(PreparedScan {
            stmt: self.conn.prepare(&sql)?,
            params: predicate.params.clone(),
            deadline: self.deadline,
        })
    }
}

/// A prepared triple query and its bound values.
pub struct PreparedScan<'conn> {
    stmt: Statement<'conn>,
    params: Vec<crate::QueryValue>,
    deadline: Option<Instant>,
}

impl PreparedScan<'_> {
    /// Executes the query and returns a cursor over its rows.
    ///
    /// # Errors
    ///
    /// Returns [`GeodataError::Store`] if execution fails.
    pub fn cursor(&mut self) -> Result<TripleCursor<'_>> {
        let rows = self.stmt.query(params_from_iter(self.params.iter()))?;
        Ok(TripleCursor {
            rows,
            deadline: self.deadline,
            done: false,
        })
    }
}

/// Pull cursor over `(geography_code, category_code, value)` rows.
///
/// Rows arrive in store order; duplicates are passed through. After the
/// first error the cursor yields `None`.
pub struct TripleCursor<'stmt> {
    rows: Rows<'stmt>,
    deadline: Option<Instant>,
    done: bool,
}

fn read_triple(row: &Row<'_>) -> Result<MetricTriple> {
    Ok(MetricTriple {
        geography_code: row.get(0)?,
        category_code: row.get(1)?,
        value: row.get(2)?,
    })
}

impl Iterator for TripleCursor<'_> {
    type Item = Result<MetricTriple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.done = true;
            return Some(Err(GeodataError::DeadlineExceeded));
        }

        let result = match self.rows.next() {
            Ok(Some(row)) => read_triple(row),
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e.into()),
        };

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use geodata_database::load::{GeoRecord, insert_geographies, insert_metrics};
    use geodata_models::{DataVersion, GeoType, Selector, SpatialFilter};

    use super::*;
    use crate::predicate::PredicateBuilder;

    fn store() -> Connection {
        let conn = geodata_database::open_in_memory().unwrap();
        insert_geographies(
            &conn,
            &[
                GeoRecord::new("E01", GeoType::Lsoa),
                GeoRecord::new("E02", GeoType::Lsoa),
            ],
        )
        .unwrap();
        insert_metrics(
            &conn,
            &DataVersion::default(),
            &[
                MetricTriple::new("E01", "QS1", 5.0),
                MetricTriple::new("E01", "QS1", 6.0),
                MetricTriple::new("E02", "QS1", 9.0),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn streams_every_row_including_duplicates() {
        let conn = store();
        let predicate = PredicateBuilder::new(&DataVersion::default()).build();
        let mut scan = TripleReader::new(&conn).prepare(&predicate).unwrap();
        let triples: Vec<_> = scan.cursor().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(triples.len(), 3);
    }

    #[test]
    fn other_versions_are_invisible() {
        let conn = store();
        let predicate = PredicateBuilder::new(&DataVersion::new(2011, "2.1")).build();
        let mut scan = TripleReader::new(&conn).prepare(&predicate).unwrap();
        assert_eq!(scan.cursor().unwrap().count(), 0);
    }

    #[test]
    fn cursor_can_be_reopened_after_early_drop() {
        let conn = store();
        let predicate = PredicateBuilder::new(&DataVersion::default())
            .geographies(&Selector {
                singles: vec!["E02".to_string()],
                ranges: vec![],
            })
            .build();
        let mut scan = TripleReader::new(&conn).prepare(&predicate).unwrap();

        {
            let mut cursor = scan.cursor().unwrap();
            assert!(cursor.next().is_some());
        }

        let triples: Vec<_> = scan.cursor().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(triples, vec![MetricTriple::new("E02", "QS1", 9.0)]);
    }

    #[test]
    fn passed_deadline_fails_once_then_ends() {
        let conn = store();
        let predicate = PredicateBuilder::new(&DataVersion::default()).build();
        let mut scan = TripleReader::new(&conn)
            .with_deadline(Some(Instant::now()))
            .prepare(&predicate)
            .unwrap();
        let mut cursor = scan.cursor().unwrap();

        assert!(matches!(
            cursor.next(),
            Some(Err(GeodataError::DeadlineExceeded))
        ));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn polygon_needs_spatial_extension() {
        let conn = store();
        let polygon = SpatialFilter::Polygon {
            ring: vec![
                geodata_models::Point::new(0.0, 0.0),
                geodata_models::Point::new(1.0, 0.0),
                geodata_models::Point::new(1.0, 1.0),
                geodata_models::Point::new(0.0, 0.0),
            ],
        };
        let predicate = PredicateBuilder::new(&DataVersion::default())
            .spatial(Some(&polygon))
            .build();

        let err = TripleReader::new(&conn).prepare(&predicate).err().unwrap();
        assert!(matches!(err, GeodataError::InvalidSpatialFilter { .. }));
    }
}
