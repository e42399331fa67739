//! Spatial filter shapes.
//!
//! Coordinates are WGS84 longitude/latitude. At most one spatial filter
//! applies to a request; the store evaluates it against each geography's
//! stored envelope, centroid, or boundary.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Builds a box from two opposite corners given in either diagonal.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            west: a.lon.min(b.lon),
            south: a.lat.min(b.lat),
            east: a.lon.max(b.lon),
            north: a.lat.max(b.lat),
        }
    }
}

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Longitude.
    pub lon: f64,
    /// Latitude.
    pub lat: f64,
}

impl Point {
    /// Creates a point from longitude and latitude.
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// The spatial restriction applied to the geography axis of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SpatialFilter {
    /// Geographies whose envelope overlaps the box.
    BoundingBox(BoundingBox),
    /// Geographies whose centroid lies within `metres` of `centre`.
    Radius {
        /// Centre point.
        centre: Point,
        /// Great-circle distance in metres.
        metres: f64,
    },
    /// Geographies whose boundary intersects a closed ring.
    Polygon {
        /// Ring vertices; the first equals the last.
        ring: Vec<Point>,
    },
}

impl SpatialFilter {
    /// Returns the box enclosing the filter's area.
    ///
    /// The radius envelope is not computed (it depends on latitude), so
    /// `None` is returned for [`SpatialFilter::Radius`].
    #[must_use]
    pub fn envelope(&self) -> Option<BoundingBox> {
        match self {
            Self::BoundingBox(bbox) => Some(*bbox),
            Self::Radius { .. } => None,
            Self::Polygon { ring } => {
                let first = ring.first()?;
                let init = BoundingBox::new(first.lon, first.lat, first.lon, first.lat);
                Some(ring.iter().fold(init, |acc, p| BoundingBox {
                    west: acc.west.min(p.lon),
                    south: acc.south.min(p.lat),
                    east: acc.east.max(p.lon),
                    north: acc.north.max(p.lat),
                }))
            }
        }
    }

    /// Renders a polygon ring as WKT (`POLYGON((lon lat, ...))`).
    ///
    /// Returns `None` for the other filter kinds.
    #[must_use]
    pub fn to_wkt(&self) -> Option<String> {
        let Self::Polygon { ring } = self else {
            return None;
        };

        let mut wkt = String::from("POLYGON((");
        for (i, p) in ring.iter().enumerate() {
            if i > 0 {
                wkt.push_str(", ");
            }
            let _ = write!(wkt, "{} {}", p.lon, p.lat);
        }
        wkt.push_str("))");
        Some(wkt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_normalize_either_diagonal() {
        let a = BoundingBox::from_corners(Point::new(0.1338, 51.4635), Point::new(0.1017, 51.4647));
        let b = BoundingBox::from_corners(Point::new(0.1017, 51.4647), Point::new(0.1338, 51.4635));
        assert_eq!(a, b);
        assert!((a.west - 0.1017).abs() < f64::EPSILON);
        assert!((a.north - 51.4647).abs() < f64::EPSILON);
    }

    #[test]
    fn polygon_envelope_and_wkt() {
        let filter = SpatialFilter::Polygon {
            ring: vec![
                Point::new(0.0, 0.0),
                Point::new(2.0, 0.0),
                Point::new(2.0, 1.5),
                Point::new(0.0, 0.0),
            ],
        };
        assert_eq!(filter.envelope(), Some(BoundingBox::new(0.0, 0.0, 2.0, 1.5)));
        assert_eq!(
            filter.to_wkt().as_deref(),
            Some("POLYGON((0 0, 2 0, 2 1.5, 0 0))")
        );
    }

    #[test]
    fn radius_has_no_envelope() {
        let filter = SpatialFilter::Radius {
            centre: Point::new(0.1, 51.5),
            metres: 1000.0,
        };
        assert!(filter.envelope().is_none());
        assert!(filter.to_wkt().is_none());
    }
}
