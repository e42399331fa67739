//! Parsing of the `bbox`, `location` + `radius`, and `polygon` parameters.
//!
//! All coordinates are `lon,lat` pairs in WGS84 degrees.

use geo::{Area, Coord, LineString, Polygon};
use geodata_models::{BoundingBox, Point, SpatialFilter};

use crate::{GeodataError, Result};

/// Minimum points in a closed ring: a triangle plus its closing point.
const MIN_RING_POINTS: usize = 4;

fn invalid(message: impl Into<String>) -> GeodataError {
    GeodataError::InvalidSpatialFilter {
        message: message.into(),
    }
}

fn parse_numbers(raw: &str, param: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(format!("{param}: {part:?} is not a number")))
        })
        .collect()
}

fn point(lon: f64, lat: f64, param: &str) -> Result<Point> {
    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(invalid(format!("{param}: {lon},{lat} is out of range")));
    }
    Ok(Point::new(lon, lat))
}

/// Parses `lon1,lat1,lon2,lat2`, two opposite corners in either diagonal.
///
/// # Errors
///
/// Returns [`GeodataError::InvalidSpatialFilter`] unless exactly four
/// in-range numbers are given.
pub fn parse_bbox(raw: &str) -> Result<BoundingBox> {
    match parse_numbers(raw, "bbox")?.as_slice() {
        [lon1, lat1, lon2, lat2] => Ok(BoundingBox::from_corners(
            point(*lon1, *lat1, "bbox")?,
            point(*lon2, *lat2, "bbox")?,
        )),
        _ => Err(invalid("bbox: expected lon1,lat1,lon2,lat2")),
    }
}

/// Parses a `lon,lat` centre point.
///
/// # Errors
///
/// Returns [`GeodataError::InvalidSpatialFilter`] unless exactly two
/// in-range numbers are given.
pub fn parse_location(raw: &str) -> Result<Point> {
    match parse_numbers(raw, "location")?.as_slice() {
        [lon, lat] => point(*lon, *lat, "location"),
        _ => Err(invalid("location: expected lon,lat")),
    }
}

/// Parses a radius in metres.
///
/// # Errors
///
/// Returns [`GeodataError::InvalidSpatialFilter`] unless the value is a
/// positive finite number.
pub fn parse_radius(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| invalid(format!("radius: {raw:?} is not a positive number of metres")))
}

/// Parses a closed ring `lon1,lat1,lon2,lat2,...,lon1,lat1`.
///
/// # Errors
///
/// Returns [`GeodataError::InvalidSpatialFilter`] if the coordinate count
/// is odd, the ring has fewer than four points, is not closed, or
/// encloses no area.
pub fn parse_polygon(raw: &str) -> Result<Vec<Point>> {
    let numbers = parse_numbers(raw, "polygon")?;
    if numbers.len() % 2 != 0 {
        return Err(invalid("polygon: odd number of coordinates"));
    }

    let ring = numbers
        .chunks_exact(2)
        .map(|pair| point(pair[0], pair[1], "polygon"))
        .collect::<Result<Vec<_>>>()?;

    if ring.len() < MIN_RING_POINTS {
        return Err(invalid(format!(
            "polygon: need at least {MIN_RING_POINTS} points, got {}",
            ring.len()
        )));
    }
    if ring.first() != ring.last() {
        return Err(invalid("polygon: first and last points must be equal"));
    }

    let exterior: LineString<f64> = ring
        .iter()
        .map(|p| Coord { x: p.lon, y: p.lat })
        .collect();
    if Polygon::new(exterior, vec![]).unsigned_area() == 0.0 {
        return Err(invalid("polygon: ring encloses no area"));
    }

    Ok(ring)
}

/// Builds the request's spatial filter from its raw parameters.
///
/// At most one of `bbox`, `location` + `radius`, and `polygon` may be
/// given. `location` and `radius` must appear together.
///
/// # Errors
///
/// Returns [`GeodataError::InvalidSpatialFilter`] if more than one filter
/// is given, only half of `location` + `radius` is given, or any part
/// fails to parse.
pub fn parse_spatial_filter(
    bbox: Option<&str>,
    location: Option<&str>,
    radius: Option<&str>,
    polygon: Option<&str>,
) -> Result<Option<SpatialFilter>> {
    let radial = match (location, radius) {
        (Some(location), Some(radius)) => Some((location, radius)),
        (None, None) => None,
        _ => return Err(invalid("location and radius must be given together")),
    };

    let given = usize::from(bbox.is_some()) + usize::from(radial.is_some()) + usize::from(polygon.is_some());
    if given > 1 {
        return Err(invalid("only one of bbox, location+radius, or polygon may be given"));
    }

    if let Some(raw) = bbox {
        return Ok(Some(SpatialFilter::BoundingBox(parse_bbox(raw)?)));
    }
    if let Some((location, radius)) = radial {
        return Ok(Some(SpatialFilter::Radius {
            centre: parse_location(location)?,
            metres: parse_radius(radius)?,
        }));
    }
    if let Some(raw) = polygon {
        return Ok(Some(SpatialFilter::Polygon {
            ring: parse_polygon(raw)?,
        }));
    }

    Ok(None)
}
