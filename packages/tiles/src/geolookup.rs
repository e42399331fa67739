//! Geography lookup table from `GeoJSON` boundary files.

use std::{io::Write, path::Path};

use geodata_cli_utils::ProgressCallback;
use geodata_models::FeatureProperties;
use geojson::GeoJson;

use crate::TilesError;

/// One row of the lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRow {
    /// Geography code.
    pub geocode: String,
    /// Geography type name.
    pub geotype: String,
    /// English name.
    pub ename: String,
    /// Welsh name.
    pub wname: String,
}

/// Extracts lookup rows from one `GeoJSON` document.
///
/// Features without both a geocode and a geotype are skipped.
///
/// # Errors
///
/// Returns [`TilesError::GeoJson`] if the text isn't valid `GeoJSON`.
pub fn rows_from_geojson(text: &str) -> Result<Vec<LookupRow>, TilesError> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => Vec::new(),
    };

    let mut rows = Vec::with_capacity(features.len());
    for (i, feature) in features.into_iter().enumerate() {
        let properties: FeatureProperties = match feature.properties {
            Some(props) => serde_json::from_value(serde_json::Value::Object(props))?,
            None => FeatureProperties::default(),
        };

        let Some((geocode, geotype)) = properties.code_and_type() else {
            log::warn!("Skipping feature {i}: missing geocode or geotype");
            continue;
        };

        rows.push(LookupRow {
            geocode: geocode.to_string(),
            geotype: geotype.to_string(),
            ename: properties.ename.clone().unwrap_or_default(),
            wname: properties.wname.clone().unwrap_or_default(),
        });
    }

    Ok(rows)
}

/// Reads every file and writes a `geocode,geotype,ename,wname` CSV.
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`TilesError`] if a file can't be read or parsed, or the CSV
/// can't be written.
pub fn write_lookup<W: Write>(
    files: &[impl AsRef<Path>],
    writer: W,
    progress: &dyn ProgressCallback,
) -> Result<usize, TilesError> {
    let mut csv = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    csv.write_record(["geocode", "geotype", "ename", "wname"])?;

    progress.set_total(files.len() as u64);

    let mut written = 0;
    for file in files {
        let file = file.as_ref();
        progress.set_message(file.display().to_string());

        let rows = rows_from_geojson(&std::fs::read_to_string(file)?)?;
        log::info!("{}: {} geographies", file.display(), rows.len());

        for row in &rows {
            csv.write_record([&row.geocode, &row.geotype, &row.ename, &row.wname])?;
        }
        written += rows.len();
        progress.inc(1);
    }

    csv.flush()?;
    progress.finish(format!("{written} geographies"));

    Ok(written)
}

#[cfg(test)]
mod tests {
    use geodata_cli_utils::NullProgress;

    use super::*;

    const LSOAS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "geocode": "W01000001", "geotype": "LSOA", "ename": "Isle of Anglesey 007A", "wname": "Ynys Mon 007A" },
                "geometry": { "type": "Point", "coordinates": [-4.3, 53.3] }
            },
            {
                "type": "Feature",
                "properties": { "geocode": "E01000001", "geotype": "LSOA", "ename": "City of London, 001A" },
                "geometry": null
            },
            {
                "type": "Feature",
                "properties": { "ename": "No code" },
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn skips_features_without_codes() {
        let rows = rows_from_geojson(LSOAS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].wname, "Ynys Mon 007A");
        assert_eq!(rows[1].wname, "");
    }

    #[test]
    fn writes_lookup_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsoa.geojson");
        std::fs::write(&path, LSOAS).unwrap();

        let mut out = Vec::new();
        let n = write_lookup(&[&path], &mut out, &NullProgress).unwrap();

        assert_eq!(n, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "geocode,geotype,ename,wname\n\
             W01000001,LSOA,Isle of Anglesey 007A,Ynys Mon 007A\n\
             E01000001,LSOA,\"City of London, 001A\",\n"
        );
    }

    #[test]
    fn invalid_geojson_is_an_error() {
        assert!(matches!(
            rows_from_geojson("{\"type\": \"Nope\"}"),
            Err(TilesError::GeoJson(_))
        ));
    }
}
