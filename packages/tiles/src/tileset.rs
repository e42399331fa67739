//! Per-tile pivot tables.
//!
//! A tiles spec maps each geography type to its tiles:
//!
//! ```json
//! { "LAD": [{ "tilename": "0-0", "bbox": { "east": 1.8, "north": 55.8, "west": -6.4, "south": 49.9 } }] }
//! ```

use std::{collections::BTreeMap, path::Path, path::PathBuf, sync::Arc};

use duckdb::Connection;
use geodata::TableRequest;
use geodata_cli_utils::ProgressCallback;
use geodata_models::{
    BoundingBox, GeoType, Point, Selector, SpatialFilter, category::is_totals_category,
    totals_category,
};
use serde::Deserialize;

use crate::{BatchSummary, Generator, TaskOutcome, TilesError, pool::run_tasks, write_atomic};

/// A tile's bounds as written in the tiles file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TileBox {
    /// Eastern longitude.
    pub east: f64,
    /// Northern latitude.
    pub north: f64,
    /// Western longitude.
    pub west: f64,
    /// Southern latitude.
    pub south: f64,
}

impl From<TileBox> for BoundingBox {
    fn from(b: TileBox) -> Self {
        Self::from_corners(Point::new(b.east, b.south), Point::new(b.west, b.north))
    }
}

/// A named tile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tile {
    /// Directory name for the tile.
    #[serde(rename = "tilename")]
    pub name: String,
    /// Tile bounds.
    pub bbox: TileBox,
}

/// Tiles per geography type.
pub type TileSpec = BTreeMap<GeoType, Vec<Tile>>;

/// Loads a tiles spec file.
///
/// # Errors
///
/// Returns [`TilesError::InvalidGeotype`] for an unknown geotype key,
/// or an I/O or JSON error.
pub fn load_spec(path: &Path) -> Result<TileSpec, TilesError> {
    let text = std::fs::read_to_string(path)?;
    parse_spec(&text)
}

fn parse_spec(text: &str) -> Result<TileSpec, TilesError> {
    let raw: BTreeMap<String, Vec<Tile>> = serde_json::from_str(text)?;
    raw.into_iter()
        .map(|(name, tiles)| {
            let geotype = name
                .parse::<GeoType>()
                .map_err(|_| TilesError::InvalidGeotype { name })?;
            Ok((geotype, tiles))
        })
        .collect()
}

/// One tile CSV to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct TileTask {
    /// Geography type of the tile.
    pub geotype: GeoType,
    /// Tile to cover.
    pub tile: Tile,
    /// Category column.
    pub category: String,
}

impl TileTask {
    /// `<out>/<geotype>/<tile>/<cat>.csv`
    #[must_use]
    pub fn path(&self, generator: &Generator) -> PathBuf {
        generator
            .out_dir
            .join(self.geotype.as_ref())
            .join(&self.tile.name)
            .join(format!("{}.csv", self.category))
    }

    /// The tile's geographies of one category, divided by the
    /// category's totals.
    fn request(&self, generator: &Generator) -> Result<TableRequest, TilesError> {
        Ok(TableRequest {
            version: generator.version.clone(),
            geographies: Selector::default(),
            categories: Selector {
                singles: vec![self.category.clone()],
                ranges: Vec::new(),
            },
            census_tables: Vec::new(),
            geotypes: vec![self.geotype],
            spatial: Some(SpatialFilter::BoundingBox(self.tile.bbox.into())),
            divide_by: Some(totals_category(&self.category)?),
        })
    }
}

/// Every tile x category pair in the tiles file.
#[must_use]
pub fn tasks(spec: &TileSpec, categories: &[String]) -> Vec<TileTask> {
    spec.iter()
        .flat_map(|(geotype, tiles)| {
            tiles.iter().flat_map(move |tile| {
                categories.iter().map(move |category| TileTask {
                    geotype: *geotype,
                    tile: tile.clone(),
                    category: category.clone(),
                })
            })
        })
        .collect()
}

/// Renders one tile's pivot table and writes it.
///
/// # Errors
///
/// Returns [`TilesError`] if the query fails or the file can't be
/// written.
pub fn generate_one(
    generator: &Generator,
    conn: &Connection,
    task: &TileTask,
) -> Result<TaskOutcome, TilesError> {
    if is_totals_category(&task.category) {
        return Ok(TaskOutcome::SkippedTotals(task.category.clone()));
    }

    let path = task.path(generator);
    if path.exists() {
        return Ok(TaskOutcome::Exists(path));
    }

    let csv = generator
        .engine
        .table(conn, &task.request(generator)?)?
        .to_csv()?;
    write_atomic(&path, csv.as_bytes())?;

    Ok(TaskOutcome::Written(path))
}

/// Generates a CSV per tile x category.
///
/// # Errors
///
/// Returns the first task error; see [`run_tasks`].
pub async fn generate(
    generator: Arc<Generator>,
    conn: &Connection,
    spec: &TileSpec,
    categories: &[String],
    workers: usize,
    progress: Arc<dyn ProgressCallback>,
) -> Result<BatchSummary, TilesError> {
    let tasks = tasks(spec, categories);
    run_tasks(conn, tasks, workers, progress, move |conn, task| {
        generate_one(&generator, conn, &task)
    })
    .await
}

#[cfg(test)]
mod tests {
    use geodata::GeodataError;
    use geodata_cli_utils::null_progress;
    use geodata_database::load::{GeoRecord, insert_geographies, insert_metrics};
    use geodata_models::{DataVersion, MetricTriple};

    use super::*;

    const SPEC: &str = r#"{
        "LSOA": [
            { "tilename": "west", "bbox": { "east": 0.0, "north": 52.0, "west": -1.0, "south": 51.0 } },
            { "tilename": "east", "bbox": { "east": 2.0, "north": 53.0, "west": 0.5, "south": 51.5 } }
        ]
    }"#;

    fn store() -> Connection {
        let conn = geodata_database::open_in_memory().unwrap();
        insert_geographies(
            &conn,
            &[
                GeoRecord::new("E01", GeoType::Lsoa)
                    .with_envelope(BoundingBox::new(-0.2, 51.4, -0.1, 51.5)),
                GeoRecord::new("E02", GeoType::Lsoa)
                    .with_envelope(BoundingBox::new(1.0, 52.0, 1.1, 52.1)),
                GeoRecord::new("L1", GeoType::Lad)
                    .with_envelope(BoundingBox::new(-0.5, 51.0, 1.5, 52.5)),
            ],
        )
        .unwrap();
        insert_metrics(
            &conn,
            &DataVersion::default(),
            &[
                MetricTriple::new("E01", "QS101EW0001", 10.0),
                MetricTriple::new("E01", "QS101EW0002", 5.0),
                MetricTriple::new("E02", "QS101EW0001", 3.0),
                MetricTriple::new("E02", "QS101EW0002", 9.0),
                MetricTriple::new("L1", "QS101EW0001", 28.0),
                MetricTriple::new("L1", "QS101EW0002", 14.0),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn parses_spec_case_insensitively() {
        let spec = parse_spec(&SPEC.replace("LSOA", "lsoa")).unwrap();
        let tiles = &spec[&GeoType::Lsoa];
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].name, "west");
        assert_eq!(
            BoundingBox::from(tiles[0].bbox),
            BoundingBox::new(-1.0, 51.0, 0.0, 52.0)
        );
    }

    #[test]
    fn unknown_geotype_is_rejected() {
        let err = parse_spec(&SPEC.replace("LSOA", "WARD")).unwrap_err();
        assert!(matches!(err, TilesError::InvalidGeotype { ref name } if name == "WARD"));
    }

    #[test]
    fn tile_without_totals_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let conn = store();
        conn.execute_batch(
            "DELETE FROM geo_metric WHERE geo_id = (SELECT id FROM geo WHERE code = 'E02')
             AND category_id = (SELECT id FROM nomis_category WHERE long_nomis_code = 'QS101EW0001')",
        )
        .unwrap();
        let generator = Generator::new(dir.path().to_path_buf(), DataVersion::default());
        let task = TileTask {
            geotype: GeoType::Lsoa,
            tile: parse_spec(SPEC).unwrap()[&GeoType::Lsoa][1].clone(),
            category: "QS101EW0002".to_string(),
        };

        let err = generate_one(&generator, &conn, &task).unwrap_err();
        assert!(matches!(
            err,
            TilesError::Geodata(GeodataError::PartialContent { ref geocode, .. })
                if geocode.as_deref() == Some("E02")
        ));
        assert!(!task.path(&generator).exists());
    }

    #[tokio::test]
    async fn writes_one_csv_per_tile_and_category() {
        let dir = tempfile::tempdir().unwrap();
        let conn = store();
        let spec = parse_spec(SPEC).unwrap();
        let generator = Arc::new(Generator::new(dir.path().to_path_buf(), DataVersion::default()));

        let summary = generate(
            generator,
            &conn,
            &spec,
            &["QS101EW0002".to_string(), "QS101EW0001".to_string()],
            2,
            null_progress(),
        )
        .await
        .unwrap();
        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 2);

        assert_eq!(
            std::fs::read_to_string(dir.path().join("LSOA/west/QS101EW0002.csv")).unwrap(),
            "geography_code,QS101EW0002\nE01,0.5\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("LSOA/east/QS101EW0002.csv")).unwrap(),
            "geography_code,QS101EW0002\nE02,3\n"
        );
    }
}
