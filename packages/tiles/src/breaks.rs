//! Pre-computed natural breaks per (geography type, category).

use std::{path::PathBuf, sync::Arc};

use duckdb::Connection;
use geodata::ClassifyRequest;
use geodata_cli_utils::ProgressCallback;
use geodata_models::{GeoType, category::is_totals_category, totals_category};
use serde::Serialize;

use crate::{BatchSummary, Generator, TaskOutcome, TilesError, pool::run_tasks, write_atomic};

/// Directory under the output root holding breaks files.
pub const BREAKS_DIR: &str = "breaks";

/// One breaks file to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreaksTask {
    /// Geography type to classify over.
    pub geotype: GeoType,
    /// Category to classify.
    pub category: String,
}

impl BreaksTask {
    /// `<out>/breaks/<geotype>/<cat>.json`
    #[must_use]
    pub fn path(&self, generator: &Generator) -> PathBuf {
        generator
            .out_dir
            .join(BREAKS_DIR)
            .join(self.geotype.as_ref())
            .join(format!("{}.json", self.category))
    }
}

/// Every geotype x category pair.
#[must_use]
pub fn tasks(geotypes: &[GeoType], categories: &[String]) -> Vec<BreaksTask> {
    geotypes
        .iter()
        .flat_map(|geotype| {
            categories.iter().map(|category| BreaksTask {
                geotype: *geotype,
                category: category.clone(),
            })
        })
        .collect()
}

/// Serializes with four-space indentation.
fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Classifies one category as a ratio against its table totals and
/// writes the result.
///
/// # Errors
///
/// Returns [`TilesError`] if the totals category can't be derived, the
/// classification fails, or the file can't be written.
pub fn generate_one(
    generator: &Generator,
    conn: &Connection,
    task: BreaksTask,
) -> Result<TaskOutcome, TilesError> {
    if is_totals_category(&task.category) {
        return Ok(TaskOutcome::SkippedTotals(task.category));
    }

    let path = task.path(generator);
    if path.exists() {
        return Ok(TaskOutcome::Exists(path));
    }

    let divide_by = totals_category(&task.category)?;
    let request = ClassifyRequest {
        version: generator.version.clone(),
        categories: vec![task.category],
        geotypes: vec![task.geotype],
        k: generator.k,
        divide_by: Some(divide_by),
    };

    let breaks = generator.engine.classify(conn, &request)?;
    write_atomic(&path, &to_pretty_json(&breaks)?)?;

    Ok(TaskOutcome::Written(path))
}

/// Generates breaks files for every geotype x category pair.
///
/// # Errors
///
/// Returns the first task error; see [`run_tasks`].
pub async fn generate(
    generator: Arc<Generator>,
    conn: &Connection,
    geotypes: &[GeoType],
    categories: &[String],
    workers: usize,
    progress: Arc<dyn ProgressCallback>,
) -> Result<BatchSummary, TilesError> {
    let tasks = tasks(geotypes, categories);
    run_tasks(conn, tasks, workers, progress, move |conn, task| {
        generate_one(&generator, conn, task)
    })
    .await
}

#[cfg(test)]
mod tests {
    use geodata_cli_utils::null_progress;
    use geodata_database::load::{GeoRecord, insert_geographies, insert_metrics};
    use geodata_models::{DataVersion, MetricTriple};

    use super::*;

    fn store() -> Connection {
        let conn = geodata_database::open_in_memory().unwrap();
        insert_geographies(
            &conn,
            &[
                GeoRecord::new("L1", GeoType::Lad),
                GeoRecord::new("L2", GeoType::Lad),
                GeoRecord::new("L3", GeoType::Lad),
            ],
        )
        .unwrap();
        insert_metrics(
            &conn,
            &DataVersion::default(),
            &[
                MetricTriple::new("L1", "QS101EW0001", 10.0),
                MetricTriple::new("L2", "QS101EW0001", 20.0),
                MetricTriple::new("L3", "QS101EW0001", 40.0),
                MetricTriple::new("L1", "QS101EW0002", 30.0),
                MetricTriple::new("L2", "QS101EW0002", 80.0),
                MetricTriple::new("L3", "QS101EW0002", 40.0),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn pairs_every_geotype_with_every_category() {
        let tasks = tasks(
            &[GeoType::Lad, GeoType::Lsoa],
            &["QS101EW0002".to_string(), "QS101EW0003".to_string()],
        );
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[2].geotype, GeoType::Lsoa);
        assert_eq!(tasks[2].category, "QS101EW0002");
    }

    #[test]
    fn pretty_json_uses_four_spaces() {
        let json = to_pretty_json(&serde_json::json!({ "a": [1] })).unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            "{\n    \"a\": [\n        1\n    ]\n}"
        );
    }

    #[tokio::test]
    async fn writes_ratio_breaks_and_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let conn = store();
        let generator = Arc::new(
            Generator::new(dir.path().to_path_buf(), DataVersion::default()).with_k(3),
        );
        let categories = vec!["QS101EW0002".to_string()];

        let summary = generate(
            Arc::clone(&generator),
            &conn,
            &[GeoType::Lad],
            &categories,
            2,
            null_progress(),
        )
        .await
        .unwrap();
        assert_eq!(summary.written, 1);

        let path = dir.path().join("breaks/LAD/QS101EW0002.json");
        let breaks: geodata_models::Breaks =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(breaks["QS101EW0002"]["LAD"], vec![1.0, 3.0, 4.0]);
        assert_eq!(breaks["QS101EW0002"]["LAD_min_max"], vec![1.0, 4.0]);

        let again = generate(generator, &conn, &[GeoType::Lad], &categories, 2, null_progress())
            .await
            .unwrap();
        assert_eq!(again.written, 0);
        assert_eq!(again.existing, 1);
    }

    #[test]
    fn totals_categories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let conn = store();
        let generator = Generator::new(dir.path().to_path_buf(), DataVersion::default());

        let outcome = generate_one(
            &generator,
            &conn,
            BreaksTask {
                geotype: GeoType::Lad,
                category: "QS101EW0001".to_string(),
            },
        )
        .unwrap();
        assert_eq!(outcome, TaskOutcome::SkippedTotals("QS101EW0001".to_string()));
        assert!(!dir.path().join(BREAKS_DIR).exists());
    }
}
