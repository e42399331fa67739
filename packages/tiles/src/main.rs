#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for generating static tiles, breaks, and geography lookups.

use std::{path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use geodata_cli_utils::IndicatifProgress;
use geodata_models::{DEFAULT_CENSUS_YEAR, DEFAULT_VER_STRING, DataVersion, GeoType};
use geodata_tiles::{DEFAULT_K, Generator, breaks, geolookup, load_categories, tileset};

#[derive(Parser)]
#[command(name = "geodata_tiles", about = "Static census geodata generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// `DuckDB` store to read
    #[arg(long, default_value_os_t = geodata_database::paths::default_db_path())]
    db: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value_t = 1)]
    jobs: usize,

    /// Census year
    #[arg(long, default_value_t = DEFAULT_CENSUS_YEAR)]
    year: i32,

    /// Data version string
    #[arg(long, default_value = DEFAULT_VER_STRING)]
    ver: String,

    /// File holding categories, one per line
    #[arg(short = 'C', long)]
    categories: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate natural breaks per geotype and category
    Breaks {
        #[command(flatten)]
        store: StoreArgs,

        /// Geography types to classify over
        #[arg(short, long, value_delimiter = ',', required = true)]
        geotype: Vec<GeoType>,

        /// Number of clusters
        #[arg(short, default_value_t = DEFAULT_K)]
        k: usize,
    },
    /// Generate a pivot CSV per tile and category
    Tiles {
        #[command(flatten)]
        store: StoreArgs,

        /// Tiles spec JSON: geotype -> [{tilename, bbox}]
        #[arg(short = 'T', long)]
        tiles: PathBuf,
    },
    /// Build a geocode lookup CSV from `GeoJSON` files
    Geolookup {
        /// Output CSV (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// `GeoJSON` files to read
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl StoreArgs {
    fn generator(&self) -> Generator {
        Generator::new(self.out.clone(), DataVersion::new(self.year, &self.ver))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = geodata_cli_utils::init_logger();
    let cli = Cli::parse();
    let start = std::time::Instant::now();

    match cli.command {
        Commands::Breaks { store, geotype, k } => {
            let conn = geodata_database::open_read_only(&store.db)?;
            let categories = load_categories(&store.categories)?;
            let progress = IndicatifProgress::tasks_bar(&multi, "breaks", 0);

            let summary = breaks::generate(
                Arc::new(store.generator().with_k(k)),
                &conn,
                &geotype,
                &categories,
                store.jobs,
                progress,
            )
            .await?;
            log::info!(
                "Breaks: {} written, {} existing",
                summary.written,
                summary.existing
            );
        }
        Commands::Tiles { store, tiles } => {
            let conn = geodata_database::open_read_only(&store.db)?;
            let categories = load_categories(&store.categories)?;
            let spec = tileset::load_spec(&tiles)?;
            let progress = IndicatifProgress::tasks_bar(&multi, "tiles", 0);

            let summary = tileset::generate(
                Arc::new(store.generator()),
                &conn,
                &spec,
                &categories,
                store.jobs,
                progress,
            )
            .await?;
            log::info!(
                "Tiles: {} written, {} existing",
                summary.written,
                summary.existing
            );
        }
        Commands::Geolookup { out, files } => {
            let progress = IndicatifProgress::scan_bar(&multi, "geolookup");
            let written = if let Some(path) = out {
                let mut buf = Vec::new();
                let n = geolookup::write_lookup(&files, &mut buf, progress.as_ref())?;
                geodata_tiles::write_atomic(&path, &buf)?;
                n
            } else {
                geolookup::write_lookup(&files, std::io::stdout().lock(), progress.as_ref())?
            };
            log::info!("Geolookup: {written} geographies");
        }
    }

    log::info!("Total elapsed time: {:.1?}", start.elapsed());
    Ok(())
}
