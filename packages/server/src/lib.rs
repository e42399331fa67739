#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for census geodata.
//!
//! Serves CSV pivot tables from `/api/query/{year}` and natural-breaks
//! classifications from `/api/ckmeans/{year}`. Each request runs the
//! synchronous `geodata` core on the blocking thread pool with a
//! connection from a small read-only `DuckDB` pool. Responses are cached
//! by request fingerprint.

pub mod cache;
pub mod config;
pub mod error;
mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use geodata::QueryEngine;
use geodata_database::DuckDbPool;

pub use cache::ResponseCache;
pub use config::{ConfigError, ServerConfig};
pub use error::ServerError;

/// Shared application state.
pub struct AppState {
    /// Read-only `DuckDB` connections to the geodata store.
    pub pool: DuckDbPool,
    /// Query settings shared by every request.
    pub engine: QueryEngine,
    /// Fingerprint-keyed response cache.
    pub cache: ResponseCache,
    /// Data version string pinned alongside the requested year.
    pub ver_string: String,
}

impl AppState {
    /// Builds the state for `pool` from server settings.
    #[must_use]
    pub fn new(pool: DuckDbPool, config: &ServerConfig) -> Self {
        Self {
            pool,
            engine: QueryEngine::new()
                .with_max_metrics(config.max_metrics)
                .with_timeout(config.request_timeout())
                .with_spatial(config.enable_spatial),
            cache: ResponseCache::new(config.cache_ttl(), config.cache_max_entries),
            ver_string: config.ver_string.clone(),
        }
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/query/{year}", web::get().to(handlers::query))
            .route("/ckmeans/{year}", web::get().to(handlers::ckmeans)),
    );
}

/// Starts the geodata API server.
///
/// Loads [`ServerConfig`], opens the connection pool (loading the
/// `spatial` extension on every connection when enabled), and runs the
/// HTTP server until shutdown. The caller provides the async runtime.
///
/// # Errors
///
/// Returns an `std::io::Error` if configuration is invalid, the store
/// cannot be opened, or the HTTP server fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::load().map_err(std::io::Error::other)?;

    log::info!(
        "Opening {} read-only connections to {}",
        config.pool_size,
        config.db_path.display()
    );
    let pool = DuckDbPool::open(&config.db_path, config.pool_size).map_err(std::io::Error::other)?;

    if config.enable_spatial {
        log::info!("Loading DuckDB spatial extension...");
        pool.for_each(geodata_database::enable_spatial)
            .map_err(std::io::Error::other)?;
    }

    if config.max_metrics > 0 {
        log::info!("Metric ceiling: {}", config.max_metrics);
    }

    let bind_addr = config.bind_addr.clone();
    let port = config.port;
    let state = web::Data::new(AppState::new(pool, &config));

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
