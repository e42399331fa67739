//! HTTP handler functions for the geodata API.

use actix_web::{HttpResponse, web};
use geodata::{ClassifyRequest, QueryParams, TableRequest, fingerprint::Fingerprint as _};
use geodata_models::DataVersion;
use geodata_server_models::{CSV_CONTENT_TYPE, CkmeansResponse, JSON_CONTENT_TYPE};

use crate::{AppState, ServerError};

fn version(state: &AppState, year: i32) -> DataVersion {
    DataVersion::new(year, &state.ver_string)
}

fn cached(state: &AppState, key: &str) -> Option<HttpResponse> {
    state.cache.get(key).map(|hit| {
        log::debug!("Cache hit for {key}");
        HttpResponse::Ok()
            .content_type(hit.content_type)
            .body(hit.body)
    })
}

fn cache_and_respond(state: &AppState, key: String, body: String, content_type: &'static str) -> HttpResponse {
    state.cache.insert(key, body.clone(), content_type);
    HttpResponse::Ok().content_type(content_type).body(body)
}

/// `GET /api/query/{year}`
///
/// Pivots the selected metrics into a CSV table with one row per
/// geography and one column per category. With `divide_by`, each cell
/// is divided by that category's value for the same geography.
pub async fn query(
    state: web::Data<AppState>,
    year: web::Path<i32>,
    params: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ServerError> {
    let params = QueryParams::from_pairs(params.into_inner());
    let request = TableRequest::from_params(version(&state, year.into_inner()), &params)?;

    let key = request.fingerprint();
    if let Some(response) = cached(&state, &key) {
        return Ok(response);
    }

    let worker = state.clone();
    let csv = web::block(move || {
        let conn = worker.pool.acquire();
        worker.engine.table(&conn, &request)?.to_csv()
    })
    .await??;

    Ok(cache_and_respond(&state, key, csv, CSV_CONTENT_TYPE))
}

/// `GET /api/ckmeans/{year}`
///
/// Computes natural breaks for each requested category and geography
/// type, optionally as a ratio against `divide_by`.
pub async fn ckmeans(
    state: web::Data<AppState>,
    year: web::Path<i32>,
    params: web::Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ServerError> {
    let params = QueryParams::from_pairs(params.into_inner());
    let request = ClassifyRequest::from_params(version(&state, year.into_inner()), &params)?;

    let key = request.fingerprint();
    if let Some(response) = cached(&state, &key) {
        return Ok(response);
    }

    let worker = state.clone();
    let breaks: CkmeansResponse = web::block(move || {
        let conn = worker.pool.acquire();
        worker.engine.classify(&conn, &request)
    })
    .await??;

    let body = serde_json::to_string(&breaks).map_err(|e| geodata::GeodataError::Render {
        message: e.to_string(),
    })?;

    Ok(cache_and_respond(&state, key, body, JSON_CONTENT_TYPE))
}
