//! Mapping core errors onto HTTP responses.

use actix_web::{HttpResponse, ResponseError, error::BlockingError, http::StatusCode};
use geodata::GeodataError;
use geodata_server_models::ApiError;

/// Error returned by request handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The query or classification failed.
    #[error(transparent)]
    Geodata(#[from] GeodataError),

    /// The blocking thread pool is gone (server shutting down).
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] BlockingError),
}

impl ServerError {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Geodata(e) => match e {
                GeodataError::MalformedRange { .. } => "malformed_range",
                GeodataError::UnsupportedRange { .. } => "unsupported_range",
                GeodataError::MissingParams { .. } => "missing_params",
                GeodataError::InvalidGeotype { .. } => "invalid_geotype",
                GeodataError::InvalidSpatialFilter { .. } => "invalid_spatial_filter",
                GeodataError::ResultSetTooLarge { .. } => "too_many_metrics",
                GeodataError::PartialContent { .. } => "partial_content",
                GeodataError::InvalidRatio { .. } => "invalid_ratio",
                GeodataError::Clustering { .. } => "clustering",
                GeodataError::DeadlineExceeded => "deadline_exceeded",
                GeodataError::Store(_) => "store",
                GeodataError::Render { .. } => "render",
            },
            Self::Blocking(_) => "internal",
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Geodata(GeodataError::ResultSetTooLarge { .. }) => StatusCode::FORBIDDEN,
            Self::Geodata(GeodataError::DeadlineExceeded) => StatusCode::GATEWAY_TIMEOUT,
            Self::Geodata(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Geodata(_) | Self::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{self}");
        } else {
            log::debug!("Rejected request: {self}");
        }
        HttpResponse::build(status).json(ApiError::new(self.kind(), self.to_string()))
    }
}
