// Error types surfaced to HTTP clients and to the process entry point

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors a handler turns into an HTTP response
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid request body")]
    InvalidBody,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Backend(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidBody | ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::Backend(_) | ProxyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Errors that stop the proxy from starting
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}
