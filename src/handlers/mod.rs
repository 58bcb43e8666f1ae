// Per-endpoint request handlers

pub mod chat;
pub mod generate;
pub mod logs;
pub mod models;

use axum::body::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;

use crate::backends::{Backend, BackendFailure};
use crate::config::Config;
use crate::database::{Database, ExchangeRecord};
use crate::error::ProxyError;

/// Shared by every handler; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn Backend>,
    pub db: Database,
}

impl AppState {
    pub fn new(config: Arc<Config>, backend: Arc<dyn Backend>, db: Database) -> Self {
        Self { config, backend, db }
    }

    /// Log record for an exchange on `endpoint`, before anything is known about its outcome
    pub fn new_record(
        &self,
        endpoint: &str,
        method: &str,
        model: &str,
        stream: bool,
    ) -> ExchangeRecord {
        ExchangeRecord {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            model: model.to_string(),
            stream,
            backend_type: self.config.backend.kind.as_str().to_string(),
            frontend_url: self.config.frontend_url(endpoint),
            ..Default::default()
        }
    }

    /// Log a failed backend call and build the client-facing error.
    pub async fn record_failure(
        &self,
        mut record: ExchangeRecord,
        failure: BackendFailure,
        started: Instant,
    ) -> ProxyError {
        tracing::error!("[PROXY] Backend error on {}: {}", record.endpoint, failure);

        let message = failure.to_string();
        record.status_code = 500;
        record.latency_ms = started.elapsed().as_millis() as u64;
        record.error = message.clone();
        record.backend_url = failure.exchange.url;
        record.backend_request = failure.exchange.raw_request;
        record.backend_response = failure.exchange.raw_response;
        self.db.record(record).await;

        ProxyError::Backend(message)
    }
}

/// Decode a JSON request body, keeping the rejection reason in the debug log
pub(crate) fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ProxyError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("[PROXY] Rejected request body: {}", e);
        ProxyError::InvalidBody
    })
}

pub(crate) fn log_raw_request<T: serde::Serialize>(config: &Config, label: &str, request: &T) {
    if !config.server.log_raw_requests {
        return;
    }
    if let Ok(pretty) = serde_json::to_string_pretty(request) {
        tracing::info!("[PROXY] Raw {} request:\n{}", label, pretty);
    }
}
