// POST /api/generate

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{decode_body, log_raw_request, AppState};
use crate::error::ProxyError;
use crate::models::GenerateRequest;
use crate::relay::{self, RelayContext};

pub const ENDPOINT: &str = "/api/generate";

pub async fn generate_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let started = Instant::now();
    let request: GenerateRequest = decode_body(&body)?;

    log_raw_request(&state.config, "generate", &request);
    if state.config.server.log_messages {
        tracing::info!("[PROXY] Generate request for {}: {}", request.model, request.prompt);
    }

    let mut record = state.new_record(ENDPOINT, "POST", &request.model, request.wants_stream());
    record.frontend_request = String::from_utf8_lossy(&body).into_owned();
    record.prompt = request.prompt.clone();
    record.last_message = if request.prompt.is_empty() {
        "unknown".to_string()
    } else {
        request.prompt.clone()
    };

    let cancel = CancellationToken::new();
    match state.backend.generate(request, cancel.clone()).await {
        Ok(stream) => Ok(relay::respond(
            stream,
            cancel,
            RelayContext {
                db: state.db.clone(),
                config: state.config.clone(),
                record,
                started,
            },
        )),
        Err(failure) => Err(state.record_failure(record, failure, started).await),
    }
}
