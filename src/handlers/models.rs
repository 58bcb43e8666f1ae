// GET /api/tags and POST /api/show

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use std::time::Instant;

use super::{decode_body, AppState};
use crate::error::ProxyError;
use crate::models::{ModelsResponse, ShowRequest, ShowResponse};

pub async fn tags_handler(
    State(state): State<AppState>,
) -> Result<Json<ModelsResponse>, ProxyError> {
    let started = Instant::now();
    let mut record = state.new_record("/api/tags", "GET", "", false);
    record.backend_url = state.backend.endpoint().to_string();

    let result = state.backend.list_models().await;
    record.latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(models) => {
            record.status_code = 200;
            record.frontend_response = serde_json::to_string(&models).unwrap_or_default();
            state.db.record(record).await;
            Ok(Json(models))
        }
        Err(e) => {
            tracing::error!("[PROXY] Failed to list models: {}", e);
            record.status_code = 500;
            record.error = e.to_string();
            state.db.record(record).await;
            Err(ProxyError::Backend(e.to_string()))
        }
    }
}

/// No model introspection is available; the name is echoed back.
pub async fn show_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ShowResponse>, ProxyError> {
    let started = Instant::now();
    let request: ShowRequest = decode_body(&body)?;

    let response = ShowResponse {
        name: request.name.clone(),
        size: 0,
        digest: String::new(),
    };

    let mut record = state.new_record("/api/show", "POST", &request.name, false);
    record.status_code = 200;
    record.latency_ms = started.elapsed().as_millis() as u64;
    record.frontend_request = String::from_utf8_lossy(&body).into_owned();
    record.frontend_response = serde_json::to_string(&response).unwrap_or_default();
    record.last_message = request.name;
    state.db.record(record).await;

    Ok(Json(response))
}
