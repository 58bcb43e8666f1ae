// Log browsing API: GET /, GET /logs, GET /logs/details

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::database::{ExchangeRecord, ExchangeSummary};
use crate::error::ProxyError;

pub const PAGE_SIZE: u32 = 25;

#[derive(Debug, Serialize)]
pub struct ProxyOverview {
    pub backend_type: String,
    pub backend_endpoint: String,
    pub host: String,
    pub port: u16,
    pub timeout: u64,
    pub database_path: String,
    pub enable_cors: bool,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogPage {
    pub entries: Vec<ExchangeSummary>,
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    pub id: Option<String>,
}

pub async fn home_handler(State(state): State<AppState>) -> Json<ProxyOverview> {
    let config = &state.config;
    Json(ProxyOverview {
        backend_type: config.backend.kind.as_str().to_string(),
        backend_endpoint: config.backend.endpoint.clone(),
        host: config.server.host.clone(),
        port: config.server.port,
        timeout: config.backend.timeout,
        database_path: config.database.path.clone(),
        enable_cors: config.server.enable_cors,
    })
}

/// Invalid or missing page numbers fall back to the first page.
pub async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<LogPage>, ProxyError> {
    let page = query
        .page
        .as_deref()
        .and_then(|p| p.parse::<u32>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1);

    let db = state.db.clone();
    let (entries, total_count) = tokio::task::spawn_blocking(move || {
        let offset = (page - 1).saturating_mul(PAGE_SIZE);
        Ok::<_, rusqlite::Error>((db.recent_entries(PAGE_SIZE, offset)?, db.total_count()?))
    })
    .await
    .map_err(|e| ProxyError::Backend(e.to_string()))??;

    let total_pages = total_count.div_ceil(u64::from(PAGE_SIZE)).max(1);
    Ok(Json(LogPage {
        entries,
        page,
        total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        total_count,
    }))
}

pub async fn details_handler(
    State(state): State<AppState>,
    Query(query): Query<DetailsQuery>,
) -> Result<Json<ExchangeRecord>, ProxyError> {
    let id: i64 = query
        .id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ProxyError::BadRequest("Invalid log ID".to_string()))?;

    let db = state.db.clone();
    let entry = tokio::task::spawn_blocking(move || db.entry_by_id(id))
        .await
        .map_err(|e| ProxyError::Backend(e.to_string()))??;

    entry.map(Json).ok_or(ProxyError::NotFound)
}
