// POST /api/chat

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{decode_body, log_raw_request, AppState};
use crate::config::Config;
use crate::error::ProxyError;
use crate::models::{ChatMessage, ChatRequest, Role};
use crate::relay::{self, RelayContext};
use crate::transforms::{filter_tools, inject_text, last_user_message};

pub const ENDPOINT: &str = "/api/chat";

/// Text injection, then tool filtering
pub fn prepare_request(config: &Config, request: &mut ChatRequest) {
    let injection = &config.chat_text_injection;
    if injection.is_active()
        && inject_text(&mut request.messages, &injection.text, injection.mode)
    {
        tracing::debug!("[PROXY] Injected text into {:?} user message", injection.mode);
    }

    if let Some(tools) = request.tools.take() {
        let (kept, removed) = filter_tools(tools, &config.backend.tool_blacklist);
        for name in &removed {
            tracing::info!("[PROXY] Filtering out blacklisted tool: {}", name);
        }
        request.tools = if kept.is_empty() && !removed.is_empty() {
            None
        } else {
            Some(kept)
        };
    }
}

fn prompt_summary(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = m.role.as_ref().map_or("unknown", Role::as_str);
            format!("{}: {}\n", role, m.content)
        })
        .collect()
}

pub async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let started = Instant::now();
    let mut request: ChatRequest = decode_body(&body)?;

    log_raw_request(&state.config, "chat", &request);

    // Logged as typed, before injection
    let last_message = last_user_message(&request.messages)
        .unwrap_or("unknown")
        .to_string();

    prepare_request(&state.config, &mut request);

    if state.config.server.log_messages {
        tracing::info!("[PROXY] Chat request for {}", request.model);
        for (i, message) in request.messages.iter().enumerate() {
            let role = message.role.as_ref().map_or("unknown", Role::as_str);
            tracing::info!("[PROXY]   [{}] {}: {}", i, role, message.content);
        }
    }

    let mut record = state.new_record(ENDPOINT, "POST", &request.model, request.wants_stream());
    record.frontend_request = String::from_utf8_lossy(&body).into_owned();
    record.prompt = prompt_summary(&request.messages);
    record.last_message = last_message;

    let cancel = CancellationToken::new();
    match state.backend.chat(request, cancel.clone()).await {
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
