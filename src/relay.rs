// Relay of backend increments to the client, with exchange capture
//
// The handler returns as soon as the backend has accepted the request. A
// spawned task then forwards increments as NDJSON lines into the response
// body, and logs the complete exchange once the backend transcript is in.

use axum::body::{Body, Bytes};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::backends::{BackendStream, INCREMENT_BUFFER};
use crate::config::Config;
use crate::database::{Database, ExchangeRecord};
use crate::models::Increment;

pub const CLIENT_DISCONNECTED: &str = "client disconnected before the response completed";

/// Everything the relay needs to log the exchange when it ends
pub struct RelayContext {
    pub db: Database,
    pub config: Arc<Config>,
    pub record: ExchangeRecord,
    pub started: Instant,
}

/// What was actually delivered to the client
#[derive(Debug, Default)]
struct Delivery {
    text: String,
    lines: Vec<String>,
    pretty: Vec<Value>,
    disconnected: bool,
}

/// Start relaying `stream` and return the streaming response for the client.
pub fn respond<T: Increment>(
    stream: BackendStream<T>,
    cancel: CancellationToken,
    ctx: RelayContext,
) -> Response {
    let content_type = if ctx.record.stream {
        "application/x-ndjson"
    } else {
        "application/json"
    };
    let (body_tx, body_rx) = mpsc::channel::<Result<Bytes, Infallible>>(INCREMENT_BUFFER);

    tokio::spawn(relay(stream, body_tx, cancel, ctx));

    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReceiverStream::new(body_rx)),
    )
        .into_response()
}

async fn relay<T: Increment>(
    stream: BackendStream<T>,
    body_tx: mpsc::Sender<Result<Bytes, Infallible>>,
    cancel: CancellationToken,
    ctx: RelayContext,
) {
    let BackendStream {
        mut increments,
        transcript,
        exchange,
    } = stream;
    let keep_pretty = ctx.config.server.log_raw_responses;
    let mut delivery = Delivery::default();

    loop {
        let next = tokio::select! {
            next = increments.recv() => next,
            _ = body_tx.closed() => {
                delivery.disconnected = true;
                break;
            }
        };
        let Some(increment) = next else {
            break;
        };

        let line = match serde_json::to_string(&increment) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("[PROXY] Failed to encode increment: {}", e);
                continue;
            }
        };
        delivery.text.push_str(increment.content());
        if keep_pretty {
            if let Ok(value) = serde_json::to_value(&increment) {
                delivery.pretty.push(value);
            }
        }

        let mut framed = line.clone();
        framed.push('\n');
        if body_tx.send(Ok(Bytes::from(framed))).await.is_err() {
            delivery.disconnected = true;
            break;
        }
        delivery.lines.push(line);

        if increment.is_final() {
            break;
        }
    }

    if delivery.disconnected {
        tracing::info!("[PROXY] Client disconnected from {}", ctx.record.endpoint);
        cancel.cancel();
    }
    // Ends the client response while the backend is still being drained.
    drop(body_tx);
    drop(increments);

    let raw_response = transcript.await.unwrap_or_else(|e| {
        tracing::warn!("[PROXY] Backend reader task failed: {}", e);
        exchange.raw_response.clone()
    });

    log_delivery(&ctx.config, &delivery);

    let RelayContext {
        db,
        mut record,
        started,
        ..
    } = ctx;
    record.status_code = 200;
    record.latency_ms = started.elapsed().as_millis() as u64;
    record.response = delivery.text;
    record.frontend_response = delivery.lines.join("\n");
    record.backend_url = exchange.url;
    record.backend_request = exchange.raw_request;
    record.backend_response = raw_response;
    if delivery.disconnected {
        record.error = CLIENT_DISCONNECTED.to_string();
    }

    db.record(record).await;
}

fn log_delivery(config: &Config, delivery: &Delivery) {
    if config.server.log_messages {
        tracing::info!("[PROXY] Full response: {}", delivery.text);
    }
    if config.server.log_raw_responses && !delivery.pretty.is_empty() {
        if let Ok(pretty) = serde_json::to_string_pretty(&delivery.pretty) {
            tracing::info!("[PROXY] Raw responses:\n{}", pretty);
        }
    }
}
