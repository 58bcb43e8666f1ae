// Backend trait and implementations

pub mod ollama;
pub mod openai;
pub mod stream;
pub mod tool_calls;

use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::{ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, ModelsResponse};

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Increments buffered between the backend reader and the client writer
pub const INCREMENT_BUFFER: usize = 10;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to marshal request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code: {status}, body: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// What was actually exchanged with the backend
#[derive(Debug, Clone, Default)]
pub struct ExchangeMetadata {
    pub url: String,
    pub raw_request: String,
    pub raw_response: String,
}

/// A backend call that failed before any increment was produced
#[derive(Debug)]
pub struct BackendFailure {
    pub error: BackendError,
    pub exchange: ExchangeMetadata,
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for BackendFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Live reply of a backend call.
///
/// `increments` yields frontend-dialect increments in backend order and closes
/// after the final one (or when the exchange is cancelled). `transcript`
/// resolves to the raw backend response once the backend stream has been
/// drained.
pub struct BackendStream<T> {
    pub increments: mpsc::Receiver<T>,
    pub transcript: JoinHandle<String>,
    pub exchange: ExchangeMetadata,
}

impl<T: Send + 'static> BackendStream<T> {
    /// A reply that was fully read before the call returned
    pub fn ready(increment: T, exchange: ExchangeMetadata) -> Self {
        let (tx, rx) = mpsc::channel(INCREMENT_BUFFER);
        let raw_response = exchange.raw_response.clone();
        let transcript = tokio::spawn(async move {
            let _ = tx.send(increment).await;
            raw_response
        });
        Self {
            increments: rx,
            transcript,
            exchange,
        }
    }
}

/// Trait for LLM backend implementations
/// Each backend dialect (Ollama pass-through, OpenAI translation) implements this trait
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the backend name ("openai", "ollama")
    fn name(&self) -> &str;

    /// Returns the base URL of the backend service
    fn endpoint(&self) -> &str;

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<BackendStream<GenerateResponse>, BackendFailure>;

    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<BackendStream<ChatResponse>, BackendFailure>;

    async fn list_models(&self) -> Result<ModelsResponse, BackendError>;
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Serialize a backend request, recording it in `exchange`.
pub(crate) fn encode_request<R: serde::Serialize>(
    request: &R,
    exchange: &mut ExchangeMetadata,
) -> Result<(), BackendError> {
    exchange.raw_request = serde_json::to_string(request)?;
    Ok(())
}

/// POST `exchange.raw_request` to `exchange.url`.
///
/// A non-200 reply is read in full into `exchange.raw_response` and returned
/// as an error.
pub(crate) async fn post_json(
    client: &Client,
    exchange: &mut ExchangeMetadata,
) -> Result<reqwest::Response, BackendError> {
    tracing::debug!("[PROXY] Sending request to backend: {}", exchange.url);
    let response = client
        .post(&exchange.url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(exchange.raw_request.clone())
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        exchange.raw_response = body.clone();
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Encode and send one backend request, keeping what was exchanged either way.
pub(crate) async fn open_exchange<R: serde::Serialize>(
    client: &Client,
    url: String,
    request: &R,
) -> Result<(reqwest::Response, ExchangeMetadata), BackendFailure> {
    let mut exchange = ExchangeMetadata {
        url,
        ..Default::default()
    };
    if let Err(error) = encode_request(request, &mut exchange) {
        return Err(BackendFailure { error, exchange });
    }
    match post_json(client, &mut exchange).await {
        Ok(response) => Ok((response, exchange)),
        Err(error) => Err(BackendFailure { error, exchange }),
    }
}

/// Hand one increment to the relay.
///
/// Returns false once the exchange is cancelled or nobody is listening any
/// more; the caller must stop producing.
pub(crate) async fn emit<T>(
    tx: &mpsc::Sender<T>,
    cancel: &CancellationToken,
    increment: T,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(increment) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_stops_after_cancel() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        assert!(emit(&tx, &cancel, 1).await);
        cancel.cancel();
        assert!(!emit(&tx, &cancel, 2).await);

        drop(tx);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_emit_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!emit(&tx, &CancellationToken::new(), 1).await);
    }

    #[tokio::test]
    async fn test_ready_stream_yields_single_increment() {
        let exchange = ExchangeMetadata {
            url: "http://backend/v1/completions".to_string(),
            raw_request: "{}".to_string(),
            raw_response: "{\"choices\":[]}".to_string(),
        };
        let mut stream = BackendStream::ready("only", exchange);

        assert_eq!(stream.increments.recv().await, Some("only"));
        assert_eq!(stream.increments.recv().await, None);
        assert_eq!(stream.transcript.await.unwrap(), "{\"choices\":[]}");
    }

    #[test]
    fn test_status_error_carries_body() {
        let err = BackendError::Status {
            status: 500,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected status code: 500, body: overloaded");
    }
}
