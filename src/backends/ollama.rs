// Pass-through backend for servers that already speak the Ollama API

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::stream::LineStream;
use super::{
    build_client, emit, open_exchange, Backend, BackendError, BackendFailure, BackendStream,
    INCREMENT_BUFFER,
};
use crate::models::{
    ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, Increment, ModelsResponse, Role,
};

pub struct OllamaBackend {
    endpoint: String,
    client: Client,
}

impl OllamaBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: build_client(timeout)?,
        })
    }

    async fn forward<R, T>(
        &self,
        path: &str,
        request: &R,
        cancel: CancellationToken,
        normalize: fn(&mut T),
    ) -> Result<BackendStream<T>, BackendFailure>
    where
        R: serde::Serialize,
        T: Increment + DeserializeOwned,
    {
        let url = format!("{}{}", self.endpoint, path);
        let (response, exchange) = open_exchange(&self.client, url, request).await?;

        let (tx, rx) = mpsc::channel(INCREMENT_BUFFER);
        let lines = LineStream::from_response(response);
        let transcript = tokio::spawn(forward_ndjson(lines, tx, cancel, normalize));

        Ok(BackendStream {
            increments: rx,
            transcript,
            exchange,
        })
    }
}

/// Relay each NDJSON line as an increment until the final one.
///
/// Lines after the final increment are still read so the transcript is
/// complete. Returns the raw transcript.
async fn forward_ndjson<T>(
    mut lines: LineStream,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
    normalize: fn(&mut T),
) -> String
where
    T: Increment + DeserializeOwned,
{
    let mut finished = false;
    while let Some(line) = lines.next_line(&cancel).await {
        if finished || line.trim().is_empty() {
            continue;
        }

        let mut increment: T = match serde_json::from_str(&line) {
            Ok(increment) => increment,
            Err(e) => {
                tracing::debug!("[OLLAMA] Skipping unparseable line: {}", e);
                continue;
            }
        };
        normalize(&mut increment);
        finished = increment.is_final();

        if !emit(&tx, &cancel, increment).await {
            break;
        }
    }
    lines.into_transcript()
}

fn normalize_generate(_: &mut GenerateResponse) {}

/// Ollama omits the role on streamed chunks and the load duration on the
/// final one; clients expect both.
fn normalize_chat(increment: &mut ChatResponse) {
    if increment.message.role.is_none() {
        increment.message.role = Some(Role::Assistant);
    }
    if increment.done && increment.usage.load_duration.unwrap_or(0) == 0 {
        increment.usage.load_duration = Some(1);
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<BackendStream<GenerateResponse>, BackendFailure> {
        self.forward::<_, GenerateResponse>("/api/generate", &request, cancel, normalize_generate)
            .await
    }

    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<BackendStream<ChatResponse>, BackendFailure> {
        self.forward::<_, ChatResponse>("/api/chat", &request, cancel, normalize_chat)
            .await
    }

    async fn list_models(&self) -> Result<ModelsResponse, BackendError> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}
