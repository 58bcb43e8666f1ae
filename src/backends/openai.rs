// Translating backend for OpenAI-compatible servers
//
// Frontend requests are rewritten into `/v1/completions` and
// `/v1/chat/completions` bodies; SSE replies are translated back into
// frontend increments as they arrive.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::stream::{sse_data, LineStream};
use super::tool_calls::ToolCallAccumulator;
use super::{
    build_client, emit, open_exchange, Backend, BackendError, BackendFailure, BackendStream,
    ExchangeMetadata, INCREMENT_BUFFER,
};
use crate::models::openai::{
    finish_reason, ChatCompletionRequest, ChatCompletionResponse, CompletionRequest,
    CompletionResponse, Message, ModelList, SamplingParams, Usage,
};
use crate::models::{
    ChatMessage, ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, ModelInfo,
    ModelsResponse, Role, UsageCounters,
};

const STREAM_DONE: &str = "[DONE]";

pub struct OpenAiBackend {
    endpoint: String,
    client: Client,
    force_prompt_cache: bool,
}

impl OpenAiBackend {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        force_prompt_cache: bool,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: build_client(timeout)?,
            force_prompt_cache,
        })
    }

    fn completion_request(&self, request: &GenerateRequest) -> CompletionRequest {
        CompletionRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            stream: request.wants_stream(),
            sampling: sampling_params(request.options.as_ref()),
            cache_prompt: self.force_prompt_cache,
        }
    }

    fn chat_request(&self, request: &ChatRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_openai_message).collect(),
            stream: request.wants_stream(),
            sampling: sampling_params(request.options.as_ref()),
            tools: request.tools.clone(),
            cache_prompt: self.force_prompt_cache,
        }
    }
}

/// Copy the recognized tuning parameters out of a frontend `options` map.
pub fn sampling_params(options: Option<&Map<String, Value>>) -> SamplingParams {
    let Some(options) = options else {
        return SamplingParams::default();
    };
    let float = |key: &str| options.get(key).and_then(Value::as_f64);

    SamplingParams {
        max_tokens: options
            .get("num_predict")
            .or_else(|| options.get("max_tokens"))
            .and_then(token_limit),
        temperature: float("temperature"),
        top_p: float("top_p"),
        stop: options
            .get("stop")
            .filter(|v| v.is_string() || v.is_array())
            .cloned(),
        frequency_penalty: float("frequency_penalty"),
        presence_penalty: float("presence_penalty"),
        seed: options.get("seed").and_then(Value::as_i64),
    }
}

// Ollama uses negative values for "no limit"
fn token_limit(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| *v >= 0.0)
            .map(|v| v as u64)
    })
}

fn to_openai_message(message: &ChatMessage) -> Message {
    let text_field = |key: &str| {
        message
            .extra
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let tool_calls = (!message.tool_calls.is_empty()).then(|| {
        message
            .tool_calls
            .iter()
            .cloned()
            .map(|call| call.with_string_arguments())
            .collect()
    });

    Message {
        role: message.role.as_ref().map_or("user", Role::as_str).to_string(),
        content: Some(message.content.clone()),
        reasoning_content: None,
        tool_calls,
        tool_call_id: text_field("tool_call_id"),
        name: text_field("tool_name").or_else(|| text_field("name")),
    }
}

fn from_openai_message(message: Message) -> ChatMessage {
    ChatMessage {
        role: Some(match message.role.as_str() {
            "" => Role::Assistant,
            role => Role::parse(role),
        }),
        content: message.content.unwrap_or_default(),
        thinking: message.reasoning_content.filter(|t| !t.is_empty()),
        tool_calls: message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| call.with_object_arguments())
            .collect(),
        extra: Map::new(),
    }
}

fn elapsed_nanos(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX - 1)
}

/// Counters for a translated final increment.
///
/// The total carries a 1ns bias so it never equals the eval duration.
/// Token counts are at least 1.
fn summary_usage(
    prompt_tokens: u64,
    eval_tokens: u64,
    started: Instant,
    with_load: bool,
) -> UsageCounters {
    let elapsed = elapsed_nanos(started);
    UsageCounters {
        total_duration: Some(elapsed + 1),
        load_duration: with_load.then_some(1),
        prompt_eval_count: Some(prompt_tokens.max(1)),
        prompt_eval_duration: Some(1),
        eval_count: Some(eval_tokens.max(1)),
        eval_duration: Some(elapsed),
    }
}

fn reported_tokens(usage: Option<&Usage>) -> (u64, u64) {
    let usage = usage.cloned().unwrap_or_default();
    (usage.prompt_tokens.max(1), usage.completion_tokens.max(1))
}

/// Translate a complete `/v1/completions` body into one final increment.
pub fn completion_from_body(
    body: &str,
    model: &str,
    started: Instant,
) -> Result<GenerateResponse, BackendError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    let choice = parsed
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| BackendError::Decode("response contained no choices".to_string()))?;

    let reason = finish_reason(&choice.finish_reason).unwrap_or("stop").to_string();
    let (prompt_tokens, eval_tokens) = reported_tokens(parsed.usage.as_ref());

    let mut increment = GenerateResponse::finished(
        model,
        &reason,
        summary_usage(prompt_tokens, eval_tokens, started, false),
    );
    increment.response = choice.text.unwrap_or_default();
    Ok(increment)
}

/// Translate a complete `/v1/chat/completions` body into one final increment.
pub fn chat_from_body(
    body: &str,
    model: &str,
    started: Instant,
) -> Result<ChatResponse, BackendError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))?;
    let choice = parsed
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or_else(|| BackendError::Decode("response contained no choices".to_string()))?;

    let reason = finish_reason(&choice.finish_reason).unwrap_or("stop").to_string();
    let (prompt_tokens, eval_tokens) = reported_tokens(parsed.usage.as_ref());

    let mut increment = ChatResponse::finished(
        model,
        &reason,
        summary_usage(prompt_tokens, eval_tokens, started, true),
    );
    if let Some(message) = choice.message {
        increment.message = from_openai_message(message);
    }
    Ok(increment)
}

/// Translate a streamed `/v1/completions` reply.
///
/// Reading continues past `[DONE]` and past the finish reason until the
/// backend closes the stream, so the returned transcript is complete.
async fn translate_completion_stream(
    mut lines: LineStream,
    tx: mpsc::Sender<GenerateResponse>,
    cancel: CancellationToken,
    model: String,
    started: Instant,
) -> String {
    let mut tokens = 0;
    let mut finished = false;

    while let Some(line) = lines.next_line(&cancel).await {
        if finished {
            continue;
        }
        let Some(data) = sse_data(&line) else {
            continue;
        };
        if data == STREAM_DONE {
            continue;
        }

        let chunk: CompletionResponse = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!("[OPENAI] Skipping unparseable chunk: {}", e);
                continue;
            }
        };
        let Some(choice) = chunk.choices.and_then(|choices| choices.into_iter().next()) else {
            continue;
        };

        if let Some(text) = choice.text.filter(|t| !t.is_empty()) {
            tokens += 1;
            if !emit(&tx, &cancel, GenerateResponse::delta(&model, text)).await {
                return lines.into_transcript();
            }
        }

        if let Some(reason) = finish_reason(&choice.finish_reason) {
            let usage = summary_usage(1, tokens, started, false);
            let last = GenerateResponse::finished(&model, reason, usage);
            if !emit(&tx, &cancel, last).await {
                return lines.into_transcript();
            }
            finished = true;
        }
    }

    if !finished {
        let usage = summary_usage(1, tokens, started, false);
        let last = GenerateResponse::finished(&model, "stop", usage);
        emit(&tx, &cancel, last).await;
    }
    lines.into_transcript()
}

/// Translate a streamed `/v1/chat/completions` reply.
///
/// Tool-call fragments are held back and sent as one increment right before
/// the final one.
async fn translate_chat_stream(
    mut lines: LineStream,
    tx: mpsc::Sender<ChatResponse>,
    cancel: CancellationToken,
    model: String,
    started: Instant,
) -> String {
    let mut tokens = 0;
    let mut finished = false;
    let mut tool_calls = ToolCallAccumulator::new();

    while let Some(line) = lines.next_line(&cancel).await {
        if finished {
            continue;
        }
        let Some(data) = sse_data(&line) else {
            continue;
        };
        if data == STREAM_DONE {
            continue;
        }

        let chunk: ChatCompletionResponse = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!("[OPENAI] Skipping unparseable chunk: {}", e);
                continue;
            }
        };
        let Some(choice) = chunk.choices.and_then(|choices| choices.into_iter().next()) else {
            continue;
        };

        if let Some(delta) = choice.delta {
            match delta.tool_calls.filter(|fragments| !fragments.is_empty()) {
                Some(fragments) => fragments.iter().for_each(|f| tool_calls.absorb(f)),
                None => {
                    let content = delta.content.unwrap_or_default();
                    let thinking = delta.reasoning_content.filter(|t| !t.is_empty());
                    if !content.is_empty() || thinking.is_some() {
                        tokens += 1;
                        let role = delta
                            .role
                            .as_deref()
                            .filter(|role| !role.is_empty())
                            .map_or(Role::Assistant, Role::parse);
                        let mut message = ChatMessage::new(role, content);
                        message.thinking = thinking;
                        if !emit(&tx, &cancel, ChatResponse::delta(&model, message)).await {
                            return lines.into_transcript();
                        }
                    }
                }
            }
        }

        if let Some(reason) = finish_reason(&choice.finish_reason) {
            let reason = reason.to_string();
            let delivered =
                finish_chat(&tx, &cancel, &model, &reason, tokens, started, &mut tool_calls).await;
            if !delivered {
                return lines.into_transcript();
            }
            finished = true;
        }
    }

    if !finished {
        finish_chat(&tx, &cancel, &model, "stop", tokens, started, &mut tool_calls).await;
    }
    lines.into_transcript()
}

async fn finish_chat(
    tx: &mpsc::Sender<ChatResponse>,
    cancel: &CancellationToken,
    model: &str,
    reason: &str,
    tokens: u64,
    started: Instant,
    tool_calls: &mut ToolCallAccumulator,
) -> bool {
    if !tool_calls.is_empty() {
        let mut message = ChatMessage::assistant("");
        message.tool_calls = std::mem::take(tool_calls).assemble();
        if !emit(tx, cancel, ChatResponse::delta(model, message)).await {
            return false;
        }
    }
    let last = ChatResponse::finished(model, reason, summary_usage(1, tokens, started, true));
    emit(tx, cancel, last).await
}

async fn read_body(
    response: reqwest::Response,
    mut exchange: ExchangeMetadata,
) -> Result<(String, ExchangeMetadata), BackendFailure> {
    match response.text().await {
        Ok(body) => {
            exchange.raw_response = body.clone();
            Ok((body, exchange))
        }
        Err(e) => Err(BackendFailure {
            error: e.into(),
            exchange,
        }),
    }
}

fn fallback_models() -> ModelsResponse {
    ModelsResponse {
        models: vec![ModelInfo::named("default")],
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> Result<BackendStream<GenerateResponse>, BackendFailure> {
        let started = Instant::now();
        let translated = self.completion_request(&request);
        let url = format!("{}/v1/completions", self.endpoint);
        let (response, exchange) = open_exchange(&self.client, url, &translated).await?;

        if !translated.stream {
            let (body, exchange) = read_body(response, exchange).await?;
            return match completion_from_body(&body, &request.model, started) {
                Ok(increment) => Ok(BackendStream::ready(increment, exchange)),
                Err(error) => Err(BackendFailure { error, exchange }),
            };
        }

        let (tx, rx) = mpsc::channel(INCREMENT_BUFFER);
        let transcript = tokio::spawn(translate_completion_stream(
            LineStream::from_response(response),
            tx,
            cancel,
            request.model,
            started,
        ));
        Ok(BackendStream {
            increments: rx,
            transcript,
            exchange,
        })
    }

    async fn chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<BackendStream<ChatResponse>, BackendFailure> {
        let started = Instant::now();
        let translated = self.chat_request(&request);
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let (response, exchange) = open_exchange(&self.client, url, &translated).await?;

        if !translated.stream {
            let (body, exchange) = read_body(response, exchange).await?;
            return match chat_from_body(&body, &request.model, started) {
                Ok(increment) => Ok(BackendStream::ready(increment, exchange)),
                Err(error) => Err(BackendFailure { error, exchange }),
            };
        }

        let (tx, rx) = mpsc::channel(INCREMENT_BUFFER);
        let transcript = tokio::spawn(translate_chat_stream(
            LineStream::from_response(response),
            tx,
            cancel,
            request.model,
            started,
        ));
        Ok(BackendStream {
            increments: rx,
            transcript,
            exchange,
        })
    }

    /// Never fails: a degraded listing endpoint yields a single "default" model.
    async fn list_models(&self) -> Result<ModelsResponse, BackendError> {
        let url = format!("{}/v1/models", self.endpoint);
        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => response,
            Ok(response) => {
                tracing::warn!(
                    "[OPENAI] Model listing returned {}, using default model",
                    response.status()
                );
                return Ok(fallback_models());
            }
            Err(e) => {
                tracing::warn!("[OPENAI] Model listing failed: {}, using default model", e);
                return Ok(fallback_models());
            }
        };

        let listing = match response.text().await {
            Ok(body) => serde_json::from_str::<ModelList>(&body).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match listing {
            Ok(list) => Ok(ModelsResponse {
                models: list.data.iter().map(|m| ModelInfo::named(&m.id)).collect(),
            }),
            Err(e) => {
                tracing::warn!("[OPENAI] Unreadable model listing: {}, using default model", e);
                Ok(fallback_models())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stream::lines_from;
    use serde_json::json;

    fn backend(force_prompt_cache: bool) -> OpenAiBackend {
        OpenAiBackend::new("http://backend", Duration::from_secs(5), force_prompt_cache).unwrap()
    }

    async fn drain<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(item) = rx.recv().await {
            out.push(item);
        }
        out
    }

    async fn run_completion(chunks: &[&str]) -> (Vec<GenerateResponse>, String) {
        let (tx, rx) = mpsc::channel(INCREMENT_BUFFER);
        let producer = tokio::spawn(translate_completion_stream(
            lines_from(chunks),
            tx,
            CancellationToken::new(),
            "m".to_string(),
            Instant::now(),
        ));
        let increments = drain(rx).await;
        (increments, producer.await.unwrap())
    }

    async fn run_chat(chunks: &[&str]) -> (Vec<ChatResponse>, String) {
        let (tx, rx) = mpsc::channel(INCREMENT_BUFFER);
        let producer = tokio::spawn(translate_chat_stream(
            lines_from(chunks),
            tx,
            CancellationToken::new(),
            "m".to_string(),
            Instant::now(),
        ));
        let increments = drain(rx).await;
        (increments, producer.await.unwrap())
    }

    #[tokio::test]
    async fn test_completion_fragments_then_synthesized_stop() {
        let (increments, transcript) = run_completion(&[
            "data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"lo\",\"finish_reason\":null}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;

        let texts: Vec<_> = increments.iter().map(|i| i.response.as_str()).collect();
        assert_eq!(texts, vec!["Hel", "lo", ""]);
        assert!(increments[..2].iter().all(|i| !i.done));

        let last = &increments[2];
        assert!(last.done);
        assert_eq!(last.done_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.eval_count, Some(2));
        assert_eq!(last.usage.prompt_eval_count, Some(1));
        assert!(last.usage.total_duration > last.usage.eval_duration);
        assert_eq!(last.usage.load_duration, None);

        let relayed: usize = texts.iter().map(|t| t.len()).sum();
        assert!(transcript.len() >= relayed);
        assert!(transcript.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_completion_finish_reason_and_trailing_data_drained() {
        let (increments, transcript) = run_completion(&[
            "data: {\"choices\":[{\"text\":\"a\"}]}\n",
            "data: {\"choices\":[{\"text\":\"b\",\"finish_reason\":\"length\"}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"text\":\"ignored\"}]}\n",
        ])
        .await;

        assert_eq!(increments.len(), 3);
        assert_eq!(increments[1].response, "b");
        assert_eq!(increments[2].done_reason.as_deref(), Some("length"));
        assert_eq!(increments[2].usage.eval_count, Some(2));
        assert!(transcript.contains("ignored"));
    }

    #[tokio::test]
    async fn test_completion_skips_bad_and_keepalive_lines() {
        let (increments, _) = run_completion(&[
            ": keep-alive\n",
            "data: {not json\n",
            "data:{\"choices\":[{\"text\":\"x\"}]}\n",
            "data: {\"choices\":[]}\n",
            "data: {\"choices\":[{\"text\":\"\",\"finish_reason\":\"null\"}]}\n",
        ])
        .await;

        assert_eq!(increments.len(), 2);
        assert_eq!(increments[0].response, "x");
        assert_eq!(increments[1].done_reason.as_deref(), Some("stop"));
        assert_eq!(increments[1].usage.eval_count, Some(1));
    }

    #[tokio::test]
    async fn test_chat_content_and_reasoning() {
        let (increments, _) = run_chat(&[
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"reasoning_content\":\"hmm\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n",
        ])
        .await;

        assert_eq!(increments.len(), 3);
        assert_eq!(increments[0].message.thinking.as_deref(), Some("hmm"));
        assert_eq!(increments[0].message.content, "");
        assert_eq!(increments[1].message.role, Some(Role::Assistant));
        assert_eq!(increments[1].message.content, "Hi");

        let last = &increments[2];
        assert!(last.done);
        assert_eq!(last.done_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.load_duration, Some(1));
        assert_eq!(last.usage.eval_count, Some(2));
    }

    #[tokio::test]
    async fn test_chat_tool_calls_reassembled_before_final() {
        let (increments, _) = run_chat(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_0\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_1\",\"function\":{\"name\":\"get_time\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"city\\\":\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Paris\\\"}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"arguments\":\"{}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
            "data: [DONE]\n",
        ])
        .await;

        assert_eq!(increments.len(), 2);
        let calls = serde_json::to_value(&increments[0].message.tool_calls).unwrap();
        assert_eq!(
            calls,
            json!([
                {"id": "call_0", "function": {"name": "get_weather", "arguments": {"city": "Paris"}}},
                {"id": "call_1", "function": {"name": "get_time", "arguments": {}}}
            ])
        );
        assert!(!increments[0].done);
        assert!(increments[1].done);
        assert_eq!(increments[1].done_reason.as_deref(), Some("tool_calls"));
        assert_eq!(increments[1].usage.eval_count, Some(1));
    }

    #[tokio::test]
    async fn test_completion_with_only_finish_chunk_reports_one_token() {
        let (increments, _) = run_completion(&[
            "data: {\"choices\":[{\"text\":\"\",\"finish_reason\":\"stop\"}]}\n",
            "data: [DONE]\n",
        ])
        .await;

        assert_eq!(increments.len(), 1);
        assert!(increments[0].done);
        assert_eq!(increments[0].usage.eval_count, Some(1));
        assert_eq!(increments[0].usage.prompt_eval_count, Some(1));
    }

    #[tokio::test]
    async fn test_chat_tool_calls_flushed_when_stream_ends_early() {
        let (increments, _) = run_chat(&[
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"f\",\"arguments\":\"{\\\"a\\\"\"}}]}}]}\n",
        ])
        .await;

        assert_eq!(increments.len(), 2);
        let call = serde_json::to_value(&increments[0].message.tool_calls[0]).unwrap();
        assert_eq!(call["function"]["arguments"], "{\"a\"");
        assert_eq!(increments[1].done_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_cancelled_stream_stops_emitting() {
        let (tx, mut rx) = mpsc::channel(INCREMENT_BUFFER);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let transcript = translate_completion_stream(
            lines_from(&["data: {\"choices\":[{\"text\":\"a\"}]}\n"]),
            tx,
            cancel,
            "m".to_string(),
            Instant::now(),
        )
        .await;

        assert!(rx.recv().await.is_none());
        assert_eq!(transcript, "");
    }

    #[test]
    fn test_non_stream_completion_defaults() {
        let body = r#"{"choices":[{"text":"Hello"}]}"#;
        let increment = completion_from_body(body, "m", Instant::now()).unwrap();
        assert!(increment.done);
        assert_eq!(increment.response, "Hello");
        assert_eq!(increment.done_reason.as_deref(), Some("stop"));
        assert_eq!(increment.usage.prompt_eval_count, Some(1));
        assert_eq!(increment.usage.eval_count, Some(1));
    }

    #[test]
    fn test_non_stream_chat_usage_and_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "c1", "type": "function",
                                    "function": {"name": "sum", "arguments": "{\"a\":1}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        })
        .to_string();

        let increment = chat_from_body(&body, "m", Instant::now()).unwrap();
        assert_eq!(increment.done_reason.as_deref(), Some("tool_calls"));
        assert_eq!(increment.usage.prompt_eval_count, Some(12));
        assert_eq!(increment.usage.eval_count, Some(7));
        assert_eq!(increment.message.content, "");
        let call = serde_json::to_value(&increment.message.tool_calls[0]).unwrap();
        assert_eq!(call["function"]["arguments"], json!({"a": 1}));
    }

    #[test]
    fn test_non_stream_chat_without_message_or_reason() {
        let increment = chat_from_body(r#"{"choices":[{}]}"#, "m", Instant::now()).unwrap();
        assert_eq!(increment.done_reason.as_deref(), Some("stop"));
        assert_eq!(increment.message.role, Some(Role::Assistant));
        assert_eq!(increment.usage.eval_count, Some(1));
    }

    #[test]
    fn test_non_stream_body_without_choices_is_error() {
        assert!(matches!(
            completion_from_body(r#"{"choices":[]}"#, "m", Instant::now()),
            Err(BackendError::Decode(_))
        ));
        assert!(matches!(
            chat_from_body("<html>", "m", Instant::now()),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_completion_request_translation() {
        let request: GenerateRequest = serde_json::from_value(json!({
            "model": "m",
            "prompt": "hi",
            "options": {"temperature": 0.2, "num_predict": 64, "top_p": 0.9,
                        "stop": ["\n"], "seed": 7, "mirostat": 1}
        }))
        .unwrap();

        let translated = serde_json::to_value(backend(true).completion_request(&request)).unwrap();
        assert_eq!(
            translated,
            json!({
                "model": "m", "prompt": "hi", "stream": true,
                "max_tokens": 64, "temperature": 0.2, "top_p": 0.9,
                "stop": ["\n"], "seed": 7, "cache_prompt": true
            })
        );
    }

    #[test]
    fn test_negative_num_predict_dropped() {
        let options = json!({"num_predict": -1}).as_object().cloned().unwrap();
        assert_eq!(sampling_params(Some(&options)).max_tokens, None);
    }

    #[test]
    fn test_chat_request_translation() {
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "m",
            "stream": false,
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": "",
                 "tool_calls": [{"function": {"name": "get_weather", "arguments": {"city": "Paris"}}}]},
                {"role": "tool", "content": "sunny", "tool_name": "get_weather"}
            ],
            "tools": [{"type": "function", "function": {"name": "get_weather"}}]
        }))
        .unwrap();

        let translated = serde_json::to_value(backend(false).chat_request(&request)).unwrap();
        assert_eq!(translated["stream"], false);
        assert!(translated.get("cache_prompt").is_none());
        assert_eq!(translated["tools"][0]["function"]["name"], "get_weather");

        let messages = &translated["messages"];
        assert_eq!(messages[0], json!({"role": "user", "content": "weather?"}));
        assert_eq!(messages[1]["tool_calls"][0]["type"], "function");
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], r#"{"city":"Paris"}"#);
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["name"], "get_weather");
    }
}
