// Frontend dialect (Ollama-compatible API presented to clients)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::tool_call::ToolCall;

/// Message author. Roles outside the common four are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Other(String),
}

impl Role {
    pub fn parse(value: &str) -> Role {
        match value {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Other(role) => role,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match Role::parse(&value) {
            Role::Other(_) => Role::Other(value),
            known => known,
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

// Streaming backends sometimes send `"role": ""` on continuation chunks.
fn empty_role_as_none<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.is_empty()).map(Role::from))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(
        default,
        deserialize_with = "empty_role_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Anything else the client sent (images, tool_name, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: content.into(),
            thinking: None,
            tool_calls: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        matches!(self.role, Some(Role::User))
    }
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerateRequest {
    /// Ollama streams unless the client explicitly opts out.
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }
}

/// Duration and token counters attached to the final increment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
}

/// One line of a streamed `/api/generate` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    #[serde(flatten)]
    pub usage: UsageCounters,
}

impl GenerateResponse {
    pub fn delta(model: &str, text: impl Into<String>) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now(),
            response: text.into(),
            thinking: None,
            done: false,
            done_reason: None,
            context: None,
            usage: UsageCounters::default(),
        }
    }

    pub fn finished(model: &str, reason: &str, usage: UsageCounters) -> Self {
        Self {
            done: true,
            done_reason: Some(reason.to_string()),
            usage,
            ..Self::delta(model, "")
        }
    }
}

/// One line of a streamed `/api/chat` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub message: ChatMessage,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    #[serde(flatten)]
    pub usage: UsageCounters,
}

impl ChatResponse {
    pub fn delta(model: &str, message: ChatMessage) -> Self {
        Self {
            model: model.to_string(),
            created_at: Utc::now(),
            message,
            done: false,
            done_reason: None,
            usage: UsageCounters::default(),
        }
    }

    pub fn finished(model: &str, reason: &str, usage: UsageCounters) -> Self {
        Self {
            done: true,
            done_reason: Some(reason.to_string()),
            usage,
            ..Self::delta(model, ChatMessage::assistant(""))
        }
    }
}

/// A unit of a streamed reply, as relayed to the client
pub trait Increment: Serialize + Send + 'static {
    fn is_final(&self) -> bool;

    /// Text this increment adds to the reply
    fn content(&self) -> &str;
}

impl Increment for GenerateResponse {
    fn is_final(&self) -> bool {
        self.done
    }

    fn content(&self) -> &str {
        &self.response
    }
}

impl Increment for ChatResponse {
    fn is_final(&self) -> bool {
        self.done
    }

    fn content(&self) -> &str {
        &self.message.content
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub families: Option<Vec<String>>,
    #[serde(default)]
    pub parameter_size: String,
    #[serde(default)]
    pub quantization_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ModelDetails>,
}

impl ModelInfo {
    /// Entry for a model known only by name; size and digest are not recoverable.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: name.to_string(),
            modified_at: Utc::now(),
            size: 0,
            digest: String::new(),
            details: None,
        }
    }
}

/// Reply of `GET /api/tags`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// Body of `POST /api/show`
#[derive(Debug, Clone, Deserialize)]
pub struct ShowRequest {
    #[serde(default, alias = "model")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResponse {
    pub name: String,
    pub size: i64,
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_role_deserializes_as_missing() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "", "content": "hi"})).unwrap();
        assert_eq!(msg.role, None);

        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "tool", "content": null})).unwrap();
        assert_eq!(msg.role, Some(Role::Tool));
        assert_eq!(msg.content, "");
    }

    #[test]
    fn test_unrecognized_role_kept_verbatim() {
        let msg: ChatMessage =
            serde_json::from_value(json!({"role": "developer", "content": "be terse"})).unwrap();
        assert_eq!(msg.role, Some(Role::Other("developer".to_string())));
        assert!(!msg.is_user());

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "developer");
    }

    #[test]
    fn test_final_increment_field_names() {
        let usage = UsageCounters {
            total_duration: Some(11),
            eval_count: Some(2),
            eval_duration: Some(10),
            ..Default::default()
        };
        let value = serde_json::to_value(GenerateResponse::finished("m", "stop", usage)).unwrap();

        assert_eq!(value["model"], "m");
        assert_eq!(value["done"], true);
        assert_eq!(value["done_reason"], "stop");
        assert_eq!(value["eval_count"], 2);
        assert_eq!(value["total_duration"], 11);
        assert!(value.get("load_duration").is_none());
        assert!(value.get("created_at").is_some());
    }

    #[test]
    fn test_delta_omits_summary_fields() {
        let delta = ChatResponse::delta("m", ChatMessage::assistant("Hel"));
        let value = serde_json::to_value(delta).unwrap();
        assert_eq!(value["message"]["role"], "assistant");
        assert_eq!(value["message"]["content"], "Hel");
        assert_eq!(value["done"], false);
        assert!(value.get("done_reason").is_none());
        assert!(value["message"].get("tool_calls").is_none());
    }

    #[test]
    fn test_request_keeps_unknown_fields() {
        let req: ChatRequest = serde_json::from_value(json!({
            "model": "llama3",
            "messages": [{"role": "user", "content": "hi", "images": ["abc"]}],
            "keep_alive": "5m"
        }))
        .unwrap();

        assert!(req.wants_stream());
        assert_eq!(req.extra["keep_alive"], "5m");
        assert_eq!(req.messages[0].extra["images"], json!(["abc"]));

        let round_trip = serde_json::to_value(&req).unwrap();
        assert_eq!(round_trip["keep_alive"], "5m");
        assert!(round_trip.get("stream").is_none());
    }

    #[test]
    fn test_show_request_accepts_model_alias() {
        let req: ShowRequest = serde_json::from_value(json!({"model": "llama3"})).unwrap();
        assert_eq!(req.name, "llama3");
    }
}
