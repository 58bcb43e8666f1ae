// Tool call representation shared by both dialects
//
// The two dialects disagree on one detail: OpenAI sends `function.arguments`
// as a JSON-encoded string, Ollama sends it as a JSON value. Anything that
// does not look like a function call is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool call as it appears in a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolCall {
    Function(FunctionToolCall),
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub function: FunctionCall,
    /// Fields neither dialect defines (e.g. a streaming `index`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCall {
    pub fn function(id: Option<String>, name: impl Into<String>, arguments: Value) -> Self {
        ToolCall::Function(FunctionToolCall {
            id,
            kind: None,
            function: FunctionCall {
                name: name.into(),
                arguments,
                extra: Map::new(),
            },
            extra: Map::new(),
        })
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ToolCall::Function(call) => Some(call.function.name.as_str()),
            ToolCall::Raw(_) => None,
        }
    }

    /// Convert for a string-arguments dialect (OpenAI).
    pub fn with_string_arguments(self) -> Self {
        match self {
            ToolCall::Function(mut call) => {
                call.kind = Some("function".to_string());
                call.function.arguments = Value::String(encode_arguments(&call.function.arguments));
                ToolCall::Function(call)
            }
            raw => raw,
        }
    }

    /// Convert for an object-arguments dialect (Ollama).
    pub fn with_object_arguments(self) -> Self {
        match self {
            ToolCall::Function(mut call) => {
                if let Value::String(raw) = &call.function.arguments {
                    call.function.arguments = parse_arguments(raw);
                }
                ToolCall::Function(call)
            }
            raw => raw,
        }
    }
}

/// Parse an accumulated argument string, keeping the raw text when it is not JSON.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn encode_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}
