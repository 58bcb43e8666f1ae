// Request rewrites applied before a chat request reaches the backend

use serde_json::Value;

use crate::config::InjectionMode;
use crate::models::ChatMessage;

/// Append `text` to the first or last user message unless it already contains it.
///
/// Returns true when a message was changed.
pub fn inject_text(messages: &mut [ChatMessage], text: &str, mode: InjectionMode) -> bool {
    if text.is_empty() {
        return false;
    }

    let target = match mode {
        InjectionMode::First => messages.iter_mut().find(|m| m.is_user()),
        InjectionMode::Last => messages.iter_mut().rev().find(|m| m.is_user()),
    };
    let Some(message) = target else {
        return false;
    };
    if message.content.contains(text) {
        return false;
    }

    message.content.push(' ');
    message.content.push_str(text);
    true
}

/// Name of a declared tool, from `function.name` (or a top-level `name`)
pub fn tool_name(tool: &Value) -> Option<&str> {
    tool.get("function")
        .and_then(|f| f.get("name"))
        .or_else(|| tool.get("name"))
        .and_then(Value::as_str)
}

/// Drop blacklisted tools. Tools without a readable name are kept.
///
/// Returns the remaining tools and the names that were removed.
pub fn filter_tools(tools: Vec<Value>, blacklist: &[String]) -> (Vec<Value>, Vec<String>) {
    if blacklist.is_empty() {
        return (tools, Vec::new());
    }

    let mut removed = Vec::new();
    let kept = tools
        .into_iter()
        .filter(|tool| match tool_name(tool) {
            Some(name) if blacklist.iter().any(|b| b == name) => {
                removed.push(name.to_string());
                false
            }
            _ => true,
        })
        .collect();
    (kept, removed)
}

pub fn last_user_message(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_user())
        .map(|m| m.content.as_str())
}
