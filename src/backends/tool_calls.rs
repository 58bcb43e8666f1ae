// Reassembly of streamed OpenAI tool-call fragments

use std::collections::BTreeMap;

use crate::models::openai::ToolCallFragment;
use crate::models::tool_call::parse_arguments;
use crate::models::ToolCall;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Tool calls being assembled for one exchange, keyed by backend index
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, fragment: &ToolCallFragment) {
        let call = self.calls.entry(fragment.index.unwrap_or(0)).or_default();

        if call.id.is_empty() {
            if let Some(id) = fragment.id.as_deref() {
                call.id = id.to_string();
            }
        }
        if let Some(function) = &fragment.function {
            if call.name.is_empty() {
                if let Some(name) = function.name.as_deref() {
                    call.name = name.to_string();
                }
            }
            if let Some(arguments) = function.arguments.as_deref() {
                call.arguments.push_str(arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Completed calls in index order, arguments parsed where they are valid JSON
    pub fn assemble(self) -> Vec<ToolCall> {
        self.calls
            .into_values()
            .map(|call| {
                let id = (!call.id.is_empty()).then_some(call.id);
                ToolCall::function(id, call.name, parse_arguments(&call.arguments))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::FunctionFragment;
    use serde_json::json;

    fn fragment(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        args: Option<&str>,
    ) -> ToolCallFragment {
        ToolCallFragment {
            index: Some(index),
            id: id.map(String::from),
            function: Some(FunctionFragment {
                name: name.map(String::from),
                arguments: args.map(String::from),
            }),
        }
    }

    #[test]
    fn test_interleaved_fragments_assemble_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&fragment(0, Some("call_a"), Some("get_weather"), None));
        acc.absorb(&fragment(1, Some("call_b"), Some("get_time"), None));
        acc.absorb(&fragment(0, None, None, Some("{\"city\":")));
        acc.absorb(&fragment(0, None, None, Some("\"Paris\"}")));
        acc.absorb(&fragment(1, None, None, Some("{\"tz\":\"UTC\"}")));

        let calls = serde_json::to_value(acc.assemble()).unwrap();
        assert_eq!(
            calls,
            json!([
                {"id": "call_a", "function": {"name": "get_weather", "arguments": {"city": "Paris"}}},
                {"id": "call_b", "function": {"name": "get_time", "arguments": {"tz": "UTC"}}}
            ])
        );
    }

    #[test]
    fn test_first_id_and_name_win() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&fragment(0, Some(""), Some(""), Some("{")));
        acc.absorb(&fragment(0, Some("call_1"), Some("lookup"), Some("}")));
        acc.absorb(&fragment(0, Some("call_2"), Some("other"), None));

        let calls = acc.assemble();
        assert_eq!(calls.len(), 1);
        let value = serde_json::to_value(&calls[0]).unwrap();
        assert_eq!(value["id"], "call_1");
        assert_eq!(value["function"]["name"], "lookup");
        assert_eq!(value["function"]["arguments"], json!({}));
    }

    #[test]
    fn test_index_gaps_are_skipped() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&fragment(2, None, Some("late"), Some("{}")));
        acc.absorb(&fragment(0, None, Some("early"), Some("{}")));

        let names: Vec<_> = acc
            .assemble()
            .iter()
            .map(|c| c.name().unwrap_or("").to_string())
            .collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn test_invalid_arguments_kept_as_string() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(&ToolCallFragment {
            index: None,
            id: None,
            function: Some(FunctionFragment {
                name: Some("f".to_string()),
                arguments: Some("{\"a\": 1".to_string()),
            }),
        });
        assert!(!acc.is_empty());

        let value = serde_json::to_value(&acc.assemble()[0]).unwrap();
        assert_eq!(value["function"]["arguments"], "{\"a\": 1");
        assert!(value.get("id").is_none());
    }
}
