// Dialect models
//
// Plain data definitions for the frontend (Ollama-compatible) dialect and the
// OpenAI-compatible backend dialect. Conversions between the two live in the
// backend adapters.

pub mod frontend;
pub mod openai;
pub mod tool_call;

pub use frontend::{
    ChatMessage, ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, Increment,
    ModelDetails, ModelInfo, ModelsResponse, Role, ShowRequest, ShowResponse, UsageCounters,
};
pub use tool_call::{FunctionCall, FunctionToolCall, ToolCall};
