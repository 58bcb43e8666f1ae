// LLM Proxy - Main Library
//
// Presents an Ollama-compatible API to clients and forwards each request to a
// single configured backend: another Ollama server (pass-through) or an
// OpenAI-compatible server (translated). Every exchange is logged to SQLite.

pub mod backends;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod proxy;
pub mod relay;
pub mod transforms;

pub use config::Config;
pub use error::StartupError;
pub use proxy::{router, run};
