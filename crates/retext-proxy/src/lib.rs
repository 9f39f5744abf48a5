//! Retext Proxy - OpenAI-compatible reverse proxy that rewrites tagged spans.
//!
//! Chat-completion traffic is forwarded to the configured upstream. For
//! buffered responses, every span between the configured wrap tags (by
//! default `<|text|>` and `<|/text|>`) is sent back to an LLM for rewriting
//! and spliced in place before the response reaches the caller. Streaming
//! responses are piped through untouched.

pub mod admin;
pub mod error;
pub mod models;
pub mod optimizer;
pub mod server;
pub mod spans;
pub mod streaming;
pub mod types;

pub use error::ProxyError;
pub use optimizer::{SpanRewrite, TextOptimizer, WholeTextOutcome};
pub use server::{configure, serve, AppState};
pub use spans::{extract_spans, replace_spans, Span};
