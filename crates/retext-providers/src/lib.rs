//! Retext Providers - OpenAI-compatible backend client
//!
//! Chat completions, model listing, streaming passthrough and connection
//! diagnostics against any `/chat/completions` + `/models` endpoint, with
//! failures classified once and retried according to their class.

mod client;
mod diagnostics;
mod error;
mod error_classify;
mod response_handling;
mod retry;
mod traits;
mod types;

pub use client::{suggestions, BackendClient, ConnectionTestResult, MODELS_TIMEOUT};
pub use diagnostics::{
    ConfigCheck, ConfigSummary, DiagnosticTests, DiagnosticsReport, Overall, OverallStatus,
    ProbeResult, ProbeStatus, PROBE_TIMEOUT,
};
pub use error::{BackendError, BackendResult, ErrorCategory, ErrorClassification, ErrorKind};
pub use error_classify::{classify_reqwest, classify_status, TransportFailure};
pub use response_handling::{parse_error_body, summarize_error_body};
pub use retry::{with_retry, RetryConfig};
pub use traits::ChatBackend;
pub use types::{
    ChatCompletionResponse, ChatMessage, Choice, CompletionOptions, ModelEntry, ModelList,
    ResponseMessage, Role,
};
