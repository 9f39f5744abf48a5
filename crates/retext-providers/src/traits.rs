//! Backend client traits

use async_trait::async_trait;
use retext_config::BackendConfig;

use crate::error::BackendResult;
use crate::types::{ChatMessage, CompletionOptions};

/// Something that can turn a conversation into a single completion text.
///
/// The text rewriter only depends on this seam, so it can be driven by a
/// scripted backend in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        backend: &BackendConfig,
        options: &CompletionOptions,
    ) -> BackendResult<String>;
}
