//! Rewriting of tagged spans through a chat backend.

use retext_config::{BackendConfig, OptimizationPolicy};
use retext_providers::{BackendError, ChatBackend, ChatMessage, CompletionOptions};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::spans::{contains_tags, extract_spans, replace_spans};

/// System message sent with every rewrite.
pub const EDITOR_PERSONA: &str =
    "You are a professional text editor who rewrites text so it reads fluently and clearly.";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("secondary backend requested but not configured")]
    NoSecondaryBackend,

    #[error("backend returned an empty rewrite")]
    EmptyRewrite,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result of rewriting a whole text as one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WholeTextOutcome {
    pub original_text: String,
    pub optimized_text: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Text after a span pass, with how many spans were found and how many
/// kept their original text.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRewrite {
    pub text: String,
    pub spans: usize,
    pub failed: usize,
}

impl SpanRewrite {
    pub fn into_outcome(self, original_text: String) -> WholeTextOutcome {
        let error = (self.failed > 0)
            .then(|| format!("{} of {} spans could not be rewritten", self.failed, self.spans));
        WholeTextOutcome {
            original_text,
            optimized_text: self.text,
            success: error.is_none(),
            error,
        }
    }
}

/// Drives span rewrites for one request.
pub struct TextOptimizer<'a> {
    backend: &'a dyn ChatBackend,
}

impl<'a> TextOptimizer<'a> {
    pub fn new(backend: &'a dyn ChatBackend) -> Self {
        Self { backend }
    }

    /// Rewrite every tagged span of `text`.
    ///
    /// Spans are rewritten one at a time in document order. A span whose
    /// rewrite fails keeps its original text; this never fails as a whole.
    pub async fn optimize_response_text(
        &self,
        text: &str,
        policy: &OptimizationPolicy,
        primary: &BackendConfig,
    ) -> String {
        self.rewrite_spans(text, policy, primary).await.text
    }

    /// Like [`Self::optimize_response_text`], also counting failed spans.
    pub async fn rewrite_spans(
        &self,
        text: &str,
        policy: &OptimizationPolicy,
        primary: &BackendConfig,
    ) -> SpanRewrite {
        let untouched = || SpanRewrite {
            text: text.to_string(),
            spans: 0,
            failed: 0,
        };
        if !contains_tags(text, policy.start_tag(), policy.end_tag()) {
            return untouched();
        }

        let spans = extract_spans(text, policy.start_tag(), policy.end_tag());
        if spans.is_empty() {
            return untouched();
        }

        let backend = policy.effective_backend(primary);
        let mut rewrites = Vec::with_capacity(spans.len());
        let mut failed = 0usize;

        for (index, span) in spans.iter().enumerate() {
            let result = match backend {
                Some(backend) => self.rewrite(&span.inner_text, policy, backend).await,
                None => Err(RewriteError::NoSecondaryBackend),
            };

            match result {
                Ok(text) => {
                    debug!(span = index, from = span.inner_text.len(), to = text.len(), "Span rewritten");
                    rewrites.push(text);
                }
                Err(err) => {
                    warn!(span = index, error = %err, "Span rewrite failed, keeping original text");
                    failed += 1;
                    rewrites.push(span.inner_text.clone());
                }
            }
        }

        info!(spans = spans.len(), rewritten = spans.len() - failed, "Tagged spans processed");
        SpanRewrite {
            text: replace_spans(text, &spans, &rewrites),
            spans: spans.len(),
            failed,
        }
    }

    /// Run every string `choices[*].message.content` of a completion response
    /// through [`Self::optimize_response_text`], in choice order.
    pub async fn optimize_completion(
        &self,
        response: &mut Value,
        policy: &OptimizationPolicy,
        primary: &BackendConfig,
    ) {
        let Some(choices) = response.get_mut("choices").and_then(Value::as_array_mut) else {
            return;
        };

        for choice in choices.iter_mut() {
            let Some(content) = choice.pointer_mut("/message/content") else {
                continue;
            };
            let Some(text) = content.as_str() else {
                continue;
            };
            let optimized = self.optimize_response_text(text, policy, primary).await;
            *content = Value::String(optimized);
        }
    }

    /// Rewrite `text` as a single unit, reporting failure instead of raising.
    pub async fn optimize_whole_text(
        &self,
        text: &str,
        policy: &OptimizationPolicy,
        primary: &BackendConfig,
    ) -> WholeTextOutcome {
        let result = match policy.effective_backend(primary) {
            Some(backend) => self.rewrite(text, policy, backend).await,
            None => Err(RewriteError::NoSecondaryBackend),
        };

        match result {
            Ok(optimized) => WholeTextOutcome {
                original_text: text.to_string(),
                optimized_text: optimized,
                success: true,
                error: None,
            },
            Err(err) => {
                warn!(error = %err, "Whole-text rewrite failed");
                WholeTextOutcome {
                    original_text: text.to_string(),
                    optimized_text: text.to_string(),
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn rewrite(
        &self,
        text: &str,
        policy: &OptimizationPolicy,
        backend: &BackendConfig,
    ) -> Result<String, RewriteError> {
        let messages = [
            ChatMessage::system(EDITOR_PERSONA),
            ChatMessage::user(compose_prompt(&policy.prompt, text)),
        ];
        let options = CompletionOptions {
            temperature: Some(policy.temperature),
            max_tokens: Some(policy.max_tokens),
        };

        let rewritten = self.backend.complete(&messages, backend, &options).await?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Err(RewriteError::EmptyRewrite);
        }
        Ok(rewritten.to_string())
    }
}

pub fn compose_prompt(prompt: &str, text: &str) -> String {
    format!("{prompt}\n\nOriginal text:\n{text}")
}
