//! Streaming passthrough.
//!
//! Upstream SSE bytes are forwarded as they arrive, without parsing. The
//! upstream byte stream lives inside the response body, so when the caller
//! disconnects actix drops the body and the upstream connection closes with
//! it. [`PipeStream`] logs how each pipe ended.

use bytes::Bytes;
use futures::Stream;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Instant;
use tracing::{debug, info, warn};

pin_project_lite::pin_project! {
    /// Byte stream that maps upstream errors for actix and reports on drop.
    pub struct PipeStream<S> {
        #[pin]
        upstream: S,
        report: PipeReport,
    }
}

impl<S> PipeStream<S> {
    pub fn new(upstream: S, model: impl Into<String>) -> Self {
        Self {
            upstream,
            report: PipeReport {
                model: model.into(),
                started: Instant::now(),
                chunks: 0,
                bytes: 0,
                state: PipeState::Open,
            },
        }
    }
}

impl<S, E> Stream for PipeStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    type Item = Result<Bytes, actix_web::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.upstream.poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.report.chunks += 1;
                this.report.bytes += chunk.len();
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(err)) => {
                warn!(model = %this.report.model, error = %err, "Upstream stream failed mid-flight");
                this.report.state = PipeState::Failed;
                Poll::Ready(Some(Err(actix_web::error::ErrorBadGateway(err.to_string()))))
            }
            None => {
                this.report.state = PipeState::Completed;
                Poll::Ready(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipeState {
    Open,
    Completed,
    Failed,
}

struct PipeReport {
    model: String,
    started: Instant,
    chunks: usize,
    bytes: usize,
    state: PipeState,
}

impl Drop for PipeReport {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match self.state {
            PipeState::Completed => info!(
                model = %self.model,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "Stream completed"
            ),
            PipeState::Failed => debug!(
                model = %self.model,
                chunks = self.chunks,
                bytes = self.bytes,
                "Stream closed after upstream error"
            ),
            PipeState::Open => info!(
                model = %self.model,
                chunks = self.chunks,
                bytes = self.bytes,
                elapsed_ms,
                "Client disconnected, upstream stream dropped"
            ),
        }
    }
}
