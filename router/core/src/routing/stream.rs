//! Streaming responses
//!
//! [`ResponseStream`] is a pull-based, finite, non-restartable sequence of
//! text chunks. Each pull races three things, in priority order:
//!
//! ```text
//!   cancel token ──┐
//!   deadline ──────┼──► first ready wins ──► Cancelled | TimedOut | chunk
//!   adapter recv ──┘
//! ```
//!
//! A pull after the deadline therefore times out even when a chunk is ready.
//! Any terminal state drops the adapter receiver, which is the adapter's
//! signal to stop producing, and settles accounting exactly once.

use std::fmt;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::accounting::{Accountant, CallContext, CallOutcome};
use crate::backend::{StreamChunk, TokenUsage};
use crate::error::{Result, RouterError};
use crate::registry::ModelDescriptor;

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Chunks may still arrive
    Streaming,
    /// Backend finished normally
    Completed,
    /// Deadline expired
    TimedOut,
    /// Backend failed mid-stream
    Failed,
    /// Caller stopped consuming
    Cancelled,
}

impl StreamState {
    /// Whether no further chunks will be yielded
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Streaming
    }
}

/// What one pull produced
enum PullEvent {
    Cancelled,
    DeadlineExpired,
    Chunk(StreamChunk),
    Closed,
}

/// Accounting still owed for this stream
struct Settlement {
    accountant: Arc<Accountant>,
    ctx: CallContext,
}

/// Cancellable stream of response text
pub struct ResponseStream {
    receiver: Option<mpsc::Receiver<StreamChunk>>,
    deadline: Instant,
    cancel: CancellationToken,
    state: StreamState,
    settlement: Option<Settlement>,
    model: ModelDescriptor,
    prompt_tokens: u64,
    content: String,
    chunks_yielded: usize,
}

impl ResponseStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<StreamChunk>,
        deadline: Instant,
        accountant: Arc<Accountant>,
        ctx: CallContext,
    ) -> Self {
        Self {
            receiver: Some(receiver),
            deadline,
            cancel: CancellationToken::new(),
            state: StreamState::Streaming,
            model: ctx.model.clone(),
            prompt_tokens: TokenUsage::estimate_tokens(&ctx.prompt),
            settlement: Some(Settlement { accountant, ctx }),
            content: String::new(),
            chunks_yielded: 0,
        }
    }

    /// Model serving this stream
    #[must_use]
    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Text yielded so far
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Chunks yielded so far
    #[must_use]
    pub fn chunks_yielded(&self) -> usize {
        self.chunks_yielded
    }

    /// When the stream times out
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Token that cancels this stream from any task
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the stream; the pending or next pull returns `None`
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Pull the next chunk
    ///
    /// `Some(Ok(text))` for output, `Some(Err(_))` once for a timeout or
    /// backend failure, then `None` forever.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        if self.state.is_terminal() {
            return None;
        }

        let event = {
            let rx = self.receiver.as_mut()?;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => PullEvent::Cancelled,
                () = tokio::time::sleep_until(self.deadline) => PullEvent::DeadlineExpired,
                chunk = rx.recv() => chunk.map_or(PullEvent::Closed, PullEvent::Chunk),
            }
        };

        match event {
            PullEvent::Chunk(StreamChunk::Delta(text)) => {
                self.content.push_str(&text);
                self.chunks_yielded += 1;
                Some(Ok(text))
            }
            PullEvent::Chunk(StreamChunk::Done { usage, .. }) => {
                let usage = usage.unwrap_or_else(|| self.attributed_usage());
                self.finish(StreamState::Completed, CallOutcome::Succeeded {
                    usage,
                    content: self.content.clone(),
                })
                .await;
                None
            }
            PullEvent::Closed => {
                let usage = self.attributed_usage();
                self.finish(StreamState::Completed, CallOutcome::Succeeded {
                    usage,
                    content: self.content.clone(),
                })
                .await;
                None
            }
            PullEvent::Chunk(StreamChunk::Error(error)) => {
                self.fail(StreamState::Failed, error.clone()).await;
                Some(Err(error))
            }
            PullEvent::DeadlineExpired => {
                let error = RouterError::timeout(format!(
                    "stream deadline exceeded after {} chunks",
                    self.chunks_yielded
                ));
                self.fail(StreamState::TimedOut, error.clone()).await;
                Some(Err(error))
            }
            PullEvent::Cancelled => {
                let usage = self.attributed_usage();
                self.finish(StreamState::Cancelled, CallOutcome::Cancelled { usage })
                    .await;
                None
            }
        }
    }

    /// Adapt into a [`futures::Stream`]
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next_chunk().await?;
            Some((item, stream))
        })
    }

    /// Prompt estimate plus the output already yielded
    fn attributed_usage(&self) -> TokenUsage {
        TokenUsage::new(self.prompt_tokens, TokenUsage::estimate_tokens(&self.content))
    }

    async fn fail(&mut self, state: StreamState, error: RouterError) {
        let usage = self.attributed_usage();
        self.finish(state, CallOutcome::Failed {
            error,
            usage,
            stage: "stream",
            attempts: 1,
        })
        .await;
    }

    async fn finish(&mut self, state: StreamState, outcome: CallOutcome) {
        self.state = state;
        // Releases the adapter's producer
        self.receiver = None;

        match state {
            StreamState::Completed => {
                debug!(model = %self.model.key, chunks = self.chunks_yielded, "Stream completed");
            }
            StreamState::Cancelled => {
                info!(model = %self.model.key, chunks = self.chunks_yielded, "Stream cancelled");
            }
            StreamState::TimedOut | StreamState::Failed => {
                warn!(
                    model = %self.model.key,
                    chunks = self.chunks_yielded,
                    state = ?state,
                    "Stream ended abnormally"
                );
            }
            StreamState::Streaming => {}
        }

        if let Some(Settlement { accountant, ctx }) = self.settlement.take() {
            accountant.settle(ctx, outcome).await;
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        let Some(Settlement { accountant, ctx }) = self.settlement.take() else {
            return;
        };

        // Abandoned mid-stream: account as a cancellation
        let usage = self.attributed_usage();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                info!(model = %self.model.key, chunks = self.chunks_yielded, "Stream dropped unfinished");
                handle.spawn(async move {
                    accountant.settle(ctx, CallOutcome::Cancelled { usage }).await;
                });
            }
            Err(_) => {
                warn!(model = %self.model.key, "Stream dropped outside a runtime, usage not recorded");
            }
        }
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("model", &self.model.key)
            .field("state", &self.state)
            .field("chunks_yielded", &self.chunks_yielded)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
