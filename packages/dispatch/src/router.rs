//! The `Router` extension point and the stop signalling shared with the
//! dispatcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailman_core::{CommitError, Event, ProcessStatus};
use tokio::sync::mpsc;

use crate::handler::Handler;

/// Sending half of a router's shared buffer.
pub type EventSender = mpsc::Sender<Arc<dyn Event>>;

// ---------------------------------------------------------------------------
// Router trait
// ---------------------------------------------------------------------------

/// A named pipeline: binds a producer source to a handler and owns the retry
/// policy for its events.
///
/// The dispatcher calls `buffer_size`, `timeout` and `handler` once when
/// `run` starts, spawns one task running `produce`, and calls `commit` after
/// every handler attempt.
#[async_trait]
pub trait Router: Send + Sync + 'static {
    /// The business handler. Middleware is applied by the dispatcher.
    fn handler(&self) -> Handler;

    /// Shared buffer capacity and worker count. Must be at least 1.
    fn buffer_size(&self) -> usize;

    /// Deadline for one handler invocation.
    fn timeout(&self) -> Duration;

    /// Pushes produced (and retried) events onto `buffer` until the source is
    /// exhausted, then reports completion through `done`.
    async fn produce(&self, buffer: EventSender, done: DoneSignal);

    /// Finalizes or requeues `event` according to `status`.
    ///
    /// # Errors
    ///
    /// Any error stops the router (or the dispatcher, depending on
    /// `CommitFailurePolicy`).
    async fn commit(&self, status: ProcessStatus, event: Arc<dyn Event>) -> Result<(), CommitError>;
}

// ---------------------------------------------------------------------------
// Stop signalling
// ---------------------------------------------------------------------------

/// Why a pipeline asked the dispatcher to stop.
#[derive(Debug)]
pub enum StopReason {
    /// The producer source closed and every produced event reached a
    /// terminal state.
    ProducerFinished,
    /// A worker's commit failed.
    CommitFailed(CommitError),
}

#[derive(Debug)]
pub struct StopSignal {
    pub router: Arc<str>,
    pub reason: StopReason,
}

/// Completion handle given to [`Router::produce`], bound to one router name.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    router: Arc<str>,
    tx: mpsc::Sender<StopSignal>,
}

impl DoneSignal {
    pub(crate) fn new(router: Arc<str>, tx: mpsc::Sender<StopSignal>) -> Self {
        Self { router, tx }
    }

    #[must_use]
    pub fn router(&self) -> &str {
        &self.router
    }

    /// Reports that the producer has finished. Consumes the handle.
    pub async fn finish(self) {
        self.send(StopReason::ProducerFinished).await;
    }

    pub(crate) async fn commit_failed(&self, err: CommitError) {
        self.send(StopReason::CommitFailed(err)).await;
    }

    async fn send(&self, reason: StopReason) {
        let signal = StopSignal {
            router: Arc::clone(&self.router),
            reason,
        };
        // The dispatcher may already have returned.
        let _ = self.tx.send(signal).await;
    }
}
