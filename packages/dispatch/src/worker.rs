//! Worker tasks draining a router's shared buffer.
//!
//! Each worker pulls one event at a time, runs the handler in its own spawned
//! task, races that task against the router's deadline, and commits the
//! resolved status back to the router.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use mailman_core::{Event, ProcessStatus};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::InvocationContext;
use crate::handler::{self, Handler, Invocation, Outcome};
use crate::router::{DoneSignal, Router};

/// Receiving half of a router's buffer, shared by all of its workers.
pub(crate) type SharedBuffer = Arc<Mutex<mpsc::Receiver<Arc<dyn Event>>>>;

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub(crate) struct Worker {
    pub(crate) pipeline: Arc<str>,
    pub(crate) worker_id: Arc<str>,
    pub(crate) router: Arc<dyn Router>,
    pub(crate) handler: Handler,
    pub(crate) buffer: SharedBuffer,
    pub(crate) timeout: Duration,
    pub(crate) done: DoneSignal,
    pub(crate) cancel: CancellationToken,
}

impl Worker {
    /// Runs until cancelled, until the buffer closes, or until a commit fails.
    pub(crate) async fn run(self) {
        debug!(pipeline = %self.pipeline, worker = %self.worker_id, "worker started");

        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = next_event(&self.buffer) => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let status = self.supervise(Arc::clone(&event)).await;
            if let Err(err) = self.router.commit(status, event).await {
                error!(
                    pipeline = %self.pipeline,
                    worker = %self.worker_id,
                    error = %err,
                    "commit failed, stopping worker"
                );
                self.done.commit_failed(err).await;
                break;
            }
        }

        debug!(pipeline = %self.pipeline, worker = %self.worker_id, "worker stopped");
    }

    /// Resolves exactly one status for one attempt of `event`.
    ///
    /// The handler runs in a spawned task. If the deadline wins the race the
    /// task is detached, not aborted: it keeps running and its result is
    /// dropped.
    pub(crate) async fn supervise(&self, event: Arc<dyn Event>) -> ProcessStatus {
        let cancel = CancellationToken::new();
        let ctx = InvocationContext::new(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.worker_id),
            event.id(),
            event.attempt(),
            self.timeout,
            cancel.clone(),
        );
        let event_id = ctx.event_id;
        let attempt = ctx.attempt;

        info!(
            pipeline = %ctx.pipeline,
            worker = %ctx.worker_id,
            event_id = %event_id,
            attempt = attempt,
            "start process"
        );

        let unit = tokio::spawn(handler::invoke(self.handler.clone(), Invocation { ctx, event }));

        match tokio::time::timeout(self.timeout, unit).await {
            Ok(Ok(Ok(Outcome::Handled))) => ProcessStatus::Success,
            Ok(Ok(Ok(Outcome::Ignored))) => ProcessStatus::Ignore,
            Ok(Ok(Err(err))) => {
                warn!(
                    pipeline = %self.pipeline,
                    worker = %self.worker_id,
                    event_id = %event_id,
                    attempt = attempt,
                    error = %err,
                    "handler failed"
                );
                ProcessStatus::Failure
            }
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    panic_message(&*join_err.into_panic())
                } else {
                    "handler task cancelled".to_string()
                };
                error!(
                    pipeline = %self.pipeline,
                    worker = %self.worker_id,
                    event_id = %event_id,
                    attempt = attempt,
                    panic = %message,
                    "handler panicked"
                );
                ProcessStatus::Panic
            }
            Err(_elapsed) => {
                cancel.cancel();
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = self.timeout.as_millis() as u64;
                warn!(
                    pipeline = %self.pipeline,
                    worker = %self.worker_id,
                    event_id = %event_id,
                    attempt = attempt,
                    timeout_ms = timeout_ms,
                    "handler timed out"
                );
                ProcessStatus::Timeout
            }
        }
    }
}

async fn next_event(buffer: &SharedBuffer) -> Option<Arc<dyn Event>> {
    buffer.lock().await.recv().await
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
