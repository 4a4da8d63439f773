//! Channel-fed router for any serializable payload type.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailman_core::{CommitError, Event, JsonEvent, ProcessStatus, RetryDecision};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use super::DeadLetter;
use crate::config::RouterConfig;
use crate::handler::Handler;
use crate::router::{DoneSignal, EventSender, Router};

/// Sending side handed to whoever produces payloads for a [`GenericRouter`].
/// Dropping every clone closes the source.
pub type Publisher<T> = mpsc::Sender<T>;

// ---------------------------------------------------------------------------
// GenericRouter
// ---------------------------------------------------------------------------

/// Router fed by an in-process channel of `T` payloads.
///
/// Each payload becomes a [`JsonEvent<T>`]. Failed attempts are requeued on a
/// bounded retry queue (capacity `buffer_size`) that the producer task drains
/// ahead of new payloads, so the number of live events stays bounded and no
/// task is spawned per event.
pub struct GenericRouter<T> {
    handler: Handler,
    config: RouterConfig,
    source: Mutex<Option<mpsc::Receiver<T>>>,
    retry_tx: mpsc::Sender<Arc<JsonEvent<T>>>,
    retry_rx: Mutex<Option<mpsc::Receiver<Arc<JsonEvent<T>>>>>,
    /// Events produced and not yet released or dropped.
    live: AtomicUsize,
    drained: Notify,
    dead_letters: Option<mpsc::Sender<DeadLetter<T>>>,
}

impl<T> GenericRouter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Creates a router and the publisher feeding it.
    #[must_use]
    pub fn new(handler: Handler, config: RouterConfig) -> (Self, Publisher<T>) {
        let (publisher, source) = mpsc::channel(1);
        let (retry_tx, retry_rx) = mpsc::channel(config.buffer_size.max(1));
        let router = Self {
            handler,
            config,
            source: Mutex::new(Some(source)),
            retry_tx,
            retry_rx: Mutex::new(Some(retry_rx)),
            live: AtomicUsize::new(0),
            drained: Notify::new(),
            dead_letters: None,
        };
        (router, publisher)
    }

    /// Reports events dropped after the retry ceiling on `tx`.
    ///
    /// Delivery never blocks a worker: if `tx` is full the dead letter is
    /// logged and discarded.
    #[must_use]
    pub fn with_dead_letters(mut self, tx: mpsc::Sender<DeadLetter<T>>) -> Self {
        self.dead_letters = Some(tx);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Number of produced events that have not reached a terminal state.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn release(&self) {
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_one();
        }
    }

    fn dead_letter(&self, event: Arc<JsonEvent<T>>) {
        let attempts = event.commit_count();
        let last_status = event.last_status().unwrap_or(ProcessStatus::Failure);
        warn!(
            event_id = %event.id(),
            attempts = attempts,
            last_status = %last_status,
            max_retries = self.config.max_retries,
            "retry ceiling exceeded, dropping event"
        );

        let Some(tx) = &self.dead_letters else {
            return;
        };
        let letter = DeadLetter {
            event,
            attempts,
            last_status,
        };
        if let Err(err) = tx.try_send(letter) {
            warn!(error = %err, "dead letter not delivered");
        }
    }
}

#[async_trait]
impl<T> Router for GenericRouter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn handler(&self) -> Handler {
        self.handler.clone()
    }

    fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    async fn produce(&self, buffer: EventSender, done: DoneSignal) {
        let source = self.source.lock().take();
        let retries = self.retry_rx.lock().take();
        let (Some(mut source), Some(mut retries)) = (source, retries) else {
            warn!(router = done.router(), "producer already started, ignoring");
            return;
        };

        let mut source_open = true;
        loop {
            if !source_open && self.in_flight() == 0 {
                break;
            }

            let event = tokio::select! {
                biased;
                Some(event) = retries.recv() => {
                    if !event.redispatch() {
                        warn!(router = done.router(), event_id = %event.id(), "skipping event not pending retry");
                        continue;
                    }
                    debug!(
                        router = done.router(),
                        event_id = %event.id(),
                        attempt = event.attempt(),
                        "resubmitting event"
                    );
                    event
                }
                item = source.recv(), if source_open => match item {
                    Some(payload) => match JsonEvent::new(payload) {
                        Ok(event) => {
                            self.live.fetch_add(1, Ordering::AcqRel);
                            Arc::new(event)
                        }
                        Err(err) => {
                            warn!(router = done.router(), error = %err, "dropping payload that failed to encode");
                            continue;
                        }
                    },
                    None => {
                        info!(router = done.router(), in_flight = self.in_flight(), "source closed, draining");
                        source_open = false;
                        continue;
                    }
                },
                () = self.drained.notified(), if !source_open => continue,
            };

            if buffer.send(event as Arc<dyn Event>).await.is_err() {
                debug!(router = done.router(), "buffer closed, producer stopping");
                return;
            }
        }

        info!(router = done.router(), "producer finished");
        done.finish().await;
    }

    async fn commit(&self, status: ProcessStatus, event: Arc<dyn Event>) -> Result<(), CommitError> {
        let event_id = event.id();
        let event = event
            .into_any()
            .downcast::<JsonEvent<T>>()
            .map_err(|_| CommitError::ForeignEvent { event_id })?;

        match event.commit(status, self.config.max_retries)? {
            RetryDecision::Retry => {
                debug!(event_id = %event_id, status = %status, commits = event.commit_count(), "queueing retry");
                self.retry_tx
                    .send(event)
                    .await
                    .map_err(|_| CommitError::RetryQueueClosed { event_id })?;
            }
            RetryDecision::Release => self.release(),
            RetryDecision::Drop => {
                self.dead_letter(event);
                self.release();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
