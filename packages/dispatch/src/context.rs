//! Invocation metadata handed to every handler call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Deadline used when `started_at + timeout` does not fit in an `Instant`.
/// Roughly thirty years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Per-invocation context: who is running the handler, for which event, and
/// until when.
///
/// The cancellation token fires when the deadline elapses. Handlers are never
/// interrupted; they may watch [`cancelled`](Self::cancelled) to stop early.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Name the router was registered under.
    pub pipeline: Arc<str>,
    /// Worker identity, `"{pipeline}-{index}"`.
    pub worker_id: Arc<str>,
    pub event_id: Uuid,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    pub started_at: Instant,
    pub deadline: Instant,
    cancel: CancellationToken,
}

impl InvocationContext {
    pub(crate) fn new(
        pipeline: Arc<str>,
        worker_id: Arc<str>,
        event_id: Uuid,
        attempt: u32,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let started_at = Instant::now();
        Self {
            pipeline,
            worker_id,
            event_id,
            attempt,
            started_at,
            deadline: deadline_after(started_at, timeout),
            cancel,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the dispatcher has stopped waiting for this invocation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the deadline has elapsed and the result will be discarded.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ctx(timeout: Duration, cancel: CancellationToken) -> InvocationContext {
        InvocationContext::new(
            Arc::from("cars"),
            Arc::from("cars-0"),
            Uuid::new_v4(),
            1,
            timeout,
            cancel,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_start_plus_timeout() {
        let ctx = make_ctx(Duration::from_millis(100), CancellationToken::new());
        assert_eq!(ctx.deadline - ctx.started_at, Duration::from_millis(100));
        assert_eq!(ctx.remaining(), Duration::from_millis(100));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(ctx.remaining(), Duration::ZERO);
        assert!(ctx.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn unbounded_timeout_saturates_deadline() {
        let ctx = make_ctx(Duration::MAX, CancellationToken::new());
        assert!(ctx.deadline > ctx.started_at);
        assert!(ctx.remaining() > Duration::from_secs(86_400 * 365));
    }

    #[tokio::test]
    async fn cancellation_is_observable() {
        let token = CancellationToken::new();
        let ctx = make_ctx(Duration::from_secs(1), token.clone());
        assert!(!ctx.is_cancelled());

        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_cancelled());
    }
}
