//! Tracing middleware for handler invocations.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use mailman_core::HandlerError;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::handler::{Invocation, Outcome};

// ---------------------------------------------------------------------------
// TraceLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps each invocation in an `invocation` span and logs
/// its duration and outcome when the inner handler returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService { inner }
    }
}

// ---------------------------------------------------------------------------
// TraceService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TraceService<S> {
    inner: S,
}

impl<S> Service<Invocation> for TraceService<S>
where
    S: Service<Invocation, Response = Outcome, Error = HandlerError> + Send,
    S::Future: Send + 'static,
{
    type Response = Outcome;
    type Error = HandlerError;
    type Future = Pin<Box<dyn Future<Output = Result<Outcome, HandlerError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, inv: Invocation) -> Self::Future {
        let span = info_span!(
            "invocation",
            pipeline = %inv.ctx.pipeline,
            worker = %inv.ctx.worker_id,
            event_id = %inv.ctx.event_id,
            attempt = inv.ctx.attempt,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(inv);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = outcome_label(&result);
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::info!(duration_ms = duration_ms, outcome = outcome, "invocation complete");

                result
            }
            .instrument(span),
        )
    }
}

fn outcome_label(result: &Result<Outcome, HandlerError>) -> &'static str {
    match result {
        Ok(Outcome::Handled) => "handled",
        Ok(Outcome::Ignored) => "ignored",
        Err(_) => "error",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mailman_core::{Event, JsonEvent};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;
    use crate::context::InvocationContext;
    use crate::handler::handler_fn;

    fn invocation() -> Invocation {
        let event: Arc<dyn Event> = Arc::new(JsonEvent::new(7u32).unwrap());
        Invocation {
            ctx: InvocationContext::new(
                Arc::from("numbers"),
                Arc::from("numbers-0"),
                event.id(),
                1,
                Duration::from_secs(1),
                CancellationToken::new(),
            ),
            event,
        }
    }

    #[tokio::test]
    async fn trace_layer_passes_through_outcome() {
        let svc = TraceLayer.layer(handler_fn(|_inv: Invocation| async { Ok(Outcome::Ignored) }));
        assert_eq!(svc.oneshot(invocation()).await.unwrap(), Outcome::Ignored);
    }

    #[tokio::test]
    async fn trace_layer_passes_through_error() {
        let svc = TraceLayer.layer(handler_fn(|_inv: Invocation| async {
            Err(HandlerError::rejected("nope"))
        }));
        let err = svc.oneshot(invocation()).await.unwrap_err();
        assert!(matches!(err, HandlerError::Rejected(reason) if reason == "nope"));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome_label(&Ok(Outcome::Handled)), "handled");
        assert_eq!(outcome_label(&Ok(Outcome::Ignored)), "ignored");
        assert_eq!(outcome_label(&Err(HandlerError::rejected("x"))), "error");
    }
}
