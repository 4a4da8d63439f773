//! Handler and middleware types.
//!
//! A handler is a cloneable `tower::Service<Invocation>`. Middleware is any
//! `tower::Layer` over [`Handler`]; the dispatcher boxes layers so routers with
//! different handler types share one chain.

use std::future::Future;
use std::sync::Arc;

use mailman_core::{Event, HandlerError};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

use crate::context::InvocationContext;

/// One handler call: the context plus the event being processed.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub ctx: InvocationContext,
    pub event: Arc<dyn Event>,
}

/// Successful handler result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event was processed.
    Handled,
    /// The handler deliberately skipped the event; it is not retried.
    Ignored,
}

/// Type-erased handler service. Cloning is cheap and clones are `Sync`, so
/// routers and workers hold one directly.
pub type Handler = BoxCloneSyncService<Invocation, Outcome, HandlerError>;

/// Type-erased middleware: a handler-to-handler transform.
pub(crate) type BoxedMiddleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Builds a [`Handler`] from an async function.
///
/// ```ignore
/// let handler = handler_fn(|inv: Invocation| async move {
///     let car: Car = inv.event.bind()?;
///     tracing::info!(model = %car.model, "received");
///     Ok(Outcome::Handled)
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Invocation) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Outcome, HandlerError>> + Send + 'static,
{
    BoxCloneSyncService::new(tower::service_fn(f))
}

/// Boxes a tower layer into a [`BoxedMiddleware`].
pub(crate) fn box_layer<L>(layer: L) -> BoxedMiddleware
where
    L: Layer<Handler> + Send + Sync + 'static,
    L::Service: Service<Invocation, Response = Outcome, Error = HandlerError> + Clone + Send + Sync + 'static,
    <L::Service as Service<Invocation>>::Future: Send + 'static,
{
    Arc::new(move |inner: Handler| BoxCloneSyncService::new(layer.layer(inner)))
}

/// Wraps `handler` so that `middleware[0]` is the outermost layer.
pub(crate) fn apply_middleware(handler: Handler, middleware: &[BoxedMiddleware]) -> Handler {
    middleware
        .iter()
        .rev()
        .fold(handler, |inner, wrap| wrap(inner))
}

/// Drives one invocation through `handler`, waiting for readiness first.
pub(crate) async fn invoke(handler: Handler, invocation: Invocation) -> Result<Outcome, HandlerError> {
    handler.oneshot(invocation).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
