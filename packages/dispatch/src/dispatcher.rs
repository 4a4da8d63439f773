//! The dispatcher: owns the registered routers and middleware, wires one
//! pipeline per router when `run` starts, and supervises stop signals.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mailman_core::HandlerError;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{error, info};

use crate::config::{CommitFailurePolicy, DispatcherConfig};
use crate::error::DispatchError;
use crate::handler::{self, BoxedMiddleware, Handler, Invocation, Outcome};
use crate::registry::RouterRegistry;
use crate::router::{DoneSignal, Router, StopReason, StopSignal};
use crate::worker::{SharedBuffer, Worker};

/// Result of a successful [`Dispatcher::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// Router whose producer finished first.
    pub router: Arc<str>,
    /// Routers halted by commit failures before the stop.
    pub halted: Vec<Arc<str>>,
}

/// Running pieces of one router's pipeline that the supervisor can stop.
struct Pipeline {
    cancel: CancellationToken,
    producer: AbortHandle,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// In-process event dispatcher.
///
/// Register routers and middleware, then call [`run`](Self::run) once. `run`
/// returns when the first producer finishes, or with an error when commits
/// fail according to the configured [`CommitFailurePolicy`].
pub struct Dispatcher {
    config: DispatcherConfig,
    routers: RouterRegistry,
    middleware: RwLock<Vec<BoxedMiddleware>>,
    started: AtomicBool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            routers: RouterRegistry::new(),
            middleware: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Registers `router` under `name`, replacing any router of that name.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidRouter`] if the router's buffer size is zero,
    /// [`DispatchError::AlreadyStarted`] once `run` has been called.
    pub fn register<R: Router>(&self, name: &str, router: R) -> Result<(), DispatchError> {
        self.register_shared(name, Arc::new(router))
    }

    /// Like [`register`](Self::register) for a router the caller keeps a
    /// handle to.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_shared(&self, name: &str, router: Arc<dyn Router>) -> Result<(), DispatchError> {
        self.ensure_not_started()?;
        if router.buffer_size() == 0 {
            return Err(DispatchError::InvalidRouter {
                name: name.to_string(),
            });
        }
        if self.routers.register(name, router).is_some() {
            info!(router = name, "router replaced");
        }
        Ok(())
    }

    /// Appends a middleware layer. The first layer registered is the
    /// outermost around every router's handler.
    ///
    /// # Errors
    ///
    /// [`DispatchError::AlreadyStarted`] once `run` has been called.
    pub fn layer<L>(&self, layer: L) -> Result<(), DispatchError>
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Invocation, Response = Outcome, Error = HandlerError> + Clone + Send + Sync + 'static,
        <L::Service as Service<Invocation>>::Future: Send + 'static,
    {
        self.ensure_not_started()?;
        self.middleware.write().push(handler::box_layer(layer));
        Ok(())
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Starts every pipeline and blocks until the dispatcher stops.
    ///
    /// The dispatcher is single-shot: later calls fail with
    /// [`DispatchError::AlreadyRunning`], even after the first run returned.
    /// When `run` returns, all workers and producers have been stopped;
    /// handler tasks detached by a timeout may still be running.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyRunning`] on a second call.
    /// - [`DispatchError::NoRouters`] if nothing was registered.
    /// - [`DispatchError::CommitFailed`] under [`CommitFailurePolicy::StopAll`].
    /// - [`DispatchError::AllRoutersHalted`] when every router halted under
    ///   [`CommitFailurePolicy::StopRouter`].
    pub async fn run(&self) -> Result<StopReport, DispatchError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyRunning);
        }

        let routers = self.routers.snapshot();
        if routers.is_empty() {
            return Err(DispatchError::NoRouters);
        }
        if let Some((name, _)) = routers.iter().find(|(_, router)| router.buffer_size() == 0) {
            return Err(DispatchError::InvalidRouter {
                name: name.to_string(),
            });
        }
        let middleware = self.middleware.read().clone();

        let root = CancellationToken::new();
        let (stop_tx, mut stop_rx) = mpsc::channel(routers.len());
        let mut tasks = JoinSet::new();
        let mut pipelines = HashMap::with_capacity(routers.len());

        for (name, router) in routers {
            let pipeline = spawn_pipeline(
                &mut tasks,
                Arc::clone(&name),
                router,
                &middleware,
                &root,
                &stop_tx,
            );
            pipelines.insert(name, pipeline);
        }
        drop(stop_tx);

        info!(routers = pipelines.len(), middleware = middleware.len(), "dispatcher running");

        let result = self.supervise(&mut stop_rx, &pipelines).await;

        root.cancel();
        tasks.shutdown().await;

        match &result {
            Ok(report) => info!(router = %report.router, "dispatcher stopped"),
            Err(err) => error!(error = %err, "dispatcher stopped"),
        }
        result
    }

    async fn supervise(
        &self,
        stop_rx: &mut mpsc::Receiver<StopSignal>,
        pipelines: &HashMap<Arc<str>, Pipeline>,
    ) -> Result<StopReport, DispatchError> {
        let mut halted: HashSet<Arc<str>> = HashSet::new();

        loop {
            let Some(signal) = stop_rx.recv().await else {
                return Err(DispatchError::StopChannelClosed);
            };

            match signal.reason {
                StopReason::ProducerFinished => {
                    info!(router = %signal.router, "producer finished");
                    let mut halted: Vec<_> = halted.into_iter().collect();
                    halted.sort();
                    return Ok(StopReport {
                        router: signal.router,
                        halted,
                    });
                }
                StopReason::CommitFailed(source) => match self.config.commit_failure {
                    CommitFailurePolicy::StopAll => {
                        return Err(DispatchError::CommitFailed {
                            router: signal.router.to_string(),
                            source,
                        });
                    }
                    CommitFailurePolicy::StopRouter => {
                        if halted.insert(Arc::clone(&signal.router)) {
                            error!(router = %signal.router, error = %source, "halting router");
                            if let Some(pipeline) = pipelines.get(&signal.router) {
                                pipeline.cancel.cancel();
                                pipeline.producer.abort();
                            }
                        }
                        if halted.len() == pipelines.len() {
                            return Err(DispatchError::AllRoutersHalted);
                        }
                    }
                },
            }
        }
    }

    fn ensure_not_started(&self) -> Result<(), DispatchError> {
        if self.is_started() {
            return Err(DispatchError::AlreadyStarted);
        }
        Ok(())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

/// Spawns `buffer_size` workers and one producer for `router`.
fn spawn_pipeline(
    tasks: &mut JoinSet<()>,
    name: Arc<str>,
    router: Arc<dyn Router>,
    middleware: &[BoxedMiddleware],
    root: &CancellationToken,
    stop_tx: &mpsc::Sender<StopSignal>,
) -> Pipeline {
    let size = router.buffer_size();
    let timeout = router.timeout();
    let handler = handler::apply_middleware(router.handler(), middleware);

    let (buffer_tx, buffer_rx) = mpsc::channel(size);
    let buffer: SharedBuffer = Arc::new(Mutex::new(buffer_rx));
    let cancel = root.child_token();
    let done = DoneSignal::new(Arc::clone(&name), stop_tx.clone());

    for idx in 0..size {
        let worker = Worker {
            pipeline: Arc::clone(&name),
            worker_id: Arc::from(format!("{name}-{idx}")),
            router: Arc::clone(&router),
            handler: handler.clone(),
            buffer: Arc::clone(&buffer),
            timeout,
            done: done.clone(),
            cancel: cancel.clone(),
        };
        tasks.spawn(worker.run());
    }

    let producer = tasks.spawn(async move { router.produce(buffer_tx, done).await });

    #[allow(clippy::cast_possible_truncation)]
    let timeout_ms = timeout.as_millis() as u64;
    info!(router = %name, workers = size, timeout_ms = timeout_ms, "pipeline started");

    Pipeline { cancel, producer }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
