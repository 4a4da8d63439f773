//! Stock middleware for handler chains.
//!
//! Any `tower::Layer` over [`Handler`](crate::Handler) can be registered with
//! [`Dispatcher::layer`](crate::Dispatcher::layer); this module ships the ones
//! most pipelines want.
//!
//! - [`trace`]: per-invocation `tracing` span with duration and outcome

pub mod trace;

pub use trace::TraceLayer;
