use std::time::Duration;

/// Per-router configuration: concurrency width, per-event deadline and retry
/// ceiling.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Shared buffer capacity and number of workers draining it.
    pub buffer_size: usize,
    /// Deadline for a single handler invocation.
    pub timeout: Duration,
    /// Maximum number of resubmissions per event before it is dropped.
    pub max_retries: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 10,
            timeout: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

/// What the dispatcher does when a router fails to commit an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitFailurePolicy {
    /// Halt only the router whose commit failed.
    #[default]
    StopRouter,
    /// Halt the whole dispatcher.
    StopAll,
}

/// Dispatcher-level configuration.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub commit_failure: CommitFailurePolicy,
}
