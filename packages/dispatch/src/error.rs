use mailman_core::CommitError;

/// Errors surfaced by [`Dispatcher`](crate::Dispatcher) setup and `run`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher is already running")]
    AlreadyRunning,
    #[error("dispatcher already started, register routers and middleware before run")]
    AlreadyStarted,
    #[error("router {name} must have a buffer size of at least 1")]
    InvalidRouter { name: String },
    #[error("no routers registered")]
    NoRouters,
    #[error("router {router} failed to commit: {source}")]
    CommitFailed {
        router: String,
        #[source]
        source: CommitError,
    },
    #[error("every router halted after commit failures")]
    AllRoutersHalted,
    #[error("all pipelines exited without reporting a stop")]
    StopChannelClosed,
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn commit_failed_exposes_source() {
        let event_id = uuid::Uuid::nil();
        let err = DispatchError::CommitFailed {
            router: "cars".to_string(),
            source: CommitError::RetryQueueClosed { event_id },
        };
        assert!(err.to_string().starts_with("router cars failed to commit"));
        assert!(err.source().is_some());
    }
}
