//! Error taxonomy shared by routers, handlers and the dispatcher.

/// Failure to serialize a payload into an event snapshot, or to decode a
/// snapshot back into a typed value.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode event content: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Error returned by a business handler or a middleware layer.
///
/// Every variant resolves the attempt to `ProcessStatus::Failure`.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("handler rejected event: {0}")]
    Rejected(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Convenience constructor for `HandlerError::Rejected`.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Router-level failure to finalize or requeue an event.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("event {event_id} does not belong to this router")]
    ForeignEvent { event_id: uuid::Uuid },
    #[error("event {event_id} was already finalized")]
    AlreadyFinalized { event_id: uuid::Uuid },
    #[error("event {event_id} is waiting for redispatch and cannot be committed")]
    NotDispatched { event_id: uuid::Uuid },
    #[error("retry queue closed while requeueing event {event_id}")]
    RetryQueueClosed { event_id: uuid::Uuid },
}
