//! Ready-made router for serializable payloads fed through a channel.

mod router;

use std::sync::Arc;

use mailman_core::{JsonEvent, ProcessStatus};

pub use router::{GenericRouter, Publisher};

/// Notification for an event dropped after exhausting its retries.
#[derive(Debug)]
pub struct DeadLetter<T> {
    pub event: Arc<JsonEvent<T>>,
    /// Total attempts made, `max_retries + 1`.
    pub attempts: u32,
    /// Status of the final attempt.
    pub last_status: ProcessStatus,
}
