//! Mailman core: events, process statuses, the per-event retry state machine,
//! and the error taxonomy shared by routers and the dispatcher.

pub mod error;
pub mod event;
pub mod retry;
pub mod status;

pub use error::{CommitError, DecodeError, HandlerError};
pub use event::{Event, JsonEvent};
pub use retry::{InvalidTransition, RetryDecision, RetryState};
pub use status::ProcessStatus;
