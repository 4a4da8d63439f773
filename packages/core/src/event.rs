//! Events: the unit of work carried through a pipeline.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CommitError, DecodeError};
use crate::retry::{InvalidTransition, RetryDecision, RetryState, RetryTracker};
use crate::status::ProcessStatus;

// ---------------------------------------------------------------------------
// Event trait
// ---------------------------------------------------------------------------

/// Type-erased view of an event as seen by workers and handlers.
///
/// Payload encodings plug in here; typed access goes through
/// [`bind`](trait.Event.html#method.bind) on `dyn Event`.
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// Unique identifier, stable across retries.
    fn id(&self) -> Uuid;

    /// Raw serialized snapshot taken when the event was built.
    fn content(&self) -> &[u8];

    /// Attempt number of the current dispatch, starting at 1.
    fn attempt(&self) -> u32;

    /// Upcast used by routers to recover their concrete event type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl dyn Event {
    /// Decodes the stored snapshot into `T`.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Decode` when the snapshot does not match the
    /// shape of `T`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_slice(self.content()).map_err(DecodeError::Decode)
    }
}

// ---------------------------------------------------------------------------
// JsonEvent
// ---------------------------------------------------------------------------

/// Event wrapping a typed payload and its JSON snapshot.
///
/// The snapshot is computed once in [`JsonEvent::new`] and never changes.
pub struct JsonEvent<T> {
    id: Uuid,
    payload: T,
    raw: Vec<u8>,
    tracker: Mutex<RetryTracker>,
}

impl<T: Serialize> JsonEvent<T> {
    /// Builds an event, serializing `payload` once.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Encode` if the payload cannot be serialized.
    pub fn new(payload: T) -> Result<Self, DecodeError> {
        let raw = serde_json::to_vec(&payload).map_err(DecodeError::Encode)?;
        Ok(Self {
            id: Uuid::new_v4(),
            payload,
            raw,
            tracker: Mutex::new(RetryTracker::new()),
        })
    }
}

impl<T> JsonEvent<T> {
    /// The original typed payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Number of commits recorded so far.
    pub fn commit_count(&self) -> u32 {
        self.tracker.lock().commits()
    }

    /// Current position in the retry state machine.
    pub fn state(&self) -> RetryState {
        self.tracker.lock().state()
    }

    /// Status passed to the most recent commit, if any.
    pub fn last_status(&self) -> Option<ProcessStatus> {
        self.tracker.lock().last_status()
    }

    /// Records a commit and returns what the router should do next.
    ///
    /// # Errors
    ///
    /// Returns `CommitError::AlreadyFinalized` for a released or dropped
    /// event, and `CommitError::NotDispatched` for an event still waiting to
    /// be pushed back onto the buffer.
    pub fn commit(&self, status: ProcessStatus, ceiling: u32) -> Result<RetryDecision, CommitError> {
        self.tracker
            .lock()
            .commit(status, ceiling)
            .map_err(|invalid| match invalid {
                InvalidTransition::Finalized => CommitError::AlreadyFinalized { event_id: self.id },
                InvalidTransition::AwaitingRedispatch => {
                    CommitError::NotDispatched { event_id: self.id }
                }
            })
    }

    /// Moves a retry-pending event back to dispatched. Returns `false` if the
    /// event was not waiting for a retry.
    pub fn redispatch(&self) -> bool {
        self.tracker.lock().redispatch()
    }
}

impl<T> Event for JsonEvent<T>
where
    T: Send + Sync + 'static,
{
    fn id(&self) -> Uuid {
        self.id
    }

    fn content(&self) -> &[u8] {
        &self.raw
    }

    fn attempt(&self) -> u32 {
        self.tracker.lock().commits() + 1
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T> fmt::Debug for JsonEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracker = self.tracker.lock();
        f.debug_struct("JsonEvent")
            .field("id", &self.id)
            .field("bytes", &self.raw.len())
            .field("commits", &tracker.commits())
            .field("state", &tracker.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Car {
        mark: String,
        model: String,
    }

    fn seal() -> Car {
        Car {
            mark: "BYD".to_string(),
            model: "Seal".to_string(),
        }
    }

    #[test]
    fn bind_decodes_snapshot() {
        let event: Arc<dyn Event> = Arc::new(JsonEvent::new(seal()).unwrap());
        let car: Car = event.bind().unwrap();
        assert_eq!(car, seal());
    }

    #[test]
    fn content_is_the_construction_snapshot() {
        let event = JsonEvent::new(seal()).unwrap();
        assert_eq!(event.content(), br#"{"mark":"BYD","model":"Seal"}"#);
        assert_eq!(event.content(), serde_json::to_vec(&seal()).unwrap().as_slice());
    }

    #[test]
    fn bind_shape_mismatch_is_decode_error() {
        let event: Arc<dyn Event> = Arc::new(JsonEvent::new(seal()).unwrap());
        let err = event.bind::<Vec<u32>>().unwrap_err();
        assert!(matches!(err, DecodeError::Decode(_)));
    }

    #[test]
    fn unserializable_payload_fails_construction() {
        use std::collections::HashMap;

        // JSON object keys must be strings.
        let mut payload = HashMap::new();
        payload.insert(vec![1u8], 1u8);
        let err = JsonEvent::new(payload).unwrap_err();
        assert!(matches!(err, DecodeError::Encode(_)));
    }

    #[test]
    fn attempt_starts_at_one_and_follows_commits() {
        let event = JsonEvent::new(seal()).unwrap();
        assert_eq!(event.attempt(), 1);
        assert_eq!(event.commit_count(), 0);

        event.commit(ProcessStatus::Failure, 5).unwrap();
        assert_eq!(event.commit_count(), 1);
        assert!(event.redispatch());
        assert_eq!(event.attempt(), 2);
    }

    #[test]
    fn commit_errors_carry_event_id() {
        let event = JsonEvent::new(seal()).unwrap();
        event.commit(ProcessStatus::Success, 1).unwrap();

        let err = event.commit(ProcessStatus::Success, 1).unwrap_err();
        assert!(matches!(err, CommitError::AlreadyFinalized { event_id } if event_id == event.id()));
    }

    #[test]
    fn into_any_downcasts_to_concrete_type() {
        let event: Arc<dyn Event> = Arc::new(JsonEvent::new(seal()).unwrap());
        let id = event.id();

        let concrete = event.into_any().downcast::<JsonEvent<Car>>().unwrap();
        assert_eq!(concrete.id(), id);
        assert_eq!(concrete.payload(), &seal());
    }

    #[test]
    fn into_any_rejects_other_payload_types() {
        let event: Arc<dyn Event> = Arc::new(JsonEvent::new(42u32).unwrap());
        assert!(event.into_any().downcast::<JsonEvent<Car>>().is_err());
    }
}
