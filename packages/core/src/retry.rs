//! Per-event retry state machine.
//!
//! ```text
//! Dispatched --Success/Ignore--> Released
//!     |
//!     +--Failure/Panic/Timeout, commits <= ceiling--> RetryPending --redispatch--> Dispatched
//!     |
//!     +--Failure/Panic/Timeout, commits >  ceiling--> Dropped
//! ```

use crate::status::ProcessStatus;

/// Lifecycle position of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Sitting in the shared buffer or held by a worker.
    Dispatched,
    /// Queued for resubmission by the owning router.
    RetryPending,
    /// Finished with `Success` or `Ignore`.
    Released,
    /// Retry ceiling exceeded; will never be resubmitted.
    Dropped,
}

impl RetryState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Dropped)
    }
}

/// What the router must do with an event after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Push the event back onto the shared buffer.
    Retry,
    /// The event is done.
    Release,
    /// The ceiling was exceeded; the event is done, unsuccessfully.
    Drop,
}

/// Rejected transition, reported by [`RetryTracker::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTransition {
    Finalized,
    AwaitingRedispatch,
}

/// Commit counter plus state, updated together.
#[derive(Debug)]
pub(crate) struct RetryTracker {
    commits: u32,
    state: RetryState,
    last_status: Option<ProcessStatus>,
}

impl RetryTracker {
    pub(crate) fn new() -> Self {
        Self {
            commits: 0,
            state: RetryState::Dispatched,
            last_status: None,
        }
    }

    pub(crate) fn commits(&self) -> u32 {
        self.commits
    }

    pub(crate) fn state(&self) -> RetryState {
        self.state
    }

    pub(crate) fn last_status(&self) -> Option<ProcessStatus> {
        self.last_status
    }

    /// Records one commit. The counter is bumped for every accepted commit,
    /// independent of `status`.
    pub(crate) fn commit(
        &mut self,
        status: ProcessStatus,
        ceiling: u32,
    ) -> Result<RetryDecision, InvalidTransition> {
        match self.state {
            RetryState::Dispatched => {}
            RetryState::RetryPending => return Err(InvalidTransition::AwaitingRedispatch),
            RetryState::Released | RetryState::Dropped => return Err(InvalidTransition::Finalized),
        }

        self.commits = self.commits.saturating_add(1);
        self.last_status = Some(status);

        let decision = if !status.is_retryable() {
            self.state = RetryState::Released;
            RetryDecision::Release
        } else if self.commits <= ceiling {
            self.state = RetryState::RetryPending;
            RetryDecision::Retry
        } else {
            self.state = RetryState::Dropped;
            RetryDecision::Drop
        };
        Ok(decision)
    }

    /// `RetryPending -> Dispatched`. Returns `false` from any other state.
    pub(crate) fn redispatch(&mut self) -> bool {
        if self.state == RetryState::RetryPending {
            self.state = RetryState::Dispatched;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn success_releases() {
        let mut t = RetryTracker::new();
        assert_eq!(t.commit(ProcessStatus::Success, 3), Ok(RetryDecision::Release));
        assert_eq!(t.state(), RetryState::Released);
        assert_eq!(t.commits(), 1);
    }

    #[test]
    fn ignore_releases_without_retry() {
        let mut t = RetryTracker::new();
        assert_eq!(t.commit(ProcessStatus::Ignore, 3), Ok(RetryDecision::Release));
        assert_eq!(t.last_status(), Some(ProcessStatus::Ignore));
    }

    #[test]
    fn failures_retry_until_ceiling_then_drop() {
        let mut t = RetryTracker::new();
        let ceiling = 2;

        for _ in 0..ceiling {
            assert_eq!(t.commit(ProcessStatus::Failure, ceiling), Ok(RetryDecision::Retry));
            assert!(t.redispatch());
        }
        assert_eq!(t.commit(ProcessStatus::Timeout, ceiling), Ok(RetryDecision::Drop));
        assert_eq!(t.state(), RetryState::Dropped);
        assert_eq!(t.commits(), ceiling + 1);
    }

    #[test]
    fn zero_ceiling_drops_on_first_failure() {
        let mut t = RetryTracker::new();
        assert_eq!(t.commit(ProcessStatus::Panic, 0), Ok(RetryDecision::Drop));
    }

    #[test]
    fn commit_after_terminal_is_rejected() {
        let mut t = RetryTracker::new();
        t.commit(ProcessStatus::Success, 1).unwrap();
        assert_eq!(
            t.commit(ProcessStatus::Success, 1),
            Err(InvalidTransition::Finalized)
        );
        assert_eq!(t.commits(), 1);
    }

    #[test]
    fn commit_before_redispatch_is_rejected() {
        let mut t = RetryTracker::new();
        t.commit(ProcessStatus::Failure, 1).unwrap();
        assert_eq!(
            t.commit(ProcessStatus::Failure, 1),
            Err(InvalidTransition::AwaitingRedispatch)
        );
    }

    #[test]
    fn redispatch_only_from_retry_pending() {
        let mut t = RetryTracker::new();
        assert!(!t.redispatch());
        t.commit(ProcessStatus::Success, 1).unwrap();
        assert!(!t.redispatch());
    }

    fn any_status() -> impl Strategy<Value = ProcessStatus> {
        prop_oneof![
            Just(ProcessStatus::Ignore),
            Just(ProcessStatus::Timeout),
            Just(ProcessStatus::Success),
            Just(ProcessStatus::Failure),
            Just(ProcessStatus::Panic),
        ]
    }

    proptest! {
        #[test]
        fn counter_tracks_accepted_commits(
            statuses in proptest::collection::vec(any_status(), 1..20),
            ceiling in 0u32..6,
        ) {
            let mut t = RetryTracker::new();
            let mut accepted = 0u32;
            for status in statuses {
                if t.commit(status, ceiling).is_err() {
                    break;
                }
                accepted += 1;
                prop_assert_eq!(t.commits(), accepted);
                if !t.redispatch() {
                    break;
                }
            }
            prop_assert!(t.commits() <= ceiling + 1);
        }
    }
}
