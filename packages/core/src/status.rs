use std::fmt;

/// Outcome classification of a single handler invocation attempt.
///
/// Exactly one status is resolved per attempt. `Failure`, `Panic` and
/// `Timeout` are retryable; `Success` and `Ignore` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    /// The handler declined the event.
    Ignore,
    /// The deadline elapsed before the handler reported a result.
    Timeout,
    /// The handler completed normally.
    Success,
    /// The handler returned an error.
    Failure,
    /// The handler panicked; the fault was contained by the worker.
    Panic,
}

impl ProcessStatus {
    /// Whether an event committed with this status may be resubmitted.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Failure | Self::Panic | Self::Timeout)
    }

    /// Stable lowercase label, used as a structured log field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Timeout => "timeout",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Panic => "panic",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_failures_are_retryable() {
        assert!(ProcessStatus::Failure.is_retryable());
        assert!(ProcessStatus::Panic.is_retryable());
        assert!(ProcessStatus::Timeout.is_retryable());
        assert!(!ProcessStatus::Success.is_retryable());
        assert!(!ProcessStatus::Ignore.is_retryable());
    }

    #[test]
    fn display_matches_label() {
        assert_eq!(ProcessStatus::Timeout.to_string(), "timeout");
        assert_eq!(ProcessStatus::Panic.to_string(), "panic");
    }
}
