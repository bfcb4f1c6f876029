//! # Task status and settled results.

use std::fmt;

use crate::error::{ListenerError, TaskAbortError};

/// Lifecycle state of a listener task or forked task.
///
/// `Running` is the only non-terminal state; a task leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Still executing.
    Running,
    /// Finished with a value.
    Ok,
    /// Finished with an error.
    Rejected,
    /// Aborted before finishing.
    Cancelled,
}

impl TaskStatus {
    /// True for `Ok`, `Rejected` and `Cancelled`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }

    /// Returns the lowercase status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Ok => "ok",
            TaskStatus::Rejected => "rejected",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settled outcome of a forked task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult<T> {
    /// The executor returned a value.
    Ok(T),
    /// The executor failed.
    Rejected(ListenerError),
    /// The task was aborted.
    Cancelled(TaskAbortError),
}

impl<T> TaskResult<T> {
    /// Maps an executor outcome; [`ListenerError::Aborted`] becomes `Cancelled`.
    pub fn from_outcome(outcome: Result<T, ListenerError>) -> Self {
        match outcome {
            Ok(value) => TaskResult::Ok(value),
            Err(ListenerError::Aborted(err)) => TaskResult::Cancelled(err),
            Err(err) => TaskResult::Rejected(err),
        }
    }

    /// Returns the terminal status this result corresponds to.
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskResult::Ok(_) => TaskStatus::Ok,
            TaskResult::Rejected(_) => TaskStatus::Rejected,
            TaskResult::Cancelled(_) => TaskStatus::Cancelled,
        }
    }

    /// Returns the value of an `Ok` result.
    pub fn ok(self) -> Option<T> {
        match self {
            TaskResult::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// Converts into a `Result`, so a parent effect can use `?` on a child's outcome.
    pub fn into_result(self) -> Result<T, ListenerError> {
        match self {
            TaskResult::Ok(value) => Ok(value),
            TaskResult::Rejected(err) => Err(err),
            TaskResult::Cancelled(err) => Err(ListenerError::Aborted(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::AbortReason;

    #[test]
    fn aborted_outcome_maps_to_cancelled() {
        let abort = TaskAbortError::new(AbortReason::TaskCancelled);
        let res: TaskResult<u8> = TaskResult::from_outcome(Err(abort.clone().into()));
        assert_eq!(res, TaskResult::Cancelled(abort));
        assert_eq!(res.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn failures_map_to_rejected() {
        let res: TaskResult<u8> = TaskResult::from_outcome(Err(ListenerError::fail("nope")));
        assert_eq!(res.status(), TaskStatus::Rejected);
        assert!(res.into_result().is_err());
    }

    #[test]
    fn only_running_is_not_terminal() {
        assert!(!TaskStatus::Running.is_terminal());
        for s in [TaskStatus::Ok, TaskStatus::Rejected, TaskStatus::Cancelled] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }
}
