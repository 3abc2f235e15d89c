//! The cooperative completion status returned by protocol operations.

use std::fmt;

/// Outcome of one non-blocking protocol call.
///
/// `Incomplete` is the normal "poll again later" signal of the boundary
/// exchange — it is not an error and carries no failure information.
/// Fatal conditions travel through `Result::Err` instead, so a polling
/// loop matches on `Ok(Complete)` / `Ok(Incomplete)` / `Err(_)` and only
/// the last arm aborts.
///
/// ```
/// use floe_core::TaskStatus;
///
/// let status = TaskStatus::complete_if(3 > 2);
/// assert!(status.is_complete());
/// assert_eq!(status.and(TaskStatus::Incomplete), TaskStatus::Incomplete);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// The operation finished; no further polling is needed this cycle.
    Complete,
    /// Progress depends on a peer that has not caught up yet; poll again.
    Incomplete,
}

impl TaskStatus {
    /// `Complete` when `done` is true, `Incomplete` otherwise.
    pub fn complete_if(done: bool) -> Self {
        if done {
            Self::Complete
        } else {
            Self::Incomplete
        }
    }

    /// Whether this is `Complete`.
    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Combine two statuses: `Complete` only if both are.
    pub fn and(self, other: Self) -> Self {
        Self::complete_if(self.is_complete() && other.is_complete())
    }

    /// Fold statuses: `Complete` only if every one is. An empty iterator
    /// is `Complete` — no pending work means done.
    pub fn all_of<I: IntoIterator<Item = TaskStatus>>(statuses: I) -> Self {
        statuses.into_iter().fold(Self::Complete, Self::and)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
        };
        write!(f, "{s}")
    }
}
