//! Heuristic for telling a slow session from a hung one.
//!
//! Tuned to one observed incident where the server stopped responding and the
//! client sat until its ~300 s deadline. A quiet session that runs into the
//! deadline is reported as a suspected deadlock; anything else is not.

use std::time::Duration;

use serde::Serialize;

/// How close to the deadline a silent session must get to count as deadlocked.
pub const DEADLOCK_PROXIMITY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StallAssessment {
    /// A completion-class event arrived
    Completed,
    /// Events arrived but the session never completed
    Incomplete,
    /// Nothing arrived, but the session ended well before the deadline
    NoResponse,
    /// Nothing arrived and the session ran into its deadline
    SuspectedDeadlock,
}

pub fn assess_stall(
    events_seen: usize,
    completed: bool,
    elapsed: Duration,
    deadline: Duration,
) -> StallAssessment {
    if completed {
        return StallAssessment::Completed;
    }
    if events_seen > 0 {
        return StallAssessment::Incomplete;
    }
    if elapsed + DEADLOCK_PROXIMITY >= deadline {
        StallAssessment::SuspectedDeadlock
    } else {
        StallAssessment::NoResponse
    }
}
