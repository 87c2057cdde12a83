use serde::{Deserialize, Serialize};
use std::fmt;

use crate::progress::Phase;

/// Lifecycle of a single job.
///
/// Runs `Queued → Converting → Transcribing → Finalizing → Completed`;
/// `Failed` is absorbing and reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Converting,
    Transcribing,
    Finalizing,
    Completed,
    Failed,
}

impl JobState {
    /// Successor on the success path, `None` for terminal states
    pub fn next(&self) -> Option<JobState> {
        match self {
            JobState::Queued => Some(JobState::Converting),
            JobState::Converting => Some(JobState::Transcribing),
            JobState::Transcribing => Some(JobState::Finalizing),
            JobState::Finalizing => Some(JobState::Completed),
            JobState::Completed | JobState::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Phase reported to observers while in this state
    pub fn phase(&self) -> Phase {
        match self {
            JobState::Queued => Phase::Queued,
            JobState::Converting => Phase::Converting,
            JobState::Transcribing => Phase::Transcribing,
            JobState::Finalizing => Phase::Finalizing,
            JobState::Completed => Phase::Completed,
            JobState::Failed => Phase::Failed,
        }
    }

    /// Advance along the success path. Terminal states stay put.
    pub fn advance(&mut self) -> JobState {
        if let Some(next) = self.next() {
            *self = next;
        }
        *self
    }

    /// Move to `Failed` unless already terminal
    pub fn fail(&mut self) -> JobState {
        if !self.is_terminal() {
            *self = JobState::Failed;
        }
        *self
    }
}

impl Default for JobState {
    fn default() -> Self {
        JobState::Queued
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.phase().as_str())
    }
}
