//! Report polling state machine
//!
//! `Submitted -> Polling{n} -> Done | TooLarge | TimedOut`. The transition
//! function is pure; the report client owns the I/O and the delay.

use std::time::Duration;

/// Status the WMS reports for a task that can never complete.
pub const TOO_LARGE_STATUS: &str = "Request too Large";

/// Status the WMS reports once report data is ready.
pub const DONE_STATUS: &str = "Done";

/// Fixed-delay, bounded polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before every status check after the first
    pub interval: Duration,
    /// Status checks allowed before giving up
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Worst-case time spent sleeping between checks
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Parsed value of the task status endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Done,
    TooLarge,
    /// Anything else, including a missing status; keep polling
    InProgress(Option<String>),
}

impl TaskStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(DONE_STATUS) => TaskStatus::Done,
            Some(TOO_LARGE_STATUS) => TaskStatus::TooLarge,
            other => TaskStatus::InProgress(other.map(str::to_string)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling { attempts: u32 },
    Done { attempts: u32 },
    TooLarge { attempts: u32 },
    TimedOut { attempts: u32 },
}

impl PollState {
    pub fn attempts(self) -> u32 {
        match self {
            PollState::Submitted => 0,
            PollState::Polling { attempts }
            | PollState::Done { attempts }
            | PollState::TooLarge { attempts }
            | PollState::TimedOut { attempts } => attempts,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollState::Done { .. } | PollState::TooLarge { .. } | PollState::TimedOut { .. }
        )
    }

    /// Whether the next status check must wait out the poll interval first
    pub fn needs_delay(self) -> bool {
        matches!(self, PollState::Polling { .. })
    }

    /// Apply one observed status. Terminal states absorb further observations.
    pub fn observe(self, status: &TaskStatus, policy: &PollPolicy) -> PollState {
        if self.is_terminal() {
            return self;
        }

        let attempts = self.attempts() + 1;
        match status {
            TaskStatus::Done => PollState::Done { attempts },
            TaskStatus::TooLarge => PollState::TooLarge { attempts },
            TaskStatus::InProgress(_) if attempts >= policy.max_attempts => {
                PollState::TimedOut { attempts }
            }
            TaskStatus::InProgress(_) => PollState::Polling { attempts },
        }
    }
}
