/// Controller state definitions for tracking a single crawl invocation
///
/// This module defines every state the crawl controller can be in and the
/// transitions allowed between them.
use std::fmt;

/// Represents the current state of the crawl controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    // ===== Initial State =====
    /// Controller has been built but `run` has not been called
    Idle,

    // ===== Live States =====
    /// Controller is working through pages and items
    Running,

    /// Controller is suspended at a cooperative checkpoint
    Paused,

    // ===== Terminal States =====
    /// A stop signal was observed; the job can be resumed later
    Stopped,

    /// The source was exhausted or the page limit was reached
    Completed,

    /// A page-level or checkpoint failure ended the run
    Failed,
}

impl ControllerState {
    /// Returns true if this is a terminal state for the current invocation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// Returns true if the controller still has live work in this state
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns true if moving from this state to `next` is allowed
    ///
    /// `Idle -> Completed` covers a job whose checkpoint was already complete.
    pub fn can_transition_to(&self, next: ControllerState) -> bool {
        use ControllerState::*;

        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Completed)
                | (Running, Paused)
                | (Running, Stopped)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Stopped)
                | (Paused, Failed)
        )
    }

    /// Returns the lowercase name used in logs and status output
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns all possible controller states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Paused,
            Self::Stopped,
            Self::Completed,
            Self::Failed,
        ]
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
