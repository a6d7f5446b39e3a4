use serde::{Deserialize, Serialize};

/// Phases of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Fetching,
    Validating,
    Diffing,
    Notifying,
    Sleeping,
    Faulted,
}

impl PollState {
    pub fn can_transition_to(self, target: PollState) -> bool {
        matches!(
            (self, target),
            (PollState::Idle, PollState::Fetching)
                | (PollState::Fetching, PollState::Validating)
                | (PollState::Validating, PollState::Diffing)
                | (PollState::Diffing, PollState::Notifying)
                | (PollState::Notifying, PollState::Sleeping)
                | (PollState::Sleeping, PollState::Idle)
                | (PollState::Fetching, PollState::Faulted)
                | (PollState::Validating, PollState::Faulted)
                | (PollState::Diffing, PollState::Faulted)
                | (PollState::Notifying, PollState::Faulted)
                | (PollState::Faulted, PollState::Sleeping)
        )
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Fetching => write!(f, "fetching"),
            Self::Validating => write!(f, "validating"),
            Self::Diffing => write!(f, "diffing"),
            Self::Notifying => write!(f, "notifying"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Faulted => write!(f, "faulted"),
        }
    }
}

/// Lower bound (Unix seconds) of the next fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollCursor(i64);

impl PollCursor {
    pub fn new(timestamp: i64) -> Self {
        Self(timestamp)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// Moves the window start to `now`. Never moves backwards.
    pub fn advance_to(&mut self, now: i64) {
        self.0 = self.0.max(now);
    }
}
