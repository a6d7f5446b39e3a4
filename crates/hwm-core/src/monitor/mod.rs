pub mod engine;
pub mod error;
pub mod event;
pub mod state;
pub mod status;
pub mod tracker;
pub mod validate;

pub use engine::{PollOutcome, PollReport, Poller};
pub use error::{FailureKind, FailureRing, PollError, PollFailure};
pub use event::{ChangeRing, StatusChange};
pub use state::{PollCursor, PollState};
pub use status::{Homework, HomeworkStatus};
pub use tracker::{StatusTracker, Transition};
pub use validate::validate;
