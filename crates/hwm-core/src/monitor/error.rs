use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::client::FetchError;

/// Everything that can fault a single poll cycle.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Response field '{field}' has wrong type: expected {expected}, got {found}")]
    SchemaType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Response does not contain key '{0}'")]
    MissingKey(&'static str),
    #[error("Homework is missing field '{0}'")]
    MissingField(&'static str),
    #[error("Unknown homework status '{0}'")]
    UnknownStatus(String),
}

impl PollError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch(FetchError::Endpoint { .. }) => FailureKind::Endpoint,
            Self::Fetch(_) => FailureKind::Transport,
            Self::SchemaType { .. } => FailureKind::SchemaType,
            Self::MissingKey(_) => FailureKind::MissingKey,
            Self::MissingField(_) => FailureKind::MissingField,
            Self::UnknownStatus(_) => FailureKind::UnknownStatus,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Fetch(e) => e.status_code(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Endpoint,
    Transport,
    SchemaType,
    MissingKey,
    MissingField,
    UnknownStatus,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint => write!(f, "Endpoint"),
            Self::Transport => write!(f, "Transport"),
            Self::SchemaType => write!(f, "Schema Type"),
            Self::MissingKey => write!(f, "Missing Key"),
            Self::MissingField => write!(f, "Missing Field"),
            Self::UnknownStatus => write!(f, "Unknown Status"),
        }
    }
}

/// Record of a faulted poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollFailure {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: FailureKind,
    pub details: String,
    pub cursor: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl PollFailure {
    pub fn from_error(error: &PollError, cursor: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind: error.kind(),
            details: error.to_string(),
            cursor,
            status_code: error.status_code(),
        }
    }
}

/// Fixed-capacity circular buffer for recent failures. Evicts oldest when full.
#[derive(Debug, Clone)]
pub struct FailureRing {
    buffer: VecDeque<PollFailure>,
    capacity: usize,
}

impl FailureRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, failure: PollFailure) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(failure);
    }

    /// Newest first.
    pub fn list(&self) -> Vec<PollFailure> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_failure(key: &'static str) -> PollFailure {
        PollFailure::from_error(&PollError::MissingKey(key), 1000)
    }

    #[test]
    fn kind_classifies_fetch_errors() {
        let endpoint = PollError::from(FetchError::Endpoint {
            url: "http://x".into(),
            status: 500,
        });
        assert_eq!(endpoint.kind(), FailureKind::Endpoint);
        assert_eq!(endpoint.status_code(), Some(500));

        let timeout = PollError::from(FetchError::Timeout { url: "http://x".into() });
        assert_eq!(timeout.kind(), FailureKind::Transport);
        assert_eq!(timeout.status_code(), None);
    }

    #[test]
    fn failure_record_carries_details() {
        let f = PollFailure::from_error(
            &PollError::SchemaType {
                field: "homeworks",
                expected: "array",
                found: "string",
            },
            42,
        );
        assert_eq!(f.kind, FailureKind::SchemaType);
        assert_eq!(f.cursor, 42);
        assert!(f.details.contains("homeworks"));
        assert!(f.status_code.is_none());
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let mut ring = FailureRing::new(2);
        ring.push(make_failure("a"));
        ring.push(make_failure("b"));
        ring.push(make_failure("c"));
        assert_eq!(ring.len(), 2);
        let list = ring.list();
        assert!(list[0].details.contains("'c'"));
        assert!(list[1].details.contains("'b'"));
    }

    #[test]
    fn kind_display() {
        assert_eq!(FailureKind::MissingKey.to_string(), "Missing Key");
        assert_eq!(FailureKind::Endpoint.to_string(), "Endpoint");
    }
}
