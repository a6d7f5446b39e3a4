use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{Homework, HomeworkStatus};

/// A detected status change and whether its notification went out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<HomeworkStatus>,
    pub current: HomeworkStatus,
    pub delivered: bool,
}

impl StatusChange {
    pub fn new(homework: &Homework, previous: Option<HomeworkStatus>, delivered: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            name: homework.name.clone(),
            previous,
            current: homework.status,
            delivered,
        }
    }
}

/// Fixed-capacity circular buffer for recent changes. Evicts oldest when full.
#[derive(Debug, Clone)]
pub struct ChangeRing {
    buffer: VecDeque<StatusChange>,
    capacity: usize,
}

impl ChangeRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, change: StatusChange) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(change);
    }

    pub fn list(&self) -> Vec<StatusChange> {
        self.buffer.iter().rev().cloned().collect()
    }

    pub fn list_chronological(&self) -> Vec<StatusChange> {
        self.buffer.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
