use std::collections::HashMap;

use serde_json::Value;

use super::error::PollError;
use super::status::{Homework, HomeworkStatus};
use super::validate::type_name;

pub const NAME_FIELD: &str = "homework_name";
pub const STATUS_FIELD: &str = "status";

/// A detected change together with the status it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub homework: Homework,
    pub previous: Option<HomeworkStatus>,
}

/// Last-seen status per homework name. Entries are never evicted.
#[derive(Debug, Default, Clone)]
pub struct StatusTracker {
    known: HashMap<String, HomeworkStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-item diff. Returns the homework when its status differs from the
    /// recorded one, including the first observation.
    pub fn observe(&mut self, item: &Value) -> Result<Option<Homework>, PollError> {
        let homework = parse_homework(item)?;
        Ok(self.record(homework).map(|t| t.homework))
    }

    /// Diffs a whole payload. Every item is parsed before anything is compared,
    /// so a malformed item leaves the recorded statuses untouched.
    pub fn diff(&mut self, items: &[Value]) -> Result<Vec<Homework>, PollError> {
        Ok(self
            .transitions(items)?
            .into_iter()
            .map(|t| t.homework)
            .collect())
    }

    /// Same as [`diff`](Self::diff) but keeps the replaced status.
    pub fn transitions(&mut self, items: &[Value]) -> Result<Vec<Transition>, PollError> {
        let parsed = items
            .iter()
            .map(parse_homework)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(parsed
            .into_iter()
            .filter_map(|homework| self.record(homework))
            .collect())
    }

    pub fn status_of(&self, name: &str) -> Option<HomeworkStatus> {
        self.known.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    fn record(&mut self, homework: Homework) -> Option<Transition> {
        match self.known.insert(homework.name.clone(), homework.status) {
            Some(previous) if previous == homework.status => None,
            previous => Some(Transition { homework, previous }),
        }
    }
}

pub fn parse_homework(item: &Value) -> Result<Homework, PollError> {
    let name = item
        .get(NAME_FIELD)
        .and_then(Value::as_str)
        .ok_or(PollError::MissingField(NAME_FIELD))?;

    let status = match item.get(STATUS_FIELD) {
        None | Some(Value::Null) => return Err(PollError::MissingField(STATUS_FIELD)),
        Some(Value::String(s)) => s
            .parse::<HomeworkStatus>()
            .map_err(|unknown| PollError::UnknownStatus(unknown.0))?,
        Some(other) => return Err(PollError::UnknownStatus(format!("<{}>", type_name(other)))),
    };

    Ok(Homework::new(name, status))
}
