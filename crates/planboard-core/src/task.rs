use std::fmt;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Todo,
    InProgress,
    Completed,
}

impl Status {
    pub fn from_str_loose(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "todo" => Ok(Self::Todo),
            "in-progress" | "in_progress" | "inprogress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Low,
    Medium,
    High,
}

impl Difficulty {
    pub fn from_str_loose(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Self::Low),
            "medium" | "med" | "m" => Ok(Self::Medium),
            "high" | "h" => Ok(Self::High),
            other => Err(anyhow!("unknown difficulty: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub status: Status,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}

impl Task {
    pub fn from_new(id: String, new: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new.title,
            description: new.description,
            status: new.status,
            created_at: now,
            start_date: new.start_date,
            due_date: new.due_date,
            difficulty: new.difficulty,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == Status::Completed
    }
}

/// Create payload. The store assigns `id` and `createdAt`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Status,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            status: Status::Todo,
            start_date: None,
            due_date: None,
            difficulty: None,
        }
    }
}

/// Partial update. The outer `Option` means "leave untouched"; for the
/// optional fields an inner `None` clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub start_date: Option<Option<NaiveDate>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub due_date: Option<Option<NaiveDate>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub difficulty: Option<Option<Difficulty>>,
}

/// A key that is present maps to `Some`, so an explicit `null` becomes
/// `Some(None)`. Absent keys fall back to `default` and stay `None`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(start_date) = self.start_date {
            task.start_date = start_date;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(difficulty) = self.difficulty {
            task.difficulty = difficulty;
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,

    #[error("due date {due} is before start date {start}")]
    DueBeforeStart { start: NaiveDate, due: NaiveDate },
}

fn check_fields(
    title: &str,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if let (Some(start), Some(due)) = (start_date, due_date)
        && due < start
    {
        return Err(ValidationError::DueBeforeStart { start, due });
    }
    Ok(())
}

pub fn validate_new_task(new: &NewTask) -> Result<(), ValidationError> {
    check_fields(&new.title, new.start_date, new.due_date)
}

/// Validates the record `patch` would produce when applied to `current`.
pub fn validate_patched(current: &Task, patch: &TaskPatch) -> Result<(), ValidationError> {
    let mut merged = current.clone();
    patch.apply(&mut merged);
    check_fields(&merged.title, merged.start_date, merged.due_date)
}
