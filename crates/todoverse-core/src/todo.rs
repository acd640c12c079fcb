use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;
use time::OffsetDateTime;

use crate::id::TodoId;

/// Importance level of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Regular importance.
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// All priorities ordered from most to least important.
    pub const ALL: [Self; 3] = [Self::High, Self::Medium, Self::Low];

    /// Numeric rank used for sorting (high=3, medium=2, low=1).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Lower-case representation used in configuration and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Self::High),
            "medium" | "med" | "m" => Ok(Self::Medium),
            "low" | "l" => Ok(Self::Low),
            _ => Err(UnknownVariant::new("priority", s)),
        }
    }
}

/// Error returned when a user-facing token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the parsed field.
    pub kind: &'static str,
    /// Raw input as given.
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Input validation failures raised before a todo enters the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Title is empty or whitespace only.
    #[error("title is required")]
    EmptyTitle,
}

/// A single task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    /// Stable identity, assigned at creation.
    pub id: TodoId,
    /// Short summary (never empty).
    pub title: String,
    /// Free-form details, possibly empty.
    #[serde(default)]
    pub description: String,
    /// Completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Importance level.
    #[serde(default)]
    pub priority: Priority,
    /// Tags in display order, without duplicates.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Timestamp of the latest mutation.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Optional deadline.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub due_date: Option<OffsetDateTime>,
    /// Manual position within the full collection.
    #[serde(default)]
    pub order: usize,
}

impl Todo {
    /// Build a record from creation input.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyTitle`] when the title is blank.
    pub fn create(
        id: TodoId,
        input: NewTodo,
        now: OffsetDateTime,
        order: usize,
    ) -> Result<Self, ValidationError> {
        let NewTodo {
            title,
            description,
            completed,
            priority,
            tags,
            due_date,
        } = input;
        let title = validate_title(&title)?;
        Ok(Self {
            id,
            title,
            description: description.trim().to_owned(),
            completed,
            priority,
            tags: normalize_tags(tags),
            created_at: now,
            updated_at: now,
            due_date,
            order,
        })
    }

    /// Merge a patch into this record and refresh `updated_at`.
    ///
    /// Validation happens before any field is touched, so a rejected patch leaves the
    /// record unchanged.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyTitle`] when the patch sets a blank title.
    pub fn apply(&mut self, patch: TodoPatch, now: OffsetDateTime) -> Result<(), ValidationError> {
        let TodoPatch {
            title,
            description,
            completed,
            priority,
            tags,
            due_date,
        } = patch;
        let title = title.as_deref().map(validate_title).transpose()?;

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description.trim().to_owned();
        }
        if let Some(completed) = completed {
            self.completed = completed;
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(tags) = tags {
            self.tags = normalize_tags(tags);
        }
        match due_date {
            Some(DueDatePatch::Set(due)) => self.due_date = Some(due),
            Some(DueDatePatch::Clear) => self.due_date = None,
            None => {}
        }
        self.touch(now);
        Ok(())
    }

    /// Flip the completion flag and refresh `updated_at`.
    pub fn toggle(&mut self, now: OffsetDateTime) {
        self.completed = !self.completed;
        self.touch(now);
    }

    /// Whether the record carries the given tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now.max(self.created_at);
    }
}

/// Creation input: everything except id, timestamps and order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    /// Short summary.
    pub title: String,
    /// Free-form details.
    #[serde(default)]
    pub description: String,
    /// Initial completion flag.
    #[serde(default)]
    pub completed: bool,
    /// Importance level.
    #[serde(default)]
    pub priority: Priority,
    /// Tags to attach.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional deadline.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub due_date: Option<OffsetDateTime>,
}

impl NewTodo {
    /// Check the input without building a record.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyTitle`] when the title is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title).map(drop)
    }

    /// Start an input with the given title and defaults elsewhere.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the tag list.
    #[must_use]
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the due date.
    #[must_use]
    pub const fn due(mut self, due_date: OffsetDateTime) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Mark the todo as already completed.
    #[must_use]
    pub const fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

/// Due date modification carried by a [`TodoPatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DueDatePatch {
    /// Set or replace the deadline.
    Set(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    /// Remove the deadline.
    Clear,
}

/// Partial update; `None` fields are left untouched.
///
/// Identity and timestamps are intentionally absent so a patch cannot rewrite them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoPatch {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    /// New priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Replacement tag list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Deadline change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DueDatePatch>,
}

impl TodoPatch {
    /// Check the patch without applying it.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyTitle`] when the patch sets a blank title.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.title.as_deref().map_or(Ok(()), |title| validate_title(title).map(drop))
    }

    /// Returns true when the patch would not change any field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.completed.is_none()
            && self.priority.is_none()
            && self.tags.is_none()
            && self.due_date.is_none()
    }
}

fn validate_title(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed.to_owned())
}

/// Trim tags, drop blanks, and remove duplicates while keeping first occurrences in place.
#[must_use]
pub fn normalize_tags<I, T>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() || normalized.iter().any(|seen| seen == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_owned());
    }
    normalized
}
