//! Derived views over a todo collection: status filter, search, tag selection, and sort.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use crate::text_matcher::TextMatcher;
use crate::todo::{Todo, UnknownVariant};

/// Completion-state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    /// Keep everything.
    #[default]
    All,
    /// Keep only open todos.
    Active,
    /// Keep only finished todos.
    Completed,
}

impl StatusFilter {
    /// Whether a todo passes this filter.
    #[must_use]
    pub const fn accepts(self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::Active => !todo.completed,
            Self::Completed => todo.completed,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "active" | "open" => Ok(Self::Active),
            "completed" | "done" => Ok(Self::Completed),
            _ => Err(UnknownVariant::new("status filter", s)),
        }
    }
}

/// Field the visible list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    /// Creation timestamp.
    #[default]
    CreatedAt,
    /// Deadline; undated todos always go last.
    DueDate,
    /// Priority rank, high before low at base.
    Priority,
    /// Title text.
    Title,
}

impl SortKey {
    fn base(self, a: &Todo, b: &Todo) -> Ordering {
        match self {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::Priority => b.priority.rank().cmp(&a.priority.rank()),
            Self::Title => compare_titles(&a.title, &b.title),
            // Undated handling lives in `compare` because it ignores direction.
            Self::DueDate => a.due_date.cmp(&b.due_date),
        }
    }
}

impl FromStr for SortKey {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "createdat" | "created" => Ok(Self::CreatedAt),
            "duedate" | "due" => Ok(Self::DueDate),
            "priority" => Ok(Self::Priority),
            "title" => Ok(Self::Title),
            _ => Err(UnknownVariant::new("sort key", s)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreatedAt => "createdAt",
            Self::DueDate => "dueDate",
            Self::Priority => "priority",
            Self::Title => "title",
        })
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Base comparator order.
    #[serde(alias = "asc")]
    Ascending,
    /// Reversed base comparator order.
    #[default]
    #[serde(alias = "desc")]
    Descending,
}

impl SortDirection {
    /// Apply the direction to a base comparison.
    #[must_use]
    pub const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

impl FromStr for SortDirection {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(UnknownVariant::new("sort direction", s)),
        }
    }
}

/// Transient parameters controlling which todos are visible and in what order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewParams {
    /// Completion-state filter.
    #[serde(default)]
    pub status: StatusFilter,
    /// Free-text query; empty matches everything.
    #[serde(default)]
    pub search: String,
    /// Selected tags (logical OR); empty matches everything.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Sort field.
    #[serde(default)]
    pub sort: SortKey,
    /// Sort direction.
    #[serde(default)]
    pub direction: SortDirection,
}

impl ViewParams {
    /// Set the status filter.
    #[must_use]
    pub const fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// Set the search query.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    /// Replace the selected tags.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set sort key and direction.
    #[must_use]
    pub const fn with_sort(mut self, sort: SortKey, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    /// Whether a todo passes the status, search, and tag stages.
    #[must_use]
    pub fn matches(&self, todo: &Todo) -> bool {
        let matcher = TextMatcher::new(&self.search);
        self.matches_with(matcher.as_ref(), todo)
    }

    fn matches_with(&self, matcher: Option<&TextMatcher>, todo: &Todo) -> bool {
        self.status.accepts(todo)
            && matcher.is_none_or(|matcher| matcher.matches(todo))
            && (self.tags.is_empty() || todo.tags.iter().any(|tag| self.tags.contains(tag)))
    }

    /// Ordering of two todos under the current sort settings.
    #[must_use]
    pub fn compare(&self, a: &Todo, b: &Todo) -> Ordering {
        if self.sort == SortKey::DueDate {
            match (a.due_date, b.due_date) {
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => return Ordering::Equal,
                (Some(_), Some(_)) => {}
            }
        }
        self.direction.apply(self.sort.base(a, b))
    }
}

/// Produce the visible, sorted subset of `todos`. The input is never modified.
#[must_use]
pub fn project(todos: &[Todo], params: &ViewParams) -> Vec<Todo> {
    let matcher = TextMatcher::new(&params.search);
    let mut visible: Vec<Todo> = todos
        .iter()
        .filter(|todo| params.matches_with(matcher.as_ref(), todo))
        .cloned()
        .collect();
    // `sort_by` is stable, so equal keys keep collection order.
    visible.sort_by(|a, b| params.compare(a, b));
    visible
}

fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
