use serde::Serialize;
use std::collections::BTreeSet;

use crate::todo::Todo;

/// Aggregate counters over an entire collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoStats {
    /// Number of todos.
    pub total: usize,
    /// Number of completed todos.
    pub completed: usize,
    /// Number of open todos.
    pub active: usize,
    /// Rounded completion percentage in `0..=100`; zero for an empty collection.
    pub completion_rate: u8,
}

impl TodoStats {
    /// Count the given todos. Always pass the unfiltered collection.
    #[must_use]
    pub fn from_todos(todos: &[Todo]) -> Self {
        let total = todos.len();
        let completed = todos.iter().filter(|todo| todo.completed).count();
        Self {
            total,
            completed,
            active: total - completed,
            completion_rate: percentage(completed, total),
        }
    }
}

/// `part / whole * 100`, rounded half up, or zero when `whole` is zero.
#[must_use]
pub fn percentage(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let part = part.min(whole);
    let rounded = (part * 200 + whole) / (whole * 2);
    u8::try_from(rounded).unwrap_or(100)
}

/// Every distinct tag across the collection, sorted lexicographically.
#[must_use]
pub fn all_tags(todos: &[Todo]) -> Vec<String> {
    todos
        .iter()
        .flat_map(|todo| todo.tags.iter())
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect()
}
