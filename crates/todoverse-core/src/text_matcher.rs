use crate::todo::Todo;

/// Case-insensitive substring matcher for todo fields.
pub struct TextMatcher {
    needle: String,
}

impl TextMatcher {
    /// Normalize a query string into a matcher. Returns `None` for empty inputs.
    ///
    /// The query is not trimmed: a search for `" milk"` only matches text containing the
    /// leading space.
    #[must_use]
    pub fn new(query: &str) -> Option<Self> {
        if query.is_empty() {
            return None;
        }
        Some(Self {
            needle: query.to_lowercase(),
        })
    }

    /// Determine whether the title, description, or any tag contains the query.
    #[must_use]
    pub fn matches(&self, todo: &Todo) -> bool {
        self.matches_field(&todo.title)
            || self.matches_field(&todo.description)
            || todo.tags.iter().any(|tag| self.matches_field(tag))
    }

    fn matches_field(&self, value: &str) -> bool {
        value.to_lowercase().contains(&self.needle)
    }
}
