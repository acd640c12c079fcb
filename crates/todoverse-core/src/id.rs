use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Opaque identifier of a todo.
///
/// Locally created todos receive a UUID v7 string; remote backends may hand out
/// identifiers of any shape (e.g. database object ids), so the value is kept as text.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    #[must_use]
    /// Generate a fresh todo identifier.
    pub fn new() -> Self {
        // UUID version 7 is time-ordered and never repeats, so deleted ids are not reused.
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TodoId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TodoId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Error returned when parsing a blank identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("todo id must not be blank")]
pub struct BlankIdError;

impl FromStr for TodoId {
    type Err = BlankIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BlankIdError);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todo_id_uses_uuid_v7() {
        let id = TodoId::new();
        let uuid = Uuid::parse_str(id.as_str()).unwrap_or_else(|err| panic!("must be a uuid: {err}"));
        assert_eq!(uuid.get_version_num(), 7);
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(TodoId::new(), TodoId::new());
    }

    #[test]
    fn parse_accepts_foreign_ids_and_rejects_blank() {
        let parsed: TodoId = " 65f0c1d2e3a4b5c6d7e8f901 "
            .parse()
            .unwrap_or_else(|err| panic!("must parse: {err}"));
        assert_eq!(parsed.as_str(), "65f0c1d2e3a4b5c6d7e8f901");
        assert_eq!("   ".parse::<TodoId>(), Err(BlankIdError));
    }
}
