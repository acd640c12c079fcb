//! Domain types and derived views for todoverse.
//!
//! Everything here is pure: records, the filter/search/sort projection, aggregate
//! statistics, and dashboard analytics. Mutation and persistence live in `todoverse-app`.

/// Dashboard analytics.
pub mod analytics;
/// Identifier types.
pub mod id;
/// Aggregate counters and tag enumeration.
pub mod stats;
/// Case-insensitive search.
pub mod text_matcher;
/// Task records and their inputs.
pub mod todo;
/// Filtered and sorted projections.
pub mod view;

pub use analytics::{Dashboard, DailyCompletion, PriorityBreakdown, TagUsage};
pub use id::TodoId;
pub use stats::{TodoStats, all_tags};
pub use text_matcher::TextMatcher;
pub use todo::{
    DueDatePatch, NewTodo, Priority, Todo, TodoPatch, UnknownVariant, ValidationError, normalize_tags,
};
pub use view::{SortDirection, SortKey, StatusFilter, ViewParams, project};
