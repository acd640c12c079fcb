//! Dashboard figures derived from the whole collection.
//!
//! Day boundaries follow the UTC offset of the `now` timestamp handed to
//! [`Dashboard::build`], so callers decide what "today" means.

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};

use crate::stats::{TodoStats, all_tags};
use crate::todo::{Priority, Todo};

/// Number of days covered by the completion trend, ending today.
pub const TREND_DAYS: i64 = 7;
/// Maximum number of entries in [`Dashboard::top_tags`].
pub const TOP_TAG_LIMIT: usize = 5;

/// Todo counts per priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PriorityBreakdown {
    /// High priority todos.
    pub high: usize,
    /// Medium priority todos.
    pub medium: usize,
    /// Low priority todos.
    pub low: usize,
}

impl PriorityBreakdown {
    /// Count for a single priority.
    #[must_use]
    pub const fn count(&self, priority: Priority) -> usize {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    /// Priority with the largest count; ties favour the more important one.
    #[must_use]
    pub fn most_used(&self) -> Option<Priority> {
        if self.high + self.medium + self.low == 0 {
            return None;
        }
        Priority::ALL
            .into_iter()
            .fold(None, |best: Option<Priority>, candidate| match best {
                Some(current) if self.count(current) >= self.count(candidate) => Some(current),
                _ => Some(candidate),
            })
    }
}

/// Completed todos whose last update fell on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCompletion {
    /// Calendar date in the reference offset.
    pub date: Date,
    /// Completed todos last touched that day.
    pub completed: usize,
}

/// How many todos carry a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagUsage {
    /// Tag name.
    pub tag: String,
    /// Number of todos carrying it.
    pub count: usize,
}

/// Aggregated analytics for the dashboard view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Totals and completion rate.
    pub stats: TodoStats,
    /// Priority distribution.
    pub priorities: PriorityBreakdown,
    /// Most common priority, if any todo exists.
    pub most_used_priority: Option<Priority>,
    /// Seven-day completion trend, oldest first.
    pub completion_trend: Vec<DailyCompletion>,
    /// Most used tags, highest count first.
    pub top_tags: Vec<TagUsage>,
    /// Open todos past their deadline.
    pub overdue: usize,
    /// Open todos due on the current day.
    pub due_today: usize,
    /// Todos with any deadline.
    pub with_due_date: usize,
    /// Distinct tags across the collection.
    pub tags_in_use: usize,
}

impl Dashboard {
    /// Compute every dashboard figure relative to `now`.
    #[must_use]
    pub fn build(todos: &[Todo], now: OffsetDateTime) -> Self {
        let offset = now.offset();
        let today = now.date();
        // Instants that cannot be expressed in the reference offset fall on no day.
        let local_date = |at: OffsetDateTime| at.checked_to_offset(offset).map(OffsetDateTime::date);

        let mut priorities = PriorityBreakdown::default();
        for todo in todos {
            match todo.priority {
                Priority::High => priorities.high += 1,
                Priority::Medium => priorities.medium += 1,
                Priority::Low => priorities.low += 1,
            }
        }

        let completion_trend = (0..TREND_DAYS)
            .rev()
            .map(|days_ago| {
                let date = today - Duration::days(days_ago);
                let completed = todos
                    .iter()
                    .filter(|todo| todo.completed && local_date(todo.updated_at) == Some(date))
                    .count();
                DailyCompletion { date, completed }
            })
            .collect();

        let tags = all_tags(todos);
        let mut top_tags: Vec<TagUsage> = tags
            .iter()
            .map(|tag| TagUsage {
                tag: tag.clone(),
                count: todos.iter().filter(|todo| todo.has_tag(tag)).count(),
            })
            .collect();
        top_tags.sort_by(|a, b| b.count.cmp(&a.count));
        top_tags.truncate(TOP_TAG_LIMIT);

        let open_due = || {
            todos
                .iter()
                .filter(|todo| !todo.completed)
                .filter_map(|todo| todo.due_date)
        };
        let overdue = open_due().filter(|due| *due < now).count();
        let due_today = open_due()
            .filter(|due| local_date(*due) == Some(today))
            .count();

        Self {
            stats: TodoStats::from_todos(todos),
            most_used_priority: priorities.most_used(),
            priorities,
            completion_trend,
            top_tags,
            overdue,
            due_today,
            with_due_date: todos.iter().filter(|todo| todo.due_date.is_some()).count(),
            tags_in_use: tags.len(),
        }
    }
}
