use std::io::Write;

use anyhow::Result;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use todoverse_core::{Dashboard, Todo, TodoStats};

pub fn todo_table<W: Write>(out: &mut W, todos: &[Todo]) -> Result<()> {
    writeln!(out, "# | ID | Done | Priority | Title | Tags | Due")?;
    writeln!(out, "- | -- | ---- | -------- | ----- | ---- | ---")?;

    for todo in todos {
        let done = if todo.completed { "[x]" } else { "[ ]" };
        let tags = if todo.tags.is_empty() {
            "-".to_owned()
        } else {
            todo.tags.join(", ")
        };
        let due = todo
            .due_date
            .map(format_timestamp)
            .transpose()?
            .unwrap_or_else(|| "-".to_owned());
        writeln!(
            out,
            "{} | {} | {done} | {} | {} | {tags} | {due}",
            todo.order, todo.id, todo.priority, todo.title
        )?;
    }
    Ok(())
}

pub fn stats<W: Write>(out: &mut W, stats: &TodoStats) -> Result<()> {
    writeln!(
        out,
        "Total: {}  Completed: {}  Active: {}  Completion: {}%",
        stats.total, stats.completed, stats.active, stats.completion_rate
    )?;
    Ok(())
}

pub fn dashboard<W: Write>(out: &mut W, dashboard: &Dashboard) -> Result<()> {
    stats(out, &dashboard.stats)?;

    let breakdown = &dashboard.priorities;
    let most_used = dashboard
        .most_used_priority
        .map_or_else(|| "-".to_owned(), |priority| priority.to_string());
    writeln!(
        out,
        "Priority: high {}, medium {}, low {} (most used: {most_used})",
        breakdown.high, breakdown.medium, breakdown.low
    )?;
    writeln!(
        out,
        "Deadlines: {} overdue, {} due today, {} with a due date",
        dashboard.overdue, dashboard.due_today, dashboard.with_due_date
    )?;

    writeln!(out, "Completed per day:")?;
    for day in &dashboard.completion_trend {
        writeln!(out, "  {}  {}", day.date, day.completed)?;
    }

    writeln!(out, "Top tags ({} in use):", dashboard.tags_in_use)?;
    if dashboard.top_tags.is_empty() {
        writeln!(out, "  -")?;
    }
    for usage in &dashboard.top_tags {
        writeln!(out, "  {}  {}", usage.tag, usage.count)?;
    }
    Ok(())
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String> {
    Ok(timestamp.format(&Rfc3339)?)
}
