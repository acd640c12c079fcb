use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};
use time::{Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};
use todoverse_app::{TodoStore, ViewConfig};
use todoverse_core::{
    Dashboard, DueDatePatch, NewTodo, SortDirection, TodoId, TodoPatch, TodoStats, all_tags, project,
};

use crate::{Command, OutputFormat};

mod render;

pub fn run<W: Write>(command: Command, store: &mut TodoStore, view: ViewConfig, out: &mut W) -> Result<()> {
    match command {
        Command::Add {
            title,
            description,
            priority,
            tags,
            due,
        } => {
            let mut input = NewTodo::new(title).tags(tags);
            if let Some(description) = description {
                input = input.description(description);
            }
            if let Some(priority) = priority {
                input = input.priority(priority);
            }
            if let Some(due) = due {
                input = input.due(parse_due(&due)?);
            }
            let todo = store.add(input)?;
            writeln!(out, "created todo: {} ({})", todo.id, todo.title)?;
        }
        Command::Edit {
            id,
            title,
            description,
            priority,
            tags,
            clear_tags,
            due,
            clear_due,
        } => {
            let id = resolve_id(store, &id)?;
            let due_date = match (due, clear_due) {
                (Some(raw), _) => Some(DueDatePatch::Set(parse_due(&raw)?)),
                (None, true) => Some(DueDatePatch::Clear),
                (None, false) => None,
            };
            let tags = if clear_tags {
                Some(Vec::new())
            } else {
                Some(tags).filter(|tags| !tags.is_empty())
            };
            let patch = TodoPatch {
                title,
                description,
                completed: None,
                priority,
                tags,
                due_date,
            };
            if patch.is_empty() {
                bail!("nothing to change; pass at least one field to edit");
            }
            let todo = store.update(&id, patch)?;
            writeln!(out, "updated todo: {} ({})", todo.id, todo.title)?;
        }
        Command::Toggle { id } => {
            let id = resolve_id(store, &id)?;
            let todo = store.toggle_completed(&id)?;
            let verb = if todo.completed { "completed" } else { "reopened" };
            writeln!(out, "{verb} todo: {} ({})", todo.id, todo.title)?;
        }
        Command::Rm { id } => {
            let id = resolve_id(store, &id)?;
            let todo = store.remove(&id)?;
            writeln!(out, "removed todo: {} ({})", todo.id, todo.title)?;
        }
        Command::Mv { from, to } => {
            store.reorder(from, to)?;
            writeln!(out, "moved todo from position {from} to {to}")?;
        }
        Command::Ls {
            filter,
            search,
            tags,
            sort,
            asc,
            desc,
            format,
        } => {
            let mut params = view.to_params();
            if let Some(filter) = filter {
                params = params.with_status(filter);
            }
            if let Some(search) = search {
                params = params.with_search(search);
            }
            let direction = if asc {
                SortDirection::Ascending
            } else if desc {
                SortDirection::Descending
            } else {
                params.direction
            };
            let sort = sort.unwrap_or(params.sort);
            let params = params.with_tags(tags).with_sort(sort, direction);

            let todos = project(store.todos(), &params);
            match format {
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&todos)?)?,
                OutputFormat::Table if todos.is_empty() => {
                    if store.is_empty() {
                        writeln!(out, "No todos yet")?;
                    } else {
                        writeln!(out, "No todos matched the provided filters")?;
                    }
                }
                OutputFormat::Table => render::todo_table(out, &todos)?,
            }
        }
        Command::Stats { format } => {
            let stats = TodoStats::from_todos(store.todos());
            match format {
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?,
                OutputFormat::Table => render::stats(out, &stats)?,
            }
        }
        Command::Tags => {
            for tag in all_tags(store.todos()) {
                writeln!(out, "{tag}")?;
            }
        }
        Command::Dashboard { format } => {
            let dashboard = Dashboard::build(store.todos(), store.now());
            match format {
                OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&dashboard)?)?,
                OutputFormat::Table => render::dashboard(out, &dashboard)?,
            }
        }
    }

    Ok(())
}

/// Match an exact id first, then a unique prefix.
fn resolve_id(store: &TodoStore, raw: &str) -> Result<TodoId> {
    let id: TodoId = raw.parse().with_context(|| format!("Invalid todo id: {raw:?}"))?;
    if store.get(&id).is_some() {
        return Ok(id);
    }
    let mut matches = store
        .todos()
        .iter()
        .filter(|todo| todo.id.as_str().starts_with(id.as_str()));
    match (matches.next(), matches.next()) {
        (Some(todo), None) => Ok(todo.id.clone()),
        (None, _) => Err(anyhow!("no todo matches id {id}")),
        (Some(_), Some(_)) => Err(anyhow!("id prefix {id} is ambiguous")),
    }
}

/// Accept RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_due(raw: &str) -> Result<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(timestamp) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(timestamp);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .with_context(|| format!("Invalid due date {raw:?}; expected RFC 3339 or YYYY-MM-DD"))
}
