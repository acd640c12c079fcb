//! Authoritative in-memory todo collection with change notifications.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use todoverse_core::{NewTodo, Todo, TodoId, TodoPatch, ValidationError};
use tracing::debug;

/// Source of "now" for timestamps.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Errors raised by store mutations. None of them leave the collection modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Input failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// No todo carries the given id.
    #[error("todo not found: {0}")]
    NotFound(TodoId),
    /// A reorder index does not address an existing position.
    #[error("index {index} is out of range for {len} todos")]
    IndexOutOfRange {
        /// Offending index.
        index: usize,
        /// Collection size at the time of the call.
        len: usize,
    },
    /// An ingested collection carries the same id twice.
    #[error("duplicate todo id: {0}")]
    DuplicateId(TodoId),
    /// An ingested record has an empty or whitespace-only title.
    #[error("todo {0} has a blank title")]
    BlankTitle(TodoId),
}

/// Kind of mutation reported to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A todo was appended.
    Added(TodoId),
    /// Fields of a todo changed.
    Updated(TodoId),
    /// Completion flag flipped.
    Toggled(TodoId),
    /// A todo was deleted.
    Removed(TodoId),
    /// A todo moved; `order` was renumbered for the whole collection.
    Reordered {
        /// Previous index.
        from: usize,
        /// New index.
        to: usize,
    },
    /// A provisional record was swapped for its confirmed copy.
    Reconciled {
        /// Id before the swap.
        provisional: TodoId,
        /// Id after the swap.
        confirmed: TodoId,
    },
    /// The whole collection was replaced.
    Replaced,
}

/// Handle returned by [`TodoStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&StoreChange, &[Todo]) + Send + Sync>;

struct Observer {
    id: SubscriptionId,
    callback: Callback,
}

/// Ordered collection of todos. Every successful mutation notifies each observer once,
/// after the collection is consistent again.
pub struct TodoStore {
    todos: Vec<Todo>,
    clock: Arc<dyn Clock>,
    observers: Vec<Observer>,
    next_subscription: u64,
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TodoStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoStore")
            .field("todos", &self.todos)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl TodoStore {
    /// Empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty store using a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            todos: Vec::new(),
            clock,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Store seeded with records from storage or a backend (no notification is sent).
    ///
    /// Records are placed by their `order`, which is renumbered densely, and an
    /// `updated_at` earlier than `created_at` is raised to `created_at`.
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateId`] or [`StoreError::BlankTitle`] for a malformed
    /// collection.
    pub fn load(todos: Vec<Todo>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        Ok(Self {
            todos: checked_collection(todos)?,
            ..Self::with_clock(clock)
        })
    }

    /// Borrow the collection in display order.
    #[must_use]
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    /// Owned copy of the collection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Todo> {
        self.todos.clone()
    }

    /// Look up a todo by id.
    #[must_use]
    pub fn get(&self, id: &TodoId) -> Option<&Todo> {
        self.todos.iter().find(|todo| &todo.id == id)
    }

    /// Number of todos.
    #[must_use]
    pub fn len(&self) -> usize {
        self.todos.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.todos.is_empty()
    }

    /// Current time according to the store's clock.
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Register an observer called after every successful mutation.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreChange, &[Todo]) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push(Observer {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|observer| observer.id != id);
        self.observers.len() != before
    }

    /// Append a new todo with a fresh id, current timestamps and trailing order.
    ///
    /// # Errors
    /// Returns [`StoreError::Invalid`] when the title is blank.
    pub fn add(&mut self, input: NewTodo) -> Result<Todo, StoreError> {
        let todo = Todo::create(TodoId::new(), input, self.clock.now(), self.todos.len())?;
        debug!(id = %todo.id, order = todo.order, "todo added");
        self.todos.push(todo.clone());
        self.notify(&StoreChange::Added(todo.id.clone()));
        Ok(todo)
    }

    /// Merge `patch` into the todo and refresh `updated_at`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for unknown ids and [`StoreError::Invalid`] when
    /// the patch sets a blank title.
    pub fn update(&mut self, id: &TodoId, patch: TodoPatch) -> Result<Todo, StoreError> {
        let now = self.clock.now();
        let todo = self.find_mut(id)?;
        todo.apply(patch, now)?;
        let updated = todo.clone();
        debug!(id = %updated.id, "todo updated");
        self.notify(&StoreChange::Updated(updated.id.clone()));
        Ok(updated)
    }

    /// Delete the todo and return it.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for unknown ids.
    pub fn remove(&mut self, id: &TodoId) -> Result<Todo, StoreError> {
        let index = self.position(id)?;
        let removed = self.todos.remove(index);
        debug!(id = %removed.id, "todo removed");
        self.notify(&StoreChange::Removed(removed.id.clone()));
        Ok(removed)
    }

    /// Flip the completion flag and refresh `updated_at`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for unknown ids.
    pub fn toggle_completed(&mut self, id: &TodoId) -> Result<Todo, StoreError> {
        let now = self.clock.now();
        let todo = self.find_mut(id)?;
        todo.toggle(now);
        let toggled = todo.clone();
        debug!(id = %toggled.id, completed = toggled.completed, "todo toggled");
        self.notify(&StoreChange::Toggled(toggled.id.clone()));
        Ok(toggled)
    }

    /// Move the todo at `from` to `to` and renumber `order` densely from zero.
    ///
    /// Indices address the full collection. Out-of-range indices are rejected rather
    /// than clamped. `updated_at` is left alone.
    ///
    /// # Errors
    /// Returns [`StoreError::IndexOutOfRange`] when either index is not `< len`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        let len = self.todos.len();
        for index in [from, to] {
            if index >= len {
                return Err(StoreError::IndexOutOfRange { index, len });
            }
        }
        let moved = self.todos.remove(from);
        self.todos.insert(to, moved);
        self.renumber();
        debug!(from, to, "todos reordered");
        self.notify(&StoreChange::Reordered { from, to });
        Ok(())
    }

    /// Replace the whole collection, e.g. after listing a backend.
    ///
    /// The incoming records go through the same checks as [`TodoStore::load`].
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateId`] or [`StoreError::BlankTitle`]; the current
    /// collection is kept.
    pub fn replace_all(&mut self, todos: Vec<Todo>) -> Result<(), StoreError> {
        let todos = checked_collection(todos)?;
        self.restore(todos);
        Ok(())
    }

    /// Put back a snapshot taken from this store.
    pub(crate) fn restore(&mut self, snapshot: Vec<Todo>) {
        debug!(count = snapshot.len(), "todo collection replaced");
        self.todos = snapshot;
        self.notify(&StoreChange::Replaced);
    }

    /// Insert a record from an external source, replacing any todo with the same id.
    ///
    /// Existing records keep their position and `order`; new ones are appended.
    pub fn upsert(&mut self, todo: Todo) -> Todo {
        self.upsert_as(todo, StoreChange::Updated)
    }

    /// Like [`TodoStore::upsert`], reporting a replacement to observers as `change`.
    pub fn upsert_as(&mut self, mut todo: Todo, change: impl FnOnce(TodoId) -> StoreChange) -> Todo {
        let change = if let Some(existing) = self.todos.iter_mut().find(|existing| existing.id == todo.id) {
            todo.order = existing.order;
            *existing = todo.clone();
            change(todo.id.clone())
        } else {
            todo.order = self.todos.len();
            self.todos.push(todo.clone());
            StoreChange::Added(todo.id.clone())
        };
        self.notify(&change);
        todo
    }

    /// Swap a provisional record for the confirmed one, keeping position and `order`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the provisional id is gone.
    pub fn reconcile(&mut self, provisional: &TodoId, mut confirmed: Todo) -> Result<Todo, StoreError> {
        let index = self.position(provisional)?;
        confirmed.order = self.todos[index].order;
        self.todos[index] = confirmed.clone();
        self.notify(&StoreChange::Reconciled {
            provisional: provisional.clone(),
            confirmed: confirmed.id.clone(),
        });
        Ok(confirmed)
    }

    fn position(&self, id: &TodoId) -> Result<usize, StoreError> {
        self.todos
            .iter()
            .position(|todo| &todo.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn find_mut(&mut self, id: &TodoId) -> Result<&mut Todo, StoreError> {
        self.todos
            .iter_mut()
            .find(|todo| &todo.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn renumber(&mut self) {
        for (position, todo) in self.todos.iter_mut().enumerate() {
            todo.order = position;
        }
    }

    fn notify(&self, change: &StoreChange) {
        for observer in &self.observers {
            (observer.callback)(change, &self.todos);
        }
    }
}

fn checked_collection(mut todos: Vec<Todo>) -> Result<Vec<Todo>, StoreError> {
    let mut seen = HashSet::with_capacity(todos.len());
    for todo in &todos {
        if todo.title.trim().is_empty() {
            return Err(StoreError::BlankTitle(todo.id.clone()));
        }
        if !seen.insert(&todo.id) {
            return Err(StoreError::DuplicateId(todo.id.clone()));
        }
    }
    todos.sort_by_key(|todo| todo.order);
    for (position, todo) in todos.iter_mut().enumerate() {
        todo.order = position;
        todo.updated_at = todo.updated_at.max(todo.created_at);
    }
    Ok(todos)
}

/// Clock pinned to a settable instant, for deterministic timestamps.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<OffsetDateTime>,
}

impl ManualClock {
    /// Clock starting at `start`.
    #[must_use]
    pub const fn new(start: OffsetDateTime) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: time::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
