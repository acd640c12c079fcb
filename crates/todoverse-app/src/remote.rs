//! Contract for the backing todo service plus an in-process implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use todoverse_core::{NewTodo, Todo, TodoId, TodoPatch};
use tokio::sync::Mutex;

use crate::store::{Clock, SystemClock};

/// Owner scope for remote queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap an owner identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure reported by a remote backend. Never retried by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Human-readable reason.
    pub message: String,
}

impl RemoteError {
    /// Build an error from any displayable reason.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Async backend holding the authoritative copy of each owner's todos.
#[allow(async_fn_in_trait)]
pub trait RemoteSync: Send + Sync {
    /// Persist a new todo and return the stored record with its server-assigned id.
    ///
    /// # Errors
    /// Returns [`RemoteError`] when the backend rejects or cannot process the call.
    async fn create(&self, input: &NewTodo, owner: &OwnerId) -> Result<Todo, RemoteError>;

    /// Apply a patch and return the stored record.
    ///
    /// # Errors
    /// Returns [`RemoteError`] when the backend rejects or cannot process the call.
    async fn update(&self, id: &TodoId, patch: &TodoPatch) -> Result<Todo, RemoteError>;

    /// Delete a todo.
    ///
    /// # Errors
    /// Returns [`RemoteError`] when the backend rejects or cannot process the call.
    async fn delete(&self, id: &TodoId) -> Result<(), RemoteError>;

    /// Flip the completion flag and return the stored record.
    ///
    /// # Errors
    /// Returns [`RemoteError`] when the backend rejects or cannot process the call.
    async fn toggle(&self, id: &TodoId) -> Result<Todo, RemoteError>;

    /// List every todo belonging to `owner`.
    ///
    /// # Errors
    /// Returns [`RemoteError`] when the backend rejects or cannot process the call.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Todo>, RemoteError>;
}

impl<R: RemoteSync> RemoteSync for Arc<R> {
    async fn create(&self, input: &NewTodo, owner: &OwnerId) -> Result<Todo, RemoteError> {
        (**self).create(input, owner).await
    }

    async fn update(&self, id: &TodoId, patch: &TodoPatch) -> Result<Todo, RemoteError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: &TodoId) -> Result<(), RemoteError> {
        (**self).delete(id).await
    }

    async fn toggle(&self, id: &TodoId) -> Result<Todo, RemoteError> {
        (**self).toggle(id).await
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Todo>, RemoteError> {
        (**self).list(owner).await
    }
}

#[derive(Debug, Default)]
struct RemoteState {
    todos: HashMap<OwnerId, Vec<Todo>>,
    next_id: u64,
    failure: Option<String>,
    calls: usize,
}

impl RemoteState {
    fn check(&mut self) -> Result<(), RemoteError> {
        self.calls += 1;
        self.failure.clone().map_or(Ok(()), |message| Err(RemoteError::new(message)))
    }

    fn find_mut(&mut self, id: &TodoId) -> Result<&mut Todo, RemoteError> {
        self.todos
            .values_mut()
            .flat_map(|todos| todos.iter_mut())
            .find(|todo| &todo.id == id)
            .ok_or_else(|| RemoteError::new(format!("todo {id} does not exist")))
    }
}

/// Process-local backend keyed by owner.
///
/// Ids look like `srv-000001`, so tests can tell server-issued ids from provisional ones.
pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRemote").finish_non_exhaustive()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// Empty backend using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Empty backend using a custom clock.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            clock,
        }
    }

    /// Make every following call fail with `message` until [`Self::recover`].
    pub async fn fail_with(&self, message: impl Into<String>) {
        self.state.lock().await.failure = Some(message.into());
    }

    /// Stop injecting failures.
    pub async fn recover(&self) {
        self.state.lock().await.failure = None;
    }

    /// Number of calls received so far, failed ones included.
    pub async fn calls(&self) -> usize {
        self.state.lock().await.calls
    }
}

impl RemoteSync for InMemoryRemote {
    async fn create(&self, input: &NewTodo, owner: &OwnerId) -> Result<Todo, RemoteError> {
        let mut state = self.state.lock().await;
        state.check()?;
        state.next_id += 1;
        let id = TodoId::from(format!("srv-{:06}", state.next_id));
        let owned = state.todos.entry(owner.clone()).or_default();
        let todo = Todo::create(id, input.clone(), self.clock.now(), owned.len())
            .map_err(|err| RemoteError::new(err.to_string()))?;
        owned.push(todo.clone());
        drop(state);
        Ok(todo)
    }

    async fn update(&self, id: &TodoId, patch: &TodoPatch) -> Result<Todo, RemoteError> {
        let mut state = self.state.lock().await;
        state.check()?;
        let now = self.clock.now();
        let todo = state.find_mut(id)?;
        todo.apply(patch.clone(), now)
            .map_err(|err| RemoteError::new(err.to_string()))?;
        Ok(todo.clone())
    }

    async fn delete(&self, id: &TodoId) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.check()?;
        for todos in state.todos.values_mut() {
            if let Some(index) = todos.iter().position(|todo| &todo.id == id) {
                todos.remove(index);
                return Ok(());
            }
        }
        Err(RemoteError::new(format!("todo {id} does not exist")))
    }

    async fn toggle(&self, id: &TodoId) -> Result<Todo, RemoteError> {
        let mut state = self.state.lock().await;
        state.check()?;
        let now = self.clock.now();
        let todo = state.find_mut(id)?;
        todo.toggle(now);
        Ok(todo.clone())
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Todo>, RemoteError> {
        let mut state = self.state.lock().await;
        state.check()?;
        Ok(state.todos.get(owner).cloned().unwrap_or_default())
    }
}
