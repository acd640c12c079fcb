//! Coordinates the local store with a remote backend.

use std::fmt;

use thiserror::Error;
use time::OffsetDateTime;
use todoverse_core::{
    Dashboard, NewTodo, Todo, TodoId, TodoPatch, TodoStats, ViewParams, all_tags, project,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::remote::{OwnerId, RemoteError, RemoteSync};
use crate::store::{StoreChange, StoreError, SubscriptionId, TodoStore};

/// When the local store is updated relative to the remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncPolicy {
    /// Apply locally first, reconcile with the server's answer, roll back on failure.
    Optimistic,
    /// Apply locally only after the server confirmed the change.
    #[default]
    Confirmed,
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Optimistic => "optimistic",
            Self::Confirmed => "confirmed",
        })
    }
}

/// Errors surfaced by [`TodoService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The local store refused the operation; the remote was not contacted.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The remote call failed; the local store holds its pre-call state.
    #[error("remote {operation} failed: {source}")]
    Remote {
        /// Remote operation name.
        operation: &'static str,
        /// Backend failure.
        #[source]
        source: RemoteError,
    },
}

impl SyncError {
    fn remote(operation: &'static str) -> impl FnOnce(RemoteError) -> Self {
        move |source| Self::Remote { operation, source }
    }
}

/// Todo operations backed by a [`RemoteSync`] implementation.
///
/// The store lock is held across the remote call, so mutations are serialized.
pub struct TodoService<R> {
    store: Mutex<TodoStore>,
    remote: R,
    owner: OwnerId,
    policy: SyncPolicy,
}

impl<R> fmt::Debug for TodoService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TodoService")
            .field("owner", &self.owner)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<R> TodoService<R> {
    /// Wrap an existing store.
    #[must_use]
    pub fn new(store: TodoStore, remote: R, owner: OwnerId, policy: SyncPolicy) -> Self {
        Self {
            store: Mutex::new(store),
            remote,
            owner,
            policy,
        }
    }

    /// Active synchronization policy.
    #[must_use]
    pub const fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Owner whose todos this service manages.
    #[must_use]
    pub const fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Borrow the remote backend.
    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Copy of the full collection in manual order.
    pub async fn snapshot(&self) -> Vec<Todo> {
        self.store.lock().await.snapshot()
    }

    /// Filtered and sorted projection of the collection.
    pub async fn view(&self, params: &ViewParams) -> Vec<Todo> {
        project(self.store.lock().await.todos(), params)
    }

    /// Aggregate counters.
    pub async fn stats(&self) -> TodoStats {
        TodoStats::from_todos(self.store.lock().await.todos())
    }

    /// Sorted distinct tags in use.
    pub async fn tags(&self) -> Vec<String> {
        all_tags(self.store.lock().await.todos())
    }

    /// Analytics relative to `now`.
    pub async fn dashboard(&self, now: OffsetDateTime) -> Dashboard {
        Dashboard::build(self.store.lock().await.todos(), now)
    }

    /// Register a store observer.
    pub async fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreChange, &[Todo]) + Send + Sync + 'static,
    {
        self.store.lock().await.subscribe(callback)
    }

    /// Remove a store observer.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.store.lock().await.unsubscribe(id)
    }

    /// Move a todo within the manual order. Local only; the remote has no ordering call.
    ///
    /// # Errors
    /// Returns [`SyncError::Store`] when an index is out of range.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<(), SyncError> {
        self.store.lock().await.reorder(from, to)?;
        Ok(())
    }

    /// Give back the store, e.g. to persist it on shutdown.
    #[must_use]
    pub fn into_store(self) -> TodoStore {
        self.store.into_inner()
    }
}

impl<R: RemoteSync> TodoService<R> {
    /// Create a todo.
    ///
    /// # Errors
    /// Returns [`SyncError::Store`] for invalid input and [`SyncError::Remote`] when the
    /// backend fails.
    pub async fn add(&self, input: NewTodo) -> Result<Todo, SyncError> {
        input.validate().map_err(StoreError::from)?;
        let mut store = self.store.lock().await;
        match self.policy {
            SyncPolicy::Confirmed => {
                let created = self
                    .remote
                    .create(&input, &self.owner)
                    .await
                    .map_err(SyncError::remote("create"))?;
                debug!(id = %created.id, "remote confirmed create");
                Ok(store.upsert(created))
            }
            SyncPolicy::Optimistic => {
                let before = store.snapshot();
                let provisional = store.add(input.clone())?;
                match self.remote.create(&input, &self.owner).await {
                    Ok(created) => Ok(store.reconcile(&provisional.id, created)?),
                    Err(err) => Err(rollback(&mut store, before, "create", err)),
                }
            }
        }
    }

    /// Apply a partial update.
    ///
    /// # Errors
    /// Returns [`SyncError::Store`] for invalid patches or unknown ids and
    /// [`SyncError::Remote`] when the backend fails.
    pub async fn update(&self, id: &TodoId, patch: TodoPatch) -> Result<Todo, SyncError> {
        patch.validate().map_err(StoreError::from)?;
        let mut store = self.store.lock().await;
        ensure_exists(&store, id)?;
        match self.policy {
            SyncPolicy::Confirmed => {
                let updated = self
                    .remote
                    .update(id, &patch)
                    .await
                    .map_err(SyncError::remote("update"))?;
                Ok(store.upsert(updated))
            }
            SyncPolicy::Optimistic => {
                let before = store.snapshot();
                store.update(id, patch.clone())?;
                match self.remote.update(id, &patch).await {
                    Ok(updated) => Ok(store.upsert(updated)),
                    Err(err) => Err(rollback(&mut store, before, "update", err)),
                }
            }
        }
    }

    /// Delete a todo.
    ///
    /// # Errors
    /// Returns [`SyncError::Store`] for unknown ids and [`SyncError::Remote`] when the
    /// backend fails.
    pub async fn remove(&self, id: &TodoId) -> Result<Todo, SyncError> {
        let mut store = self.store.lock().await;
        ensure_exists(&store, id)?;
        match self.policy {
            SyncPolicy::Confirmed => {
                self.remote
                    .delete(id)
                    .await
                    .map_err(SyncError::remote("delete"))?;
                Ok(store.remove(id)?)
            }
            SyncPolicy::Optimistic => {
                let before = store.snapshot();
                let removed = store.remove(id)?;
                match self.remote.delete(id).await {
                    Ok(()) => Ok(removed),
                    Err(err) => Err(rollback(&mut store, before, "delete", err)),
                }
            }
        }
    }

    /// Flip the completion flag.
    ///
    /// # Errors
    /// Returns [`SyncError::Store`] for unknown ids and [`SyncError::Remote`] when the
    /// backend fails.
    pub async fn toggle(&self, id: &TodoId) -> Result<Todo, SyncError> {
        let mut store = self.store.lock().await;
        ensure_exists(&store, id)?;
        match self.policy {
            SyncPolicy::Confirmed => {
                let toggled = self
                    .remote
                    .toggle(id)
                    .await
                    .map_err(SyncError::remote("toggle"))?;
                Ok(store.upsert_as(toggled, StoreChange::Toggled))
            }
            SyncPolicy::Optimistic => {
                let before = store.snapshot();
                store.toggle_completed(id)?;
                match self.remote.toggle(id).await {
                    Ok(toggled) => Ok(store.upsert_as(toggled, StoreChange::Toggled)),
                    Err(err) => Err(rollback(&mut store, before, "toggle", err)),
                }
            }
        }
    }

    /// Replace the local collection with the owner's remote todos.
    ///
    /// # Errors
    /// Returns [`SyncError::Remote`] when listing fails and [`SyncError::Store`] when the
    /// listed records are malformed; either way the store is left as is.
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        let mut store = self.store.lock().await;
        let todos = self
            .remote
            .list(&self.owner)
            .await
            .map_err(SyncError::remote("list"))?;
        let count = todos.len();
        store.replace_all(todos)?;
        debug!(owner = %self.owner, count, "refreshed from remote");
        Ok(count)
    }
}

fn ensure_exists(store: &TodoStore, id: &TodoId) -> Result<(), StoreError> {
    store
        .get(id)
        .map(drop)
        .ok_or_else(|| StoreError::NotFound(id.clone()))
}

fn rollback(
    store: &mut TodoStore,
    before: Vec<Todo>,
    operation: &'static str,
    source: RemoteError,
) -> SyncError {
    warn!(operation, error = %source, "remote call failed, rolling back local change");
    store.restore(before);
    SyncError::Remote { operation, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex, PoisonError};

    use crate::remote::InMemoryRemote;

    fn service(policy: SyncPolicy) -> TodoService<Arc<InMemoryRemote>> {
        TodoService::new(
            TodoStore::new(),
            Arc::new(InMemoryRemote::new()),
            OwnerId::new("alice"),
            policy,
        )
    }

    fn titles(todos: &[Todo]) -> Vec<String> {
        todos.iter().map(|todo| todo.title.clone()).collect()
    }

    #[tokio::test]
    async fn confirmed_add_stores_server_record() {
        let service = service(SyncPolicy::Confirmed);
        let todo = service
            .add(NewTodo::new("Buy milk"))
            .await
            .unwrap_or_else(|err| panic!("add: {err}"));
        assert_eq!(todo.id.as_str(), "srv-000001");
        assert_eq!(todo.order, 0);
        assert_eq!(titles(&service.snapshot().await), vec!["Buy milk"]);
    }

    #[tokio::test]
    async fn confirmed_failure_leaves_store_untouched() {
        let service = service(SyncPolicy::Confirmed);
        service
            .add(NewTodo::new("keep"))
            .await
            .unwrap_or_else(|err| panic!("add: {err}"));
        service.remote().fail_with("offline").await;

        let err = service
            .add(NewTodo::new("lost"))
            .await
            .err()
            .unwrap_or_else(|| panic!("add should fail"));
        assert!(matches!(err, SyncError::Remote { operation: "create", .. }));
        assert_eq!(titles(&service.snapshot().await), vec!["keep"]);
    }

    #[tokio::test]
    async fn optimistic_add_reconciles_provisional_id() {
        let service = service(SyncPolicy::Optimistic);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service
            .subscribe(move |change, _| {
                sink.lock().unwrap_or_else(PoisonError::into_inner).push(change.clone());
            })
            .await;

        let todo = service
            .add(NewTodo::new("draft"))
            .await
            .unwrap_or_else(|err| panic!("add: {err}"));
        assert_eq!(todo.id.as_str(), "srv-000001");
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, todo.id);

        let changes = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
        assert!(matches!(changes.as_slice(), [StoreChange::Added(_), StoreChange::Reconciled { .. }]));
    }

    #[tokio::test]
    async fn optimistic_failure_rolls_back() {
        let service = service(SyncPolicy::Optimistic);
        let kept = service
            .add(NewTodo::new("kept"))
            .await
            .unwrap_or_else(|err| panic!("add: {err}"));
        let before = service.snapshot().await;
        service.remote().fail_with("timeout").await;

        assert!(service.add(NewTodo::new("lost")).await.is_err());
        assert!(service.toggle(&kept.id).await.is_err());
        assert!(service.remove(&kept.id).await.is_err());
        let patch = TodoPatch {
            title: Some("renamed".into()),
            ..TodoPatch::default()
        };
        assert!(service.update(&kept.id, patch).await.is_err());
        assert_eq!(service.snapshot().await, before);
    }

    #[tokio::test]
    async fn validation_and_missing_ids_skip_the_remote() {
        let service = service(SyncPolicy::Confirmed);
        let err = service
            .add(NewTodo::new("  "))
            .await
            .err()
            .unwrap_or_else(|| panic!("add should fail"));
        assert!(matches!(err, SyncError::Store(StoreError::Invalid(_))));

        let missing = TodoId::from("missing");
        let err = service
            .toggle(&missing)
            .await
            .err()
            .unwrap_or_else(|| panic!("toggle should fail"));
        assert_eq!(err, SyncError::Store(StoreError::NotFound(missing)));
        assert_eq!(service.remote().calls().await, 0);
    }

    #[tokio::test]
    async fn update_toggle_remove_round_trip_through_remote() {
        for policy in [SyncPolicy::Confirmed, SyncPolicy::Optimistic] {
            let service = service(policy);
            let todo = service
                .add(NewTodo::new("write report"))
                .await
                .unwrap_or_else(|err| panic!("add: {err}"));
            let patch = TodoPatch {
                tags: Some(vec!["work".into()]),
                ..TodoPatch::default()
            };
            let updated = service
                .update(&todo.id, patch)
                .await
                .unwrap_or_else(|err| panic!("update: {err}"));
            assert_eq!(updated.tags, vec!["work"]);
            let toggled = service
                .toggle(&todo.id)
                .await
                .unwrap_or_else(|err| panic!("toggle: {err}"));
            assert!(toggled.completed);
            assert_eq!(service.stats().await.completed, 1);
            assert_eq!(service.tags().await, vec!["work"]);
            service
                .remove(&todo.id)
                .await
                .unwrap_or_else(|err| panic!("remove: {err}"));
            assert!(service.snapshot().await.is_empty());
        }
    }

    #[tokio::test]
    async fn refresh_loads_remote_collection() {
        let remote = Arc::new(InMemoryRemote::new());
        let owner = OwnerId::new("alice");
        for title in ["a", "b"] {
            remote
                .create(&NewTodo::new(title), &owner)
                .await
                .unwrap_or_else(|err| panic!("seed: {err}"));
        }
        let service = TodoService::new(TodoStore::new(), remote, owner, SyncPolicy::Confirmed);
        let count = service
            .refresh()
            .await
            .unwrap_or_else(|err| panic!("refresh: {err}"));
        assert_eq!(count, 2);
        let orders: Vec<usize> = service.snapshot().await.iter().map(|todo| todo.order).collect();
        assert_eq!(orders, vec![0, 1]);
    }

    #[tokio::test]
    async fn reorder_stays_local() {
        let service = service(SyncPolicy::Confirmed);
        for title in ["A", "B", "C"] {
            service
                .add(NewTodo::new(title))
                .await
                .unwrap_or_else(|err| panic!("add: {err}"));
        }
        let calls = service.remote().calls().await;
        service
            .reorder(0, 2)
            .await
            .unwrap_or_else(|err| panic!("reorder: {err}"));
        assert_eq!(titles(&service.snapshot().await), vec!["B", "C", "A"]);
        assert_eq!(service.remote().calls().await, calls);
    }

    #[tokio::test]
    async fn toggle_reports_toggled_under_both_policies() {
        for policy in [SyncPolicy::Confirmed, SyncPolicy::Optimistic] {
            let service = service(policy);
            let todo = service
                .add(NewTodo::new("flip"))
                .await
                .unwrap_or_else(|err| panic!("add: {err}"));
            let seen = Arc::new(StdMutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            service
                .subscribe(move |change, _| {
                    sink.lock().unwrap_or_else(PoisonError::into_inner).push(change.clone());
                })
                .await;

            service
                .toggle(&todo.id)
                .await
                .unwrap_or_else(|err| panic!("toggle: {err}"));
            let changes = seen.lock().unwrap_or_else(PoisonError::into_inner).clone();
            assert!(!changes.is_empty(), "{policy}: no change reported");
            assert!(
                changes
                    .iter()
                    .all(|change| *change == StoreChange::Toggled(todo.id.clone())),
                "{policy}: {changes:?}"
            );
        }
    }

    struct ListingRemote(Vec<Todo>);

    impl RemoteSync for ListingRemote {
        async fn create(&self, _input: &NewTodo, _owner: &OwnerId) -> Result<Todo, RemoteError> {
            Err(RemoteError::new("read only"))
        }

        async fn update(&self, _id: &TodoId, _patch: &TodoPatch) -> Result<Todo, RemoteError> {
            Err(RemoteError::new("read only"))
        }

        async fn delete(&self, _id: &TodoId) -> Result<(), RemoteError> {
            Err(RemoteError::new("read only"))
        }

        async fn toggle(&self, _id: &TodoId) -> Result<Todo, RemoteError> {
            Err(RemoteError::new("read only"))
        }

        async fn list(&self, _owner: &OwnerId) -> Result<Vec<Todo>, RemoteError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn refresh_rejects_malformed_remote_collection() {
        let mut store = TodoStore::new();
        let local = store
            .add(NewTodo::new("local"))
            .unwrap_or_else(|err| panic!("add: {err}"));
        let mut duplicate = local.clone();
        duplicate.title = "shadow".into();
        let mut blank = local.clone();
        blank.id = TodoId::from("srv-000002");
        blank.title = "   ".into();

        let service = TodoService::new(
            store,
            ListingRemote(vec![local.clone(), duplicate]),
            OwnerId::new("alice"),
            SyncPolicy::Confirmed,
        );
        let before = service.snapshot().await;
        let err = service
            .refresh()
            .await
            .err()
            .unwrap_or_else(|| panic!("refresh should fail"));
        assert_eq!(err, SyncError::Store(StoreError::DuplicateId(local.id.clone())));
        assert_eq!(service.snapshot().await, before);

        let service = TodoService::new(
            service.into_store(),
            ListingRemote(vec![local, blank]),
            OwnerId::new("alice"),
            SyncPolicy::Confirmed,
        );
        let err = service
            .refresh()
            .await
            .err()
            .unwrap_or_else(|| panic!("refresh should fail"));
        assert_eq!(err, SyncError::Store(StoreError::BlankTitle(TodoId::from("srv-000002"))));
        assert_eq!(service.snapshot().await, before);
    }
}
