//! Local JSON persistence for the todo collection.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use todoverse_core::Todo;
use tracing::{debug, info, warn};

use crate::store::{Clock, StoreError, SubscriptionId, TodoStore};

/// Key under which the collection is stored.
pub const STORAGE_KEY: &str = "todos";

const FILE_NAME: &str = "todos.json";

/// Errors raised while reading or writing the local copy.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The collection could not be encoded.
    #[error("failed to encode todos: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The stored file is not a valid collection.
    #[error("failed to decode {path}: {source}")]
    Deserialize {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// The temporary file could not replace the target.
    #[error("failed to persist {path}: {source}")]
    Persist {
        /// Target file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: tempfile::PersistError,
    },
    /// The stored collection decoded but violates the store's invariants.
    #[error("stored todos are invalid: {0}")]
    Invalid(#[from] StoreError),
}

/// Backend able to load and save the whole collection.
pub trait TodoStorage: Send + Sync {
    /// Read the stored collection; a missing store yields an empty list.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the data cannot be read or decoded.
    fn load(&self) -> Result<Vec<Todo>, StorageError>;

    /// Overwrite the stored collection.
    ///
    /// # Errors
    /// Returns [`StorageError`] when the data cannot be written.
    fn save(&self, todos: &[Todo]) -> Result<(), StorageError>;
}

impl<S: TodoStorage + ?Sized> TodoStorage for Arc<S> {
    fn load(&self) -> Result<Vec<Todo>, StorageError> {
        (**self).load()
    }

    fn save(&self, todos: &[Todo]) -> Result<(), StorageError> {
        (**self).save(todos)
    }
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    todos: &'a [Todo],
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    todos: Vec<Todo>,
}

/// Stores the collection as `<dir>/todos.json`, replacing the file atomically on save.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FILE_NAME),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TodoStorage for FileStorage {
    fn load(&self) -> Result<Vec<Todo>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(file = %self.path.display(), "no stored todos yet");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let document: Document =
            serde_json::from_str(&contents).map_err(|source| StorageError::Deserialize {
                path: self.path.clone(),
                source,
            })?;
        info!(file = %self.path.display(), count = document.todos.len(), "loaded todos");
        Ok(document.todos)
    }

    fn save(&self, todos: &[Todo]) -> Result<(), StorageError> {
        debug!(file = %self.path.display(), count = todos.len(), "saving todos atomically");
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source: io::Error| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut temp, &DocumentRef { todos })
            .map_err(StorageError::Serialize)?;
        temp.flush().map_err(io_err)?;
        temp.persist(&self.path)
            .map_err(|source| StorageError::Persist {
                path: self.path.clone(),
                source,
            })?;
        Ok(())
    }
}

/// Save the collection after every successful store mutation.
///
/// Failed writes are logged and do not affect the mutation that triggered them.
pub fn attach_storage<S>(store: &mut TodoStore, storage: S) -> SubscriptionId
where
    S: TodoStorage + 'static,
{
    store.subscribe(move |change, todos| {
        if let Err(err) = storage.save(todos) {
            warn!(?change, error = %err, "failed to persist todos");
        }
    })
}

/// Load a store from `storage` and keep it persisted.
///
/// Records are checked and placed as described on [`TodoStore::load`].
///
/// # Errors
/// Returns [`StorageError`] when the stored collection cannot be loaded, or
/// [`StorageError::Invalid`] when it holds duplicate ids or blank titles.
pub fn open_store<S>(storage: S, clock: Arc<dyn Clock>) -> Result<TodoStore, StorageError>
where
    S: TodoStorage + 'static,
{
    let mut store = TodoStore::load(storage.load()?, clock)?;
    attach_storage(&mut store, storage);
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SystemClock;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use todoverse_core::NewTodo;

    struct FailingStorage {
        attempts: Mutex<usize>,
    }

    impl TodoStorage for FailingStorage {
        fn load(&self) -> Result<Vec<Todo>, StorageError> {
            Ok(Vec::new())
        }

        fn save(&self, _todos: &[Todo]) -> Result<(), StorageError> {
            *self
                .attempts
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
            Err(StorageError::Io {
                path: PathBuf::from("/dev/full"),
                source: io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let storage = FileStorage::new(dir.path().join("nested"));
        let todos = storage.load().unwrap_or_else(|err| panic!("load: {err}"));
        assert!(todos.is_empty());
    }

    #[test]
    fn saves_under_todos_key_and_reloads() {
        let dir = tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let storage = FileStorage::new(dir.path());
        let mut store = open_store(storage.clone(), Arc::new(SystemClock))
            .unwrap_or_else(|err| panic!("open: {err}"));
        store
            .add(NewTodo::new("persist me").tags(["home"]))
            .unwrap_or_else(|err| panic!("add: {err}"));

        let raw = fs::read_to_string(storage.path()).unwrap_or_else(|err| panic!("read: {err}"));
        let json: serde_json::Value =
            serde_json::from_str(&raw).unwrap_or_else(|err| panic!("parse: {err}"));
        assert_eq!(json[STORAGE_KEY][0]["title"], "persist me");

        let reloaded = storage.load().unwrap_or_else(|err| panic!("load: {err}"));
        assert_eq!(reloaded, store.snapshot());
    }

    #[test]
    fn open_store_renumbers_by_stored_order() {
        let dir = tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let storage = FileStorage::new(dir.path());
        let mut seed = TodoStore::new();
        let mut first = seed
            .add(NewTodo::new("first"))
            .unwrap_or_else(|err| panic!("add: {err}"));
        let mut second = seed
            .add(NewTodo::new("second"))
            .unwrap_or_else(|err| panic!("add: {err}"));
        first.order = 7;
        second.order = 3;
        storage
            .save(&[first, second])
            .unwrap_or_else(|err| panic!("save: {err}"));

        let store = open_store(storage, Arc::new(SystemClock)).unwrap_or_else(|err| panic!("open: {err}"));
        let loaded: Vec<(&str, usize)> = store
            .todos()
            .iter()
            .map(|todo| (todo.title.as_str(), todo.order))
            .collect();
        assert_eq!(loaded, vec![("second", 0), ("first", 1)]);
    }

    #[test]
    fn malformed_records_are_rejected_on_open() {
        let dir = tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let storage = FileStorage::new(dir.path());
        let record = |id: &str, title: &str| {
            format!(
                r#"{{"id":"{id}","title":"{title}","createdAt":"2024-05-10T08:00:00Z","updatedAt":"2024-05-09T08:00:00Z","order":0}}"#
            )
        };
        let write = |records: &[String]| {
            let body = format!(r#"{{"todos":[{}]}}"#, records.join(","));
            fs::write(storage.path(), body).unwrap_or_else(|err| panic!("write: {err}"));
        };

        write(&[record("x", "first"), record("x", "second")]);
        let result = open_store(storage.clone(), Arc::new(SystemClock));
        assert!(matches!(
            result,
            Err(StorageError::Invalid(StoreError::DuplicateId(ref id))) if id.as_str() == "x"
        ));

        write(&[record("x", "first"), record("y", "   ")]);
        let result = open_store(storage.clone(), Arc::new(SystemClock));
        assert!(matches!(result, Err(StorageError::Invalid(StoreError::BlankTitle(_)))));

        write(&[record("x", "first")]);
        let store = open_store(storage, Arc::new(SystemClock)).unwrap_or_else(|err| panic!("open: {err}"));
        let todo = &store.todos()[0];
        assert_eq!(todo.updated_at, todo.created_at);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let storage = FileStorage::new(dir.path());
        fs::write(storage.path(), "{not json").unwrap_or_else(|err| panic!("write: {err}"));
        assert!(matches!(storage.load(), Err(StorageError::Deserialize { .. })));
    }

    #[test]
    fn save_failures_do_not_fail_mutations() {
        let storage = Arc::new(FailingStorage {
            attempts: Mutex::new(0),
        });
        let mut store = TodoStore::new();
        attach_storage(&mut store, Arc::clone(&storage));
        store
            .add(NewTodo::new("still added"))
            .unwrap_or_else(|err| panic!("add: {err}"));
        assert_eq!(store.len(), 1);
        assert_eq!(
            *storage
                .attempts
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
            1
        );
    }
}
