//! Application layer for todoverse.
//!
//! Owns the mutable todo collection, keeps it in sync with a remote backend,
//! persists it locally, and loads user configuration.

/// User configuration.
pub mod config;
/// Remote backend contract and an in-process implementation.
pub mod remote;
/// Store and remote coordination.
pub mod service;
/// Local persistence.
pub mod storage;
/// Authoritative in-memory collection.
pub mod store;

// Re-exports for convenience
pub use config::{AppConfig, ENV_CONFIG, StorageConfig, ViewConfig};
pub use remote::{InMemoryRemote, OwnerId, RemoteError, RemoteSync};
pub use service::{SyncError, SyncPolicy, TodoService};
pub use storage::{FileStorage, STORAGE_KEY, StorageError, TodoStorage, attach_storage, open_store};
pub use store::{
    Clock, ManualClock, StoreChange, StoreError, SubscriptionId, SystemClock, TodoStore,
};
