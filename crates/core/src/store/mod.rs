#![allow(missing_docs)]

//! Durable key/value storage for client state (the cookie jar equivalent).

/// JSON file backed store.
pub mod file;
/// Process-local store, used by tests and ephemeral sessions.
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Failure reading or writing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One pending change: `Some` writes the value, `None` removes the key.
pub type StoreChange<'a> = (&'a str, Option<&'a str>);

/// String key/value store that survives restarts.
pub trait PersistedStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.apply(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.apply(&[(key, None)])
    }

    /// Remove every key in `keys`.
    fn clear(&self, keys: &[&str]) -> Result<(), StoreError> {
        let changes: Vec<StoreChange<'_>> = keys.iter().map(|key| (*key, None)).collect();
        self.apply(&changes)
    }

    /// Apply a batch of changes. Implementations make the batch visible all at
    /// once where the medium allows it.
    fn apply(&self, changes: &[StoreChange<'_>]) -> Result<(), StoreError>;
}
