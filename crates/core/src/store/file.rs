use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::warn;

use super::{PersistedStore, StoreChange, StoreError};

/// Store persisted as a flat JSON object in a single file.
///
/// Every batch rewrites the whole file through a temporary sibling that is
/// renamed into place, so readers see either the old or the new contents.
/// The temporary file is created owner-only, which the rename preserves.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let serialized = serde_json::to_vec_pretty(entries)?;
        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl PersistedStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(key))
    }

    fn apply(&self, changes: &[StoreChange<'_>]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StoreError::Serde(err)) => {
                warn!(path = %self.path.display(), %err, "discarding unreadable store file");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };

        for (key, value) in changes {
            match value {
                Some(value) => {
                    entries.insert((*key).to_string(), (*value).to_string());
                }
                None => {
                    entries.remove(*key);
                }
            }
        }
        self.write_entries(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn values_survive_a_new_instance() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("state").join("session.json");

        let store = FileStore::new(&path);
        assert_eq!(store.get("authToken")?, None);
        store.apply(&[("authToken", Some("abc")), ("userRole", Some("admin"))])?;
        assert!(path.is_file());

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("authToken")?.as_deref(), Some("abc"));
        assert_eq!(reopened.get("userRole")?.as_deref(), Some("admin"));

        reopened.clear(&["authToken", "userRole"])?;
        assert_eq!(store.get("authToken")?, None);
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_fail_but_writes_recover() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json")?;

        let store = FileStore::new(&path);
        assert!(matches!(store.get("user"), Err(StoreError::Serde(_))));

        store.set("user", "{}")?;
        assert_eq!(store.get("user")?.as_deref(), Some("{}"));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn store_file_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let path = dir.path().join("session.json");
        FileStore::new(&path).set("authToken", "secret")?;
        let mode = fs::metadata(&path)?.permissions().mode();
        assert_eq!(mode & 0o077, 0);
        Ok(())
    }
}
