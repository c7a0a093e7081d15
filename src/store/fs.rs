//! Filesystem backend
//!
//! Keys map to paths below a root directory. Values are written to a hidden
//! temporary sibling and renamed into place; hidden files are never reported
//! as keys, so a write interrupted before the rename leaves only an orphaned
//! temporary file.

use super::{KeyValueStore, StoreError, StoreKey};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory-backed [`KeyValueStore`]
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root`; the directory is created lazily on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of a key
    pub fn path_of(&self, key: &StoreKey) -> PathBuf {
        key.to_path(&self.root)
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn key_of(&self, path: &Path) -> Option<StoreKey> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        StoreKey::new(segments).ok()
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

impl KeyValueStore for FsStore {
    fn contains(&self, key: &StoreKey) -> Result<bool, StoreError> {
        if key.is_root() {
            return Ok(false);
        }
        Ok(self.path_of(key).is_file())
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        if key.is_root() {
            return Ok(None);
        }
        let path = self.path_of(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(&path, e)),
        }
    }

    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        let leaf = key.leaf().ok_or(StoreError::EmptyKey)?;
        let path = self.path_of(key);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&parent).map_err(|e| Self::io_error(&parent, e))?;

        let tmp = parent.join(format!(".{}.{}.tmp", leaf, uuid::Uuid::new_v4().simple()));
        std::fs::write(&tmp, value).map_err(|e| Self::io_error(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Self::io_error(&path, e));
        }
        Ok(())
    }

    fn keys(&self, scope: &StoreKey) -> Result<Vec<StoreKey>, StoreError> {
        let dir = self.path_of(scope);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            // An unreadable subtree is left out; its records are missing, not fatal
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable store entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let hidden = entry
                .file_name()
                .to_str()
                .map(is_hidden)
                .unwrap_or(true);
            if hidden {
                continue;
            }
            match self.key_of(entry.path()) {
                Some(key) => keys.push(key),
                None => tracing::warn!(path = %entry.path().display(), "Ignoring file with unusable name"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(parts: &[&str]) -> StoreKey {
        StoreKey::new(parts.iter().copied()).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let k = key(&["blind", "GPT_OSS_20B", "NOVA_MICRO", "abc.json"]);

        assert!(!store.contains(&k).unwrap());
        assert_eq!(store.get(&k).unwrap(), None);

        store.put(&k, b"{}").unwrap();
        assert!(store.contains(&k).unwrap());
        assert_eq!(store.get(&k).unwrap().as_deref(), Some(&b"{}"[..]));
        assert!(dir
            .path()
            .join("blind/GPT_OSS_20B/NOVA_MICRO/abc.json")
            .is_file());
    }

    #[test]
    fn test_put_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let k = key(&["a", "b.json"]);
        store.put(&k, b"1").unwrap();
        store.put(&k, b"2").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["b.json".to_string()]);
        assert_eq!(store.get(&k).unwrap().unwrap(), b"2");
    }

    #[test]
    fn test_keys_are_sorted_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        for parts in [
            &["within_model", "B", "B", "2.json"][..],
            &["within_model", "A", "A", "1.json"][..],
            &["blind", "A", "C", "9.json"][..],
        ] {
            store.put(&key(parts), b"x").unwrap();
        }
        std::fs::write(dir.path().join("within_model/.orphan.tmp"), b"partial").unwrap();

        let all = store.keys(&StoreKey::root()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].to_string(), "blind/A/C/9.json");

        let scoped = store.keys(&key(&["within_model"])).unwrap();
        let names: Vec<_> = scoped.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["within_model/A/A/1.json", "within_model/B/B/2.json"]);
    }

    #[test]
    fn test_missing_scope_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("never-created"));
        assert!(store.keys(&StoreKey::root()).unwrap().is_empty());
    }

    #[test]
    fn test_put_rejects_root_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        assert!(matches!(
            store.put(&StoreKey::root(), b"x"),
            Err(StoreError::EmptyKey)
        ));
    }
}
