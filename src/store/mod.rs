//! Content-addressed persistence
//!
//! Every record lives under a [`StoreKey`], an ordered list of validated path
//! segments. Backends implement [`KeyValueStore`]; the typed stores on top
//! ([`ResultStore`], [`Study1Corpus`], [`EditedPairStore`]) decide how a record
//! maps to its key.
//!
//! Completeness of a stage is determined purely by key presence, so an
//! interrupted run leaves a valid partial store that the next run resumes.

pub mod corpus;
pub mod edited;
pub mod fs;
pub mod memory;
pub mod results;

pub use corpus::{CandidateSet, Study1Corpus};
pub use edited::EditedPairStore;
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use results::{ResultIter, ResultSet, ResultStore, Scope};

use std::path::{Path, PathBuf};

/// Errors raised by a store backend or a typed store
#[derive(Debug)]
pub enum StoreError {
    /// A key segment is empty, `.`/`..`, or contains a path separator
    InvalidSegment { segment: String, reason: &'static str },
    /// Writing requires at least one segment
    EmptyKey,
    /// Underlying I/O failure
    Io { path: PathBuf, source: std::io::Error },
    /// A record could not be serialized
    Serialize(String),
    /// In-memory backend lock was poisoned by a panicking writer
    Poisoned,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidSegment { segment, reason } => {
                write!(f, "invalid key segment '{}': {}", segment, reason)
            }
            StoreError::EmptyKey => write!(f, "store key has no segments"),
            StoreError::Io { path, source } => {
                write!(f, "I/O error at '{}': {}", path.display(), source)
            }
            StoreError::Serialize(msg) => write!(f, "serialization failed: {}", msg),
            StoreError::Poisoned => write!(f, "store lock poisoned"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Check that a value can be used as one path segment
pub fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let reason = if segment.is_empty() {
        Some("empty")
    } else if segment == "." || segment == ".." {
        Some("relative path component")
    } else if segment.contains('/') || segment.contains('\\') {
        Some("contains a path separator")
    } else if segment.contains('\0') {
        Some("contains a NUL byte")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidSegment {
            segment: segment.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Ordered, validated path segments identifying one record or one scope
///
/// Keys order lexicographically by segment, which is also the order in which
/// backends enumerate them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StoreKey {
    segments: Vec<String>,
}

impl StoreKey {
    /// The empty key, used as the scope covering a whole store
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a key, validating every segment
    pub fn new<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments
            .into_iter()
            .map(Into::into)
            .map(|s: String| validate_segment(&s).map(|_| s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Append one validated segment
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, StoreError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment (the file name for filesystem backends)
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn starts_with(&self, prefix: &StoreKey) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Resolve the key below a base directory
    pub fn to_path(&self, base: &Path) -> PathBuf {
        let mut path = base.to_path_buf();
        for segment in &self.segments {
            path.push(segment);
        }
        path
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// Ordered key-value backend with scoped-prefix enumeration
///
/// Implementations must return keys from [`KeyValueStore::keys`] sorted in
/// [`StoreKey`] order and must never expose a partially written value under
/// its final key.
pub trait KeyValueStore: Send + Sync {
    /// Whether a value exists under `key`
    fn contains(&self, key: &StoreKey) -> Result<bool, StoreError>;

    /// Read the value under `key`, `None` when absent
    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError>;

    /// Every key below `scope`, sorted. A missing scope yields no keys.
    fn keys(&self, scope: &StoreKey) -> Result<Vec<StoreKey>, StoreError>;
}

/// Read and decode one JSON record
///
/// Read failures, a key that vanished mid-scan and malformed JSON all come
/// back as a reason string so bulk loaders can count the record as corrupt
/// and keep going.
pub(crate) fn read_record<S, T>(backend: &S, key: &StoreKey) -> Result<T, String>
where
    S: KeyValueStore + ?Sized,
    T: serde::de::DeserializeOwned,
{
    let bytes = backend
        .get(key)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "record disappeared during iteration".to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn contains(&self, key: &StoreKey) -> Result<bool, StoreError> {
        (**self).contains(key)
    }

    fn get(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn keys(&self, scope: &StoreKey) -> Result<Vec<StoreKey>, StoreError> {
        (**self).keys(scope)
    }
}
