use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Key holding the raw credential string
pub const TOKEN_KEY: &str = "token";

/// Key holding the serialized user profile
pub const USER_KEY: &str = "user";

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Process-wide key-value storage for session state.
///
/// Writes are last-writer-wins; there is no transactional grouping of keys.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk.
///
/// The file is read once on first access and rewritten after every mutation.
/// The cached map only changes once the file write has succeeded, so this
/// process never sees a value the disk does not hold.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<HashMap<String, String>>>,
}

impl FileStore {
    /// Create a store backed by `session.json` inside `cache_dir`
    pub fn new(cache_dir: &Path) -> Self {
        Self::at(cache_dir.join(SESSION_FILE))
    }

    /// Create a store backed by an explicit file path
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> HashMap<String, String> {
        if !path.exists() {
            return HashMap::new();
        }
        let parsed = std::fs::read_to_string(path)
            .context("Failed to read session file")
            .and_then(|contents| {
                serde_json::from_str::<HashMap<String, String>>(&contents)
                    .context("Failed to parse session file")
            });
        match parsed {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable session file");
                HashMap::new()
            }
        }
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), keys = entries.len(), "Session file saved");
        Ok(())
    }

    fn with_entries<R>(&self, f: impl FnOnce(&HashMap<String, String>) -> R) -> R {
        let mut guard = self.entries.lock();
        let entries = guard.get_or_insert_with(|| Self::load(&self.path));
        f(entries)
    }

    /// Apply `change` to a copy, persist it, then swap it in.
    /// `change` returns false when there is nothing to write.
    fn update(&self, change: impl FnOnce(&mut HashMap<String, String>) -> bool) -> Result<()> {
        let mut guard = self.entries.lock();
        let current = guard.get_or_insert_with(|| Self::load(&self.path));

        let mut next = current.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.save(&next)?;
        *current = next;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some())
    }
}
