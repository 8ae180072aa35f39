use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// Storage key for the raw API credential string.
pub const API_KEY_KEY: &str = "openai_api_key";
/// Storage key for the JSON-serialized recent-questions log.
pub const RECENT_QUESTIONS_KEY: &str = "recent_questions";

/// Durable string-keyed storage, one file per key under the app directory.
///
/// Writes are last-write-wins with no locking; fine for a single interactive
/// process.
pub struct KvStore {
    dir: PathBuf,
}

impl KvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<config_dir>/chatwrap/`.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("chatwrap");
        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A missing key reads as `None`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.dir.join(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(key), value)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path());
        assert_eq!(store.get("nothing_here").unwrap(), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path().join("nested"));
        store.set(API_KEY_KEY, "sk-abc123").unwrap();
        assert_eq!(store.get(API_KEY_KEY).unwrap().as_deref(), Some("sk-abc123"));
    }

    #[test]
    fn set_overwrites_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::new(dir.path());
        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("second"));
    }
}
