use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PersistError;

const STATE_FILE_REL: &str = "marktree/state.json";
const STORE_FILE_NAME: &str = "bookmarks.json";
const LOG_DIR_NAME: &str = "logs";

/// String key-value storage for settings and view state.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    values: BTreeMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileKv {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonFileKv {
    /// A missing file starts empty; an unreadable one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), %err, "state file is malformed, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, values }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.values)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        if self.values.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        if self.values.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

pub fn state_file_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join(STATE_FILE_REL));
    }
    if let Ok(appdata) = std::env::var("APPDATA")
        && !appdata.is_empty()
    {
        return Some(PathBuf::from(appdata).join(STATE_FILE_REL));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join(STATE_FILE_REL))
}

pub fn state_dir() -> PathBuf {
    state_file_path()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_store_path() -> PathBuf {
    state_dir().join(STORE_FILE_NAME)
}

pub fn log_dir() -> PathBuf {
    state_dir().join(LOG_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_file_kv_survives_reopen() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join("state.json");
        {
            let mut kv = JsonFileKv::open(&path);
            kv.set("opens", "1,5").expect("set");
            kv.set("scroll_top", "3").expect("set");
            kv.remove("scroll_top").expect("remove");
        }
        let kv = JsonFileKv::open(&path);
        assert_eq!(kv.get("opens").as_deref(), Some("1,5"));
        assert_eq!(kv.get("scroll_top"), None);
    }

    #[test]
    fn malformed_state_file_starts_empty() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("state.json");
        fs::write(&path, "{not json").expect("write");
        let mut kv = JsonFileKv::open(&path);
        assert_eq!(kv.get("opens"), None);
        kv.set("opens", "7").expect("set");
        assert_eq!(JsonFileKv::open(&path).get("opens").as_deref(), Some("7"));
    }

    #[test]
    fn memory_kv_builder() {
        let kv = MemoryKv::new().with("rtl", "true");
        assert_eq!(kv.get("rtl").as_deref(), Some("true"));
    }
}
