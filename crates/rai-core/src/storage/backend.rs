//! Storage backends behind the session store
//!
//! Both backends are shared: every handle cloned from one backend (or every
//! file backend opened on the same path) sees the same values, the way tabs
//! of one origin share their storage.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, Result};

/// Raw string key/value storage.
pub trait SessionBackend: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Remove several keys in one write
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

/// In-process storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.values.write();
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

/// JSON file storage.
///
/// Reads go to disk every time, so separate handles on one file observe
/// each other's writes. Writes from this process are serialized.
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .finish()
    }
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| CoreError::Storage(format!("read {}: {}", self.path.display(), e)))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| CoreError::Storage(format!("parse {}: {}", self.path.display(), e)))
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::Storage(e.to_string()))?;
        }
        let contents =
            serde_json::to_string_pretty(values).map_err(|e| CoreError::Storage(e.to_string()))?;
        fs::write(&self.path, contents)
            .map_err(|e| CoreError::Storage(format!("write {}: {}", self.path.display(), e)))?;

        // Credentials live here; keep the file private on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = fs::metadata(&self.path) {
                let mut permissions = metadata.permissions();
                permissions.set_mode(0o600);
                let _ = fs::set_permissions(&self.path, permissions);
            }
        }
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut values = self.load()?;
        apply(&mut values);
        self.save(&values)
    }
}

impl SessionBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|values| {
            values.remove(key);
        })
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        self.update(|values| {
            for key in keys {
                values.remove(*key);
            }
        })
    }
}
