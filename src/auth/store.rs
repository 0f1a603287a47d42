use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::{STORE_TOKEN_KEY, STORE_USER_KEY};
use crate::utils::PlazaError;

/// Process-wide string slots holding the persisted session
///
/// Only two keys are used: `token` and `user` (a JSON identity snapshot).
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), PlazaError>;

    fn remove(&self, key: &str) -> Result<(), PlazaError>;
}

/// Remove both session slots
///
/// Both removals are attempted; the first failure is returned.
pub fn clear_session(store: &dyn SessionStore) -> Result<(), PlazaError> {
    let token = store.remove(STORE_TOKEN_KEY);
    let user = store.remove(STORE_USER_KEY);
    token.and(user)
}

/// Volatile store, used for tests and `--ephemeral` runs
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlazaError> {
        self.slots.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PlazaError> {
        self.slots.lock().remove(key);
        Ok(())
    }
}

/// JSON file backed store, shared by every plaza process of the same user
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileSessionStore {
    /// Open the store at `path`, starting empty when the file is missing
    /// or unreadable
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlazaError> {
        let path = path.as_ref().to_path_buf();

        let slots = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(slots) => slots,
                Err(e) => {
                    // Corrupt file: bootstrap will see no session
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable session store");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, slots: &BTreeMap<String, String>) -> Result<(), PlazaError> {
        if slots.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(slots)?;
        write_private(&self.path, json.as_bytes()).map_err(|e| {
            PlazaError::StoreError(format!("Failed to write {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), "Session store written");
        Ok(())
    }
}

/// Write `contents` to `path`, readable by the owner only on Unix
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // The mode above only applies to newly created files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.sync_all()
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlazaError> {
        let mut slots = self.slots.lock();
        slots.insert(key.to_string(), value.to_string());
        self.persist(&slots)
    }

    fn remove(&self, key: &str) -> Result<(), PlazaError> {
        let mut slots = self.slots.lock();
        if slots.remove(key).is_some() {
            self.persist(&slots)?;
        }
        Ok(())
    }
}
