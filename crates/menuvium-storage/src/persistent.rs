use crate::mem::{self, InMemoryPrefs};
use crate::traits::{PrefStore, UpdateFn};
use menuvium_core::{MenuError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const PREFS_FILE: &str = "prefs.json";

/// Preferences kept in `<dir>/prefs.json`. Reads are served from memory;
/// every write rewrites the file through a temp file and rename, and memory
/// only changes once the rename has landed.
pub struct FilePrefs {
    mem: InMemoryPrefs,
    path: PathBuf,
    write_lock: parking_lot::Mutex<()>,
}

impl FilePrefs {
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(PREFS_FILE);
        let map = load_map(&path);
        Ok(Self {
            mem: InMemoryPrefs::from_map(map),
            path,
            write_lock: parking_lot::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&self, key: &str, f: UpdateFn<'_>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut next = self.mem.snapshot();
        mem::apply(&mut next, key, f)?;
        write_map(&self.path, &next)?;
        self.mem.replace(next);
        Ok(())
    }
}

fn write_map(path: &Path, map: &BTreeMap<String, String>) -> Result<()> {
    let body = serde_json::to_vec_pretty(map).map_err(|e| MenuError::Internal(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| MenuError::Internal(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| MenuError::Internal(e.to_string()))
}

// A missing file is an empty store; a damaged one is logged and ignored.
fn load_map(path: &Path) -> BTreeMap<String, String> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "prefs unreadable, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "prefs file malformed, starting empty");
            BTreeMap::new()
        }
    }
}

impl PrefStore for FilePrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.mem.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.commit(key, &mut |_| Ok(Some(value.to_string())))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.commit(key, &mut |_| Ok(None))
    }

    fn update(&self, key: &str, f: UpdateFn<'_>) -> Result<()> {
        self.commit(key, f)
    }
}
