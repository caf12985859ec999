use crate::traits::{PrefStore, UpdateFn};
use menuvium_core::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryPrefs {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryPrefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_map(map: BTreeMap<String, String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub(crate) fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.read().clone()
    }

    pub(crate) fn replace(&self, map: BTreeMap<String, String>) {
        *self.inner.write() = map;
    }
}

pub(crate) fn apply(
    map: &mut BTreeMap<String, String>,
    key: &str,
    f: UpdateFn<'_>,
) -> Result<()> {
    match f(map.get(key).map(String::as_str))? {
        Some(value) => {
            map.insert(key.to_string(), value);
        }
        None => {
            map.remove(key);
        }
    }
    Ok(())
}

impl PrefStore for InMemoryPrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn update(&self, key: &str, f: UpdateFn<'_>) -> Result<()> {
        apply(&mut self.inner.write(), key, f)
    }
}
