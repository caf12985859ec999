use menuvium_core::Result;

/// Read-modify-write step for [`PrefStore::update`]: receives the current
/// value and returns the new one, `None` to remove the key.
pub type UpdateFn<'a> = &'a mut dyn FnMut(Option<&str>) -> Result<Option<String>>;

/// Key/value store for guest-side preferences. Values are raw strings; the
/// typed layer in `preferences` decides how to parse them.
pub trait PrefStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;

    /// Applies `f` to one key with writers excluded for the whole step. An
    /// error from `f` leaves the store untouched.
    fn update(&self, key: &str, f: UpdateFn<'_>) -> Result<()>;
}
