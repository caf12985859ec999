//! Typed view over the preference store.
//!
//! Every key is optional and a missing key means the default. A stored value
//! that does not parse is discarded with a warning; loading never fails.

use crate::traits::PrefStore;
use menuvium_core::presets::{TagGroup, TagLabels};
use menuvium_core::{MenuError, Result, SoldOutMode, TagGroupOverrides};
use serde::{Deserialize, Serialize};

pub const SOLD_OUT_DISPLAY_KEY: &str = "menuvium_sold_out_display";
pub const TAG_LABELS_KEY: &str = "menuvium_tag_labels";
pub const TAG_GROUPS_KEY: &str = "menuvium_tag_groups";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientPreferences {
    pub sold_out_display: SoldOutMode,
    pub tag_labels: TagLabels,
    pub tag_groups: TagGroupOverrides,
}

impl ClientPreferences {
    pub fn load(store: &dyn PrefStore) -> Self {
        let sold_out_display = match store.get(SOLD_OUT_DISPLAY_KEY) {
            Some(raw) => raw.parse::<SoldOutMode>().unwrap_or_else(|e: MenuError| {
                tracing::warn!(error = %e, "ignoring stored sold-out display");
                SoldOutMode::default()
            }),
            None => SoldOutMode::default(),
        };
        Self {
            sold_out_display,
            tag_labels: load_json(store, TAG_LABELS_KEY),
            tag_groups: load_json(store, TAG_GROUPS_KEY),
        }
    }

    pub fn save_sold_out_display(store: &dyn PrefStore, mode: SoldOutMode) -> Result<()> {
        store.set(SOLD_OUT_DISPLAY_KEY, mode.as_str())
    }

    pub fn save_tag_labels(store: &dyn PrefStore, labels: &TagLabels) -> Result<()> {
        save_json(store, TAG_LABELS_KEY, labels)
    }

    pub fn save_tag_groups(store: &dyn PrefStore, groups: &TagGroupOverrides) -> Result<()> {
        save_json(store, TAG_GROUPS_KEY, groups)
    }

    /// Edits the stored labels in place. Nothing is written when `edit` fails.
    pub fn update_tag_labels(
        store: &dyn PrefStore,
        edit: impl FnOnce(&mut TagLabels) -> Result<()>,
    ) -> Result<TagLabels> {
        update_json(store, TAG_LABELS_KEY, edit)
    }

    /// Moves one tag (by identity key) into `group`, or back to preset
    /// classification when `group` is `None`.
    pub fn assign_tag_group(
        store: &dyn PrefStore,
        identity_key: &str,
        group: Option<TagGroup>,
    ) -> Result<TagGroupOverrides> {
        Self::assign_tag_groups(store, [(identity_key.to_string(), group)])
    }

    /// Applies several group moves as one write.
    pub fn assign_tag_groups(
        store: &dyn PrefStore,
        changes: impl IntoIterator<Item = (String, Option<TagGroup>)>,
    ) -> Result<TagGroupOverrides> {
        update_json(store, TAG_GROUPS_KEY, |groups: &mut TagGroupOverrides| {
            for (key, group) in changes {
                match group {
                    Some(g) => {
                        groups.insert(key, g);
                    }
                    None => {
                        groups.remove(&key);
                    }
                }
            }
            Ok(())
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned + Default>(key: &str, raw: Option<&str>) -> T {
    let Some(raw) = raw else {
        return T::default();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(key, error = %e, "discarding malformed preference");
        T::default()
    })
}

fn load_json<T: serde::de::DeserializeOwned + Default>(store: &dyn PrefStore, key: &str) -> T {
    parse_json(key, store.get(key).as_deref())
}

fn save_json<T: Serialize>(store: &dyn PrefStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|e| MenuError::Internal(e.to_string()))?;
    store.set(key, &raw)
}

// Parse, edit and write back under the store's update lock.
fn update_json<T>(
    store: &dyn PrefStore,
    key: &str,
    edit: impl FnOnce(&mut T) -> Result<()>,
) -> Result<T>
where
    T: Serialize + serde::de::DeserializeOwned + Default,
{
    let mut edit = Some(edit);
    let mut updated = None;
    store.update(key, &mut |raw| {
        let mut value: T = parse_json(key, raw);
        if let Some(edit) = edit.take() {
            edit(&mut value)?;
        }
        let body =
            serde_json::to_string(&value).map_err(|e| MenuError::Internal(e.to_string()))?;
        updated = Some(value);
        Ok(Some(body))
    })?;
    updated.ok_or_else(|| MenuError::Internal(format!("update of {key} did not run")))
}
