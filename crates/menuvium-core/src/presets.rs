//! Built-in tag vocabularies and facet labels.

use serde::{Deserialize, Serialize};

pub const DIET_TAGS: &[&str] = &["Vegetarian", "Vegan", "Eggless", "Halal", "Jain"];
pub const ALLERGEN_TAGS: &[&str] = &["Contains Nuts", "Contains Dairy", "Contains Gluten"];
pub const SPICE_TAGS: &[&str] = &["Mild", "Spicy", "Extra Spicy"];
pub const HIGHLIGHT_TAGS: &[&str] = &["Bestseller", "Chef's Special", "New"];

/// Suggested tag names per bucket, offered by tag pickers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TagPresets {
    pub diet: &'static [&'static str],
    pub spice: &'static [&'static str],
    pub highlights: &'static [&'static str],
    pub allergens: &'static [&'static str],
}

pub const TAG_PRESETS: TagPresets = TagPresets {
    diet: DIET_TAGS,
    spice: SPICE_TAGS,
    highlights: HIGHLIGHT_TAGS,
    allergens: ALLERGEN_TAGS,
};

/// Facet bucket a dietary tag is shown under.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TagGroup {
    Diet,
    Spice,
    Highlights,
}

impl TagGroup {
    /// Preset classification by name. Allergen presets are never consulted.
    pub fn infer(name: &str) -> Self {
        let key = normalize(name);
        if DIET_TAGS.iter().any(|t| normalize(t) == key) {
            TagGroup::Diet
        } else if SPICE_TAGS.iter().any(|t| normalize(t) == key) {
            TagGroup::Spice
        } else {
            TagGroup::Highlights
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TagGroup::Diet => "diet",
            TagGroup::Spice => "spice",
            TagGroup::Highlights => "highlights",
        }
    }
}

impl std::str::FromStr for TagGroup {
    type Err = crate::MenuError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "diet" => Ok(TagGroup::Diet),
            "spice" => Ok(TagGroup::Spice),
            "highlights" => Ok(TagGroup::Highlights),
            other => Err(crate::MenuError::Invalid(format!("unknown tag group {other:?}"))),
        }
    }
}

/// Display label per facet bucket. Deserializing a partial object keeps the
/// defaults for the buckets it leaves out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TagLabels {
    pub diet: String,
    pub spice: String,
    pub highlights: String,
    pub allergens: String,
}

impl Default for TagLabels {
    fn default() -> Self {
        Self {
            diet: "Diet".into(),
            spice: "Spice Level".into(),
            highlights: "Highlights".into(),
            allergens: "Allergens".into(),
        }
    }
}

impl TagLabels {
    /// Sets one bucket's label; `bucket` is `diet`, `spice`, `highlights` or `allergens`.
    pub fn set(&mut self, bucket: &str, label: impl Into<String>) -> crate::Result<()> {
        let slot = match bucket {
            "diet" => &mut self.diet,
            "spice" => &mut self.spice,
            "highlights" => &mut self.highlights,
            "allergens" => &mut self.allergens,
            other => {
                return Err(crate::MenuError::Invalid(format!(
                    "unknown facet bucket {other:?}"
                )))
            }
        };
        *slot = label.into();
        Ok(())
    }
}

pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
